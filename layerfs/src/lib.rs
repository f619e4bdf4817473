#![warn(missing_docs)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::comparison_chain)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::print_stdout)]
#![deny(clippy::cast_possible_truncation)]

//! layerfs, the superblock core of a layered copy-on-write filesystem.

#[macro_use]
extern crate more_asserts;

#[macro_use]
extern crate log;

#[macro_use]
extern crate layerfs_macros;

/// The filesystem's block size. Every superblock occupies exactly one block.
pub const BLOCK_SIZE: usize = 4096;

/// The filesystem's signature. Stored little-endian as the superblock magic.
pub const SIGNATURE: &[u8; 8] = b"layerFS!";

/// Magic number found at the start of every superblock.
pub const SUPER_MAGIC: u64 = u64::from_le_bytes(*SIGNATURE);

/// On-disk format version.
pub const VERSION: u32 = 1;

/// Fixed location of the primary layer's superblock.
pub const SUPER_BLOCK: u64 = 0;

/// First block handed out by the allocator.
pub const START_BLOCK: u64 = SUPER_BLOCK + 1;

/// Inode number of a layer's root directory.
pub const ROOT_INODE: u64 = 2;

/// First inode number handed out after the root.
pub const START_INODE: u64 = ROOT_INODE + 1;

/// Sentinel for a block address that has not been assigned yet.
pub const INVALID_BLOCK: u64 = u64::MAX;

pub use self::{
    config::{AllocStrategy, ForestConfig},
    disk::{Disk, DiskFile, DiskMem, DiskObj},
    error::{LFError, LFResult},
    forest::{Forest, ForestHandle, StatFs},
    layer::{DirtyKind, Layer, LayerId},
    ondisk::*,
    writeback::{DirectSink, QueuedSink, SuperblockSink, WritebackQueue},
};

mod checkpoint;
mod config;
mod disk;
mod error;
mod forest;
mod layer;
mod ondisk;
mod writeback;

pub use self::checkpoint::CheckpointStats;

/// Functions useful for testing
pub mod test;

/// Implementation for several utilites: fsck,mkfs,etc...
pub mod operations;

/// Documentation-only module
pub mod doc;
