use std::io;

use thiserror::Error;

use crate::LayerId;

/// Result type used throughout layerfs.
pub type LFResult<T> = Result<T, LFError>;

/// Errors raised by the superblock core.
#[derive(Debug, Error)]
pub enum LFError {
    /// Bad magic or version. The record is foreign or uninitialized and its links are never trusted.
    #[error("superblock at block {block} has an unknown format (magic {magic:#x}, version {version})")]
    FormatMismatch {
        /// Block the record was read from
        block:   u64,
        /// Magic found on disk
        magic:   u64,
        /// Version found on disk
        version: u32,
    },

    /// Valid format but the checksum does not match. No repair is attempted.
    #[error("superblock at block {block} is corrupt: checksum {found:#010x}, expected {expected:#010x}")]
    Corruption {
        /// Block the record was read from
        block:    u64,
        /// Checksum stored in the record
        found:    u32,
        /// Checksum computed over the record
        expected: u32,
    },

    /// The allocator could not satisfy a superblock reservation.
    #[error("unable to reserve {count} superblock block(s)")]
    Allocation {
        /// Number of blocks requested
        count: u64,
    },

    /// A block write failed. Writes already completed for other layers are kept.
    #[error("write of block {block} failed: {source}")]
    Write {
        /// Destination block
        block:  u64,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// An internal invariant was broken. Linkage must not be trusted after this.
    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),

    /// The layer does not exist in the registry
    #[error("no such layer: {0}")]
    NoLayer(LayerId),

    /// The layer cannot be removed while it still has children
    #[error("layer {0} still has child layers")]
    LayerBusy(LayerId),

    /// The layer is frozen and cannot be modified
    #[error("layer {0} is read-only")]
    ReadOnly(LayerId),

    /// The forest was mounted with unusable superblocks skipped and is never written
    #[error("forest mounted read-only: part of it could not be loaded")]
    ReadOnlyForest,

    /// Block address beyond the end of the device
    #[error("block {block} is out of range (device has {size} blocks)")]
    OutOfRange {
        /// Requested block
        block: u64,
        /// Device size in blocks
        size:  u64,
    },

    /// A lock was poisoned by a panicking thread
    #[error("lock poisoned")]
    Poison,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LFError {
    /// True for errors that make a layer unmountable: bad format or bad checksum.
    pub fn is_unmountable(&self) -> bool {
        matches!(self, LFError::FormatMismatch { .. } | LFError::Corruption { .. })
    }
}
