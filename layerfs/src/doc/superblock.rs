//!
//! Every layer has exactly one superblock, occupying one block.
//!
//! The primary layer's superblock always lives at [SUPER_BLOCK](crate::SUPER_BLOCK) and is the only
//! one carrying the device-wide counters (blocks in use, inode numbers, device size):
//! ```
//! # use layerfs::{Superblock, BLOCK_SIZE, ROOT_INODE};
//! let primary = Superblock::new(ROOT_INODE, 1000 * BLOCK_SIZE as u64, 0, true);
//! assert!(primary.is_global());
//! assert_eq!(primary.total_blocks(), 1000);
//!
//! let layer = Superblock::new(ROOT_INODE, 0, 0, false);
//! assert!(!layer.is_global());
//! ```
//!
//! Superblocks start with a magic number and a format version. A record with
//! the wrong magic or version is foreign, and none of its links are followed.
//!
//! Since superblocks aren't referenced by checksummed pointers, they carry
//! their own CRC32, computed over the whole block with the checksum field
//! zeroed:
//! ```
//! # use layerfs::{DiskMem, LFError, Superblock, ROOT_INODE};
//! let disk = DiskMem::open(4);
//! let mut sb = Superblock::new(ROOT_INODE, 0, 0, false);
//! sb.write(&disk, 2)?;
//! assert!(Superblock::read(&disk, 2)?.verify_checksum());
//!
//! let mut raw = layerfs::BlockBuf::zeroed();
//! disk.read_block(2, &mut raw)?;
//! raw.as_mut()[4000] ^= 1;
//! disk.write_block(2, &raw)?;
//! assert!(matches!(Superblock::read(&disk, 2), Err(LFError::Corruption { .. })));
//! # Ok::<(), LFError>(())
//! ```
//!
//! The flag word records the layer's state. The [Dirty](crate::SuperFlag::Dirty) flag stays set on disk
//! while the forest is mounted; a clean unmount clears it everywhere.
