//!
//! Layers are linked as a forest of first-child/next-sibling lists: each
//! superblock stores the block of its first child and of its next sibling,
//! zero meaning none.
//!
//! A checkpoint rewrites the forest:
//! 1. every secondary layer gets a fresh superblock block, all of them taken
//!    from one reservation;
//! 2. links are stamped with the new addresses and the secondaries are queued
//!    for write-back;
//! 3. the queue is flushed;
//! 4. the primary is written in place at [SUPER_BLOCK](crate::SUPER_BLOCK).
//!
//! Blocks holding the previous generation of superblocks are only released
//! after step 4, so a crash at any point leaves the old forest readable.
//! ```
//! # use layerfs::{DiskMem, Forest, ForestConfig, LFError, LayerId, ROOT_INODE};
//! let mut forest = Forest::format(DiskMem::open(64), ForestConfig::default())?;
//! let layer = forest.create_layer(LayerId::PRIMARY, ROOT_INODE, 0)?;
//! let stats = forest.checkpoint_forest()?;
//! assert_eq!(stats.allocated, 1);
//! assert_eq!(stats.written, 2);
//!
//! // A clean forest costs nothing
//! assert_eq!(forest.checkpoint_forest()?.written, 0);
//!
//! let disk = forest.disk().clone();
//! forest.unmount()?;
//! drop(forest);
//! let forest = Forest::mount(disk, ForestConfig::default())?;
//! assert_eq!(forest.children(LayerId::PRIMARY)?.len(), 1);
//! # let _ = layer;
//! # Ok::<(), LFError>(())
//! ```
