pub use self::{
    fsck::{check_forest, FsckError, FsckErrorKind, FsckReport},
    mkfs::mkfs,
};

/// Offline consistency check of a forest
pub mod fsck;
/// Filesystem creation
pub mod mkfs;
