pub use self::{
    allocator::{Allocator, Extent},
    block::BlockBuf,
    superblock::{SuperFlag, Superblock, CHECKSUM_OFFSET},
};

mod allocator;
mod block;
pub(crate) mod superblock;
