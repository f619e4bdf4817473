use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};

use crate::{BlockBuf, LFError, LFResult, BLOCK_SIZE};

/// A handle to a disk. Clones share the same device and counters.
#[derive(Clone)]
pub struct Disk {
    obj:   Arc<Mutex<dyn DiskObj + Send>>,
    stats: Arc<DiskStats>,
}

#[derive(Debug, Default)]
struct DiskStats {
    reads:  AtomicU64,
    writes: AtomicU64,
}

impl std::fmt::Debug for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Disk(reads={}, writes={})", self.reads(), self.writes())
    }
}

impl Disk {
    /// Wraps a disk object into a shareable handle.
    #[cfg(feature = "stable")]
    pub fn new<D: DiskObj + Send + 'static>(obj: D) -> Disk {
        Disk {
            obj:   Arc::new(Mutex::new(obj)),
            stats: Arc::new(DiskStats::default()),
        }
    }
    #[cfg(feature = "stable")]
    fn lock(&self) -> LFResult<MutexGuard<'_, dyn DiskObj + Send + 'static>> {
        self.obj.lock().or(Err(LFError::Poison))
    }
    /// Reads a given block into the buffer.
    #[cfg(feature = "stable")]
    pub fn read_block(&self, block: u64, buffer: &mut BlockBuf) -> LFResult<()> {
        let mut d = self.lock()?;
        let size = d.size()?;
        assert_or_err!(block < size, LFError::OutOfRange { block, size });
        trace!("Reading block {}", block);
        d.read_at(block, buffer.as_mut())?;
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    /// Writes a block to a given location.
    #[cfg(feature = "stable")]
    pub fn write_block(&self, block: u64, buffer: &BlockBuf) -> LFResult<()> {
        let mut d = self.lock()?;
        let size = d.size()?;
        assert_or_err!(block < size, LFError::OutOfRange { block, size });
        trace!("Writing block {}", block);
        d.write_at(block, buffer.as_ref())
            .map_err(|source| LFError::Write { block, source })?;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    /// Returns the size of the disk in blocks.
    #[cfg(feature = "stable")]
    pub fn size(&self) -> LFResult<u64> {
        Ok(self.lock()?.size()?)
    }
    /// Syncs the disk's content to stable storage.
    #[cfg(feature = "stable")]
    pub fn sync(&self) -> LFResult<()> {
        Ok(self.lock()?.sync()?)
    }
    /// Number of blocks read through this handle and its clones.
    #[cfg(feature = "stable")]
    pub fn reads(&self) -> u64 {
        self.stats.reads.load(Ordering::Relaxed)
    }
    /// Number of blocks written through this handle and its clones.
    #[cfg(feature = "stable")]
    pub fn writes(&self) -> u64 {
        self.stats.writes.load(Ordering::Relaxed)
    }
}

/// A disk object. Has a size, supports reading/writing of whole blocks.
pub trait DiskObj {
    /// Reads a given block into the buffer.
    fn read_at(&mut self, block: u64, buffer: &mut [u8]) -> std::io::Result<()>;
    /// Writes a block to a given location.
    fn write_at(&mut self, block: u64, buffer: &[u8]) -> std::io::Result<()>;
    /// Returns the size of the disk in blocks.
    fn size(&self) -> std::io::Result<u64>;
    /// Syncs the disk's content to stable storage.
    fn sync(&mut self) -> std::io::Result<()>;
}

/// Byte offset of a block on the device.
pub(crate) fn block_offset(block: u64) -> u64 {
    block * (BLOCK_SIZE as u64)
}

pub use file::DiskFile;
pub use mem::DiskMem;

pub mod file;
pub mod mem;
