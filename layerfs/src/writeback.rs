use std::collections::BTreeMap;

use crate::{BlockBuf, Disk, LFResult};

/// Destination for an encoded superblock image.
pub trait SuperblockSink {
    /// Takes ownership of `image` and arranges for it to reach `block`.
    fn submit(&mut self, block: u64, image: BlockBuf) -> LFResult<()>;
}

/// Writes superblocks synchronously to the device.
#[derive(Debug)]
pub struct DirectSink<'a> {
    disk: &'a Disk,
}

impl<'a> DirectSink<'a> {
    /// Creates a sink writing straight to `disk`
    pub fn new(disk: &'a Disk) -> Self {
        DirectSink { disk }
    }
}

impl SuperblockSink for DirectSink<'_> {
    fn submit(&mut self, block: u64, image: BlockBuf) -> LFResult<()> {
        self.disk.write_block(block, &image)
    }
}

/// Hands superblocks to the write-back queue owned by the primary layer.
#[derive(Debug)]
pub struct QueuedSink<'a> {
    queue:    &'a mut WritebackQueue,
    priority: u8,
}

impl<'a> QueuedSink<'a> {
    /// Creates a sink queueing pages at `priority`
    pub fn new(queue: &'a mut WritebackQueue, priority: u8) -> Self {
        QueuedSink { queue, priority }
    }
}

impl SuperblockSink for QueuedSink<'_> {
    fn submit(&mut self, block: u64, image: BlockBuf) -> LFResult<()> {
        if self.queue.enqueue(block, image, self.priority).is_some() {
            debug!("Replaced queued page for block {}", block);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Page {
    buf:      BlockBuf,
    priority: u8,
}

/// Pending block writes, deduplicated by block address.
#[derive(Debug, Default)]
pub struct WritebackQueue {
    pages: BTreeMap<u64, Page>,
}

impl WritebackQueue {
    /// Creates an empty queue
    #[cfg(feature = "stable")]
    pub fn new() -> Self {
        Self::default()
    }
    /// Queues `buf` for `block`. Returns the image it replaced, if any.
    #[cfg(feature = "stable")]
    pub fn enqueue(&mut self, block: u64, buf: BlockBuf, priority: u8) -> Option<BlockBuf> {
        self.pages
            .insert(block, Page { buf, priority })
            .map(|old| old.buf)
    }
    /// Number of queued pages
    #[cfg(feature = "stable")]
    pub fn len(&self) -> usize {
        self.pages.len()
    }
    /// True if nothing is queued
    #[cfg(feature = "stable")]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
    /// True if a page is queued for `block`
    #[cfg(feature = "stable")]
    pub fn contains(&self, block: u64) -> bool {
        self.pages.contains_key(&block)
    }
    /// Writes every queued page, highest priority first and then by block.
    /// Pages are dropped as they are written; on failure the rest stay queued.
    #[cfg(feature = "stable")]
    pub fn flush(&mut self, disk: &Disk) -> LFResult<u64> {
        let mut order: Vec<(u8, u64)> = self
            .pages
            .iter()
            .map(|(block, page)| (page.priority, *block))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let mut written = 0;
        for (_, block) in order {
            if let Some(page) = self.pages.get(&block) {
                if let Err(e) = disk.write_block(block, &page.buf) {
                    error!("Write-back of block {} failed: {}", block, e);
                    return Err(e);
                }
            }
            self.pages.remove(&block);
            written += 1;
        }
        Ok(written)
    }
}

#[test]
#[allow(clippy::unwrap_used)]
fn dedup_and_flush() {
    let d = crate::DiskMem::open(8);
    let mut q = WritebackQueue::new();
    let mut first = BlockBuf::zeroed();
    first.as_mut()[0] = 1;
    let mut second = BlockBuf::zeroed();
    second.as_mut()[0] = 2;
    {
        let mut sink = QueuedSink::new(&mut q, 1);
        sink.submit(5, first).unwrap();
        sink.submit(5, second).unwrap();
        sink.submit(3, BlockBuf::zeroed()).unwrap();
    }
    assert_eq!(q.len(), 2);
    assert_eq!(d.writes(), 0);
    assert_eq!(q.flush(&d).unwrap(), 2);
    assert!(q.is_empty());
    let mut back = BlockBuf::zeroed();
    d.read_block(5, &mut back).unwrap();
    assert_eq!(back.as_ref()[0], 2);
}

#[test]
#[allow(clippy::unwrap_used)]
fn failed_flush_keeps_remaining_pages() {
    let d = crate::DiskMem::open(4);
    let mut q = WritebackQueue::new();
    q.enqueue(1, BlockBuf::zeroed(), 1);
    q.enqueue(9, BlockBuf::zeroed(), 1);
    assert!(q.flush(&d).is_err());
    assert!(!q.contains(1));
    assert!(q.contains(9));
}
