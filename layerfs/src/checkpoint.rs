//! Checkpointing: relocate every secondary superblock in one batch, stamp the
//! parent/child/sibling links with the fresh addresses, write the secondaries
//! through the primary's write-back queue, then commit the primary directly.

use crate::{
    ondisk::superblock::now, AllocStrategy, DirectSink, DirtyKind, Forest, LFError, LFResult,
    Layer, LayerId, QueuedSink, SuperFlag, SuperblockSink, INVALID_BLOCK, SUPER_BLOCK,
};

/// What a checkpoint did
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CheckpointStats {
    /// Superblock blocks reserved by the batch allocator
    pub allocated: u64,
    /// Superblocks written, the primary included
    pub written:   u64,
}

/// Stamps and writes one secondary layer's superblock through `sink`.
///
/// The layer's lock is held for the whole stamp-and-write and released on
/// every path. The in-memory dirty bit is only cleared once `sink` accepted
/// the image.
#[cfg(feature = "stable")]
pub(crate) fn write_layer(
    layer: &Layer,
    links: Option<(u64, u64)>,
    sink: &mut dyn SuperblockSink,
    t: u64,
    unmounting: bool,
) -> LFResult<()> {
    let mut state = layer.write()?;
    assert_or_err!(
        state.dirty,
        LFError::InternalConsistency(format!("layer {} written while clean", layer.id()))
    );
    assert_or_err!(
        layer.has_sblock(),
        LFError::InternalConsistency(format!("layer {} has no superblock block", layer.id()))
    );
    if let Some((next, child)) = links {
        state.superblock.set_links(next, child);
    }
    if unmounting || state.frozen {
        assert_or_err!(
            !state.inodes_dirty && !state.extents_dirty,
            LFError::InternalConsistency(format!(
                "layer {} still has deferred inode or extent changes",
                layer.id()
            ))
        );
        state.superblock.clear_flag(SuperFlag::Dirty);
    }
    state.superblock.set_commit_time(t);
    state.superblock.update_checksum();
    sink.submit(layer.sblock(), state.superblock.to_block())?;
    state.dirty = false;
    trace!("Layer {} superblock submitted for block {}", layer.id(), layer.sblock());
    Ok(())
}

impl Forest {
    /// Persists every dirty superblock of the forest.
    ///
    /// Does nothing, and touches neither the allocator nor the disk, when no
    /// layer is dirty. A read-only forest with pending changes is refused.
    #[cfg(feature = "stable")]
    pub fn checkpoint_forest(&mut self) -> LFResult<CheckpointStats> {
        if !self.is_dirty()? {
            trace!("Checkpoint skipped, forest is clean");
            return Ok(CheckpointStats::default());
        }
        assert_or_err!(!self.read_only, LFError::ReadOnlyForest);
        let t = now();
        self.mark_layer_dirty(LayerId::PRIMARY, DirtyKind::Super)?;
        let allocated = self.allocate_superblocks()?;
        self.link_superblocks(t)?;
        let flushed = self.writeback.flush(&self.disk)?;
        self.disk.sync()?;
        self.commit_primary()?;
        self.disk.sync()?;
        self.release_freed()?;
        self.generation += 1;
        debug!(
            "Checkpoint {} done: {} block(s) reserved, {} superblock(s) written",
            self.generation, allocated, flushed + 1
        );
        Ok(CheckpointStats {
            allocated,
            written: flushed + 1,
        })
    }

    /// Gives every secondary layer a fresh superblock block.
    ///
    /// All blocks come from a single reservation. The primary never consumes
    /// one: its superblock stays at `SUPER_BLOCK`. Superseded blocks go to the
    /// free queue of the current generation.
    #[cfg(feature = "stable")]
    pub(crate) fn allocate_superblocks(&mut self) -> LFResult<u64> {
        let count = (self.layer_count() - 1) as u64;
        if count == 0 {
            return Ok(0);
        }
        let fresh: Vec<u64> = match self.config.strategy {
            AllocStrategy::Contiguous => {
                let start = self.allocator.alloc_exact(count, true)?;
                (start..start + count).collect()
            }
            AllocStrategy::Scattered => self.allocator.alloc_many(count, true)?,
        };
        debug!("Reserved {} superblock block(s): {:?}", count, fresh);
        let mut fresh = fresh.into_iter();
        let generation = self.generation;
        for layer in self.layers.iter_mut().skip(1).flatten() {
            if layer.sblock != INVALID_BLOCK {
                self.free_queue
                    .entry(generation)
                    .or_insert_with(Vec::new)
                    .push(layer.sblock);
            }
            layer.sblock = fresh.next().ok_or_else(|| {
                LFError::InternalConsistency(format!(
                    "superblock reservation exhausted at layer {}",
                    layer.id()
                ))
            })?;
            layer.mark_dirty(DirtyKind::Super)?;
        }
        assert_or_err!(
            fresh.next().is_none(),
            LFError::InternalConsistency(format!(
                "superblock reservation of {} block(s) not fully consumed",
                count
            ))
        );
        Ok(count)
    }

    /// Block a link should point at: the relative's current superblock, or 0.
    fn link_target(&self, id: Option<LayerId>) -> LFResult<u64> {
        match id {
            None => Ok(0),
            Some(id) => {
                let l = self.layer(id)?;
                assert_or_err!(
                    l.has_sblock(),
                    LFError::InternalConsistency(format!("link to unplaced layer {}", id))
                );
                Ok(l.sblock)
            }
        }
    }

    /// Stamps links into every superblock and queues every secondary for write-back.
    /// The primary is only stamped; its write is `commit_primary`.
    #[cfg(feature = "stable")]
    pub(crate) fn link_superblocks(&mut self, t: u64) -> LFResult<u64> {
        let mut links = Vec::with_capacity(self.layers.len());
        for layer in self.layers.iter().flatten() {
            links.push((
                layer.id(),
                self.link_target(layer.next)?,
                self.link_target(layer.child)?,
            ));
        }
        let unmounting = self.unmounting;
        let priority = self.config.writeback_priority;
        let Forest {
            layers, writeback, ..
        } = self;
        let mut sink = QueuedSink::new(writeback, priority);
        let mut queued = 0;
        for (id, next, child) in links {
            let layer = layers[id.index()].as_ref().ok_or(LFError::NoLayer(id))?;
            if id.is_primary() {
                let mut state = layer.write()?;
                state.superblock.set_links(next, child);
                assert_or_err!(
                    state.dirty,
                    LFError::InternalConsistency("primary layer reached linking clean".into())
                );
                continue;
            }
            write_layer(layer, Some((next, child)), &mut sink, t, unmounting)?;
            queued += 1;
        }
        Ok(queued)
    }

    /// Writes the primary superblock in place. This is the commit point of a checkpoint.
    #[cfg(feature = "stable")]
    pub(crate) fn commit_primary(&mut self) -> LFResult<()> {
        let used = self.allocator.used_space();
        let unmounting = self.unmounting;
        let layer = self.layer(LayerId::PRIMARY)?;
        let mut state = layer.write()?;
        assert_or_err!(
            state.dirty,
            LFError::InternalConsistency("primary layer committed clean".into())
        );
        state.superblock.set_blocks(used);
        if unmounting {
            state.superblock.clear_flag(SuperFlag::Dirty);
        }
        state.superblock.update_checksum();
        DirectSink::new(&self.disk).submit(SUPER_BLOCK, state.superblock.to_block())?;
        state.dirty = false;
        Ok(())
    }

    /// Returns every queued block up to the current generation to the allocator.
    #[cfg(feature = "stable")]
    fn release_freed(&mut self) -> LFResult<()> {
        let later = self.free_queue.split_off(&(self.generation + 1));
        let due = std::mem::replace(&mut self.free_queue, later);
        for block in due.into_iter().flat_map(|(_, blocks)| blocks) {
            trace!("Releasing superseded superblock {}", block);
            self.allocator.release(block, 1)?;
        }
        Ok(())
    }

    /// Rewrites one layer's superblock in place, without relocating it.
    /// A clean layer is left alone.
    ///
    /// The primary links to secondaries that may not be on disk yet, so
    /// syncing it runs a full checkpoint.
    #[cfg(feature = "unstable")]
    pub fn sync_layer(&mut self, id: LayerId) -> LFResult<bool> {
        if !self.is_layer_dirty(id)? {
            return Ok(false);
        }
        assert_or_err!(!self.read_only, LFError::ReadOnlyForest);
        if id.is_primary() {
            return Ok(self.checkpoint_forest()?.written > 0);
        }
        let unmounting = self.unmounting;
        let layer = self.layer(id)?;
        write_layer(layer, None, &mut DirectSink::new(&self.disk), now(), unmounting)?;
        self.disk.sync()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{test::forest::forest_mem, Superblock, ROOT_INODE};

    #[test]
    fn primary_and_two_children() {
        let mut f = forest_mem(64);
        let b = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        assert_eq!(f.children(LayerId::PRIMARY).unwrap(), vec![a, b]);

        let used = f.allocator.used_space();
        assert_eq!(f.allocate_superblocks().unwrap(), 2);
        assert_eq!(f.allocator.used_space(), used + 2);
        f.link_superblocks(7).unwrap();

        let a_blk = f.layer(a).unwrap().sblock();
        let b_blk = f.layer(b).unwrap().sblock();
        let p = f.layer(LayerId::PRIMARY).unwrap().superblock().unwrap();
        let sa = f.layer(a).unwrap().superblock().unwrap();
        let sb = f.layer(b).unwrap().superblock().unwrap();
        assert_eq!(p.child_layer(), a_blk);
        assert_eq!(p.next_layer(), 0);
        assert_eq!(sa.next_layer(), b_blk);
        assert_eq!(sa.child_layer(), 0);
        assert_eq!(sb.next_layer(), 0);
        assert_eq!(sb.child_layer(), 0);
        assert_eq!(sa.commit_time(), 7);

        assert!(f.is_layer_dirty(LayerId::PRIMARY).unwrap());
        assert_eq!(f.layer(LayerId::PRIMARY).unwrap().sblock(), SUPER_BLOCK);
        assert!(!f.is_layer_dirty(a).unwrap());
        assert_eq!(f.writeback.len(), 2);
    }

    #[test]
    fn primary_never_takes_a_reserved_block() {
        let mut f = forest_mem(64);
        assert_eq!(f.allocate_superblocks().unwrap(), 0);
        let used = f.allocator.used_space();
        let only = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        assert_eq!(f.allocate_superblocks().unwrap(), 1);
        assert_eq!(f.allocator.used_space(), used + 1);
        assert_eq!(f.layer(LayerId::PRIMARY).unwrap().sblock(), SUPER_BLOCK);
        assert_ne!(f.layer(only).unwrap().sblock(), SUPER_BLOCK);
    }

    #[test]
    fn relocation_queues_old_block() {
        let mut f = forest_mem(64);
        let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        f.checkpoint_forest().unwrap();
        let first = f.layer(a).unwrap().sblock();
        f.mark_layer_dirty(a, DirtyKind::Super).unwrap();
        f.allocate_superblocks().unwrap();
        let second = f.layer(a).unwrap().sblock();
        assert_ne!(first, second);
        assert!(f.allocator.is_used(first));
        assert_eq!(f.free_queue.values().flatten().copied().collect::<Vec<_>>(), vec![first]);
    }

    #[test]
    fn old_block_released_after_commit() {
        let mut f = forest_mem(64);
        let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        f.checkpoint_forest().unwrap();
        let first = f.layer(a).unwrap().sblock();
        f.mark_layer_dirty(a, DirtyKind::Extents).unwrap();
        f.layer(a).unwrap().clear_metadata_dirty(DirtyKind::Extents).unwrap();
        f.checkpoint_forest().unwrap();
        assert!(!f.allocator.is_used(first));
        assert!(f.free_queue.is_empty());
        let on_disk = Superblock::read(f.disk(), f.layer(a).unwrap().sblock()).unwrap();
        assert_eq!(on_disk, f.layer(a).unwrap().superblock().unwrap());
    }

    #[test]
    fn deferred_metadata_blocks_frozen_write() {
        let mut f = forest_mem(64);
        let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        f.mark_layer_dirty(a, DirtyKind::Inodes).unwrap();
        f.freeze_layer(a).unwrap();
        assert!(matches!(
            f.checkpoint_forest(),
            Err(LFError::InternalConsistency(_))
        ));
    }

    #[test]
    fn sync_layer_in_place() {
        let mut f = forest_mem(64);
        let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        f.checkpoint_forest().unwrap();
        let blk = f.layer(a).unwrap().sblock();
        assert!(!f.sync_layer(a).unwrap());
        f.layer(a)
            .unwrap()
            .update_superblock(|sb| sb.set_inode_block(40))
            .unwrap();
        assert!(f.sync_layer(a).unwrap());
        assert_eq!(f.layer(a).unwrap().sblock(), blk);
        assert_eq!(Superblock::read(f.disk(), blk).unwrap().inode_block(), 40);
    }

    #[test]
    fn sync_primary_places_new_layers_first() {
        let mut f = forest_mem(64);
        let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        assert!(f.sync_layer(LayerId::PRIMARY).unwrap());
        let blk = f.layer(a).unwrap().sblock();
        assert_ne!(blk, INVALID_BLOCK);
        assert_eq!(Superblock::read(f.disk(), SUPER_BLOCK).unwrap().child_layer(), blk);
        assert!(Superblock::read(f.disk(), blk).is_ok());
        assert!(!f.is_dirty().unwrap());
    }
}
