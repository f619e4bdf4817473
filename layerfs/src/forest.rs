use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use derivative::Derivative;

use crate::{
    operations::mkfs, Allocator, CheckpointStats, DirtyKind, Disk,
    ForestConfig, LFError, LFResult, Layer, LayerId, SuperFlag, Superblock, WritebackQueue,
    BLOCK_SIZE, INVALID_BLOCK, START_BLOCK, SUPER_BLOCK,
};

/// A handle to a mounted forest, shareable between threads
#[derive(Clone, Debug)]
pub struct ForestHandle(Arc<RwLock<Forest>>);

impl ForestHandle {
    /// Wraps a mounted forest
    #[cfg(feature = "stable")]
    pub fn new(forest: Forest) -> Self {
        Self(Arc::new(RwLock::new(forest)))
    }
    /// Mounts the forest found on a disk
    #[cfg(feature = "stable")]
    pub fn open(d: Disk, config: ForestConfig) -> LFResult<Self> {
        Ok(Self::new(Forest::mount(d, config)?))
    }
    /// Records a mutation of a layer. Only needs shared access to the forest.
    #[cfg(feature = "stable")]
    pub fn mark_layer_dirty(&self, id: LayerId, kind: DirtyKind) -> LFResult<()> {
        self.read()?.mark_layer_dirty(id, kind)
    }
    /// Hands out an inode number from the global counters
    #[cfg(feature = "stable")]
    pub fn allocate_inode(&self, id: LayerId) -> LFResult<u64> {
        self.read()?.allocate_inode(id)
    }
    /// Records that a layer's inode table or extent list reached the disk
    #[cfg(feature = "unstable")]
    pub fn clear_metadata_dirty(&self, id: LayerId, kind: DirtyKind) -> LFResult<()> {
        self.read()?.layer(id)?.clear_metadata_dirty(kind)
    }
    /// True if any layer has unpersisted changes
    #[cfg(feature = "stable")]
    pub fn is_dirty(&self) -> LFResult<bool> {
        self.read()?.is_dirty()
    }
    /// Persists every dirty superblock
    #[cfg(feature = "stable")]
    pub fn checkpoint(&self) -> LFResult<CheckpointStats> {
        self.write()?.checkpoint_forest()
    }
    /// Creates a layer below `parent`
    #[cfg(feature = "stable")]
    pub fn create_layer(&self, parent: LayerId, root: u64, flags: u32) -> LFResult<LayerId> {
        self.write()?.create_layer(parent, root, flags)
    }
    /// Removes a leaf layer
    #[cfg(feature = "stable")]
    pub fn remove_layer(&self, id: LayerId) -> LFResult<()> {
        self.write()?.remove_layer(id)
    }
    /// Freezes a layer
    #[cfg(feature = "stable")]
    pub fn freeze_layer(&self, id: LayerId) -> LFResult<()> {
        self.write()?.freeze_layer(id)
    }
    /// Filesystem usage figures
    #[cfg(feature = "stable")]
    pub fn statfs(&self) -> LFResult<StatFs> {
        self.read()?.statfs()
    }
    /// Handle to the underlying disk
    #[cfg(feature = "stable")]
    pub fn disk(&self) -> LFResult<Disk> {
        Ok(self.read()?.disk().clone())
    }
    /// Final checkpoint. The forest reads back clean afterwards.
    #[cfg(feature = "stable")]
    pub fn unmount(&self) -> LFResult<CheckpointStats> {
        self.write()?.unmount()
    }
    #[cfg(feature = "stable")]
    pub(crate) fn write(&self) -> LFResult<RwLockWriteGuard<Forest>> {
        self.0.write().or(Err(LFError::Poison))
    }
    #[cfg(feature = "stable")]
    pub(crate) fn read(&self) -> LFResult<RwLockReadGuard<Forest>> {
        self.0.read().or(Err(LFError::Poison))
    }
}

/// Usage figures derived from the global superblock
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StatFs {
    /// Block size in bytes
    pub block_size:  u64,
    /// Device size in blocks
    pub blocks:      u64,
    /// Blocks not in use
    pub free_blocks: u64,
    /// Inodes in use
    pub inodes:      u64,
    /// Next inode number to be handed out
    pub next_inode:  u64,
}

/// The mounted layer forest: registry, allocator and write-back queue.
///
/// Slot 0 of the registry always holds the primary layer, whose superblock
/// lives at `SUPER_BLOCK` and is written directly at the end of a
/// checkpoint. Every other layer's superblock is relocated on each
/// checkpoint.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Forest {
    #[derivative(Debug = "ignore")]
    pub(crate) disk:       Disk,
    pub(crate) config:     ForestConfig,
    pub(crate) layers:     Vec<Option<Layer>>,
    pub(crate) allocator:  Allocator,
    pub(crate) writeback:  WritebackQueue,
    pub(crate) free_queue: BTreeMap<u64, Vec<u64>>,
    pub(crate) generation: u64,
    pub(crate) unmounting: bool,
    pub(crate) read_only:  bool,
}

impl Forest {
    /// Formats `d` with an empty forest and mounts it.
    #[cfg(feature = "stable")]
    pub fn format(d: Disk, config: ForestConfig) -> LFResult<Forest> {
        mkfs::mkfs(&d, false)?;
        Forest::mount(d, config)
    }
    /// Mounts the forest found on a disk.
    ///
    /// A layer whose superblock fails validation is skipped together with
    /// everything reachable only through it. The primary must be intact.
    /// Skipping anything leaves the forest read-only: the blocks behind a bad
    /// record are unknown, so no checkpoint may hand out or relink blocks.
    #[cfg(feature = "stable")]
    pub fn mount(d: Disk, config: ForestConfig) -> LFResult<Forest> {
        let mut primary = Superblock::read(&d, SUPER_BLOCK)?;
        assert_or_err!(
            primary.is_global(),
            LFError::FormatMismatch {
                block:   SUPER_BLOCK,
                magic:   primary.magic(),
                version: primary.version(),
            }
        );
        if primary.has_flag(SuperFlag::Dirty) {
            warn!("Forest was not cleanly unmounted");
        }
        primary.set_flag(SuperFlag::Mounted);
        let total = primary.total_blocks().min(d.size()?);
        let mut allocator = Allocator::new(total);
        allocator.mark_used(SUPER_BLOCK, START_BLOCK - SUPER_BLOCK)?;

        let mut res = Forest {
            disk: d,
            config,
            layers: vec![Some(Layer::new(LayerId::PRIMARY, None, primary, SUPER_BLOCK))],
            allocator,
            writeback: WritebackQueue::new(),
            free_queue: BTreeMap::new(),
            generation: 0,
            unmounting: false,
            read_only: false,
        };
        let mut seen = BTreeSet::new();
        res.load_children(LayerId::PRIMARY, primary.child_layer(), &mut seen)?;
        if res.read_only {
            warn!("Forest mounted read-only with {} layer(s)", res.layer_count());
        } else {
            info!("Mounted forest with {} layer(s)", res.layer_count());
        }
        Ok(res)
    }
    /// Loads the sibling chain starting at `block` as children of `parent`.
    #[cfg(feature = "stable")]
    fn load_children(
        &mut self,
        parent: LayerId,
        mut block: u64,
        seen: &mut BTreeSet<u64>,
    ) -> LFResult<()> {
        let mut prev: Option<LayerId> = None;
        while block != 0 {
            if !seen.insert(block) || block >= self.allocator.total_space() {
                warn!("Layer link from {} to block {} ignored", parent, block);
                self.read_only = true;
                break;
            }
            let sb = match Superblock::read(&self.disk, block) {
                Ok(sb) => sb,
                Err(e) if e.is_unmountable() => {
                    warn!("Superblock at {} unusable, skipping its subtree: {}", block, e);
                    self.allocator.mark_used(block, 1)?;
                    self.read_only = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            self.allocator.mark_used(block, 1)?;
            let id = self.free_slot();
            self.install(Layer::new(id, Some(parent), sb, block));
            match prev {
                None => self.layer_mut(parent)?.child = Some(id),
                Some(p) => self.layer_mut(p)?.next = Some(id),
            }
            debug!("Loaded layer {} from block {}", id, block);
            self.load_children(id, sb.child_layer(), seen)?;
            prev = Some(id);
            block = sb.next_layer();
        }
        Ok(())
    }
    fn free_slot(&self) -> LayerId {
        LayerId(
            self.layers
                .iter()
                .skip(1)
                .position(Option::is_none)
                .map_or(self.layers.len(), |p| p + 1),
        )
    }
    fn install(&mut self, layer: Layer) {
        let idx = layer.id().index();
        if idx == self.layers.len() {
            self.layers.push(Some(layer));
        } else {
            self.layers[idx] = Some(layer);
        }
    }
    /// Getter for the disk
    #[cfg(feature = "stable")]
    pub fn disk(&self) -> &Disk {
        &self.disk
    }
    /// Getter for the allocator
    #[cfg(feature = "stable")]
    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }
    /// Getter for the config
    #[cfg(feature = "stable")]
    pub fn config(&self) -> ForestConfig {
        self.config
    }
    /// Replaces the config, e.g. to retry a checkpoint with another strategy
    #[cfg(feature = "stable")]
    pub fn set_config(&mut self, config: ForestConfig) {
        self.config = config;
    }
    /// Looks up a layer
    #[cfg(feature = "stable")]
    pub fn layer(&self, id: LayerId) -> LFResult<&Layer> {
        self.layers
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(LFError::NoLayer(id))
    }
    #[cfg(feature = "stable")]
    pub(crate) fn layer_mut(&mut self, id: LayerId) -> LFResult<&mut Layer> {
        self.layers
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(LFError::NoLayer(id))
    }
    /// Every layer id, in registry order
    #[cfg(feature = "stable")]
    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.layers.iter().flatten().map(Layer::id).collect()
    }
    /// Number of layers, the primary included
    #[cfg(feature = "stable")]
    pub fn layer_count(&self) -> usize {
        self.layers.iter().flatten().count()
    }
    /// Children of a layer, in sibling order
    #[cfg(feature = "stable")]
    pub fn children(&self, id: LayerId) -> LFResult<Vec<LayerId>> {
        let mut res = Vec::new();
        let mut cur = self.layer(id)?.child;
        while let Some(c) = cur {
            res.push(c);
            cur = self.layer(c)?.next;
        }
        Ok(res)
    }
    /// True while the final checkpoint of an unmount is running
    #[cfg(feature = "stable")]
    pub fn is_unmounting(&self) -> bool {
        self.unmounting
    }
    /// True if mounting skipped part of the forest. Nothing is ever written then.
    #[cfg(feature = "stable")]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
    /// Marks a layer as modified
    #[cfg(feature = "stable")]
    pub fn mark_layer_dirty(&self, id: LayerId, kind: DirtyKind) -> LFResult<()> {
        assert_or_err!(!self.read_only, LFError::ReadOnlyForest);
        self.layer(id)?.mark_dirty(kind)
    }
    /// Layer-local dirty predicate
    #[cfg(feature = "stable")]
    pub fn is_layer_dirty(&self, id: LayerId) -> LFResult<bool> {
        self.layer(id)?.is_dirty()
    }
    /// Forest-wide dirty predicate: true iff any layer is dirty
    #[cfg(feature = "stable")]
    pub fn is_dirty(&self) -> LFResult<bool> {
        for layer in self.layers.iter().flatten() {
            if layer.is_dirty()? {
                return Ok(true);
            }
        }
        Ok(false)
    }
    /// Creates a layer as the first child of `parent`.
    #[cfg(feature = "stable")]
    pub fn create_layer(&mut self, parent: LayerId, root: u64, flags: u32) -> LFResult<LayerId> {
        assert_or_err!(!self.read_only, LFError::ReadOnlyForest);
        let first_child = self.layer(parent)?.child;
        let id = self.free_slot();
        let sb = Superblock::new(root, 0, flags, false);
        let mut layer = Layer::new(id, Some(parent), sb, INVALID_BLOCK);
        layer.next = first_child;
        self.install(layer);
        self.layer_mut(parent)?.child = Some(id);
        self.mark_layer_dirty(id, DirtyKind::Super)?;
        self.mark_layer_dirty(LayerId::PRIMARY, DirtyKind::Super)?;
        info!("Created layer {} below {}", id, parent);
        Ok(id)
    }
    /// Removes a layer with no children. Its superblock block is released
    /// once the next checkpoint has committed.
    #[cfg(feature = "stable")]
    pub fn remove_layer(&mut self, id: LayerId) -> LFResult<()> {
        assert_or_err!(!self.read_only, LFError::ReadOnlyForest);
        assert_or_err!(!id.is_primary(), LFError::LayerBusy(id));
        let (parent, next, child, sblock) = {
            let l = self.layer(id)?;
            (l.parent, l.next, l.child, l.sblock)
        };
        assert_or_err!(child.is_none(), LFError::LayerBusy(id));
        let parent = parent.ok_or_else(|| {
            LFError::InternalConsistency(format!("layer {} has no parent", id))
        })?;
        if self.layer(parent)?.child == Some(id) {
            self.layer_mut(parent)?.child = next;
        } else {
            let mut cur = self.layer(parent)?.child;
            while let Some(c) = cur {
                if self.layer(c)?.next == Some(id) {
                    self.layer_mut(c)?.next = next;
                    break;
                }
                cur = self.layer(c)?.next;
            }
        }
        if sblock != INVALID_BLOCK {
            self.free_queue
                .entry(self.generation)
                .or_insert_with(Vec::new)
                .push(sblock);
        }
        self.layers[id.index()] = None;
        while let Some(None) = self.layers.last() {
            self.layers.pop();
        }
        self.mark_layer_dirty(parent, DirtyKind::Super)?;
        self.mark_layer_dirty(LayerId::PRIMARY, DirtyKind::Super)?;
        info!("Removed layer {}", id);
        Ok(())
    }
    /// Freezes a layer. It becomes read-only and reads back clean once written.
    #[cfg(feature = "stable")]
    pub fn freeze_layer(&mut self, id: LayerId) -> LFResult<()> {
        assert_or_err!(!self.read_only, LFError::ReadOnlyForest);
        assert_or_err!(!id.is_primary(), LFError::ReadOnly(id));
        {
            let mut state = self.layer(id)?.write()?;
            state.frozen = true;
            state.superblock.set_flag(SuperFlag::Frozen);
            state.superblock.clear_flag(SuperFlag::ReadWrite);
        }
        self.mark_layer_dirty(id, DirtyKind::Super)?;
        info!("Froze layer {}", id);
        Ok(())
    }
    /// Hands out an inode number for a file created in layer `id`.
    #[cfg(feature = "stable")]
    pub fn allocate_inode(&self, id: LayerId) -> LFResult<u64> {
        assert_or_err!(!self.read_only, LFError::ReadOnlyForest);
        assert_or_err!(!self.layer(id)?.is_frozen()?, LFError::ReadOnly(id));
        let ino = {
            let mut primary = self.layer(LayerId::PRIMARY)?.write()?;
            primary.superblock.take_inode()
        };
        self.mark_layer_dirty(LayerId::PRIMARY, DirtyKind::Super)?;
        self.mark_layer_dirty(id, DirtyKind::Inodes)?;
        Ok(ino)
    }
    /// Usage figures
    #[cfg(feature = "stable")]
    pub fn statfs(&self) -> LFResult<StatFs> {
        let sb = self.layer(LayerId::PRIMARY)?.superblock()?;
        Ok(StatFs {
            block_size:  BLOCK_SIZE as u64,
            blocks:      sb.total_blocks(),
            free_blocks: self.allocator.free_space(),
            inodes:      sb.inodes(),
            next_inode:  sb.next_inode(),
        })
    }
    /// Runs the final checkpoint. Every layer, the primary included, reads back clean.
    ///
    /// On failure the forest stays mounted and ordinary checkpoints behave as before.
    /// A read-only forest is left untouched on disk.
    #[cfg(feature = "stable")]
    pub fn unmount(&mut self) -> LFResult<CheckpointStats> {
        if self.read_only {
            assert_or_err!(!self.is_dirty()?, LFError::ReadOnlyForest);
            info!("Unmounted read-only forest");
            return Ok(CheckpointStats::default());
        }
        self.unmounting = true;
        self.layer(LayerId::PRIMARY)?
            .write()?
            .superblock
            .clear_flag(SuperFlag::Mounted);
        let res = self
            .mark_layer_dirty(LayerId::PRIMARY, DirtyKind::Super)
            .and_then(|_| self.checkpoint_forest());
        if let Err(e) = &res {
            error!("Unmount checkpoint failed: {}", e);
            self.unmounting = false;
            self.layer(LayerId::PRIMARY)?
                .write()?
                .superblock
                .set_flag(SuperFlag::Mounted);
        } else {
            info!("Unmounted forest");
        }
        res
    }
}
