use std::{
    fmt,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{LFError, LFResult, SuperFlag, Superblock, INVALID_BLOCK};

/// Stable identifier of a layer: its slot in the forest registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    /// The primary layer, owner of the device-wide counters.
    pub const PRIMARY: LayerId = LayerId(0);

    /// Registry slot of this layer
    pub fn index(self) -> usize {
        self.0
    }
    /// True for the primary layer
    pub fn is_primary(self) -> bool {
        self == LayerId::PRIMARY
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// What part of a layer a mutation touched
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirtyKind {
    /// The superblock itself
    Super,
    /// The inode table
    Inodes,
    /// The extent list
    Extents,
}

/// Mutable per-layer state, guarded by the layer's lock.
#[derive(Debug)]
pub struct LayerState {
    pub(crate) superblock:    Superblock,
    pub(crate) dirty:         bool,
    pub(crate) inodes_dirty:  bool,
    pub(crate) extents_dirty: bool,
    pub(crate) frozen:        bool,
}

/// One layer of the forest.
///
/// Topology (`parent`, `next`, `child`) and the superblock location are only
/// changed with exclusive access to the whole forest. Everything else sits
/// behind the layer's own lock so workers can mark different layers dirty
/// concurrently.
#[derive(Debug)]
pub struct Layer {
    id:                LayerId,
    pub(crate) parent: Option<LayerId>,
    pub(crate) next:   Option<LayerId>,
    pub(crate) child:  Option<LayerId>,
    pub(crate) sblock: u64,
    state:             RwLock<LayerState>,
}

impl Layer {
    #[cfg(feature = "stable")]
    pub(crate) fn new(id: LayerId, parent: Option<LayerId>, superblock: Superblock, sblock: u64) -> Layer {
        let frozen = superblock.has_flag(SuperFlag::Frozen);
        Layer {
            id,
            parent,
            next: None,
            child: None,
            sblock,
            state: RwLock::new(LayerState {
                superblock,
                dirty: false,
                inodes_dirty: false,
                extents_dirty: false,
                frozen,
            }),
        }
    }
    /// Getter for id
    #[cfg(feature = "stable")]
    pub fn id(&self) -> LayerId {
        self.id
    }
    /// Layer this one was cloned from. None for the primary.
    #[cfg(feature = "stable")]
    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }
    /// Next sibling
    #[cfg(feature = "stable")]
    pub fn next(&self) -> Option<LayerId> {
        self.next
    }
    /// First child
    #[cfg(feature = "stable")]
    pub fn child(&self) -> Option<LayerId> {
        self.child
    }
    /// Block holding this layer's superblock, `INVALID_BLOCK` until allocated
    #[cfg(feature = "stable")]
    pub fn sblock(&self) -> u64 {
        self.sblock
    }
    /// True once a superblock location has been assigned
    #[cfg(feature = "stable")]
    pub fn has_sblock(&self) -> bool {
        self.sblock != INVALID_BLOCK
    }
    #[cfg(feature = "stable")]
    pub(crate) fn read(&self) -> LFResult<RwLockReadGuard<LayerState>> {
        self.state.read().or(Err(LFError::Poison))
    }
    #[cfg(feature = "stable")]
    pub(crate) fn write(&self) -> LFResult<RwLockWriteGuard<LayerState>> {
        self.state.write().or(Err(LFError::Poison))
    }
    /// Copy of the in-memory superblock
    #[cfg(feature = "stable")]
    pub fn superblock(&self) -> LFResult<Superblock> {
        Ok(self.read()?.superblock)
    }
    /// True if this layer has unpersisted changes
    #[cfg(feature = "stable")]
    pub fn is_dirty(&self) -> LFResult<bool> {
        Ok(self.read()?.dirty)
    }
    /// True once the layer has been frozen
    #[cfg(feature = "stable")]
    pub fn is_frozen(&self) -> LFResult<bool> {
        Ok(self.read()?.frozen)
    }
    /// Records a mutation. Idempotent.
    /// Frozen layers only accept superblock-level changes.
    #[cfg(feature = "stable")]
    pub fn mark_dirty(&self, kind: DirtyKind) -> LFResult<()> {
        let mut state = self.write()?;
        assert_or_err!(
            kind == DirtyKind::Super || !state.frozen,
            LFError::ReadOnly(self.id)
        );
        match kind {
            DirtyKind::Super => {}
            DirtyKind::Inodes => state.inodes_dirty = true,
            DirtyKind::Extents => state.extents_dirty = true,
        }
        if !state.dirty {
            trace!("Layer {} dirty ({:?})", self.id, kind);
        }
        state.dirty = true;
        state.superblock.set_flag(SuperFlag::Dirty);
        Ok(())
    }
    /// Called by the inode and extent writers once their part is on disk.
    #[cfg(feature = "unstable")]
    pub fn clear_metadata_dirty(&self, kind: DirtyKind) -> LFResult<()> {
        let mut state = self.write()?;
        match kind {
            DirtyKind::Super => {}
            DirtyKind::Inodes => state.inodes_dirty = false,
            DirtyKind::Extents => state.extents_dirty = false,
        }
        Ok(())
    }
    /// Applies `f` to the in-memory superblock and marks the layer dirty.
    #[cfg(feature = "unstable")]
    pub fn update_superblock<F: FnOnce(&mut Superblock)>(&self, f: F) -> LFResult<()> {
        {
            let mut state = self.write()?;
            f(&mut state.superblock);
        }
        self.mark_dirty(DirtyKind::Super)
    }
}

#[test]
#[allow(clippy::unwrap_used)]
fn mark_dirty_is_idempotent() {
    let l = Layer::new(LayerId(3), Some(LayerId::PRIMARY), Superblock::new(2, 0, 0, false), INVALID_BLOCK);
    assert!(!l.is_dirty().unwrap());
    l.mark_dirty(DirtyKind::Super).unwrap();
    let once = l.superblock().unwrap();
    l.mark_dirty(DirtyKind::Super).unwrap();
    assert!(l.is_dirty().unwrap());
    assert_eq!(once, l.superblock().unwrap());
    assert!(once.has_flag(SuperFlag::Dirty));
}

#[test]
#[allow(clippy::unwrap_used)]
fn frozen_layer_rejects_data_mutation() {
    let l = Layer::new(
        LayerId(1),
        Some(LayerId::PRIMARY),
        Superblock::new(2, 0, SuperFlag::Frozen.bit(), false),
        INVALID_BLOCK,
    );
    assert!(l.is_frozen().unwrap());
    assert!(matches!(l.mark_dirty(DirtyKind::Inodes), Err(LFError::ReadOnly(_))));
    l.mark_dirty(DirtyKind::Super).unwrap();
}
