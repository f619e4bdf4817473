use layerfs::{
    DirtyKind, DiskMem, Forest, ForestConfig, LFError, LayerId, SuperFlag, BLOCK_SIZE, ROOT_INODE,
    START_INODE,
};
use layerfs_macros::*;
use layerfs_tests::mount;
use more_asserts::*;

fn format(blocks: usize) -> Forest {
    Forest::format(DiskMem::open(blocks), ForestConfig::default()).unwrap()
}

#[test_fs]
fn test_fresh_forest() {
    let f = format(64);
    assert_eq!(f.layer_count(), 1);
    assert!(f.children(LayerId::PRIMARY).unwrap().is_empty());
    assert!(!f.is_dirty().unwrap());
    let st = f.statfs().unwrap();
    assert_eq!(st.block_size, BLOCK_SIZE as u64);
    assert_eq!(st.blocks, 64);
    assert_eq!(st.free_blocks, 63);
    assert_eq!(st.inodes, 1);
    assert_eq!(st.next_inode, START_INODE);
}

#[test_fs]
fn test_new_layer_becomes_first_child() {
    let mut f = format(64);
    let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    let b = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    let c = f.create_layer(a, ROOT_INODE, SuperFlag::ReadWrite.bit()).unwrap();
    assert_eq!(f.children(LayerId::PRIMARY).unwrap(), vec![b, a]);
    assert_eq!(f.children(a).unwrap(), vec![c]);
    assert_eq!(f.layer(c).unwrap().parent(), Some(a));
    assert!(!f.layer(c).unwrap().has_sblock());
    assert!(f.is_layer_dirty(c).unwrap());
    assert!(f.is_layer_dirty(LayerId::PRIMARY).unwrap());
}

#[test_fs]
fn test_remove_layer() {
    let mut f = format(64);
    let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    let b = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    f.checkpoint_forest().unwrap();
    assert_eq!(f.statfs().unwrap().free_blocks, 61);

    let gone = f.layer(b).unwrap().sblock();
    f.remove_layer(b).unwrap();
    assert!(matches!(f.layer(b), Err(LFError::NoLayer(_))));
    assert_eq!(f.children(LayerId::PRIMARY).unwrap(), vec![a]);
    assert!(f.allocator().is_used(gone));

    f.checkpoint_forest().unwrap();
    assert!(!f.allocator().is_used(gone));
    assert_eq!(f.statfs().unwrap().free_blocks, 62);

    let g = mount(f.disk());
    assert_eq!(g.layer_count(), 2);
}

#[test_fs]
fn test_remove_refused() {
    let mut f = format(64);
    let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    f.create_layer(a, ROOT_INODE, 0).unwrap();
    assert!(matches!(f.remove_layer(a), Err(LFError::LayerBusy(_))));
    assert!(matches!(
        f.remove_layer(LayerId::PRIMARY),
        Err(LFError::LayerBusy(_))
    ));
    assert_eq!(f.layer_count(), 3);
}

#[test_fs]
fn test_slot_reuse() {
    let mut f = format(64);
    let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    let b = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    f.remove_layer(a).unwrap();
    let c = f.create_layer(b, ROOT_INODE, 0).unwrap();
    assert_eq!(c, a);
    assert_eq!(f.layer(c).unwrap().parent(), Some(b));
    f.checkpoint_forest().unwrap();
    assert_eq!(mount(f.disk()).layer_count(), 3);
}

#[test_fs]
fn test_frozen_layer_is_read_only() {
    let mut f = format(64);
    let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, SuperFlag::ReadWrite.bit()).unwrap();
    f.freeze_layer(a).unwrap();
    let sb = f.layer(a).unwrap().superblock().unwrap();
    assert!(sb.has_flag(SuperFlag::Frozen));
    assert!(!sb.has_flag(SuperFlag::ReadWrite));
    assert!(matches!(f.allocate_inode(a), Err(LFError::ReadOnly(_))));
    assert!(matches!(
        f.mark_layer_dirty(a, DirtyKind::Extents),
        Err(LFError::ReadOnly(_))
    ));
    f.mark_layer_dirty(a, DirtyKind::Super).unwrap();
    assert!(matches!(
        f.freeze_layer(LayerId::PRIMARY),
        Err(LFError::ReadOnly(_))
    ));

    f.unmount().unwrap();
    let g = mount(f.disk());
    let a = g.children(LayerId::PRIMARY).unwrap()[0];
    assert!(g.layer(a).unwrap().is_frozen().unwrap());
}

#[test_fs]
fn test_inode_counters_persist() {
    let mut f = format(64);
    let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    let inos: Vec<u64> = (0..5).map(|_| f.allocate_inode(a).unwrap()).collect();
    assert_eq!(inos, (START_INODE..START_INODE + 5).collect::<Vec<_>>());
    assert!(matches!(f.unmount(), Err(LFError::InternalConsistency(_))));

    f.layer(a).unwrap().clear_metadata_dirty(DirtyKind::Inodes).unwrap();
    f.unmount().unwrap();
    let g = mount(f.disk());
    let st = g.statfs().unwrap();
    assert_eq!(st.inodes, 6);
    assert_eq!(st.next_inode, START_INODE + 5);
    assert_ge!(st.free_blocks, 60);
}

#[test_fs]
fn test_removed_layer_is_unknown() {
    let mut f = format(16);
    let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    f.remove_layer(a).unwrap();
    assert_eq!(f.layer_ids(), vec![LayerId::PRIMARY]);
    assert!(matches!(
        f.mark_layer_dirty(a, DirtyKind::Super),
        Err(LFError::NoLayer(_))
    ));
    assert!(matches!(f.remove_layer(a), Err(LFError::NoLayer(_))));
}
