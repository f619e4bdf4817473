use std::{sync::Arc, thread};

use itertools::Itertools;
use layerfs::{
    test::forest::handle_mem, DirtyKind, ForestHandle, LayerId, ROOT_INODE, START_INODE,
};
use layerfs_macros::*;
use layerfs_tests::mount;

const WORKERS: usize = 8;
const PER_WORKER: usize = 50;

#[test_fs]
fn test_parallel_mutation_and_checkpoint() {
    let h = handle_mem(256);
    let layers: Vec<LayerId> = (0..4)
        .map(|_| h.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap())
        .collect();
    let layers = Arc::new(layers);

    let workers: Vec<_> = (0..WORKERS)
        .map(|w| {
            let h: ForestHandle = h.clone();
            let layers = layers.clone();
            thread::spawn(move || {
                let mut got = Vec::with_capacity(PER_WORKER);
                for i in 0..PER_WORKER {
                    let id = layers[(w + i) % layers.len()];
                    got.push(h.allocate_inode(id).unwrap());
                    h.mark_layer_dirty(id, DirtyKind::Extents).unwrap();
                    if i % 10 == 0 {
                        h.checkpoint().unwrap();
                    }
                }
                got
            })
        })
        .collect();
    let inos: Vec<u64> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();

    let total = (WORKERS * PER_WORKER) as u64;
    assert_eq!(inos.iter().unique().count() as u64, total);
    assert_eq!(*inos.iter().min().unwrap(), START_INODE);
    assert_eq!(*inos.iter().max().unwrap(), START_INODE + total - 1);

    for id in layers.iter() {
        h.clear_metadata_dirty(*id, DirtyKind::Inodes).unwrap();
        h.clear_metadata_dirty(*id, DirtyKind::Extents).unwrap();
    }
    h.unmount().unwrap();
    assert!(!h.is_dirty().unwrap());

    let d = h.disk().unwrap();
    let f = mount(&d);
    assert_eq!(f.layer_count(), 5);
    assert_eq!(f.statfs().unwrap().next_inode, START_INODE + total);
}

#[test_fs]
fn test_marking_is_idempotent_across_threads() {
    let h = handle_mem(64);
    let a = h.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    h.checkpoint().unwrap();
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let h = h.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    h.mark_layer_dirty(a, DirtyKind::Super).unwrap();
                }
            })
        })
        .collect();
    for t in handles {
        t.join().unwrap();
    }
    assert!(h.is_dirty().unwrap());
    let stats = h.checkpoint().unwrap();
    assert_eq!(stats.allocated, 1);
    assert_eq!(stats.written, 2);
    assert_eq!(h.checkpoint().unwrap().written, 0);
}
