use crate::{Disk, DiskMem, Forest, ForestConfig, ForestHandle, LayerId, ROOT_INODE};

/// A freshly formatted forest on a memory disk of `blocks` blocks
pub fn forest_mem(blocks: usize) -> Forest {
    Forest::format(DiskMem::open(blocks), ForestConfig::default()).unwrap()
}

/// Same as `forest_mem`, behind a shareable handle
pub fn handle_mem(blocks: usize) -> ForestHandle {
    ForestHandle::new(forest_mem(blocks))
}

/// Builds a forest with `children` layers below the primary, checkpointed once
pub fn forest_with_children(blocks: usize, children: usize) -> (Forest, Vec<LayerId>) {
    let mut f = forest_mem(blocks);
    let ids = (0..children)
        .map(|_| f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap())
        .collect();
    f.checkpoint_forest().unwrap();
    (f, ids)
}

/// Drops the forest and mounts whatever it left on its disk
pub fn remount(f: Forest) -> Forest {
    let d: Disk = f.disk().clone();
    let config = f.config();
    drop(f);
    Forest::mount(d, config).unwrap()
}
