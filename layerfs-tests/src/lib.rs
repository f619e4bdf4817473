#![allow(unknown_lints)]
#![allow(require_stability_comment)]

#[cfg(not(tarpaulin_include))]
pub mod imagegen;

use layerfs::{Disk, Forest, ForestConfig};

/// Mounts `d` with the default config, panicking on failure
pub fn mount(d: &Disk) -> Forest {
    Forest::mount(d.clone(), ForestConfig::default()).unwrap()
}

/// Superblock block of every layer of `f`, primary first
pub fn sblocks(f: &Forest) -> Vec<u64> {
    f.layer_ids()
        .into_iter()
        .map(|id| f.layer(id).unwrap().sblock())
        .collect()
}
