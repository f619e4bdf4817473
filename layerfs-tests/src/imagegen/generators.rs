use layerfs::{
    operations::mkfs, Disk, DiskMem, Forest, ForestConfig, LayerId, ROOT_INODE, SIGNATURE,
    SUPER_BLOCK,
};

use super::{utils, IMAGE_BLOCKS};

/// Zero-filled disk
pub fn generate_0000() -> Disk {
    DiskMem::open(IMAGE_BLOCKS)
}

/// Superblock signature and version, no checksum
pub fn generate_0001() -> Disk {
    let d = generate_0000();
    utils::patch(&d, SUPER_BLOCK, 0, SIGNATURE);
    utils::patch(&d, SUPER_BLOCK, 8, &layerfs::VERSION.to_le_bytes());
    d
}

/// Freshly formatted forest
pub fn generate_0002() -> Disk {
    let d = generate_0000();
    mkfs(&d, false).unwrap();
    d
}

/// Primary with children A and B, A with one child, cleanly unmounted
pub fn generate_0003() -> Disk {
    let mut f = Forest::format(generate_0000(), ForestConfig::default()).unwrap();
    let b = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
    f.create_layer(a, ROOT_INODE, 0).unwrap();
    f.freeze_layer(b).unwrap();
    f.unmount().unwrap();
    f.disk().clone()
}

/// Image 3 with a bit flipped in the superblock of A's child
pub fn generate_0004() -> Disk {
    let d = generate_0003();
    let f = crate::mount(&d);
    let a = f.children(LayerId::PRIMARY).unwrap()[0];
    let leaf = f.children(a).unwrap()[0];
    let blk = f.layer(leaf).unwrap().sblock();
    drop(f);
    utils::flip_bit(&d, blk, 8 * 20 + 3);
    d
}

/// Formatted forest written by a newer format version
pub fn generate_0005() -> Disk {
    let d = generate_0002();
    utils::patch(&d, SUPER_BLOCK, 8, &(layerfs::VERSION + 1).to_le_bytes());
    utils::reseal(&d, SUPER_BLOCK);
    d
}

/// Image 3 with a bit flipped in the superblock of A, the first child
pub fn generate_0006() -> Disk {
    let d = generate_0003();
    let f = crate::mount(&d);
    let a = f.children(LayerId::PRIMARY).unwrap()[0];
    let blk = f.layer(a).unwrap().sblock();
    drop(f);
    utils::flip_bit(&d, blk, 8 * 20 + 3);
    d
}
