use crate::{Disk, LFResult, SuperFlag, Superblock, BLOCK_SIZE, ROOT_INODE, SUPER_BLOCK};

/// Writes an empty forest to `d`: a global primary superblock with no children.
/// With `erase`, every block of the device is zeroed first.
#[cfg(feature = "stable")]
pub fn mkfs(d: &Disk, erase: bool) -> LFResult<()> {
    let size = d.size()?;
    if erase {
        let zero = crate::BlockBuf::zeroed();
        for i in 0..size {
            d.write_block(i, &zero)?;
        }
    }
    let mut sb = Superblock::new(
        ROOT_INODE,
        size * BLOCK_SIZE as u64,
        SuperFlag::ReadWrite.bit(),
        true,
    );
    sb.write(d, SUPER_BLOCK)?;
    d.sync()?;
    info!("Created forest on {} blocks", size);
    Ok(())
}

#[test]
fn mkfs_writes_global_primary() {
    #![allow(clippy::unwrap_used)]
    let d = crate::DiskMem::open(32);
    mkfs(&d, true).unwrap();
    assert_eq!(d.writes(), 33);
    let sb = Superblock::read(&d, SUPER_BLOCK).unwrap();
    assert!(sb.is_global());
    assert_eq!(sb.total_blocks(), 32);
    assert_eq!(sb.child_layer(), 0);
    assert_eq!(sb.next_layer(), 0);
    assert!(!sb.has_flag(SuperFlag::Dirty));
    assert!(sb.has_flag(SuperFlag::ReadWrite));
}
