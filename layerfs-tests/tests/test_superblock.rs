use layerfs::{BlockBuf, LFError, SuperFlag, Superblock, BLOCK_SIZE, CHECKSUM_OFFSET, SUPER_BLOCK, VERSION};
use layerfs_macros::*;
use layerfs_tests::imagegen::utils;
use rand::Rng;

#[test_fs]
fn test_err_signature() {
    let d = generate_image!(0);
    assert!(matches!(
        Superblock::read(&d, SUPER_BLOCK),
        Err(LFError::FormatMismatch { block: 0, magic: 0, version: 0 })
    ));
}

#[test_fs]
fn test_err_checksum() {
    let d = generate_image!(1);
    match Superblock::read(&d, SUPER_BLOCK) {
        Err(LFError::Corruption { block, found, .. }) => {
            assert_eq!(block, SUPER_BLOCK);
            assert_eq!(found, 0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test_fs]
fn test_err_version() {
    let d = generate_image!(5);
    match Superblock::read(&d, SUPER_BLOCK) {
        Err(LFError::FormatMismatch { version, .. }) => assert_eq!(version, VERSION + 1),
        other => panic!("unexpected {:?}", other),
    }
}

#[test_fs]
fn test_okay() {
    let d = generate_image!(2);
    let sb = Superblock::read(&d, SUPER_BLOCK).unwrap();
    assert!(sb.is_global());
    assert!(sb.verify_checksum());
    assert_eq!(sb.total_blocks(), d.size().unwrap());
}

#[test_fs]
fn test_checksum_covers_whole_block() {
    let d = generate_image!(2);
    let mut raw = BlockBuf::zeroed();
    d.read_block(SUPER_BLOCK, &mut raw).unwrap();
    let stored = raw.get_u32(CHECKSUM_OFFSET);
    raw.put_u32(CHECKSUM_OFFSET, 0);
    assert_eq!(crc32fast::hash(raw.as_ref()), stored);
}

#[test_fs]
fn test_round_trip() {
    let d = generate_image!(0);
    let mut sb = Superblock::new(7, 0, SuperFlag::ReadWrite.bit() | SuperFlag::Init.bit(), false);
    sb.set_inode_block(12);
    sb.set_extent_block(13);
    sb.write(&d, 5).unwrap();
    let back = Superblock::read(&d, 5).unwrap();
    assert_eq!(back, sb);
    assert_eq!(back.root(), 7);
    assert_eq!(
        SuperFlag::decode(back.flags()),
        vec![SuperFlag::ReadWrite, SuperFlag::Init]
    );
    assert_eq!(back.inode_block(), 12);
    assert_eq!(back.extent_block(), 13);
    assert!(!back.is_global());
}

#[test_fs]
fn test_bit_flips_are_detected() {
    let d = generate_image!(2);
    let mut rng = rand::thread_rng();
    for _ in 0..64 {
        let bit = rng.gen_range(0..BLOCK_SIZE * 8);
        utils::flip_bit(&d, SUPER_BLOCK, bit);
        let err = Superblock::read(&d, SUPER_BLOCK).unwrap_err();
        assert!(err.is_unmountable());
        if bit < 12 * 8 {
            assert!(matches!(err, LFError::FormatMismatch { .. }), "bit {}: {:?}", bit, err);
        } else {
            assert!(matches!(err, LFError::Corruption { .. }), "bit {}: {:?}", bit, err);
        }
        utils::flip_bit(&d, SUPER_BLOCK, bit);
        Superblock::read(&d, SUPER_BLOCK).unwrap();
    }
}
