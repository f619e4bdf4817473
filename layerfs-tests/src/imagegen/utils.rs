use layerfs::{BlockBuf, Disk};

/// Flips one bit of a block in place
pub fn flip_bit(d: &Disk, block: u64, bit: usize) {
    let mut buf = BlockBuf::zeroed();
    d.read_block(block, &mut buf).unwrap();
    buf.flip_bit(bit);
    d.write_block(block, &buf).unwrap();
}

/// Overwrites the first bytes of a block
pub fn patch(d: &Disk, block: u64, offset: usize, bytes: &[u8]) {
    let mut buf = BlockBuf::zeroed();
    d.read_block(block, &mut buf).unwrap();
    buf.as_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    d.write_block(block, &buf).unwrap();
}

/// Recomputes the checksum stored in a block after it was patched
pub fn reseal(d: &Disk, block: u64) {
    let mut buf = BlockBuf::zeroed();
    d.read_block(block, &mut buf).unwrap();
    let sum = layerfs::Superblock::block_checksum(&buf);
    buf.put_u32(layerfs::CHECKSUM_OFFSET, sum);
    d.write_block(block, &buf).unwrap();
}
