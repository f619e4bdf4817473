use std::fmt;

use crate::BLOCK_SIZE;

/// An owned, block-sized byte buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct BlockBuf(Box<[u8; BLOCK_SIZE]>);

impl BlockBuf {
    /// Creates a zero-filled block.
    #[cfg(feature = "stable")]
    pub fn zeroed() -> BlockBuf {
        BlockBuf(Box::new([0; BLOCK_SIZE]))
    }
    /// Reads a little-endian u32 at `offset`.
    #[cfg(feature = "stable")]
    pub fn get_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }
    /// Writes a little-endian u32 at `offset`.
    #[cfg(feature = "stable")]
    pub fn put_u32(&mut self, offset: usize, value: u32) {
        self.0[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
    /// Flips a single bit. Used to fabricate damaged images.
    #[cfg(feature = "unstable")]
    pub fn flip_bit(&mut self, bit: usize) {
        self.0[bit / 8] ^= 1 << (bit % 8);
    }
}

impl AsRef<[u8]> for BlockBuf {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl AsMut<[u8]> for BlockBuf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }
}

impl fmt::Debug for BlockBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.0.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        write!(f, "BlockBuf({} significant bytes)", used)
    }
}

#[test]
fn u32_accessors() {
    let mut b = BlockBuf::zeroed();
    b.put_u32(12, 0xdead_beef);
    assert_eq!(b.get_u32(12), 0xdead_beef);
    assert_eq!(b.as_ref()[12], 0xef);
    b.flip_bit(12 * 8);
    assert_eq!(b.get_u32(12), 0xdead_beee);
}
