use std::time::{SystemTime, UNIX_EPOCH};

use crc32fast::Hasher;
use endian_codec::{DecodeLE, EncodeLE, PackedSize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::{
    BlockBuf, Disk, LFError, LFResult, BLOCK_SIZE, INVALID_BLOCK, START_BLOCK, START_INODE,
    SUPER_MAGIC, VERSION,
};

/// Byte offset of the checksum inside an encoded superblock.
pub const CHECKSUM_OFFSET: usize = 12;

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, EnumIter, Display)]
/// Bits of the superblock `flags` field
pub enum SuperFlag {
    /// Must be rewritten before the next checkpoint completes
    Dirty     = 0x01,
    /// Layer is in use
    Mounted   = 0x02,
    /// Layer accepts modifications
    ReadWrite = 0x04,
    /// Layer is still being populated
    Init      = 0x08,
    /// Layer has been frozen
    Frozen    = 0x10,
}

impl SuperFlag {
    /// The bit this flag occupies
    #[cfg(feature = "stable")]
    pub fn bit(self) -> u32 {
        self as u32
    }
    /// Decodes a flag word into the set of known flags it contains
    #[cfg(feature = "stable")]
    pub fn decode(flags: u32) -> Vec<SuperFlag> {
        SuperFlag::iter().filter(|f| flags & f.bit() != 0).collect()
    }
}

/// Seconds since the epoch, or zero if the clock is before it.
pub(crate) fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PackedSize, EncodeLE, DecodeLE)]
/// A layer superblock. Identifies one layer and links it to its relatives.
pub struct Superblock {
    magic:        u64,
    version:      u32,
    checksum:     u32,
    root:         u64,
    flags:        u32,
    ctime:        u64,
    atime:        u64,
    commit_time:  u64,
    next_layer:   u64,
    child_layer:  u64,
    inode_block:  u64,
    extent_block: u64,
    blocks:       u64,
    next_inode:   u64,
    inodes:       u64,
    total_blocks: u64,
}

impl Superblock {
    /// Creates a new superblock. Device-wide counters are only set when `global` is true.
    #[cfg(feature = "stable")]
    pub fn new(root: u64, device_size: u64, flags: u32, global: bool) -> Superblock {
        let t = now();
        let mut sb = Superblock {
            magic:        SUPER_MAGIC,
            version:      VERSION,
            checksum:     0,
            root,
            flags,
            ctime:        t,
            atime:        t,
            commit_time:  0,
            next_layer:   0,
            child_layer:  0,
            inode_block:  INVALID_BLOCK,
            extent_block: INVALID_BLOCK,
            blocks:       0,
            next_inode:   0,
            inodes:       0,
            total_blocks: 0,
        };
        if global {
            sb.blocks = START_BLOCK;
            sb.next_inode = START_INODE;
            sb.inodes = 1;
            sb.total_blocks = device_size / BLOCK_SIZE as u64;
        }
        sb
    }
    /// Decodes a superblock from a block image without any validation.
    #[cfg(feature = "stable")]
    pub fn from_block(buf: &BlockBuf) -> Superblock {
        Superblock::decode_from_le_bytes(&buf.as_ref()[..Superblock::PACKED_LEN])
    }
    /// Encodes this superblock into a block image. Bytes past the record are zero.
    #[cfg(feature = "stable")]
    pub fn to_block(&self) -> BlockBuf {
        let mut buf = BlockBuf::zeroed();
        self.encode_as_le_bytes(&mut buf.as_mut()[..Superblock::PACKED_LEN]);
        buf
    }
    /// Computes the checksum of a block image, skipping the checksum field.
    #[cfg(feature = "stable")]
    pub fn block_checksum(buf: &BlockBuf) -> u32 {
        let bytes = buf.as_ref();
        let mut hasher = Hasher::new();
        hasher.update(&bytes[..CHECKSUM_OFFSET]);
        hasher.update(&[0; 4]);
        hasher.update(&bytes[CHECKSUM_OFFSET + 4..]);
        hasher.finalize()
    }
    /// Reads a superblock from disk, rejecting foreign formats and bad checksums.
    #[cfg(feature = "stable")]
    pub fn read(d: &Disk, block: u64) -> LFResult<Superblock> {
        let mut buf = BlockBuf::zeroed();
        d.read_block(block, &mut buf)?;
        let res = Superblock::from_block(&buf);
        assert_or_err!(
            res.is_valid(),
            LFError::FormatMismatch {
                block,
                magic: res.magic,
                version: res.version,
            }
        );
        let expected = Superblock::block_checksum(&buf);
        assert_or_err!(
            res.checksum == expected,
            LFError::Corruption {
                block,
                found: res.checksum,
                expected,
            }
        );
        Ok(res)
    }
    /// Writes a superblock to disk. The checksum is refreshed first.
    #[cfg(feature = "stable")]
    pub fn write(&mut self, d: &Disk, block: u64) -> LFResult<()> {
        self.update_checksum();
        d.write_block(block, &self.to_block())
    }
    /// Checks magic and version. Must pass before the checksum means anything.
    #[cfg(feature = "stable")]
    pub fn is_valid(&self) -> bool {
        self.magic == SUPER_MAGIC && self.version == VERSION
    }
    /// Verifies our checksum
    #[cfg(feature = "stable")]
    pub fn verify_checksum(&self) -> bool {
        self.is_valid() && self.checksum == Superblock::block_checksum(&self.to_block())
    }
    /// Updates our checksum
    #[cfg(feature = "stable")]
    pub fn update_checksum(&mut self) {
        self.checksum = Superblock::block_checksum(&self.to_block());
    }
    /// True if this record carries the device-wide counters
    #[cfg(feature = "stable")]
    pub fn is_global(&self) -> bool {
        self.total_blocks != 0
    }
    /// Getter for magic
    #[cfg(feature = "stable")]
    pub fn magic(&self) -> u64 {
        self.magic
    }
    /// Getter for version
    #[cfg(feature = "stable")]
    pub fn version(&self) -> u32 {
        self.version
    }
    /// Getter for checksum
    #[cfg(feature = "stable")]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }
    /// Getter for the root inode
    #[cfg(feature = "stable")]
    pub fn root(&self) -> u64 {
        self.root
    }
    /// Getter for the raw flag word
    #[cfg(feature = "stable")]
    pub fn flags(&self) -> u32 {
        self.flags
    }
    /// Tests a single flag
    #[cfg(feature = "stable")]
    pub fn has_flag(&self, flag: SuperFlag) -> bool {
        self.flags & flag.bit() != 0
    }
    /// Sets a single flag
    #[cfg(feature = "stable")]
    pub fn set_flag(&mut self, flag: SuperFlag) {
        self.flags |= flag.bit();
    }
    /// Clears a single flag
    #[cfg(feature = "stable")]
    pub fn clear_flag(&mut self, flag: SuperFlag) {
        self.flags &= !flag.bit();
    }
    /// Getter for the creation time
    #[cfg(feature = "stable")]
    pub fn ctime(&self) -> u64 {
        self.ctime
    }
    /// Getter for the access time
    #[cfg(feature = "stable")]
    pub fn atime(&self) -> u64 {
        self.atime
    }
    /// Getter for the time this record was last committed
    #[cfg(feature = "stable")]
    pub fn commit_time(&self) -> u64 {
        self.commit_time
    }
    #[cfg(feature = "stable")]
    pub(crate) fn set_commit_time(&mut self, t: u64) {
        self.commit_time = t;
    }
    /// Block of the next sibling's superblock, 0 if none
    #[cfg(feature = "stable")]
    pub fn next_layer(&self) -> u64 {
        self.next_layer
    }
    /// Block of the first child's superblock, 0 if none
    #[cfg(feature = "stable")]
    pub fn child_layer(&self) -> u64 {
        self.child_layer
    }
    #[cfg(feature = "stable")]
    pub(crate) fn set_links(&mut self, next: u64, child: u64) {
        self.next_layer = next;
        self.child_layer = child;
    }
    /// Block holding the layer's inode table
    #[cfg(feature = "stable")]
    pub fn inode_block(&self) -> u64 {
        self.inode_block
    }
    /// Records where the inode table was placed
    #[cfg(feature = "unstable")]
    pub fn set_inode_block(&mut self, block: u64) {
        self.inode_block = block;
    }
    /// Block holding the layer's extent list
    #[cfg(feature = "stable")]
    pub fn extent_block(&self) -> u64 {
        self.extent_block
    }
    /// Records where the extent list was placed
    #[cfg(feature = "unstable")]
    pub fn set_extent_block(&mut self, block: u64) {
        self.extent_block = block;
    }
    /// Blocks in use. Global superblock only.
    #[cfg(feature = "stable")]
    pub fn blocks(&self) -> u64 {
        self.blocks
    }
    #[cfg(feature = "stable")]
    pub(crate) fn set_blocks(&mut self, blocks: u64) {
        self.blocks = blocks;
    }
    /// Next inode number to hand out. Global superblock only.
    #[cfg(feature = "stable")]
    pub fn next_inode(&self) -> u64 {
        self.next_inode
    }
    /// Number of inodes in use. Global superblock only.
    #[cfg(feature = "stable")]
    pub fn inodes(&self) -> u64 {
        self.inodes
    }
    /// Hands out the next inode number and counts it as used.
    #[cfg(feature = "stable")]
    pub(crate) fn take_inode(&mut self) -> u64 {
        let ino = self.next_inode;
        self.next_inode += 1;
        self.inodes += 1;
        ino
    }
    /// Device size in blocks. Global superblock only.
    #[cfg(feature = "stable")]
    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }
}

#[test]
fn packed_len() {
    assert_eq!(Superblock::PACKED_LEN, 116);
    assert_le!(Superblock::PACKED_LEN, BLOCK_SIZE);
}

#[test]
fn init_is_valid() {
    let mut sb = Superblock::new(2, 1 << 30, SuperFlag::ReadWrite.bit(), true);
    assert!(sb.is_valid());
    sb.update_checksum();
    assert!(sb.verify_checksum());
    assert_eq!(sb.total_blocks(), (1 << 30) / BLOCK_SIZE as u64);
    assert_eq!(sb.inode_block(), INVALID_BLOCK);
    assert_eq!(sb.next_inode(), START_INODE);
}

#[test]
fn local_has_no_counters() {
    let sb = Superblock::new(2, 1 << 30, 0, false);
    assert!(!sb.is_global());
    assert_eq!(sb.blocks(), 0);
    assert_eq!(sb.inodes(), 0);
}

#[test]
fn layout_offsets() {
    let mut sb = Superblock::new(0x1122, 0, 0, false);
    sb.update_checksum();
    let buf = sb.to_block();
    assert_eq!(&buf.as_ref()[..8], crate::SIGNATURE);
    assert_eq!(buf.get_u32(8), VERSION);
    assert_eq!(buf.get_u32(CHECKSUM_OFFSET), sb.checksum());
    assert_eq!(buf.as_ref()[16], 0x22);
    assert!(buf.as_ref()[Superblock::PACKED_LEN..].iter().all(|b| *b == 0));
}

#[test]
fn foreign_record_is_not_checksummed() {
    let mut sb = Superblock::new(2, 0, 0, false);
    sb.update_checksum();
    let mut buf = sb.to_block();
    buf.as_mut()[0] ^= 0xff;
    let foreign = Superblock::from_block(&buf);
    assert!(!foreign.is_valid());
    assert!(!foreign.verify_checksum());
}

#[test]
fn flag_decode() {
    let mut sb = Superblock::new(2, 0, 0, false);
    sb.set_flag(SuperFlag::Dirty);
    sb.set_flag(SuperFlag::Frozen);
    assert_eq!(SuperFlag::decode(sb.flags()), vec![SuperFlag::Dirty, SuperFlag::Frozen]);
    sb.clear_flag(SuperFlag::Dirty);
    assert!(!sb.has_flag(SuperFlag::Dirty));
    assert_eq!(SuperFlag::Frozen.to_string(), "Frozen");
}
