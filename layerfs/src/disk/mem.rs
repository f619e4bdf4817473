use std::{
    convert::TryFrom,
    io::{Error, ErrorKind},
};

use crate::{disk::DiskObj, Disk, BLOCK_SIZE};

/// A disk object stored in memory.
pub struct DiskMem {
    data: Vec<[u8; BLOCK_SIZE]>,
    size: u64,
}

impl DiskMem {
    /// Creates a zero-filled memory disk of `size` blocks.
    #[cfg(feature = "stable")]
    pub fn open(size: usize) -> Disk {
        Disk::new(DiskMem {
            data: vec![[0; BLOCK_SIZE]; size],
            size: size as u64,
        })
    }
    #[cfg(feature = "stable")]
    fn slot(&mut self, block: u64) -> std::io::Result<&mut [u8; BLOCK_SIZE]> {
        usize::try_from(block)
            .ok()
            .and_then(move |b| self.data.get_mut(b))
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "block beyond end of disk"))
    }
}

impl DiskObj for DiskMem {
    fn read_at(&mut self, block: u64, buffer: &mut [u8]) -> std::io::Result<()> {
        buffer.copy_from_slice(self.slot(block)?);
        Ok(())
    }
    fn write_at(&mut self, block: u64, buffer: &[u8]) -> std::io::Result<()> {
        self.slot(block)?.copy_from_slice(buffer);
        Ok(())
    }
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.size)
    }
    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
#[allow(clippy::unwrap_used)]
fn mem_rw() {
    let d = DiskMem::open(8);
    let mut buf = crate::BlockBuf::zeroed();
    buf.as_mut()[17] = 0xa5;
    d.write_block(3, &buf).unwrap();
    let mut back = crate::BlockBuf::zeroed();
    d.read_block(3, &mut back).unwrap();
    assert_eq!(back.as_ref()[17], 0xa5);
    assert_eq!(d.reads(), 1);
    assert_eq!(d.writes(), 1);
    assert!(d.read_block(8, &mut back).is_err());
}
