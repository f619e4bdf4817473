use std::{
    collections::BTreeSet,
    convert::TryFrom,
    io::{Error, ErrorKind},
    sync::{Arc, Mutex},
};

use crate::{disk::DiskObj, Disk, BLOCK_SIZE};

/// A memory disk whose writes to selected blocks fail
pub struct FaultyDisk {
    data:    Vec<[u8; BLOCK_SIZE]>,
    failing: Arc<Mutex<BTreeSet<u64>>>,
}

/// Switch controlling which blocks of a `FaultyDisk` fail
#[derive(Clone, Debug, Default)]
pub struct Faults(Arc<Mutex<BTreeSet<u64>>>);

impl Faults {
    /// Makes every later write to `blocks` fail
    pub fn fail<I: IntoIterator<Item = u64>>(&self, blocks: I) {
        self.0.lock().unwrap().extend(blocks);
    }
    /// Lets every write succeed again
    pub fn heal(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl FaultyDisk {
    /// A zeroed disk of `size` blocks and the switch for its failures
    pub fn open(size: usize) -> (Disk, Faults) {
        let faults = Faults::default();
        let d = Disk::new(FaultyDisk {
            data:    vec![[0; BLOCK_SIZE]; size],
            failing: faults.0.clone(),
        });
        (d, faults)
    }
}

impl FaultyDisk {
    fn slot(&mut self, block: u64) -> std::io::Result<&mut [u8; BLOCK_SIZE]> {
        usize::try_from(block)
            .ok()
            .and_then(move |b| self.data.get_mut(b))
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "block beyond end of disk"))
    }
}

impl DiskObj for FaultyDisk {
    fn read_at(&mut self, block: u64, buffer: &mut [u8]) -> std::io::Result<()> {
        buffer.copy_from_slice(self.slot(block)?);
        Ok(())
    }
    fn write_at(&mut self, block: u64, buffer: &[u8]) -> std::io::Result<()> {
        if self.failing.lock().unwrap().contains(&block) {
            return Err(Error::new(ErrorKind::Other, "injected write failure"));
        }
        self.slot(block)?.copy_from_slice(buffer);
        Ok(())
    }
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.data.len() as u64)
    }
    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn injected_failure() {
    let (d, faults) = FaultyDisk::open(4);
    let buf = crate::BlockBuf::zeroed();
    faults.fail(vec![2]);
    assert!(d.write_block(1, &buf).is_ok());
    assert!(matches!(
        d.write_block(2, &buf),
        Err(crate::LFError::Write { block: 2, .. })
    ));
    faults.heal();
    assert!(d.write_block(2, &buf).is_ok());
}
