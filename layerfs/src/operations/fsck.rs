use std::convert::TryFrom;

use bitvec::prelude::*;

use crate::{Disk, LFError, LFResult, SuperFlag, Superblock, SUPER_BLOCK};

/// What is wrong at a given block
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FsckErrorKind {
    /// Magic or version do not match
    InvalidSuperblock,
    /// Checksum does not match
    CorruptSuperblock,
    /// Block is linked to more than once
    DoubleReference,
    /// Link points past the end of the device
    OutOfRange,
    /// Primary still carries the dirty flag
    UncleanUnmount,
    /// More superblocks are linked than the primary accounts for
    BlockCount,
}

/// A single finding
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FsckError {
    /// Block the finding is about
    pub block: u64,
    /// What was found
    pub kind:  FsckErrorKind,
}

/// Outcome of a forest check
#[derive(Debug)]
pub struct FsckReport {
    /// Layers whose superblock verified, the primary included
    pub layers:  u64,
    /// Everything found along the way
    pub errors:  Vec<FsckError>,
    blockmap:    BitVec<u8, Msb0>,
}

impl FsckReport {
    /// True if nothing was found
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
    /// Number of blocks holding a reachable superblock
    pub fn referenced(&self) -> usize {
        self.blockmap.count_ones()
    }
    /// True if `block` holds a reachable superblock
    pub fn is_referenced(&self, block: u64) -> bool {
        usize::try_from(block)
            .ok()
            .and_then(|b| self.blockmap.get(b).map(|bit| *bit))
            .unwrap_or(false)
    }
    fn push(&mut self, block: u64, kind: FsckErrorKind) {
        warn!("\tBlock {}: {:?}", block, kind);
        self.errors.push(FsckError { block, kind });
    }
}

fn classify(e: &LFError) -> Option<FsckErrorKind> {
    match e {
        LFError::FormatMismatch { .. } => Some(FsckErrorKind::InvalidSuperblock),
        LFError::Corruption { .. } => Some(FsckErrorKind::CorruptSuperblock),
        _ => None,
    }
}

/// Walks every superblock reachable from the primary and reports what is wrong.
///
/// Unreadable subtrees are reported once and not descended into. IO errors
/// abort the check.
#[cfg(feature = "stable")]
pub fn check_forest(d: &Disk) -> LFResult<FsckReport> {
    let size = d.size()?;
    let mut report = FsckReport {
        layers:   0,
        errors:   Vec::new(),
        blockmap: BitVec::repeat(false, to_index(size, size)?),
    };
    info!("Verifying primary superblock...");
    let primary = match Superblock::read(d, SUPER_BLOCK) {
        Ok(sb) => sb,
        Err(e) => match classify(&e) {
            Some(kind) => {
                report.push(SUPER_BLOCK, kind);
                return Ok(report);
            }
            None => return Err(e),
        },
    };
    report.blockmap.set(to_index(SUPER_BLOCK, size)?, true);
    report.layers += 1;
    if !primary.is_global() {
        report.push(SUPER_BLOCK, FsckErrorKind::InvalidSuperblock);
        return Ok(report);
    }
    if primary.has_flag(SuperFlag::Dirty) {
        report.push(SUPER_BLOCK, FsckErrorKind::UncleanUnmount);
    }

    info!("Verifying layers...");
    let mut pending = vec![primary.child_layer()];
    while let Some(mut block) = pending.pop() {
        while block != 0 {
            if block >= size {
                report.push(block, FsckErrorKind::OutOfRange);
                break;
            }
            let idx = to_index(block, size)?;
            if report.blockmap[idx] {
                report.push(block, FsckErrorKind::DoubleReference);
                break;
            }
            report.blockmap.set(idx, true);
            let sb = match Superblock::read(d, block) {
                Ok(sb) => sb,
                Err(e) => match classify(&e) {
                    Some(kind) => {
                        report.push(block, kind);
                        break;
                    }
                    None => return Err(e),
                },
            };
            trace!("\tLayer superblock at {} OK", block);
            report.layers += 1;
            pending.push(sb.child_layer());
            block = sb.next_layer();
        }
    }
    if report.referenced() as u64 > primary.blocks() {
        report.push(SUPER_BLOCK, FsckErrorKind::BlockCount);
    }
    if report.is_clean() {
        info!("\tOK! {} layer(s)", report.layers);
    }
    Ok(report)
}

fn to_index(block: u64, size: u64) -> LFResult<usize> {
    usize::try_from(block).or(Err(LFError::OutOfRange { block, size }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{test::forest::forest_mem, LayerId, BlockBuf, ROOT_INODE};

    #[test]
    fn fresh_forest_is_clean() {
        let f = forest_mem(16);
        let report = check_forest(f.disk()).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.layers, 1);
        assert_eq!(report.referenced(), 1);
    }

    #[test]
    fn checkpointed_forest_is_walked() {
        let mut f = forest_mem(32);
        let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        f.create_layer(a, ROOT_INODE, 0).unwrap();
        f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        f.unmount().unwrap();
        let report = check_forest(f.disk()).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        assert_eq!(report.layers, 4);
        for id in f.layer_ids() {
            assert!(report.is_referenced(f.layer(id).unwrap().sblock()));
        }
    }

    #[test]
    fn corrupt_child_is_reported() {
        let mut f = forest_mem(32);
        let a = f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        f.unmount().unwrap();
        let blk = f.layer(a).unwrap().sblock();
        let mut buf = BlockBuf::zeroed();
        f.disk().read_block(blk, &mut buf).unwrap();
        buf.as_mut()[40] ^= 0x04;
        f.disk().write_block(blk, &buf).unwrap();
        let report = check_forest(f.disk()).unwrap();
        assert_eq!(
            report.errors,
            vec![FsckError {
                block: blk,
                kind:  FsckErrorKind::CorruptSuperblock,
            }]
        );
    }

    #[test]
    fn mounted_forest_is_unclean() {
        let mut f = forest_mem(16);
        f.create_layer(LayerId::PRIMARY, ROOT_INODE, 0).unwrap();
        f.checkpoint_forest().unwrap();
        let report = check_forest(f.disk()).unwrap();
        assert!(report
            .errors
            .iter()
            .any(|e| e.kind == FsckErrorKind::UncleanUnmount));
    }
}
