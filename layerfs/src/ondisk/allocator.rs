use std::collections::{BTreeMap, BTreeSet};

use crate::{LFError, LFResult};

/// The filesystem's block allocator. Tracks free and used extents over the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocator {
    size:    u64,
    extents: BTreeMap<u64, Extent>,
    movable: BTreeSet<u64>,
}

/// A run of blocks that is either entirely used or entirely free
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    /// Length in blocks
    pub size: u64,
    /// Whether the run is allocated
    pub used: bool,
}

impl Allocator {
    /// Creates a new allocator
    #[cfg(feature = "stable")]
    pub fn new(size: u64) -> Self {
        let mut extent_map = BTreeMap::new();
        extent_map.insert(0, Extent { size, used: false });
        Self {
            size,
            extents: extent_map,
            movable: BTreeSet::new(),
        }
    }
    /// Returns the amount of space free
    #[cfg(feature = "stable")]
    pub fn free_space(&self) -> u64 {
        self.extents.values().filter(|ex| !ex.used).map(|ex| ex.size).sum()
    }
    /// Returns the amount of space in use
    #[cfg(feature = "stable")]
    pub fn used_space(&self) -> u64 {
        self.extents.values().filter(|ex| ex.used).map(|ex| ex.size).sum()
    }
    /// Returns the total space belonging to this allocator
    #[cfg(feature = "stable")]
    pub fn total_space(&self) -> u64 {
        self.size
    }
    /// Gets the list of extents
    #[cfg(feature = "unstable")]
    pub fn extents(&self) -> &BTreeMap<u64, Extent> {
        &self.extents
    }
    /// True if `block` was allocated with the movable hint
    #[cfg(feature = "stable")]
    pub fn is_movable(&self, block: u64) -> bool {
        self.movable.contains(&block)
    }
    /// True if `block` lies inside a used extent
    #[cfg(feature = "stable")]
    pub fn is_used(&self, block: u64) -> bool {
        self.extents
            .range(..=block)
            .next_back()
            .map_or(false, |(a, ex)| ex.used && block < a + ex.size)
    }
    /// Allocates `count` contiguous blocks and returns the first one.
    #[cfg(feature = "stable")]
    pub fn alloc_exact(&mut self, count: u64, movable: bool) -> LFResult<u64> {
        assert_or_err!(
            count > 0 && count <= self.size,
            LFError::Allocation { count }
        );
        trace!("Allocating run of size: {:x}", count);
        let mut found = None;
        for (a, ex) in self.extents.iter_mut() {
            if ex.used {
                continue;
            }
            if ex.size == count {
                trace!("Found exact match");
                ex.used = true;
                found = Some(*a);
                break;
            }
        }
        if found.is_none() {
            let mut exs = None;
            for (a, ex) in self.extents.iter() {
                if !ex.used && ex.size > count {
                    trace!("Found larger extent: {:x}", ex.size);
                    exs = Some((*a, ex.size));
                    break;
                }
            }
            let (a, se) = exs.ok_or(LFError::Allocation { count })?;
            self.extents.insert(
                a,
                Extent {
                    size: count,
                    used: true,
                },
            );
            self.extents.insert(
                a + count,
                Extent {
                    size: se - count,
                    used: false,
                },
            );
            found = Some(a);
        }
        let start = found.ok_or(LFError::Allocation { count })?;
        if movable {
            self.movable.extend(start..start + count);
        }
        Ok(start)
    }
    /// Allocates `count` single blocks, not necessarily contiguous.
    /// Nothing stays allocated if the request cannot be met in full.
    #[cfg(feature = "stable")]
    pub fn alloc_many(&mut self, count: u64, movable: bool) -> LFResult<Vec<u64>> {
        let mut res = Vec::new();
        for _ in 0..count {
            match self.alloc_exact(1, movable) {
                Ok(v) => res.push(v),
                Err(_) => {
                    for a in res {
                        self.release(a, 1)?;
                    }
                    return Err(LFError::Allocation { count });
                }
            }
        }
        Ok(res)
    }
    /// Returns `count` blocks starting at `start` to the free pool.
    /// The range may be any part of a used extent.
    #[cfg(feature = "stable")]
    pub fn release(&mut self, start: u64, count: u64) -> LFResult<()> {
        trace!("Releasing {:x}+{:x}", start, count);
        let (c_start, c_size) = self.containing_used(start, count)?;
        if c_start < start {
            self.extents.insert(
                c_start,
                Extent {
                    size: start - c_start,
                    used: true,
                },
            );
        }
        let end = start + count;
        let c_end = c_start + c_size;
        if c_end > end {
            self.extents.insert(
                end,
                Extent {
                    size: c_end - end,
                    used: true,
                },
            );
        }
        self.extents.insert(
            start,
            Extent {
                size: count,
                used: false,
            },
        );
        for b in start..end {
            self.movable.remove(&b);
        }
        self.merge(start)
    }
    /// Marks an extent used
    #[cfg(feature = "stable")]
    pub fn mark_used(&mut self, start: u64, size: u64) -> LFResult<()> {
        let (c0, c1) = {
            let containing = self.extents.range(..=start).next_back();
            let (a, ex) = containing.ok_or_else(|| {
                LFError::InternalConsistency(format!("no extent contains block {}", start))
            })?;
            (*a, ex.size)
        };
        assert_or_err!(
            !self.extents[&c0].used && c0 + c1 >= start + size,
            LFError::InternalConsistency(format!(
                "blocks {}+{} are already in use",
                start, size
            ))
        );
        if start == c0 {
            if c1 == size {
                if let Some(ex) = self.extents.get_mut(&c0) {
                    ex.used = true;
                }
            } else {
                self.extents.insert(c0, Extent { size, used: true });
                self.extents.insert(
                    c0 + size,
                    Extent {
                        size: c1 - size,
                        used: false,
                    },
                );
            }
        } else if c0 + c1 == start + size {
            if let Some(ex) = self.extents.get_mut(&c0) {
                ex.size -= size;
            }
            self.extents.insert(start, Extent { size, used: true });
        } else {
            if let Some(ex) = self.extents.get_mut(&c0) {
                ex.size = start - c0;
            }
            self.extents.insert(start, Extent { size, used: true });
            self.extents.insert(
                start + size,
                Extent {
                    size: (c0 + c1) - (start + size),
                    used: false,
                },
            );
        }
        Ok(())
    }
    fn containing_used(&self, start: u64, count: u64) -> LFResult<(u64, u64)> {
        let not_allocated = || {
            LFError::InternalConsistency(format!(
                "release of unallocated blocks {}+{}",
                start, count
            ))
        };
        let (a, ex) = self
            .extents
            .range(..=start)
            .next_back()
            .ok_or_else(not_allocated)?;
        assert_or_err!(
            count > 0 && ex.used && a + ex.size >= start + count,
            not_allocated()
        );
        Ok((*a, ex.size))
    }
    fn merge(&mut self, addr: u64) -> LFResult<()> {
        let mut size = self.extents.get(&addr).map_or(0, |ex| ex.size);
        let mut merge_previous = None;
        let mut merge_next = None;
        if let Some(p) = self.extents.range(..addr).next_back() {
            if !p.1.used {
                merge_previous = Some(*p.0)
            }
        }
        if let Some(n) = self.extents.range(addr..).nth(1) {
            if !n.1.used {
                merge_next = Some((*n.0, n.1.size))
            }
        }
        if let Some((n_a, n_s)) = merge_next {
            if let Some(ex) = self.extents.get_mut(&addr) {
                ex.size += n_s;
            }
            size += n_s;
            self.extents.remove(&n_a);
        }
        if let Some(p_a) = merge_previous {
            let prev = self.extents.get_mut(&p_a).ok_or_else(|| {
                LFError::InternalConsistency(format!("extent {} vanished during merge", p_a))
            })?;
            prev.size += size;
            self.extents.remove(&addr);
        }
        Ok(())
    }
}

#[test]
fn release_part_of_run() {
    #![allow(clippy::unwrap_used)]
    let mut a = Allocator::new(64);
    a.mark_used(0, 1).unwrap();
    let run = a.alloc_exact(4, true).unwrap();
    assert_eq!(run, 1);
    assert!(a.is_movable(2));
    a.release(2, 1).unwrap();
    assert!(!a.is_used(2));
    assert!(!a.is_movable(2));
    assert!(a.is_used(1) && a.is_used(3) && a.is_used(4));
    assert_eq!(a.used_space(), 4);
    a.release(1, 1).unwrap();
    a.release(3, 2).unwrap();
    assert_eq!(a.used_space(), 1);
    assert_eq!(a.extents().len(), 2);
}

#[test]
fn release_unallocated_is_rejected() {
    let mut a = Allocator::new(16);
    assert!(matches!(
        a.release(3, 1),
        Err(LFError::InternalConsistency(_))
    ));
}

#[test]
fn random_churn() {
    #![allow(clippy::unwrap_used)]
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let mut a = Allocator::new(10005);
    let mut live = Vec::new();

    for _ in 0..2000 {
        let n = rng.gen_range(1..5);
        live.push((a.alloc_exact(n, false).unwrap(), n));
    }
    a.mark_used(10000, 5).unwrap();
    let held: u64 = live.iter().map(|(_, n)| n).sum();
    assert_eq!(a.used_space(), held + 5);

    for (start, n) in live.drain(..) {
        a.release(start, n).unwrap();
    }
    a.release(10000, 5).unwrap();
    assert_eq!(a, Allocator::new(10005));
}
