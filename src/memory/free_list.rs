use crate::memory::{AllocError, align_up};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AllocPolicy {
    /// General purpose: first-fit search with free-range coalescing.
    FirstFit,
    /// Strictly linear: allocations bump a cursor; the range resets when the
    /// last live allocation is freed. Cheap when lifetimes are uniform.
    Linear,
}

/// Move-only token for a sub-range of the allocator's virtual address space.
/// `offset` is already aligned; `size` is the caller-requested size.
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    pub offset: u64,
    pub size: u64,
}

#[derive(Copy, Clone, Debug)]
struct FreeRange {
    offset: u64,
    size: u64,
}

/// General purpose allocator over a virtual range, typically mapped onto one
/// physically backed GPU buffer. Supports arbitrary alloc/free order under
/// [`AllocPolicy::FirstFit`].
pub struct FreeListAllocator {
    capacity: u64,
    policy: AllocPolicy,
    /// Sorted by offset, non-overlapping, non-adjacent (always coalesced).
    free: Vec<FreeRange>,
    cursor: u64,
    live_count: u64,
    live_bytes: u64,
}

impl FreeListAllocator {
    pub fn new(capacity: u64, policy: AllocPolicy) -> Self {
        assert!(capacity > 0, "free-list allocator needs a nonzero capacity");
        Self {
            capacity,
            policy,
            free: vec![FreeRange {
                offset: 0,
                size: capacity,
            }],
            cursor: 0,
            live_count: 0,
            live_bytes: 0,
        }
    }

    pub fn allocate(&mut self, size: u64, alignment: u64) -> Result<Allocation, AllocError> {
        assert!(size > 0, "zero-size allocation");

        let alloc = match self.policy {
            AllocPolicy::FirstFit => self.allocate_first_fit(size, alignment),
            AllocPolicy::Linear => self.allocate_linear(size, alignment),
        }?;

        self.live_count += 1;
        self.live_bytes += alloc.size;
        Ok(alloc)
    }

    pub fn free(&mut self, alloc: Allocation) {
        assert!(self.live_count > 0, "free with no live allocations");
        self.live_count -= 1;
        self.live_bytes -= alloc.size;

        match self.policy {
            AllocPolicy::FirstFit => self.insert_free_range(FreeRange {
                offset: alloc.offset,
                size: alloc.size,
            }),
            AllocPolicy::Linear => {
                // Individual ranges are not reclaimed; the whole span recycles
                // once nothing is live.
                if self.live_count == 0 {
                    self.cursor = 0;
                }
            }
        }
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    pub fn live_count(&self) -> u64 {
        self.live_count
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn allocate_first_fit(&mut self, size: u64, alignment: u64) -> Result<Allocation, AllocError> {
        for i in 0..self.free.len() {
            let range = self.free[i];
            let aligned = align_up(range.offset, alignment);
            let pad = aligned - range.offset;
            if pad + size > range.size {
                continue;
            }

            self.free.remove(i);

            // Alignment padding stays free; an adjacent free later re-merges it.
            if pad > 0 {
                self.insert_free_range(FreeRange {
                    offset: range.offset,
                    size: pad,
                });
            }
            let tail = range.size - pad - size;
            if tail > 0 {
                self.insert_free_range(FreeRange {
                    offset: aligned + size,
                    size: tail,
                });
            }

            return Ok(Allocation {
                offset: aligned,
                size,
            });
        }

        Err(AllocError::OutOfSpace {
            requested: size,
            capacity: self.capacity,
            live: self.live_bytes,
        })
    }

    fn allocate_linear(&mut self, size: u64, alignment: u64) -> Result<Allocation, AllocError> {
        let offset = align_up(self.cursor, alignment);
        if offset + size > self.capacity {
            return Err(AllocError::OutOfSpace {
                requested: size,
                capacity: self.capacity,
                live: self.live_bytes,
            });
        }
        self.cursor = offset + size;
        Ok(Allocation { offset, size })
    }

    fn insert_free_range(&mut self, range: FreeRange) {
        let index = self
            .free
            .partition_point(|existing| existing.offset < range.offset);

        debug_assert!(
            index == 0 || self.free[index - 1].offset + self.free[index - 1].size <= range.offset,
            "freed range overlaps a free block"
        );

        self.free.insert(index, range);

        // Coalesce with the following block, then the preceding one.
        if index + 1 < self.free.len()
            && self.free[index].offset + self.free[index].size == self.free[index + 1].offset
        {
            self.free[index].size += self.free[index + 1].size;
            self.free.remove(index + 1);
        }
        if index > 0
            && self.free[index - 1].offset + self.free[index - 1].size == self.free[index].offset
        {
            self.free[index - 1].size += self.free[index].size;
            self.free.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_reuses_freed_range() {
        let mut ator = FreeListAllocator::new(1024, AllocPolicy::FirstFit);
        let a = ator.allocate(256, 1).unwrap();
        let _b = ator.allocate(256, 1).unwrap();

        let freed_offset = a.offset;
        ator.free(a);

        let c = ator.allocate(256, 1).unwrap();
        assert_eq!(c.offset, freed_offset);
    }

    #[test]
    fn live_bytes_never_exceed_capacity() {
        let mut ator = FreeListAllocator::new(1024, AllocPolicy::FirstFit);
        let mut live = Vec::new();
        for _ in 0..4 {
            live.push(ator.allocate(256, 1).unwrap());
            assert!(ator.live_bytes() <= ator.capacity());
        }
        assert!(matches!(
            ator.allocate(1, 1),
            Err(AllocError::OutOfSpace { .. })
        ));

        ator.free(live.pop().unwrap());
        assert_eq!(ator.live_bytes(), 768);
        assert!(ator.allocate(256, 1).is_ok());
    }

    #[test]
    fn coalescing_makes_large_block_available_again() {
        let mut ator = FreeListAllocator::new(300, AllocPolicy::FirstFit);
        let a = ator.allocate(100, 1).unwrap();
        let b = ator.allocate(100, 1).unwrap();
        let c = ator.allocate(100, 1).unwrap();

        // Free out of order; neighbours must merge back into one span.
        ator.free(b);
        ator.free(a);
        ator.free(c);

        let whole = ator.allocate(300, 1).unwrap();
        assert_eq!(whole.offset, 0);
    }

    #[test]
    fn alignment_padding_is_not_leaked() {
        let mut ator = FreeListAllocator::new(512, AllocPolicy::FirstFit);
        let a = ator.allocate(10, 1).unwrap();
        let b = ator.allocate(16, 64).unwrap();
        assert_eq!(b.offset % 64, 0);

        ator.free(a);
        ator.free(b);
        let whole = ator.allocate(512, 1).unwrap();
        assert_eq!(whole.offset, 0);
    }

    #[test]
    fn linear_policy_resets_when_drained() {
        let mut ator = FreeListAllocator::new(256, AllocPolicy::Linear);
        let a = ator.allocate(128, 1).unwrap();
        let b = ator.allocate(128, 1).unwrap();
        assert!(ator.allocate(1, 1).is_err());

        ator.free(a);
        // Still exhausted: linear mode reclaims nothing while anything lives.
        assert!(ator.allocate(1, 1).is_err());

        ator.free(b);
        assert_eq!(ator.allocate(256, 1).unwrap().offset, 0);
    }
}
