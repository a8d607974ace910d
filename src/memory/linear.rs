use crate::memory::align_up;

/// Bump allocator over a virtual range. No per-allocation free; the whole
/// range is recycled with [`clear`](LinearAllocator::clear) once per cycle.
///
/// Capacities are planned statically per subsystem, so running out is a
/// programming error and panics rather than returning an error.
pub struct LinearAllocator {
    capacity: u64,
    cursor: u64,
    high_water: u64,
}

impl LinearAllocator {
    pub fn new(capacity: u64) -> Self {
        assert!(capacity > 0, "linear allocator needs a nonzero capacity");
        Self {
            capacity,
            cursor: 0,
            high_water: 0,
        }
    }

    pub fn allocate(&mut self, size: u64, alignment: u64) -> u64 {
        let offset = align_up(self.cursor, alignment);
        let end = offset
            .checked_add(size)
            .expect("linear allocation overflowed u64");
        assert!(
            end <= self.capacity,
            "linear allocator exhausted: {} + {} exceeds capacity {}",
            offset,
            size,
            self.capacity
        );

        self.cursor = end;
        self.high_water = self.high_water.max(end);
        offset
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
    }

    pub fn used(&self) -> u64 {
        self.cursor
    }

    /// Highest cursor position seen since construction. Useful for sizing the
    /// static budget from a real workload.
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_monotonic() {
        let mut ator = LinearAllocator::new(1024);
        assert_eq!(ator.allocate(100, 1), 0);
        assert_eq!(ator.allocate(100, 1), 100);
        assert_eq!(ator.used(), 200);
    }

    #[test]
    fn respects_alignment() {
        let mut ator = LinearAllocator::new(1024);
        ator.allocate(3, 1);
        assert_eq!(ator.allocate(8, 256), 256);
        assert_eq!(ator.allocate(1, 16), 272);
    }

    #[test]
    fn clear_resets_cursor_but_keeps_high_water() {
        let mut ator = LinearAllocator::new(1024);
        ator.allocate(512, 1);
        ator.clear();
        assert_eq!(ator.used(), 0);
        assert_eq!(ator.high_water(), 512);
        assert_eq!(ator.allocate(16, 1), 0);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exceeding_capacity_panics() {
        let mut ator = LinearAllocator::new(64);
        ator.allocate(60, 1);
        ator.allocate(8, 1);
    }
}
