//! Arena Allocator
//!
//! A pure logical structure that does not hold wgpu resources; it only manages
//! byte ranges. The multi-draw builder packs many sub-meshes into one GPU buffer
//! by allocating extents from a virtual range `[0, max_capacity)` and growing the
//! physical buffer lazily behind it.
//!
//! Allocation is first-fit over an offset-ordered free list. Freeing merges the
//! extent with its free neighbours so fragmentation stays bounded.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

/// A contiguous `(offset, size)` range inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaExtent {
    pub offset: u64,
    pub size: u64,
}

impl ArenaExtent {
    /// One past the last byte of the extent.
    #[inline]
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &ArenaExtent) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// First-fit free-list allocator over a virtual linear range.
#[derive(Debug)]
pub struct ArenaAllocator {
    max_capacity: u64,
    /// Free extents keyed by offset. Adjacent free extents never coexist.
    free: BTreeMap<u64, u64>,
    /// Live allocations, offset -> size.
    allocated: FxHashMap<u64, u64>,
    used: u64,
}

impl ArenaAllocator {
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let mut free = BTreeMap::new();
        if max_capacity > 0 {
            free.insert(0, max_capacity);
        }
        Self {
            max_capacity,
            free,
            allocated: FxHashMap::default(),
            used: 0,
        }
    }

    /// Allocates `size` bytes at the lowest offset that fits.
    ///
    /// Returns `None` when no free extent can hold the request, even
    /// considering the full virtual capacity.
    #[must_use]
    pub fn alloc(&mut self, size: u64) -> Option<ArenaExtent> {
        self.alloc_aligned(size, 1)
    }

    /// Allocates `size` bytes whose offset is a multiple of `align`.
    ///
    /// `align` does not have to be a power of two, so vertex strides such as
    /// 12 or 20 bytes can be used directly. Zero-sized requests are rounded up
    /// to one byte so every allocation has a distinct offset.
    #[must_use]
    pub fn alloc_aligned(&mut self, size: u64, align: u64) -> Option<ArenaExtent> {
        let size = size.max(1);
        let align = align.max(1);

        let (free_offset, free_size, start) = self.free.iter().find_map(|(&off, &len)| {
            let start = off.checked_next_multiple_of(align)?;
            let end = start.checked_add(size)?;
            (end <= off + len).then_some((off, len, start))
        })?;

        self.free.remove(&free_offset);
        if start > free_offset {
            self.free.insert(free_offset, start - free_offset);
        }
        let end = start + size;
        let free_end = free_offset + free_size;
        if end < free_end {
            self.free.insert(end, free_end - end);
        }

        self.allocated.insert(start, size);
        self.used += size;
        Some(ArenaExtent {
            offset: start,
            size,
        })
    }

    /// Returns the extent allocated at `offset` to the free set.
    ///
    /// # Panics
    ///
    /// Panics if nothing is allocated at `offset` (double free or a foreign
    /// offset). Continuing would let two owners share the same GPU memory.
    pub fn free(&mut self, offset: u64) -> ArenaExtent {
        let Some(size) = self.allocated.remove(&offset) else {
            panic!("arena free of unallocated offset {offset} (double free?)");
        };
        self.used -= size;

        let mut start = offset;
        let mut len = size;

        if let Some((&prev_off, &prev_len)) = self.free.range(..offset).next_back()
            && prev_off + prev_len == offset
        {
            self.free.remove(&prev_off);
            start = prev_off;
            len += prev_len;
        }

        if let Some(next_len) = self.free.remove(&(offset + size)) {
            len += next_len;
        }

        self.free.insert(start, len);
        ArenaExtent { offset, size }
    }

    /// Frees every allocation at once.
    pub fn reset(&mut self) {
        self.allocated.clear();
        self.free.clear();
        if self.max_capacity > 0 {
            self.free.insert(0, self.max_capacity);
        }
        self.used = 0;
    }

    /// One past the highest allocated byte, or 0 when empty.
    #[must_use]
    pub fn allocated_end(&self) -> u64 {
        if self.allocated.is_empty() {
            return 0;
        }
        match self.free.iter().next_back() {
            Some((&off, &len)) if off + len == self.max_capacity => off,
            _ => self.max_capacity,
        }
    }

    #[inline]
    #[must_use]
    pub fn max_capacity(&self) -> u64 {
        self.max_capacity
    }

    #[inline]
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.used
    }

    #[inline]
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.max_capacity - self.used
    }

    #[inline]
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocated.len()
    }

    /// Number of disjoint free extents; 1 means no fragmentation.
    #[inline]
    #[must_use]
    pub fn free_extent_count(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn is_allocated(&self, offset: u64) -> bool {
        self.allocated.contains_key(&offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_takes_lowest_offset() {
        let mut arena = ArenaAllocator::new(1024);
        let a = arena.alloc(100).unwrap();
        let b = arena.alloc(100).unwrap();
        let c = arena.alloc(100).unwrap();
        assert_eq!((a.offset, b.offset, c.offset), (0, 100, 200));

        arena.free(a.offset);
        let d = arena.alloc(50).unwrap();
        assert_eq!(d.offset, 0);
    }

    #[test]
    fn free_merges_neighbours() {
        let mut arena = ArenaAllocator::new(300);
        let a = arena.alloc(100).unwrap();
        let b = arena.alloc(100).unwrap();
        let c = arena.alloc(100).unwrap();
        assert_eq!(arena.free_extent_count(), 0);

        arena.free(a.offset);
        arena.free(c.offset);
        assert_eq!(arena.free_extent_count(), 2);
        arena.free(b.offset);
        assert_eq!(arena.free_extent_count(), 1);
        assert_eq!(arena.alloc(300).unwrap().offset, 0);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut arena = ArenaAllocator::new(256);
        assert!(arena.alloc(200).is_some());
        assert!(arena.alloc(100).is_none());
        assert!(arena.alloc(56).is_some());
        assert!(arena.alloc(1).is_none());
    }

    #[test]
    fn aligned_allocation_leaves_gap_free() {
        let mut arena = ArenaAllocator::new(1024);
        let a = arena.alloc(5).unwrap();
        let b = arena.alloc_aligned(24, 12).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 12);
        // the 5..12 gap is still usable
        let c = arena.alloc(7).unwrap();
        assert_eq!(c.offset, 5);
    }

    #[test]
    fn allocated_end_tracks_highest_extent() {
        let mut arena = ArenaAllocator::new(1000);
        assert_eq!(arena.allocated_end(), 0);
        let a = arena.alloc(100).unwrap();
        let b = arena.alloc(50).unwrap();
        assert_eq!(arena.allocated_end(), 150);
        arena.free(b.offset);
        assert_eq!(arena.allocated_end(), 100);
        arena.free(a.offset);
        assert_eq!(arena.allocated_end(), 0);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut arena = ArenaAllocator::new(64);
        let a = arena.alloc(8).unwrap();
        arena.free(a.offset);
        arena.free(a.offset);
    }
}
