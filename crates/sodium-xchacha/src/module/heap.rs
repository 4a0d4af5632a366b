//! First-fit allocator over a [`LinearMemory`].
//!
//! Blocks are 16-byte aligned and tracked out of band, so user bytes are
//! never overwritten by allocator metadata. Address 0 is never handed out.
//! When no free block fits, the heap extends its top and grows the memory
//! if needed, which relocates every existing view.

use std::collections::BTreeMap;

use super::memory::{LinearMemory, PAGE_SIZE};
use super::{NULL, Ptr};

/// Allocation alignment in bytes.
pub const ALIGN: u32 = 16;

fn align_up(size: u32) -> Option<u32> {
    size.checked_add(ALIGN - 1).map(|s| s & !(ALIGN - 1))
}

/// Free-list heap.
#[derive(Debug)]
pub struct Heap {
    base: u32,
    top: u32,
    live: BTreeMap<Ptr, u32>,
    free: BTreeMap<Ptr, u32>,
}

impl Heap {
    /// Create an empty heap whose first block starts at `base`.
    ///
    /// `base` is rounded up to [`ALIGN`] and never below it.
    #[must_use]
    pub fn new(base: u32) -> Self {
        let base = align_up(base.max(ALIGN)).unwrap_or(ALIGN);
        Self {
            base,
            top: base,
            live: BTreeMap::new(),
            free: BTreeMap::new(),
        }
    }

    /// Allocate `size` bytes, growing `memory` if necessary.
    ///
    /// Returns [`NULL`] if the request cannot be satisfied. A zero-sized
    /// request still yields a unique pointer.
    pub fn malloc(&mut self, memory: &mut LinearMemory, size: u32) -> Ptr {
        let Some(size) = align_up(size.max(1)) else {
            return NULL;
        };

        if let Some(ptr) = self.take_free(size) {
            self.live.insert(ptr, size);
            return ptr;
        }

        let Some(end) = self.top.checked_add(size) else {
            return NULL;
        };
        if end as usize > memory.len() {
            let missing = end as usize - memory.len();
            let pages = missing.div_ceil(PAGE_SIZE) as u32;
            if memory.grow(pages).is_none() {
                return NULL;
            }
        }

        let ptr = self.top;
        self.top = end;
        self.live.insert(ptr, size);
        ptr
    }

    fn take_free(&mut self, size: u32) -> Option<Ptr> {
        let (&ptr, &block) = self.free.iter().find(|&(_, &block)| block >= size)?;
        self.free.remove(&ptr);
        if block > size {
            self.free.insert(ptr + size, block - size);
        }
        Some(ptr)
    }

    /// Release the block at `ptr`.
    ///
    /// Returns `false` if `ptr` is not the start of a live allocation.
    pub fn free(&mut self, ptr: Ptr) -> bool {
        let Some(mut size) = self.live.remove(&ptr) else {
            return false;
        };
        let mut start = ptr;

        if let Some(next) = self.free.remove(&(start + size)) {
            size += next;
        }

        let previous = self
            .free
            .range(..start)
            .next_back()
            .map(|(&prev, &prev_size)| (prev, prev_size));
        if let Some((prev, prev_size)) = previous {
            if prev + prev_size == start {
                self.free.remove(&prev);
                start = prev;
                size += prev_size;
            }
        }

        if start + size == self.top {
            self.top = start;
        } else {
            self.free.insert(start, size);
        }
        true
    }

    /// First address handed out by this heap.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// End of the highest block ever in use and not yet returned.
    #[must_use]
    pub fn top(&self) -> u32 {
        self.top
    }

    /// Number of live allocations.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    /// Rounded size of the live allocation at `ptr`.
    #[must_use]
    pub fn allocation_size(&self, ptr: Ptr) -> Option<u32> {
        self.live.get(&ptr).copied()
    }

    /// Bytes sitting in the free list below the top.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.free.values().map(|&size| u64::from(size)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(pages: u32, maximum: u32) -> (LinearMemory, Heap) {
        (LinearMemory::new(pages, maximum).unwrap(), Heap::new(1024))
    }

    #[test]
    fn test_alignment_and_non_null() {
        let (mut memory, mut heap) = setup(1, 1);
        let a = heap.malloc(&mut memory, 1);
        let b = heap.malloc(&mut memory, 17);
        let c = heap.malloc(&mut memory, 0);

        for ptr in [a, b, c] {
            assert_ne!(ptr, NULL);
            assert_eq!(ptr % ALIGN, 0);
        }
        assert_eq!(a, 1024);
        assert_eq!(b, 1040);
        assert_eq!(heap.allocation_size(b), Some(32));
        assert_ne!(b, c);
    }

    #[test]
    fn test_base_never_zero() {
        let heap = Heap::new(0);
        assert_eq!(heap.base(), ALIGN);
    }

    #[test]
    fn test_reuse_after_free() {
        let (mut memory, mut heap) = setup(1, 1);
        let a = heap.malloc(&mut memory, 64);
        let _b = heap.malloc(&mut memory, 64);
        assert!(heap.free(a));
        assert_eq!(heap.free_bytes(), 64);

        let c = heap.malloc(&mut memory, 48);
        assert_eq!(c, a);
        assert_eq!(heap.free_bytes(), 16);
    }

    #[test]
    fn test_free_top_block_lowers_top() {
        let (mut memory, mut heap) = setup(1, 1);
        let a = heap.malloc(&mut memory, 64);
        assert!(heap.free(a));
        assert_eq!(heap.top(), heap.base());
        assert_eq!(heap.free_bytes(), 0);
    }

    #[test]
    fn test_coalescing() {
        let (mut memory, mut heap) = setup(1, 1);
        let a = heap.malloc(&mut memory, 32);
        let b = heap.malloc(&mut memory, 32);
        let c = heap.malloc(&mut memory, 32);
        let _guard = heap.malloc(&mut memory, 32);

        assert!(heap.free(a));
        assert!(heap.free(c));
        assert_eq!(heap.free_bytes(), 64);
        assert!(heap.free(b));
        assert_eq!(heap.free_bytes(), 96);

        // the merged block satisfies a request none of the pieces could
        assert_eq!(heap.malloc(&mut memory, 96), a);
    }

    #[test]
    fn test_free_unknown_pointer() {
        let (mut memory, mut heap) = setup(1, 1);
        let a = heap.malloc(&mut memory, 32);
        assert!(!heap.free(a + 16));
        assert!(!heap.free(NULL));
        assert!(heap.free(a));
        assert!(!heap.free(a));
    }

    #[test]
    fn test_grows_memory_when_exhausted() {
        let (mut memory, mut heap) = setup(1, 4);
        let before = memory.identity();
        let ptr = heap.malloc(&mut memory, PAGE_SIZE as u32);
        assert_ne!(ptr, NULL);
        assert_eq!(memory.pages(), 2);
        assert_ne!(memory.identity(), before);
        assert!(memory.get(ptr, PAGE_SIZE as u64).is_some());
    }

    #[test]
    fn test_fails_at_maximum() {
        let (mut memory, mut heap) = setup(1, 2);
        assert_eq!(heap.malloc(&mut memory, 3 * PAGE_SIZE as u32), NULL);
        assert_eq!(heap.live_allocations(), 0);
        assert_eq!(heap.malloc(&mut memory, u32::MAX), NULL);
    }
}
