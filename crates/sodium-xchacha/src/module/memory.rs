//! Resizable linear memory.
//!
//! Growing the memory moves its contents to a fresh allocation, the same way
//! a WASM engine may relocate the memory's backing store on `memory.grow`.
//! Every growth bumps the generation, so any view derived earlier can be
//! recognised as stale through [`MemoryIdentity`].

use tracing::debug;

use crate::error::{Result, SodiumError};

/// WASM page size (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

/// Page limit of a 32-bit linear memory (4 GiB).
pub const MAX_PAGES: u32 = 65_536;

/// Identity of the memory's current backing storage.
///
/// Two identities compare equal only if no growth happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryIdentity {
    generation: u64,
    base: usize,
}

impl MemoryIdentity {
    pub(crate) fn new(generation: u64, base: usize) -> Self {
        Self { generation, base }
    }

    /// Number of growths the memory had gone through.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Host address of the backing storage, for diagnostics.
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.base
    }
}

/// Page-granular linear memory addressed by 32-bit offsets.
pub struct LinearMemory {
    bytes: Vec<u8>,
    maximum_pages: u32,
    generation: u64,
}

impl LinearMemory {
    /// Create a zeroed memory of `initial_pages` pages.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InvalidConfig`] if the page counts are out of
    /// range, and [`SodiumError::AllocationFailed`] if the host cannot
    /// provide the initial pages.
    pub fn new(initial_pages: u32, maximum_pages: u32) -> Result<Self> {
        if maximum_pages > MAX_PAGES || initial_pages > maximum_pages {
            return Err(SodiumError::InvalidConfig(format!(
                "memory pages: initial {initial_pages}, maximum {maximum_pages}, limit {MAX_PAGES}"
            )));
        }

        let len = initial_pages as usize * PAGE_SIZE;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| SodiumError::AllocationFailed { requested: len })?;
        bytes.resize(len, 0);

        Ok(Self {
            bytes,
            maximum_pages,
            generation: 0,
        })
    }

    /// Current size in pages.
    #[must_use]
    pub fn pages(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE) as u32
    }

    /// Page limit.
    #[must_use]
    pub fn maximum_pages(&self) -> u32 {
        self.maximum_pages
    }

    /// Current size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the memory has zero pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Identity of the current backing storage.
    #[must_use]
    pub fn identity(&self) -> MemoryIdentity {
        MemoryIdentity::new(self.generation, self.bytes.as_ptr() as usize)
    }

    /// Grow by `delta` pages, relocating the contents.
    ///
    /// Returns the previous size in pages, or `None` if the memory would
    /// exceed its maximum or the host refuses the allocation. A zero delta
    /// neither relocates nor changes the identity.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let previous = self.pages();
        if delta == 0 {
            return Some(previous);
        }

        let target = previous
            .checked_add(delta)
            .filter(|&pages| pages <= self.maximum_pages)?;
        let new_len = target as usize * PAGE_SIZE;

        let mut grown = Vec::new();
        grown.try_reserve_exact(new_len).ok()?;
        grown.extend_from_slice(&self.bytes);
        grown.resize(new_len, 0);
        self.bytes = grown;
        self.generation += 1;

        debug!(
            previous,
            pages = target,
            generation = self.generation,
            "linear memory grown"
        );
        Some(previous)
    }

    /// Whole memory.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Whole memory, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// `len` bytes at `ptr`, if in bounds.
    #[must_use]
    pub fn get(&self, ptr: u32, len: u64) -> Option<&[u8]> {
        let start = ptr as usize;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.bytes.get(start..end)
    }

    /// `len` bytes at `ptr`, mutable, if in bounds.
    pub fn get_mut(&mut self, ptr: u32, len: u64) -> Option<&mut [u8]> {
        let start = ptr as usize;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.bytes.get_mut(start..end)
    }
}
