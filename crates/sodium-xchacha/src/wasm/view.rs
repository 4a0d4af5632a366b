//! Per-handle view cache.
//!
//! A handle remembers the range it resolved to together with the identity of
//! the memory it was resolved against. The range is reused while the
//! identity is unchanged and re-derived after the memory relocated.
//!
//! The range is always `ptr..ptr + len`, so a refresh yields the same
//! offsets. What keeps a view valid across growth is that every view guard
//! re-borrows the module's current memory under the module lock; the cache
//! only records which memory identity the handle last observed.

use std::ops::Range;

use parking_lot::Mutex;
use tracing::trace;

use crate::module::{MemoryIdentity, Ptr};

#[derive(Debug, Clone)]
struct CachedView {
    identity: MemoryIdentity,
    range: Range<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct ViewCache {
    slot: Mutex<Option<CachedView>>,
}

impl ViewCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Range of `len` bytes at `ptr` within the memory identified by
    /// `identity`.
    pub(crate) fn resolve(&self, identity: MemoryIdentity, ptr: Ptr, len: usize) -> Range<usize> {
        let mut slot = self.slot.lock();
        if let Some(cached) = slot.as_ref().filter(|cached| cached.identity == identity) {
            return cached.range.clone();
        }

        let start = ptr as usize;
        let range = start..start + len;
        if slot.is_some() {
            trace!(ptr, len, generation = identity.generation(), "refreshing stale view");
        }
        *slot = Some(CachedView {
            identity,
            range: range.clone(),
        });
        range
    }

    /// Identity the cached range was derived against.
    pub(crate) fn identity(&self) -> Option<MemoryIdentity> {
        self.slot.lock().as_ref().map(|cached| cached.identity)
    }
}
