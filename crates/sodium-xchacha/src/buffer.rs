//! Buffer pointer abstraction shared by both backends.
//!
//! A [`BufferPointer`] names a contiguous byte region. On the native backend
//! the region is ordinary host memory; on the WASM backend it is an
//! offset/length pair inside the module's linear memory, which may move
//! whenever the memory grows.
//!
//! Views are lock guards. Keep them short-lived: do not hold a view across
//! an allocation, a `free`, or an AEAD call on the same backend, and do not
//! store them. Holding one is the Rust equivalent of keeping a reference to
//! a buffer that a memory growth may invalidate, except that here the lock
//! makes the mistake a deadlock rather than silent corruption.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::error::{Result, SodiumError};

/// Handle to a contiguous byte region owned by a backend.
pub trait BufferPointer: Sized + fmt::Debug {
    /// Read view of the region.
    type View<'a>: Deref<Target = [u8]>
    where
        Self: 'a;

    /// Write view of the region.
    type ViewMut<'a>: DerefMut<Target = [u8]>
    where
        Self: 'a;

    /// Byte length of the region.
    fn len(&self) -> usize;

    /// Whether the region is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current contents, exactly [`len`](Self::len) bytes.
    ///
    /// Always valid, even if the backing memory relocated since the last
    /// access.
    fn view(&self) -> Self::View<'_>;

    /// Mutable access to the current contents.
    fn view_mut(&self) -> Self::ViewMut<'_>;

    /// Release the region.
    ///
    /// A no-op for host memory and for sub-regions. On the WASM backend the
    /// allocation returns to the module heap; any sub-region derived from it
    /// must not be used afterwards.
    fn free(self);

    /// Handle over `[start, end)` of this region, sharing its storage.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InvalidRange`] if `start > end`, and
    /// [`SodiumError::OutOfBounds`] if `end > self.len()`.
    fn subarray(&self, start: usize, end: usize) -> Result<Self>;

    /// Handle over `[start, len)`.
    ///
    /// # Errors
    ///
    /// See [`subarray`](Self::subarray).
    fn subarray_from(&self, start: usize) -> Result<Self> {
        self.subarray(start, self.len())
    }

    /// Copy of the current contents.
    fn to_vec(&self) -> Vec<u8> {
        self.view().to_vec()
    }
}

/// Validate a `subarray` request against a region of `len` bytes.
pub(crate) fn check_subrange(start: usize, end: usize, len: usize) -> Result<()> {
    if start > end {
        return Err(SodiumError::InvalidRange { start, end });
    }
    if end > len {
        return Err(SodiumError::OutOfBounds { start, end, len });
    }
    Ok(())
}
