//! Fixed-size byte arena backing the stored rows

use crate::error::{LineStoreError, Result};
use std::ptr::NonNull;

/// Boxed slice of `len` values from `init`, reporting allocation failure instead of aborting
pub(crate) fn try_boxed_slice<T>(len: usize, init: impl FnMut() -> T) -> Result<Box<[T]>> {
    let mut storage: Vec<T> = Vec::new();
    storage
        .try_reserve_exact(len)
        .map_err(|_| LineStoreError::Allocation {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    storage.extend(std::iter::repeat_with(init).take(len));
    Ok(storage.into_boxed_slice())
}

/// One contiguous allocation, sized once and never moved or resized
///
/// The arena hands out raw access; callers uphold the single-writer
/// discipline: bytes are written only while no reader can observe them, and
/// bytes handed out as shared slices are never written again.
pub(crate) struct Arena {
    base: NonNull<u8>,
    len: usize,
}

impl Arena {
    /// Allocate `len` zeroed bytes, reporting allocation failure instead of aborting
    pub fn allocate(len: usize) -> Result<Self> {
        let storage = try_boxed_slice(len, || 0u8)?;
        let raw = Box::into_raw(storage) as *mut u8;
        // SAFETY: Box::into_raw never returns null
        let base = unsafe { NonNull::new_unchecked(raw) };
        Ok(Self { base, len })
    }

    /// Copy `src` into the arena at `offset`
    ///
    /// # Safety
    /// The arena must not be released, and no reader may be looking at
    /// `offset..offset + src.len()` now or until the write is published.
    pub unsafe fn write(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.len);
        std::ptr::copy_nonoverlapping(src.as_ptr(), self.base.as_ptr().add(offset), src.len());
    }

    /// Borrow `len` bytes starting at `offset`
    ///
    /// # Safety
    /// The arena must stay allocated and the range must not be written while
    /// the returned slice is alive.
    pub unsafe fn slice<'a>(&self, offset: usize, len: usize) -> &'a [u8] {
        debug_assert!(offset + len <= self.len);
        std::slice::from_raw_parts(self.base.as_ptr().add(offset), len)
    }

    /// Free the allocation
    ///
    /// # Safety
    /// Must be called exactly once, after which no other method may be called.
    pub unsafe fn release(&self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len);
        drop(Box::from_raw(slice));
    }
}

// SAFETY: the arena is a plain byte allocation; all cross-thread access goes
// through the store, which only writes unpublished rows from the single writer
// and only lends out rows that are never written again.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}
