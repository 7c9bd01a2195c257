// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Mapped views of locked buffers.

use std::ptr::NonNull;
use std::sync::Arc;

use crate::buffer::{BufferHandle, BufferRecord};
use crate::error::{BufferError, Result};
use crate::registry::BufferRegistry;

/// CPU view of a locked buffer.
///
/// The safe helpers check, under the buffer's state mutex, that the buffer
/// is still live and locked before touching memory, and fail with
/// `NullArgument` or `NotLocked` otherwise. Destroying the buffer waits on
/// the same mutex, so memory cannot be released mid-access. Raw slices
/// bypass that check and are `unsafe`.
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
    record: Arc<BufferRecord>,
}

impl Mapping {
    pub(crate) fn new(ptr: NonNull<u8>, len: usize, record: Arc<BufferRecord>) -> Self {
        Self { ptr, len, record }
    }

    pub fn buffer(&self) -> BufferHandle {
        self.record.info.handle
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the buffer is still live and holds at least one lock.
    pub fn is_valid(&self) -> bool {
        let state = self.record.state.lock();
        !state.destroyed && state.lock_count > 0
    }

    /// # Safety
    ///
    /// The buffer must still be locked and no other view of the same memory
    /// may be used while the returned slice is alive.
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// # Safety
    ///
    /// The buffer must still be locked.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Set every mapped byte to `value`.
    pub fn fill(&self, value: u8) -> Result<()> {
        self.with_bytes(|bytes| bytes.fill(value))
    }

    /// Repeat `pattern` over the whole mapping. A trailing partial pattern
    /// is truncated.
    pub fn fill_pattern(&self, pattern: &[u8]) -> Result<()> {
        self.with_bytes(|bytes| {
            if pattern.is_empty() {
                return;
            }
            for chunk in bytes.chunks_mut(pattern.len()) {
                chunk.copy_from_slice(&pattern[..chunk.len()]);
            }
        })
    }

    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len())?;
        self.with_bytes(|bytes| bytes[offset..offset + data.len()].copy_from_slice(data))
    }

    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.check_range(offset, out.len())?;
        self.with_bytes(|bytes| out.copy_from_slice(&bytes[offset..offset + out.len()]))
    }

    fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let state = self.record.state.lock();
        if state.destroyed {
            tracing::error!(
                "[Mapping] Buffer {} was destroyed, mapping is stale",
                self.record.info.handle.id()
            );
            return Err(BufferError::NullArgument("buffer"));
        }
        if state.lock_count == 0 {
            tracing::error!(
                "[Mapping] Buffer {} is no longer locked",
                self.record.info.handle.id()
            );
            return Err(BufferError::NotLocked);
        }
        // SAFETY: the buffer is live and mapped, and release waits on `state`.
        // Holding `state` also serializes helper access across mappings.
        let bytes = unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) };
        Ok(f(bytes))
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(BufferError::SizeMismatch {
                expected: self.len,
                actual: offset.saturating_add(len),
            }),
        }
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("buffer", &self.record.info.handle.id())
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Lock held for the lifetime of the guard.
///
/// Dropping the guard unlocks the buffer. If the buffer was destroyed in the
/// meantime the drop does nothing.
pub struct LockGuard<'a> {
    registry: &'a BufferRegistry,
    buffer: BufferHandle,
    mapping: Mapping,
}

impl<'a> LockGuard<'a> {
    pub(crate) fn new(registry: &'a BufferRegistry, buffer: BufferHandle, mapping: Mapping) -> Self {
        Self {
            registry,
            buffer,
            mapping,
        }
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }
}

impl std::ops::Deref for LockGuard<'_> {
    type Target = Mapping;

    fn deref(&self) -> &Mapping {
        &self.mapping
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match self.registry.unlock(self.buffer) {
            Ok(()) => {}
            Err(BufferError::NullArgument(_)) => {
                tracing::debug!(
                    "[LockGuard] Buffer {} already destroyed, nothing to unlock",
                    self.buffer.id()
                );
            }
            Err(e) => {
                tracing::warn!("[LockGuard] Unlock of buffer {} failed: {}", self.buffer.id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AllocationId;
    use crate::buffer::BufferInfo;
    use crate::format::PixelFormat;
    use crate::provider::ProviderHandle;
    use crate::usage::BufferUsage;

    fn record(len: usize, lock_count: u32) -> Arc<BufferRecord> {
        let info = BufferInfo {
            handle: BufferHandle(1),
            provider: ProviderHandle(1),
            width: len as u32,
            height: 1,
            stride: len as u32,
            size: len,
            format: PixelFormat::A8,
            usage: BufferUsage::CPU,
            external: false,
        };
        let record = Arc::new(BufferRecord::new(info, AllocationId(1), None));
        record.state.lock().lock_count = lock_count;
        record
    }

    fn scratch(len: usize) -> (Vec<u8>, Mapping) {
        let mut backing = vec![0u8; len];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();
        (backing, Mapping::new(ptr, len, record(len, 1)))
    }

    #[test]
    fn test_fill_and_read_back() {
        let (_backing, mapping) = scratch(16);
        mapping.fill(0xAB).unwrap();
        let mut out = [0u8; 4];
        mapping.read_at(12, &mut out).unwrap();
        assert_eq!(out, [0xAB; 4]);
    }

    #[test]
    fn test_fill_pattern_truncates_tail() {
        let (_backing, mapping) = scratch(10);
        mapping.fill_pattern(&[1, 2, 3, 4]).unwrap();
        let bytes = unsafe { mapping.as_slice() };
        assert_eq!(bytes, &[1, 2, 3, 4, 1, 2, 3, 4, 1, 2]);
    }

    #[test]
    fn test_out_of_bounds_access_rejected() {
        let (_backing, mapping) = scratch(8);
        assert!(mapping.write_at(6, &[0; 4]).is_err());
        assert!(mapping.write_at(usize::MAX, &[0; 1]).is_err());
        let mut out = [0u8; 9];
        assert!(mapping.read_at(0, &mut out).is_err());
        assert!(mapping.write_at(4, &[9; 4]).is_ok());
    }

    #[test]
    fn test_helpers_refuse_unlocked_or_destroyed_buffers() {
        let (backing, mapping) = scratch(8);

        mapping.record.state.lock().lock_count = 0;
        assert!(!mapping.is_valid());
        assert!(matches!(mapping.fill(0xFF), Err(BufferError::NotLocked)));

        {
            let mut state = mapping.record.state.lock();
            state.lock_count = 1;
            state.destroyed = true;
        }
        assert!(!mapping.is_valid());
        assert!(matches!(
            mapping.write_at(0, &[0xFF; 8]),
            Err(BufferError::NullArgument("buffer"))
        ));
        let mut out = [0u8; 1];
        assert!(mapping.read_at(0, &mut out).is_err());
        assert!(backing.iter().all(|&b| b == 0));
    }
}
