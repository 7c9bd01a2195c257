// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Backing memory for the host platform and its global name table.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::ExportKey;
use crate::error::{BufferError, Result};

/// Byte pattern fresh host memory is filled with, standing in for the stale
/// contents of recycled device memory.
pub const STALE_BYTE: u8 = 0xCD;

/// A contiguous, always-mapped memory region.
pub(crate) trait Region: Send + Sync {
    fn as_ptr(&self) -> NonNull<u8>;
    fn len(&self) -> usize;
}

/// Where host regions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Process heap.
    Heap,
    /// Anonymous shared memory (`memfd_create` + `mmap`).
    #[cfg(target_os = "linux")]
    Memfd,
}

struct HeapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl HeapRegion {
    fn new(len: usize) -> Self {
        let boxed = vec![STALE_BYTE; len].into_boxed_slice();
        let ptr = NonNull::from(Box::leak(boxed)).cast::<u8>();
        Self { ptr, len }
    }
}

impl Region for HeapRegion {
    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len come from the boxed slice leaked in `new`.
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            )));
        }
    }
}

// SAFETY: the region is plain bytes; synchronizing access is the caller's job,
// as with any shared device mapping.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

#[cfg(target_os = "linux")]
struct MemfdRegion {
    fd: libc::c_int,
    ptr: NonNull<u8>,
    len: usize,
}

#[cfg(target_os = "linux")]
impl MemfdRegion {
    fn new(name: &str, len: usize) -> Result<Self> {
        let cname = std::ffi::CString::new(name)
            .map_err(|e| BufferError::Backend(format!("Invalid memfd name: {e}")))?;

        // SAFETY: plain syscalls on a freshly created descriptor; every
        // failure path closes what it opened.
        unsafe {
            let fd = libc::memfd_create(cname.as_ptr(), libc::MFD_CLOEXEC);
            if fd < 0 {
                return Err(BufferError::OutOfMemory(format!(
                    "memfd_create failed: {}",
                    std::io::Error::last_os_error()
                )));
            }

            if libc::ftruncate(fd, len as libc::off_t) != 0 {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                return Err(BufferError::OutOfMemory(format!("ftruncate failed: {err}")));
            }

            let addr = libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if addr == libc::MAP_FAILED {
                let err = std::io::Error::last_os_error();
                libc::close(fd);
                return Err(BufferError::OutOfMemory(format!("mmap failed: {err}")));
            }

            let ptr = NonNull::new(addr as *mut u8)
                .ok_or_else(|| BufferError::OutOfMemory("mmap returned null".into()))?;
            std::ptr::write_bytes(ptr.as_ptr(), STALE_BYTE, len);

            Ok(Self { fd, ptr, len })
        }
    }
}

#[cfg(target_os = "linux")]
impl Region for MemfdRegion {
    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(target_os = "linux")]
impl Drop for MemfdRegion {
    fn drop(&mut self) {
        // SAFETY: mapping and descriptor are owned by this region.
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
            libc::close(self.fd);
        }
    }
}

// SAFETY: see HeapRegion.
#[cfg(target_os = "linux")]
unsafe impl Send for MemfdRegion {}
#[cfg(target_os = "linux")]
unsafe impl Sync for MemfdRegion {}

/// Region factory plus the global name table shared by every connection of
/// one host platform.
pub(crate) struct MemoryNamespace {
    kind: MemoryKind,
    next_name: AtomicU32,
    names: Mutex<HashMap<u32, Weak<dyn Region>>>,
}

impl MemoryNamespace {
    pub(crate) fn new(kind: MemoryKind) -> Self {
        Self {
            kind,
            next_name: AtomicU32::new(1),
            names: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub(crate) fn create(&self, len: usize) -> Result<Arc<dyn Region>> {
        if len == 0 {
            return Err(BufferError::OutOfMemory(
                "zero-sized allocation requested".into(),
            ));
        }
        let region: Arc<dyn Region> = match self.kind {
            MemoryKind::Heap => Arc::new(HeapRegion::new(len)),
            #[cfg(target_os = "linux")]
            MemoryKind::Memfd => Arc::new(MemfdRegion::new("nativebuf", len)?),
        };
        Ok(region)
    }

    /// Give `region` a global name, reusing its existing one if any.
    pub(crate) fn publish(&self, region: &Arc<dyn Region>) -> Result<ExportKey> {
        let mut names = self.names.lock();
        names.retain(|_, weak| weak.strong_count() > 0);

        let existing = names.iter().find_map(|(name, weak)| {
            weak.upgrade()
                .filter(|r| r.as_ptr() == region.as_ptr())
                .map(|_| *name)
        });
        let name = existing.unwrap_or_else(|| {
            let name = self.next_name.fetch_add(1, Ordering::Relaxed);
            names.insert(name, Arc::downgrade(region));
            name
        });

        ExportKey::new(name)
            .ok_or_else(|| BufferError::Backend("export name space exhausted".into()))
    }

    pub(crate) fn lookup(&self, key: ExportKey) -> Option<Arc<dyn Region>> {
        self.names.lock().get(&key.get()).and_then(Weak::upgrade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_region_is_stale_filled() {
        let namespace = MemoryNamespace::new(MemoryKind::Heap);
        let region = namespace.create(64).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(region.as_ptr().as_ptr(), region.len()) };
        assert!(bytes.iter().all(|&b| b == STALE_BYTE));
    }

    #[test]
    fn test_publish_is_stable_and_lookup_follows_lifetime() {
        let namespace = MemoryNamespace::new(MemoryKind::Heap);
        let region = namespace.create(16).unwrap();
        let key = namespace.publish(&region).unwrap();
        assert_eq!(namespace.publish(&region).unwrap(), key);
        assert!(namespace.lookup(key).is_some());

        drop(region);
        assert!(namespace.lookup(key).is_none());
    }

    #[test]
    fn test_zero_sized_region_rejected() {
        let namespace = MemoryNamespace::new(MemoryKind::Heap);
        assert!(namespace.create(0).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memfd_region_round_trip() {
        let namespace = MemoryNamespace::new(MemoryKind::Memfd);
        let region = namespace.create(4096).unwrap();
        unsafe {
            std::ptr::write_bytes(region.as_ptr().as_ptr(), 0x11, region.len());
            assert_eq!(*region.as_ptr().as_ptr().add(4095), 0x11);
        }
    }
}
