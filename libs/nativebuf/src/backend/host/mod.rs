// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-process reference platform.
//!
//! Implements the full collaborator contract on top of process memory: a
//! display that hands out surfaces, a device with a magic-token handshake, and
//! an allocator with a global name table shared by every connection opened
//! from the same [`HostPlatform`]. On Linux the memory can come from
//! `memfd_create`, which makes it shareable with other processes.
//!
//! A [`FaultPlan`] makes individual backend steps fail, and [`HostStats`]
//! exposes live-resource counters, so rollback and teardown are observable.

mod memory;

use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

pub use memory::{MemoryKind, STALE_BYTE};
use memory::{MemoryNamespace, Region};

use super::{
    AllocationId, Allocator, Device, DisplayConnection, ExportKey, Platform, SurfaceId,
    SurfaceImport,
};
use crate::error::{BufferError, Result};
use crate::usage::{DeviceClass, MapAccess};

/// Device node the host display points providers at.
pub const HOST_DEVICE_NAME: &str = "/dev/dri/host0";

/// Native depth of the host display.
pub const HOST_DISPLAY_DEPTH: u32 = 24;

/// Surface rows are padded to this many bytes.
const SURFACE_PITCH_ALIGNMENT: u64 = 64;

/// Backend steps that can be made to fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub open_display: bool,
    pub device_name: bool,
    pub open_device: bool,
    pub magic: bool,
    pub authenticate: bool,
    pub create_allocator: bool,
    pub allocate: bool,
    pub import: bool,
    pub map: bool,
    pub create_surface: bool,
    pub clear_surface: bool,
    pub import_surface: bool,
}

/// Snapshot of live host resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub open_displays: usize,
    pub open_devices: usize,
    pub live_allocators: usize,
    pub live_allocations: usize,
    pub active_maps: usize,
    pub live_surfaces: usize,
}

#[derive(Default)]
struct Counters {
    open_displays: AtomicUsize,
    open_devices: AtomicUsize,
    live_allocators: AtomicUsize,
    live_allocations: AtomicUsize,
    active_maps: AtomicUsize,
    live_surfaces: AtomicUsize,
}

struct HostShared {
    memory: MemoryNamespace,
    faults: Mutex<FaultPlan>,
    authenticated: Mutex<HashSet<u32>>,
    next_magic: AtomicU32,
    last_map_access: Mutex<Option<(DeviceClass, MapAccess)>>,
    counters: Counters,
}

impl HostShared {
    fn check(&self, step: &'static str, failing: impl Fn(&FaultPlan) -> bool) -> Result<()> {
        if failing(&self.faults.lock()) {
            return Err(BufferError::Backend(format!("injected failure: {step}")));
        }
        Ok(())
    }
}

/// Reference platform backed by process memory.
#[derive(Clone)]
pub struct HostPlatform {
    shared: Arc<HostShared>,
}

impl HostPlatform {
    /// Host platform allocating from the process heap.
    pub fn new() -> Self {
        Self::with_memory(MemoryKind::Heap)
    }

    /// Host platform allocating shareable `memfd` memory.
    #[cfg(target_os = "linux")]
    pub fn with_memfd() -> Self {
        Self::with_memory(MemoryKind::Memfd)
    }

    pub fn with_memory(kind: MemoryKind) -> Self {
        Self {
            shared: Arc::new(HostShared {
                memory: MemoryNamespace::new(kind),
                faults: Mutex::new(FaultPlan::default()),
                authenticated: Mutex::new(HashSet::new()),
                next_magic: AtomicU32::new(0x4e42_0001),
                last_map_access: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    pub fn memory_kind(&self) -> MemoryKind {
        self.shared.memory.kind()
    }

    /// Replace the fault plan. Affects connections already opened.
    pub fn set_faults(&self, plan: FaultPlan) {
        *self.shared.faults.lock() = plan;
    }

    pub fn clear_faults(&self) {
        self.set_faults(FaultPlan::default());
    }

    pub fn stats(&self) -> HostStats {
        let c = &self.shared.counters;
        HostStats {
            open_displays: c.open_displays.load(Ordering::SeqCst),
            open_devices: c.open_devices.load(Ordering::SeqCst),
            live_allocators: c.live_allocators.load(Ordering::SeqCst),
            live_allocations: c.live_allocations.load(Ordering::SeqCst),
            active_maps: c.active_maps.load(Ordering::SeqCst),
            live_surfaces: c.live_surfaces.load(Ordering::SeqCst),
        }
    }

    /// Device class and access of the most recent successful map.
    pub fn last_map_access(&self) -> Option<(DeviceClass, MapAccess)> {
        *self.shared.last_map_access.lock()
    }

    /// Allocate memory outside of any provider, the way a foreign allocator
    /// context would, and publish it under a global name.
    pub fn create_external(&self, size: usize) -> Result<ExternalAllocation> {
        let region = self.shared.memory.create(size)?;
        let key = self.shared.memory.publish(&region)?;
        Ok(ExternalAllocation { region, key })
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPlatform")
            .field("memory", &self.memory_kind())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Platform for HostPlatform {
    fn name(&self) -> &str {
        "host"
    }

    fn open_display(&self) -> Result<Box<dyn DisplayConnection>> {
        self.shared.check("open_display", |f| f.open_display)?;
        self.shared
            .counters
            .open_displays
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HostDisplay {
            shared: Arc::clone(&self.shared),
            surfaces: Mutex::new(HashMap::new()),
            next_surface: AtomicU64::new(1),
        }))
    }

    fn open_device(&self, device_name: &str) -> Result<Box<dyn Device>> {
        self.shared.check("open_device", |f| f.open_device)?;
        if device_name != HOST_DEVICE_NAME {
            return Err(BufferError::Backend(format!(
                "No such device: {device_name}"
            )));
        }
        self.shared
            .counters
            .open_devices
            .fetch_add(1, Ordering::SeqCst);
        let magic = self.shared.next_magic.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(HostDevice {
            shared: Arc::clone(&self.shared),
            magic,
        }))
    }
}

/// Memory owned by a foreign allocator context.
///
/// Stays alive as long as this value or any imported reference to it lives.
pub struct ExternalAllocation {
    region: Arc<dyn Region>,
    key: ExportKey,
}

impl ExternalAllocation {
    pub fn key(&self) -> ExportKey {
        self.key
    }

    pub fn size(&self) -> usize {
        self.region.len()
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        // SAFETY: the region is live for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.region.as_ptr().as_ptr(), self.region.len()) }
            .to_vec()
    }

    /// Overwrite every byte with `value`.
    pub fn fill(&self, value: u8) {
        // SAFETY: the region is live and `len` bytes long.
        unsafe { std::ptr::write_bytes(self.region.as_ptr().as_ptr(), value, self.region.len()) }
    }
}

impl std::fmt::Debug for ExternalAllocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalAllocation")
            .field("key", &self.key)
            .field("size", &self.size())
            .finish()
    }
}

struct HostSurface {
    region: Arc<dyn Region>,
    width: u32,
    height: u32,
    stride: u32,
}

struct HostDisplay {
    shared: Arc<HostShared>,
    surfaces: Mutex<HashMap<u64, HostSurface>>,
    next_surface: AtomicU64,
}

impl DisplayConnection for HostDisplay {
    fn device_name(&self) -> Result<String> {
        self.shared.check("device_name", |f| f.device_name)?;
        Ok(HOST_DEVICE_NAME.to_string())
    }

    fn authenticate(&self, magic: u32) -> Result<()> {
        self.shared.check("authenticate", |f| f.authenticate)?;
        self.shared.authenticated.lock().insert(magic);
        Ok(())
    }

    fn default_depth(&self) -> u32 {
        HOST_DISPLAY_DEPTH
    }

    fn create_surface(&self, width: u32, height: u32, depth: u32) -> Result<SurfaceId> {
        self.shared.check("create_surface", |f| f.create_surface)?;
        let bytes_per_pixel: u64 = match depth {
            24 | 32 => 4,
            16 => 2,
            8 => 1,
            other => {
                return Err(BufferError::Backend(format!(
                    "Unsupported surface depth {other}"
                )));
            }
        };
        let pitch = (u64::from(width) * bytes_per_pixel).div_ceil(SURFACE_PITCH_ALIGNMENT)
            * SURFACE_PITCH_ALIGNMENT;
        let stride = u32::try_from(pitch)
            .map_err(|_| BufferError::Backend(format!("Surface too wide: {width}")))?;
        let size = usize::try_from(pitch * u64::from(height))
            .map_err(|_| BufferError::OutOfMemory(format!("Surface too large: {width}x{height}")))?;

        let region = self.shared.memory.create(size)?;
        let id = self.next_surface.fetch_add(1, Ordering::Relaxed);
        self.surfaces.lock().insert(
            id,
            HostSurface {
                region,
                width,
                height,
                stride,
            },
        );
        self.shared
            .counters
            .live_surfaces
            .fetch_add(1, Ordering::SeqCst);
        Ok(SurfaceId(id))
    }

    fn clear_surface(&self, surface: SurfaceId) -> Result<()> {
        self.shared.check("clear_surface", |f| f.clear_surface)?;
        let surfaces = self.surfaces.lock();
        let entry = surfaces
            .get(&surface.0)
            .ok_or_else(|| BufferError::Backend(format!("Unknown surface {}", surface.0)))?;
        // SAFETY: the region is kept alive by the surface entry.
        unsafe { std::ptr::write_bytes(entry.region.as_ptr().as_ptr(), 0, entry.region.len()) };
        Ok(())
    }

    fn import_surface(&self, surface: SurfaceId) -> Result<SurfaceImport> {
        self.shared.check("import_surface", |f| f.import_surface)?;
        let surfaces = self.surfaces.lock();
        let entry = surfaces
            .get(&surface.0)
            .ok_or_else(|| BufferError::Backend(format!("Unknown surface {}", surface.0)))?;
        let key = self.shared.memory.publish(&entry.region)?;
        Ok(SurfaceImport {
            key,
            width: entry.width,
            height: entry.height,
            stride: entry.stride,
        })
    }

    fn destroy_surface(&self, surface: SurfaceId) {
        if self.surfaces.lock().remove(&surface.0).is_some() {
            self.shared
                .counters
                .live_surfaces
                .fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for HostDisplay {
    fn drop(&mut self) {
        let leftover = self.surfaces.get_mut().len();
        if leftover > 0 {
            tracing::warn!("[HostDisplay] Closing with {} live surfaces", leftover);
            self.shared
                .counters
                .live_surfaces
                .fetch_sub(leftover, Ordering::SeqCst);
        }
        self.shared
            .counters
            .open_displays
            .fetch_sub(1, Ordering::SeqCst);
    }
}

struct HostDevice {
    shared: Arc<HostShared>,
    magic: u32,
}

impl Device for HostDevice {
    fn magic(&self) -> Result<u32> {
        self.shared.check("magic", |f| f.magic)?;
        Ok(self.magic)
    }

    fn create_allocator(&self) -> Result<Box<dyn Allocator>> {
        self.shared.check("create_allocator", |f| f.create_allocator)?;
        if !self.shared.authenticated.lock().contains(&self.magic) {
            return Err(BufferError::Backend(format!(
                "Device magic {:#x} was never authenticated",
                self.magic
            )));
        }
        self.shared
            .counters
            .live_allocators
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HostAllocator {
            shared: Arc::clone(&self.shared),
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }))
    }
}

impl Drop for HostDevice {
    fn drop(&mut self) {
        self.shared.authenticated.lock().remove(&self.magic);
        self.shared
            .counters
            .open_devices
            .fetch_sub(1, Ordering::SeqCst);
    }
}

struct HostHandle {
    region: Arc<dyn Region>,
    maps: usize,
}

struct HostAllocator {
    shared: Arc<HostShared>,
    handles: Mutex<HashMap<u64, HostHandle>>,
    next_handle: AtomicU64,
}

impl HostAllocator {
    fn insert(&self, region: Arc<dyn Region>) -> AllocationId {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles
            .lock()
            .insert(id, HostHandle { region, maps: 0 });
        self.shared
            .counters
            .live_allocations
            .fetch_add(1, Ordering::SeqCst);
        AllocationId(id)
    }

    fn unknown(allocation: AllocationId) -> BufferError {
        BufferError::Backend(format!("Unknown allocation {}", allocation.0))
    }
}

impl Allocator for HostAllocator {
    fn allocate(&self, size: usize) -> Result<AllocationId> {
        if self.shared.faults.lock().allocate {
            return Err(BufferError::OutOfMemory(format!(
                "injected failure: allocate {size} bytes"
            )));
        }
        let region = self.shared.memory.create(size)?;
        Ok(self.insert(region))
    }

    fn import(&self, key: ExportKey) -> Result<AllocationId> {
        self.shared.check("import", |f| f.import)?;
        let region = self
            .shared
            .memory
            .lookup(key)
            .ok_or_else(|| BufferError::Backend(format!("No allocation named {}", key.get())))?;
        Ok(self.insert(region))
    }

    fn export(&self, allocation: AllocationId) -> Result<ExportKey> {
        let handles = self.handles.lock();
        let handle = handles
            .get(&allocation.0)
            .ok_or_else(|| Self::unknown(allocation))?;
        self.shared.memory.publish(&handle.region)
    }

    fn map(
        &self,
        allocation: AllocationId,
        device: DeviceClass,
        access: MapAccess,
    ) -> Result<NonNull<u8>> {
        self.shared.check("map", |f| f.map)?;
        let mut handles = self.handles.lock();
        let handle = handles
            .get_mut(&allocation.0)
            .ok_or_else(|| Self::unknown(allocation))?;
        handle.maps += 1;
        self.shared
            .counters
            .active_maps
            .fetch_add(1, Ordering::SeqCst);
        *self.shared.last_map_access.lock() = Some((device, access));
        Ok(handle.region.as_ptr())
    }

    fn unmap(&self, allocation: AllocationId) -> Result<()> {
        let mut handles = self.handles.lock();
        let handle = handles
            .get_mut(&allocation.0)
            .ok_or_else(|| Self::unknown(allocation))?;
        if handle.maps == 0 {
            return Err(BufferError::Backend(format!(
                "Allocation {} is not mapped",
                allocation.0
            )));
        }
        handle.maps -= 1;
        self.shared
            .counters
            .active_maps
            .fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn size_of(&self, allocation: AllocationId) -> Result<usize> {
        self.handles
            .lock()
            .get(&allocation.0)
            .map(|h| h.region.len())
            .ok_or_else(|| Self::unknown(allocation))
    }

    fn release(&self, allocation: AllocationId) {
        if let Some(handle) = self.handles.lock().remove(&allocation.0) {
            let c = &self.shared.counters;
            c.active_maps.fetch_sub(handle.maps, Ordering::SeqCst);
            c.live_allocations.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for HostAllocator {
    fn drop(&mut self) {
        let handles = std::mem::take(self.handles.get_mut());
        if !handles.is_empty() {
            tracing::warn!(
                "[HostAllocator] Deinit with {} live allocations",
                handles.len()
            );
        }
        let c = &self.shared.counters;
        for handle in handles.values() {
            c.active_maps.fetch_sub(handle.maps, Ordering::SeqCst);
            c.live_allocations.fetch_sub(1, Ordering::SeqCst);
        }
        c.live_allocators.fetch_sub(1, Ordering::SeqCst);
    }
}
