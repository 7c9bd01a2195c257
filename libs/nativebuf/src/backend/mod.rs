// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Collaborator contracts the buffer core consumes.
//!
//! A [`Platform`] opens the display connection and the allocation device. The
//! provider authenticates the device against the display once, then asks the
//! device for an [`Allocator`]. Render/scanout buffers additionally go through
//! the display's surface calls.

pub mod host;

use std::num::NonZeroU32;
use std::ptr::NonNull;

use crate::error::Result;
use crate::usage::{DeviceClass, MapAccess};

/// Backend-local id of one allocation reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationId(pub u64);

/// Display-side id of a presentable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// Global name of an allocation, valid across allocator contexts.
///
/// Zero is never a valid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExportKey(NonZeroU32);

impl ExportKey {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

/// Result of importing a surface's memory as an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceImport {
    pub key: ExportKey,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

/// Entry point to a buffer-allocation backend.
pub trait Platform: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &str;

    /// Open a connection to the display server.
    fn open_display(&self) -> Result<Box<dyn DisplayConnection>>;

    /// Open the allocation device the display pointed us at.
    fn open_device(&self, device_name: &str) -> Result<Box<dyn Device>>;
}

/// Display/surface backend connection.
pub trait DisplayConnection: Send + Sync {
    /// Path of the device node to allocate from.
    fn device_name(&self) -> Result<String>;

    /// Authorize a device's magic token for allocation.
    fn authenticate(&self, magic: u32) -> Result<()>;

    /// Native color depth of the default screen, in bits.
    fn default_depth(&self) -> u32;

    fn create_surface(&self, width: u32, height: u32, depth: u32) -> Result<SurfaceId>;

    /// Fill the surface with the background value (zero).
    fn clear_surface(&self, surface: SurfaceId) -> Result<()>;

    /// Expose the surface's memory under a global name.
    fn import_surface(&self, surface: SurfaceId) -> Result<SurfaceImport>;

    fn destroy_surface(&self, surface: SurfaceId);
}

/// An opened allocation device.
pub trait Device: Send + Sync {
    /// Token the display must authenticate before allocation succeeds.
    fn magic(&self) -> Result<u32>;

    fn create_allocator(&self) -> Result<Box<dyn Allocator>>;
}

/// Allocator context bound to one device.
pub trait Allocator: Send + Sync {
    fn allocate(&self, size: usize) -> Result<AllocationId>;

    /// Take a new reference to the allocation behind a global name.
    fn import(&self, key: ExportKey) -> Result<AllocationId>;

    /// Publish an allocation under a global name.
    fn export(&self, allocation: AllocationId) -> Result<ExportKey>;

    /// Map for access by `device`. Maps nest; each needs a matching `unmap`.
    fn map(
        &self,
        allocation: AllocationId,
        device: DeviceClass,
        access: MapAccess,
    ) -> Result<NonNull<u8>>;

    fn unmap(&self, allocation: AllocationId) -> Result<()>;

    fn size_of(&self, allocation: AllocationId) -> Result<usize>;

    /// Drop this reference. Outstanding maps of the reference go with it.
    fn release(&self, allocation: AllocationId);
}
