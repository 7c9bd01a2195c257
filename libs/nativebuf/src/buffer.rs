// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer descriptors, metadata snapshots and the per-buffer record.

use std::num::NonZeroU32;

use parking_lot::Mutex;

use crate::backend::{AllocationId, SurfaceId};
use crate::format::PixelFormat;
use crate::provider::ProviderHandle;
use crate::usage::BufferUsage;

/// Handle to a buffer owned by a [`crate::BufferRegistry`].
///
/// Ids are never reused; a handle to a destroyed buffer stays invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Parameters for a freshly allocated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Caller-chosen stride in bytes. `None` lets the layout calculator pick.
    pub stride: Option<NonZeroU32>,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            stride: None,
            usage: BufferUsage::empty(),
        }
    }

    /// Use `stride` verbatim. Zero means "auto".
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = NonZeroU32::new(stride);
        self
    }

    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Snapshot of a buffer's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub handle: BufferHandle,
    pub provider: ProviderHandle,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub size: usize,
    pub format: PixelFormat,
    pub usage: BufferUsage,
    /// Wraps an allocation that was created outside this provider.
    pub external: bool,
}

/// Invoked once when a buffer is destroyed, before its memory is released.
pub type DestroyCallback = Box<dyn FnOnce(&BufferInfo) + Send>;

#[derive(Default)]
pub(crate) struct BufferState {
    pub(crate) lock_count: u32,
    pub(crate) destroyed: bool,
    pub(crate) on_destroy: Option<DestroyCallback>,
}

/// A buffer as stored in the registry.
pub(crate) struct BufferRecord {
    pub(crate) info: BufferInfo,
    pub(crate) allocation: AllocationId,
    pub(crate) surface: Option<SurfaceId>,
    pub(crate) state: Mutex<BufferState>,
}

impl BufferRecord {
    pub(crate) fn new(info: BufferInfo, allocation: AllocationId, surface: Option<SurfaceId>) -> Self {
        Self {
            info,
            allocation,
            surface,
            state: Mutex::new(BufferState::default()),
        }
    }

    /// Whether destroying the buffer also destroys its surface.
    pub(crate) fn owns_surface(&self) -> Option<SurfaceId> {
        self.surface.filter(|_| !self.info.external)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let desc = BufferDescriptor::new(480, 800, PixelFormat::Bgra8888)
            .with_stride(2048)
            .with_usage(BufferUsage::TEXTURE_3D);
        assert_eq!(desc.stride.map(NonZeroU32::get), Some(2048));
        assert_eq!(desc.usage, BufferUsage::TEXTURE_3D);

        let desc = desc.with_stride(0);
        assert_eq!(desc.stride, None);
    }

    #[test]
    fn test_external_buffers_do_not_own_surfaces() {
        let info = BufferInfo {
            handle: BufferHandle(1),
            provider: ProviderHandle(1),
            width: 4,
            height: 4,
            stride: 16,
            size: 64,
            format: PixelFormat::Rgba8888,
            usage: BufferUsage::DISPLAY,
            external: false,
        };
        let owned = BufferRecord::new(info, AllocationId(1), Some(SurfaceId(3)));
        assert_eq!(owned.owns_surface(), Some(SurfaceId(3)));

        let wrapped = BufferRecord::new(
            BufferInfo {
                external: true,
                ..info
            },
            AllocationId(2),
            Some(SurfaceId(3)),
        );
        assert_eq!(wrapped.owns_surface(), None);
    }
}
