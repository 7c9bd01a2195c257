// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Side-effect free metadata getters. All return `None` for invalid handles.

use super::BufferRegistry;
use crate::backend::{AllocationId, SurfaceId};
use crate::buffer::{BufferHandle, BufferInfo};
use crate::format::PixelFormat;
use crate::provider::ProviderHandle;
use crate::usage::BufferUsage;

impl BufferRegistry {
    pub fn info(&self, buffer: BufferHandle) -> Option<BufferInfo> {
        self.buffers.read().get(&buffer.0).map(|record| record.info)
    }

    pub fn width(&self, buffer: BufferHandle) -> Option<u32> {
        self.info(buffer).map(|info| info.width)
    }

    pub fn height(&self, buffer: BufferHandle) -> Option<u32> {
        self.info(buffer).map(|info| info.height)
    }

    pub fn stride(&self, buffer: BufferHandle) -> Option<u32> {
        self.info(buffer).map(|info| info.stride)
    }

    pub fn size(&self, buffer: BufferHandle) -> Option<usize> {
        self.info(buffer).map(|info| info.size)
    }

    pub fn format(&self, buffer: BufferHandle) -> Option<PixelFormat> {
        self.info(buffer).map(|info| info.format)
    }

    pub fn usage(&self, buffer: BufferHandle) -> Option<BufferUsage> {
        self.info(buffer).map(|info| info.usage)
    }

    /// Provider the buffer was created through.
    pub fn provider(&self, buffer: BufferHandle) -> Option<ProviderHandle> {
        self.info(buffer).map(|info| info.provider)
    }

    pub fn is_external(&self, buffer: BufferHandle) -> Option<bool> {
        self.info(buffer).map(|info| info.external)
    }

    /// Backend id of the buffer's own allocation reference.
    pub fn allocation(&self, buffer: BufferHandle) -> Option<AllocationId> {
        self.buffers
            .read()
            .get(&buffer.0)
            .map(|record| record.allocation)
    }

    /// Display surface behind a render/scanout buffer.
    pub fn surface(&self, buffer: BufferHandle) -> Option<SurfaceId> {
        self.buffers
            .read()
            .get(&buffer.0)
            .and_then(|record| record.surface)
    }
}
