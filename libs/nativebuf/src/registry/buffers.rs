// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Buffer creation, wrapping and destruction.

use std::num::NonZeroU32;
use std::sync::Arc;

use super::BufferRegistry;
use crate::backend::{AllocationId, ExportKey, SurfaceId};
use crate::buffer::{BufferDescriptor, BufferHandle, BufferInfo, BufferRecord};
use crate::error::{BufferError, Result};
use crate::format::PixelFormat;
use crate::layout::PixelLayout;
use crate::provider::{ProviderHandle, ProviderKind, ProviderRecord};
use crate::usage::{BufferUsage, DeviceClass, MapAccess};

/// Backing memory of a buffer under construction.
struct Backing {
    allocation: AllocationId,
    surface: Option<SurfaceId>,
    width: u32,
    height: u32,
    stride: u32,
    size: usize,
}

impl BufferRegistry {
    /// Allocate a new buffer through `provider`.
    ///
    /// Render and scanout usages are backed by a display surface; everything
    /// else gets a plain zero-filled allocation sized by the layout calculator.
    pub fn create_buffer(
        &self,
        provider: ProviderHandle,
        descriptor: &BufferDescriptor,
    ) -> Result<BufferHandle> {
        let record = self.provider_record(provider)?;
        validate_dimensions(descriptor.width, descriptor.height)?;

        let surface_backed = descriptor.usage.requires_surface();
        if surface_backed && !descriptor.format.is_render_target_compatible() {
            tracing::error!(
                "[BufferRegistry] Format {} cannot back usage {:?}",
                descriptor.format,
                descriptor.usage
            );
            return Err(BufferError::UnsupportedFormat {
                format: descriptor.format,
                usage: descriptor.usage,
            });
        }

        record.register_buffer().inspect_err(|e| {
            tracing::error!("[BufferRegistry] Provider {}: {}", provider.0, e);
        })?;

        let backing = if surface_backed {
            self.create_surface_backing(&record, descriptor)
        } else {
            self.create_plain_backing(&record, descriptor)
        };
        let backing = match backing {
            Ok(backing) => backing,
            Err(e) => {
                self.unregister(&record);
                return Err(e);
            }
        };

        let handle = BufferHandle(self.next_id());
        let info = BufferInfo {
            handle,
            provider,
            width: backing.width,
            height: backing.height,
            stride: backing.stride,
            size: backing.size,
            format: descriptor.format,
            usage: descriptor.usage,
            external: false,
        };
        self.buffers.write().insert(
            handle.0,
            Arc::new(BufferRecord::new(info, backing.allocation, backing.surface)),
        );

        tracing::debug!(
            "[BufferRegistry] Created buffer {} ({}x{} {}, stride {}, {} bytes) on provider {}",
            handle.0,
            info.width,
            info.height,
            info.format,
            info.stride,
            info.size,
            provider.0
        );
        Ok(handle)
    }

    /// Wrap an allocation published under `key` by another allocator context.
    ///
    /// The buffer holds its own imported reference. The allocation's size
    /// must match the layout implied by the given dimensions exactly.
    pub fn create_buffer_from_external(
        &self,
        provider: ProviderHandle,
        key: ExportKey,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
    ) -> Result<BufferHandle> {
        let record = self.provider_record(provider)?;
        if record.kind != ProviderKind::Core {
            tracing::error!("[BufferRegistry] Provider {} cannot wrap allocations", provider.0);
            return Err(BufferError::UnsupportedProviderKind);
        }
        validate_dimensions(width, height)?;

        let layout = self.layout(width, height, format, NonZeroU32::new(stride))?;
        if let Some(stride) = NonZeroU32::new(stride) {
            warn_if_short_stride(width, format, stride);
        }

        record.register_buffer().inspect_err(|e| {
            tracing::error!("[BufferRegistry] Provider {}: {}", provider.0, e);
        })?;

        let allocator = &record.connection.allocator;
        let imported = allocator.import(key).and_then(|allocation| {
            match allocator.size_of(allocation) {
                Ok(actual) if actual == layout.size => Ok(allocation),
                Ok(actual) => {
                    allocator.release(allocation);
                    Err(BufferError::SizeMismatch {
                        expected: layout.size,
                        actual,
                    })
                }
                Err(e) => {
                    allocator.release(allocation);
                    Err(e)
                }
            }
        });
        let allocation = match imported {
            Ok(allocation) => allocation,
            Err(e) => {
                tracing::error!(
                    "[BufferRegistry] Failed to wrap external allocation {}: {}",
                    key.get(),
                    e
                );
                self.unregister(&record);
                return Err(e);
            }
        };

        let handle = BufferHandle(self.next_id());
        let info = BufferInfo {
            handle,
            provider,
            width,
            height,
            stride: layout.stride,
            size: layout.size,
            format,
            usage: BufferUsage::empty(),
            external: true,
        };
        self.buffers
            .write()
            .insert(handle.0, Arc::new(BufferRecord::new(info, allocation, None)));

        tracing::debug!(
            "[BufferRegistry] Wrapped external allocation {} as buffer {} ({}x{} {})",
            key.get(),
            handle.0,
            width,
            height,
            format
        );
        Ok(handle)
    }

    /// Destroy a buffer.
    ///
    /// Runs the destroy callback, unmaps any locks still held, releases the
    /// allocation and owned surface, then lets the provider finish a pending
    /// teardown if this was its last buffer.
    pub fn destroy_buffer(&self, buffer: BufferHandle) -> Result<()> {
        let record = self.buffers.write().remove(&buffer.0).ok_or_else(|| {
            tracing::error!("[BufferRegistry] Invalid buffer handle {}", buffer.0);
            BufferError::NullArgument("buffer")
        })?;
        let provider = self.provider_record(record.info.provider)?;

        let (on_destroy, outstanding) = {
            let mut state = record.state.lock();
            state.destroyed = true;
            (state.on_destroy.take(), std::mem::take(&mut state.lock_count))
        };

        if let Some(callback) = on_destroy {
            callback(&record.info);
        }

        let allocator = &provider.connection.allocator;
        if outstanding > 0 {
            tracing::warn!(
                "[BufferRegistry] Destroying buffer {} with {} outstanding locks",
                buffer.0,
                outstanding
            );
            for _ in 0..outstanding {
                if let Err(e) = allocator.unmap(record.allocation) {
                    tracing::warn!("[BufferRegistry] Unmap of buffer {} failed: {}", buffer.0, e);
                }
            }
        }
        allocator.release(record.allocation);

        if let Some(surface) = record.owns_surface() {
            provider.connection.display.destroy_surface(surface);
        }

        tracing::debug!("[BufferRegistry] Destroyed buffer {}", buffer.0);
        self.unregister(&provider);
        Ok(())
    }

    /// Publish the buffer's allocation under a global name another provider
    /// can wrap.
    pub fn export_key(&self, buffer: BufferHandle) -> Result<ExportKey> {
        let record = self.buffer_record(buffer)?;
        let provider = self.provider_record(record.info.provider)?;
        provider
            .connection
            .allocator
            .export(record.allocation)
            .inspect_err(|e| {
                tracing::error!("[BufferRegistry] Failed to export buffer {}: {}", buffer.0, e);
            })
    }

    /// Install the callback run when `buffer` is destroyed, replacing any
    /// previous one.
    pub fn set_destroy_callback<F>(&self, buffer: BufferHandle, callback: F) -> Result<()>
    where
        F: FnOnce(&BufferInfo) + Send + 'static,
    {
        let record = self.buffer_record(buffer)?;
        record.state.lock().on_destroy = Some(Box::new(callback));
        Ok(())
    }

    pub fn clear_destroy_callback(&self, buffer: BufferHandle) -> Result<()> {
        let record = self.buffer_record(buffer)?;
        record.state.lock().on_destroy = None;
        Ok(())
    }

    fn layout(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: Option<NonZeroU32>,
    ) -> Result<PixelLayout> {
        PixelLayout::compute(width, height, format, stride, self.alignment).ok_or_else(|| {
            tracing::error!(
                "[BufferRegistry] Layout of {}x{} {} does not fit in memory",
                width,
                height,
                format
            );
            BufferError::OutOfMemory(format!("{}x{} {}", width, height, format))
        })
    }

    fn create_plain_backing(
        &self,
        provider: &ProviderRecord,
        descriptor: &BufferDescriptor,
    ) -> Result<Backing> {
        let layout = self.layout(
            descriptor.width,
            descriptor.height,
            descriptor.format,
            descriptor.stride,
        )?;
        if let Some(stride) = descriptor.stride {
            warn_if_short_stride(descriptor.width, descriptor.format, stride);
        }

        let allocator = &provider.connection.allocator;
        let allocation = allocator.allocate(layout.size).inspect_err(|e| {
            tracing::error!(
                "[BufferRegistry] Failed to allocate {} bytes: {}",
                layout.size,
                e
            );
        })?;

        // Never hand out what the previous owner of the memory left behind.
        let cleared = allocator
            .map(allocation, DeviceClass::Cpu, MapAccess::WRITE)
            .and_then(|ptr| {
                // SAFETY: the allocation was just created with `layout.size`
                // bytes and is mapped for writing.
                unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, layout.size) };
                allocator.unmap(allocation)
            });
        if let Err(e) = cleared {
            tracing::error!("[BufferRegistry] Failed to zero-fill new allocation: {}", e);
            allocator.release(allocation);
            return Err(e);
        }

        Ok(Backing {
            allocation,
            surface: None,
            width: descriptor.width,
            height: descriptor.height,
            stride: layout.stride,
            size: layout.size,
        })
    }

    /// Create a cleared display surface and import its memory. The import is
    /// authoritative for the resulting geometry.
    fn create_surface_backing(
        &self,
        provider: &ProviderRecord,
        descriptor: &BufferDescriptor,
    ) -> Result<Backing> {
        let display = &provider.connection.display;
        let allocator = &provider.connection.allocator;
        let depth = self
            .config
            .display_depth
            .unwrap_or_else(|| display.default_depth());

        let surface = display
            .create_surface(descriptor.width, descriptor.height, depth)
            .inspect_err(|e| {
                tracing::error!(
                    "[BufferRegistry] Failed to create {}x{} surface at depth {}: {}",
                    descriptor.width,
                    descriptor.height,
                    depth,
                    e
                );
            })?;

        let imported = display
            .clear_surface(surface)
            .and_then(|()| display.import_surface(surface))
            .and_then(|import| {
                let allocation = allocator.import(import.key)?;
                match allocator.size_of(allocation) {
                    Ok(size) => Ok((import, allocation, size)),
                    Err(e) => {
                        allocator.release(allocation);
                        Err(e)
                    }
                }
            });

        match imported {
            Ok((import, allocation, size)) => Ok(Backing {
                allocation,
                surface: Some(surface),
                width: import.width,
                height: import.height,
                stride: import.stride,
                size,
            }),
            Err(e) => {
                tracing::error!(
                    "[BufferRegistry] Failed to import surface {}: {}",
                    surface.0,
                    e
                );
                display.destroy_surface(surface);
                Err(e)
            }
        }
    }
}

fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        tracing::error!("[BufferRegistry] Invalid dimensions {}x{}", width, height);
        return Err(BufferError::InvalidDimensions { width, height });
    }
    Ok(())
}

fn warn_if_short_stride(width: u32, format: PixelFormat, stride: NonZeroU32) {
    let packed = PixelLayout::packed_row_bytes(width, format);
    if u64::from(stride.get()) < packed {
        tracing::warn!(
            "[BufferRegistry] Stride {} is shorter than a packed {} row of {} bytes",
            stride,
            format,
            packed
        );
    }
}
