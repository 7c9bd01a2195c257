// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Reentrant lock accounting.

use std::sync::Arc;

use super::BufferRegistry;
use crate::buffer::BufferHandle;
use crate::error::{BufferError, Result};
use crate::lock::{LockGuard, Mapping};
use crate::usage::{AccessOptions, BufferUsage, DeviceClass, MapAccess};

impl BufferRegistry {
    /// Map the buffer for `usage` and count one more lock.
    ///
    /// Every successful call needs a matching [`BufferRegistry::unlock`].
    pub fn lock(
        &self,
        buffer: BufferHandle,
        usage: BufferUsage,
        access: AccessOptions,
    ) -> Result<Mapping> {
        let record = self.buffer_record(buffer)?;
        let provider = self.provider_record(record.info.provider)?;
        let device = DeviceClass::from_usage(usage);
        let map_access = MapAccess::from(access);

        let mut state = record.state.lock();
        if state.destroyed {
            return Err(BufferError::NullArgument("buffer"));
        }

        let ptr = provider
            .connection
            .allocator
            .map(record.allocation, device, map_access)
            .inspect_err(|e| {
                tracing::error!("[BufferRegistry] Failed to map buffer {}: {}", buffer.0, e);
            })?;
        state.lock_count += 1;

        tracing::debug!(
            "[BufferRegistry] Locked buffer {} for {:?} {:?} (count {})",
            buffer.0,
            device,
            map_access,
            state.lock_count
        );
        Ok(Mapping::new(ptr, record.info.size, Arc::clone(&record)))
    }

    /// Undo one [`BufferRegistry::lock`].
    pub fn unlock(&self, buffer: BufferHandle) -> Result<()> {
        let record = self.buffer_record(buffer)?;
        let provider = self.provider_record(record.info.provider)?;

        let mut state = record.state.lock();
        if state.destroyed {
            return Err(BufferError::NullArgument("buffer"));
        }
        if state.lock_count == 0 {
            tracing::error!("[BufferRegistry] Buffer {} is not locked", buffer.0);
            return Err(BufferError::NotLocked);
        }

        provider
            .connection
            .allocator
            .unmap(record.allocation)
            .inspect_err(|e| {
                tracing::error!("[BufferRegistry] Failed to unmap buffer {}: {}", buffer.0, e);
            })?;
        state.lock_count -= 1;

        tracing::debug!(
            "[BufferRegistry] Unlocked buffer {} (count {})",
            buffer.0,
            state.lock_count
        );
        Ok(())
    }

    /// Outstanding locks, or `None` for an invalid handle.
    pub fn lock_count(&self, buffer: BufferHandle) -> Option<u32> {
        let record = self.buffers.read().get(&buffer.0).cloned()?;
        let state = record.state.lock();
        (!state.destroyed).then_some(state.lock_count)
    }

    /// Lock for the lifetime of the returned guard.
    pub fn lock_scoped(
        &self,
        buffer: BufferHandle,
        usage: BufferUsage,
        access: AccessOptions,
    ) -> Result<LockGuard<'_>> {
        let mapping = self.lock(buffer, usage, access)?;
        Ok(LockGuard::new(self, buffer, mapping))
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::host::HostPlatform;
    use crate::buffer::BufferDescriptor;
    use crate::error::BufferError;
    use crate::format::PixelFormat;
    use crate::provider::ProviderKind;
    use crate::registry::BufferRegistry;
    use crate::usage::{AccessOptions, BufferUsage, DeviceClass, MapAccess};

    #[test]
    fn test_lock_forwards_device_class_and_access() {
        let platform = HostPlatform::new();
        let registry = BufferRegistry::new(platform.clone());
        let provider = registry.create_provider(ProviderKind::Core).unwrap();
        let buffer = registry
            .create_buffer(provider, &BufferDescriptor::new(16, 16, PixelFormat::Nv12))
            .unwrap();

        registry
            .lock(
                buffer,
                BufferUsage::TEXTURE_3D,
                AccessOptions::READ | AccessOptions::WRITE,
            )
            .unwrap();
        assert_eq!(
            platform.last_map_access(),
            Some((DeviceClass::Accel3d, MapAccess::READ | MapAccess::WRITE))
        );

        registry
            .lock(buffer, BufferUsage::CODEC, AccessOptions::READ)
            .unwrap();
        assert_eq!(
            platform.last_map_access(),
            Some((DeviceClass::Codec, MapAccess::READ))
        );
        assert_eq!(registry.lock_count(buffer), Some(2));
        assert_eq!(platform.stats().active_maps, 2);
    }

    #[test]
    fn test_scoped_lock_unlocks_on_drop() {
        let platform = HostPlatform::new();
        let registry = BufferRegistry::new(platform.clone());
        let provider = registry.create_provider(ProviderKind::Core).unwrap();
        let buffer = registry
            .create_buffer(provider, &BufferDescriptor::new(4, 4, PixelFormat::Rgbx8888))
            .unwrap();

        {
            let guard = registry
                .lock_scoped(buffer, BufferUsage::CPU, AccessOptions::WRITE)
                .unwrap();
            guard.fill(0x7f).unwrap();
            assert_eq!(registry.lock_count(buffer), Some(1));
        }
        assert_eq!(registry.lock_count(buffer), Some(0));
        assert!(matches!(registry.unlock(buffer), Err(BufferError::NotLocked)));
    }

    #[test]
    fn test_scoped_lock_outliving_buffer() {
        let platform = HostPlatform::new();
        let registry = BufferRegistry::new(platform.clone());
        let provider = registry.create_provider(ProviderKind::Core).unwrap();
        let buffer = registry
            .create_buffer(provider, &BufferDescriptor::new(4, 4, PixelFormat::A8))
            .unwrap();

        let guard = registry
            .lock_scoped(buffer, BufferUsage::CPU, AccessOptions::READ)
            .unwrap();
        registry.destroy_buffer(buffer).unwrap();
        drop(guard);

        assert_eq!(registry.lock_count(buffer), None);
        assert_eq!(platform.stats().active_maps, 0);
    }
}
