// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Lifecycle coordinator for providers and buffers.
//!
//! The registry owns every provider and buffer record; callers hold `Copy`
//! handles. Buffers refer to their provider by handle only, so a provider's
//! backend connection is dropped as soon as the registry removes it, which
//! happens exactly once: at destroy time when no buffers are live, or when
//! the last buffer of a provider with a pending destroy goes away.

mod accessors;
mod buffers;
mod locking;
mod unsupported;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::backend::Platform;
use crate::buffer::{BufferHandle, BufferRecord};
use crate::config::NativeBufConfig;
use crate::error::{BufferError, Result};
use crate::layout::AlignmentPolicy;
use crate::provider::{
    CoreConnection, ProviderHandle, ProviderKind, ProviderRecord, ProviderState, Teardown,
};

/// Owns providers and buffers and exposes every buffer operation.
pub struct BufferRegistry {
    platform: Arc<dyn Platform>,
    config: NativeBufConfig,
    alignment: AlignmentPolicy,
    next_id: AtomicU64,
    providers: RwLock<HashMap<u64, Arc<ProviderRecord>>>,
    buffers: RwLock<HashMap<u64, Arc<BufferRecord>>>,
}

impl BufferRegistry {
    pub fn new(platform: impl Platform + 'static) -> Self {
        Self::with_config(platform, NativeBufConfig::default())
    }

    pub fn with_config(platform: impl Platform + 'static, config: NativeBufConfig) -> Self {
        Self::from_shared(Arc::new(platform), config)
    }

    pub fn from_shared(platform: Arc<dyn Platform>, config: NativeBufConfig) -> Self {
        let alignment = config.resolve_alignment();
        tracing::debug!(
            "[BufferRegistry] Using {} platform with {} alignment",
            platform.name(),
            alignment
        );
        Self {
            platform,
            config,
            alignment,
            next_id: AtomicU64::new(1),
            providers: RwLock::new(HashMap::new()),
            buffers: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &NativeBufConfig {
        &self.config
    }

    /// Alignment policy resolved at construction.
    pub fn alignment(&self) -> AlignmentPolicy {
        self.alignment
    }

    /// Connect a new provider of `kind` to the backend.
    pub fn create_provider(&self, kind: ProviderKind) -> Result<ProviderHandle> {
        let connection = match kind {
            ProviderKind::Core => CoreConnection::connect(self.platform.as_ref())?,
        };

        let handle = ProviderHandle(self.next_id());
        self.providers.write().insert(
            handle.0,
            Arc::new(ProviderRecord::new(handle, kind, connection)),
        );

        tracing::info!("[BufferRegistry] Created {} provider {}", kind, handle.0);
        Ok(handle)
    }

    /// Connect a provider of the configured default kind.
    pub fn create_default_provider(&self) -> Result<ProviderHandle> {
        self.create_provider(self.config.default_provider)
    }

    /// Connect a provider named by its string kind (`"core"`).
    pub fn create_provider_named(&self, kind: &str) -> Result<ProviderHandle> {
        let kind = kind.parse::<ProviderKind>().map_err(|e| {
            tracing::error!("[BufferRegistry] {}", e);
            BufferError::UnsupportedProviderKind
        })?;
        self.create_provider(kind)
    }

    /// Request provider teardown.
    ///
    /// Tears down immediately when no buffers are live. Otherwise the provider
    /// keeps serving until its last buffer is destroyed. Repeating the call
    /// while teardown is pending is a no-op.
    pub fn destroy_provider(&self, provider: ProviderHandle) -> Result<()> {
        let record = self.provider_record(provider)?;
        match record.request_destroy()? {
            Teardown::Now => self.teardown(&record),
            Teardown::Deferred => {
                tracing::info!(
                    "[BufferRegistry] Provider {} has {} live buffers, deferring teardown",
                    provider.0,
                    record.live_buffers()
                );
            }
        }
        Ok(())
    }

    /// Buffers currently counted against `provider`.
    pub fn live_buffer_count(&self, provider: ProviderHandle) -> Option<usize> {
        self.providers
            .read()
            .get(&provider.0)
            .map(|record| record.live_buffers())
    }

    /// `None` once the provider has been torn down.
    pub fn provider_state(&self, provider: ProviderHandle) -> Option<ProviderState> {
        self.providers
            .read()
            .get(&provider.0)
            .map(|record| record.state())
    }

    pub fn provider_kind(&self, provider: ProviderHandle) -> Option<ProviderKind> {
        self.providers
            .read()
            .get(&provider.0)
            .map(|record| record.kind)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.read().len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.read().len()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn provider_record(&self, provider: ProviderHandle) -> Result<Arc<ProviderRecord>> {
        self.providers
            .read()
            .get(&provider.0)
            .cloned()
            .ok_or_else(|| {
                tracing::error!("[BufferRegistry] Invalid provider handle {}", provider.0);
                BufferError::NullArgument("provider")
            })
    }

    fn buffer_record(&self, buffer: BufferHandle) -> Result<Arc<BufferRecord>> {
        self.buffers
            .read()
            .get(&buffer.0)
            .cloned()
            .ok_or_else(|| {
                tracing::error!("[BufferRegistry] Invalid buffer handle {}", buffer.0);
                BufferError::NullArgument("buffer")
            })
    }

    /// Forget a provider whose lifecycle reached teardown. The backend
    /// connection closes when the last in-flight reference is dropped.
    fn teardown(&self, record: &ProviderRecord) {
        self.providers.write().remove(&record.handle.0);
        tracing::info!("[BufferRegistry] Tore down provider {}", record.handle.0);
    }

    /// Undo a buffer registration and finish a pending teardown if it was
    /// the last one.
    fn unregister(&self, provider: &ProviderRecord) {
        if provider.unregister_buffer() == Teardown::Now {
            self.teardown(provider);
        }
    }
}

impl Drop for BufferRegistry {
    fn drop(&mut self) {
        let buffers = self.buffers.get_mut().len();
        let providers = self.providers.get_mut().len();
        if buffers > 0 || providers > 0 {
            tracing::warn!(
                "[BufferRegistry] Dropped with {} providers and {} buffers still live",
                providers,
                buffers
            );
        }
        // Buffers release their allocations through their provider, so they
        // must go first.
        let records: Vec<_> = self.buffers.get_mut().drain().map(|(_, r)| r).collect();
        for record in records {
            if let Some(provider) = self.providers.get_mut().get(&record.info.provider.0) {
                let allocator = &provider.connection.allocator;
                let outstanding = {
                    let mut state = record.state.lock();
                    state.destroyed = true;
                    std::mem::take(&mut state.lock_count)
                };
                for _ in 0..outstanding {
                    if let Err(e) = allocator.unmap(record.allocation) {
                        tracing::warn!(
                            "[BufferRegistry] Unmap of buffer {} failed: {}",
                            record.info.handle.id(),
                            e
                        );
                    }
                }
                allocator.release(record.allocation);
                if let Some(surface) = record.owns_surface() {
                    provider.connection.display.destroy_surface(surface);
                }
            }
        }
        self.providers.get_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{FaultPlan, HostPlatform, HostStats};
    use crate::buffer::BufferDescriptor;
    use crate::format::PixelFormat;
    use crate::usage::{AccessOptions, BufferUsage};

    #[test]
    fn test_provider_ids_are_never_reused() {
        let registry = BufferRegistry::new(HostPlatform::new());
        let first = registry.create_provider(ProviderKind::Core).unwrap();
        registry.destroy_provider(first).unwrap();
        let second = registry.create_provider(ProviderKind::Core).unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            registry.destroy_provider(first),
            Err(BufferError::NullArgument("provider"))
        ));
    }

    #[test]
    fn test_named_provider_kind() {
        let registry = BufferRegistry::new(HostPlatform::new());
        assert!(registry.create_provider_named("core").is_ok());
        assert!(matches!(
            registry.create_provider_named("tbm"),
            Err(BufferError::UnsupportedProviderKind)
        ));
        assert_eq!(registry.provider_count(), 1);
    }

    #[test]
    fn test_failed_provider_leaves_nothing_behind() {
        let platform = HostPlatform::new();
        platform.set_faults(FaultPlan {
            authenticate: true,
            ..Default::default()
        });
        let registry = BufferRegistry::new(platform.clone());
        assert!(registry.create_provider(ProviderKind::Core).is_err());
        assert_eq!(registry.provider_count(), 0);
        assert_eq!(platform.stats(), HostStats::default());
    }

    #[test]
    fn test_drop_releases_everything() {
        let platform = HostPlatform::new();
        {
            let registry = BufferRegistry::new(platform.clone());
            let provider = registry.create_provider(ProviderKind::Core).unwrap();
            let buffer = registry
                .create_buffer(provider, &BufferDescriptor::new(8, 8, PixelFormat::A8))
                .unwrap();
            registry
                .lock(buffer, BufferUsage::CPU, AccessOptions::READ)
                .unwrap();
            assert_eq!(platform.stats().active_maps, 1);
        }
        assert_eq!(platform.stats(), HostStats::default());
    }

    #[test]
    fn test_mapping_outliving_registry_is_inert() {
        let platform = HostPlatform::new();
        let mapping = {
            let registry = BufferRegistry::new(platform.clone());
            let provider = registry.create_provider(ProviderKind::Core).unwrap();
            let buffer = registry
                .create_buffer(provider, &BufferDescriptor::new(8, 8, PixelFormat::A8))
                .unwrap();
            let mapping = registry
                .lock(buffer, BufferUsage::CPU, AccessOptions::WRITE)
                .unwrap();
            mapping.fill(0x01).unwrap();
            mapping
        };
        assert_eq!(platform.stats(), HostStats::default());
        assert!(!mapping.is_valid());
        assert!(matches!(
            mapping.fill(0x02),
            Err(BufferError::NullArgument("buffer"))
        ));
    }
}
