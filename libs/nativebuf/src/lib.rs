// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Hardware-shareable pixel buffers.
//!
//! A [`BufferRegistry`] owns providers (one authenticated backend connection
//! each) and the buffers created through them. Buffers get a stride and size
//! from the per-format layout calculator, are zero-filled on allocation, and
//! are mapped for CPU or device access through reentrant lock/unlock calls.
//! A provider whose destroy is requested while buffers are live stays
//! connected until the last of them is destroyed.
//!
//! ```no_run
//! use nativebuf::{
//!     AccessOptions, BufferDescriptor, BufferRegistry, BufferUsage, HostPlatform, PixelFormat,
//!     ProviderKind,
//! };
//!
//! # fn main() -> nativebuf::Result<()> {
//! let registry = BufferRegistry::new(HostPlatform::new());
//! let provider = registry.create_provider(ProviderKind::Core)?;
//! let buffer = registry.create_buffer(
//!     provider,
//!     &BufferDescriptor::new(480, 800, PixelFormat::Bgra8888)
//!         .with_usage(BufferUsage::CPU | BufferUsage::TEXTURE_3D),
//! )?;
//!
//! {
//!     let mapping = registry.lock_scoped(buffer, BufferUsage::CPU, AccessOptions::WRITE)?;
//!     mapping.fill_pattern(&[0x00, 0x00, 0xff, 0xff])?;
//! }
//!
//! registry.destroy_buffer(buffer)?;
//! registry.destroy_provider(provider)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod format;
pub mod layout;
pub mod lock;
pub mod provider;
pub mod registry;
pub mod usage;

pub use backend::host::{FaultPlan, HostPlatform, HostStats};
pub use backend::{AllocationId, ExportKey, Platform, SurfaceId};
pub use buffer::{BufferDescriptor, BufferHandle, BufferInfo, DestroyCallback};
pub use config::NativeBufConfig;
pub use error::{BufferError, ErrorKind, Result, Status};
pub use format::PixelFormat;
pub use layout::{AlignmentPolicy, PixelLayout};
pub use lock::{LockGuard, Mapping};
pub use provider::{ProviderHandle, ProviderKind, ProviderState};
pub use registry::BufferRegistry;
pub use usage::{AccessOptions, Advice, BufferUsage, DeviceClass, MapAccess};

pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_MICRO: u32 = 1;

/// `major * 10000 + minor * 100 + micro`.
pub const fn version() -> u32 {
    VERSION_MAJOR * 10000 + VERSION_MINOR * 100 + VERSION_MICRO
}

/// Dotted version, e.g. `"1.1.1"`.
pub fn version_string() -> String {
    format!("{}.{}.{}", VERSION_MAJOR, VERSION_MINOR, VERSION_MICRO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), 10101);
        assert_eq!(version_string(), "1.1.1");
    }
}
