// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Usage and access flags, and their translation to backend mapping terms.

use bitflags::bitflags;

bitflags! {
    /// Which hardware blocks a buffer is meant to be accessed by.
    ///
    /// The empty set is the "default" usage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Read or written by the CPU.
        const CPU = 1 << 0;
        /// Source or destination of the 2D accelerator.
        const ACCEL_2D = 1 << 1;
        /// Sampled by the 3D accelerator as a texture.
        const TEXTURE_3D = 1 << 2;
        /// Rendered into by the 3D accelerator.
        const RENDER_3D = 1 << 3;
        /// Video codec decode/encode hardware.
        const CODEC = 1 << 4;
        /// Scanned out by the display.
        const DISPLAY = 1 << 5;
    }
}

impl BufferUsage {
    /// Usages that need a presentable surface behind the buffer.
    pub const PRESENTABLE: Self = Self::RENDER_3D.union(Self::DISPLAY);

    pub fn requires_surface(&self) -> bool {
        self.intersects(Self::PRESENTABLE)
    }
}

bitflags! {
    /// Access the caller wants when locking a buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessOptions: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

bitflags! {
    /// Access flags handed to the allocation backend's `map`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapAccess: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl From<AccessOptions> for MapAccess {
    fn from(options: AccessOptions) -> Self {
        let mut access = MapAccess::empty();
        if options.contains(AccessOptions::READ) {
            access |= MapAccess::READ;
        }
        if options.contains(AccessOptions::WRITE) {
            access |= MapAccess::WRITE;
        }
        access
    }
}

/// Device class a mapping is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceClass {
    #[default]
    Default,
    Cpu,
    Accel2d,
    Accel3d,
    Codec,
}

impl DeviceClass {
    /// Translate a lock usage into the backend's device class.
    ///
    /// Texture-source and render-target usages share the 3D class. Mixed
    /// usages spanning several blocks fall back to [`DeviceClass::Default`].
    pub fn from_usage(usage: BufferUsage) -> Self {
        let accel_3d = BufferUsage::TEXTURE_3D | BufferUsage::RENDER_3D;
        if usage == BufferUsage::CPU {
            Self::Cpu
        } else if usage == BufferUsage::ACCEL_2D {
            Self::Accel2d
        } else if !usage.is_empty() && accel_3d.contains(usage) {
            Self::Accel3d
        } else if usage == BufferUsage::CODEC {
            Self::Codec
        } else {
            Self::Default
        }
    }
}

/// Memory-advisory hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Advice {
    Normal,
    WillNeed,
    DontNeed,
    Resident,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_class_translation() {
        assert_eq!(DeviceClass::from_usage(BufferUsage::CPU), DeviceClass::Cpu);
        assert_eq!(
            DeviceClass::from_usage(BufferUsage::ACCEL_2D),
            DeviceClass::Accel2d
        );
        assert_eq!(
            DeviceClass::from_usage(BufferUsage::TEXTURE_3D),
            DeviceClass::Accel3d
        );
        assert_eq!(
            DeviceClass::from_usage(BufferUsage::RENDER_3D),
            DeviceClass::Accel3d
        );
        assert_eq!(
            DeviceClass::from_usage(BufferUsage::TEXTURE_3D | BufferUsage::RENDER_3D),
            DeviceClass::Accel3d
        );
        assert_eq!(
            DeviceClass::from_usage(BufferUsage::CODEC),
            DeviceClass::Codec
        );
        assert_eq!(
            DeviceClass::from_usage(BufferUsage::empty()),
            DeviceClass::Default
        );
        assert_eq!(
            DeviceClass::from_usage(BufferUsage::CPU | BufferUsage::TEXTURE_3D),
            DeviceClass::Default
        );
    }

    #[test]
    fn test_access_passes_both_flags_through() {
        assert_eq!(
            MapAccess::from(AccessOptions::READ | AccessOptions::WRITE),
            MapAccess::READ | MapAccess::WRITE
        );
        assert_eq!(MapAccess::from(AccessOptions::WRITE), MapAccess::WRITE);
        assert!(MapAccess::from(AccessOptions::empty()).is_empty());
    }

    #[test]
    fn test_requires_surface() {
        assert!(BufferUsage::RENDER_3D.requires_surface());
        assert!((BufferUsage::CPU | BufferUsage::DISPLAY).requires_surface());
        assert!(!(BufferUsage::CPU | BufferUsage::TEXTURE_3D).requires_surface());
    }
}
