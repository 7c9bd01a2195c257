// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pixel formats a buffer can be created with.
//!
//! Discriminants match the legacy numeric format codes so a raw value coming
//! across an FFI boundary converts with [`PixelFormat::from_raw`].

use std::str::FromStr;

/// Pixel formats supported by the buffer provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelFormat {
    // ===========================================
    // Packed RGB / gray formats
    // ===========================================
    /// 32-bit RGBA (8 bits/channel).
    Rgba8888 = 1,
    /// 32-bit RGB with an unused padding byte.
    Rgbx8888 = 2,
    /// 24-bit packed RGB.
    Rgb888 = 3,
    /// 16-bit RGB, 5/6/5 bits per channel.
    Rgb565 = 4,
    /// 32-bit BGRA (8 bits/channel).
    Bgra8888 = 5,
    /// 8-bit alpha only.
    A8 = 6,

    // ===========================================
    // YUV 4:2:0
    // ===========================================
    /// 8-bit Y plane followed by 2x2 subsampled V and U planes.
    Yv12 = 7,
    /// 8-bit Y plane followed by 2x2 subsampled U and V planes.
    I420 = 8,
    /// 8-bit Y plane followed by an interleaved U/V plane.
    Nv12 = 9,
    /// 8-bit Y plane followed by an interleaved V/U plane.
    Nv21 = 10,
    /// NV12 stored in the backend's tiled layout.
    Nv12Tiled = 11,
}

impl PixelFormat {
    /// Every format, in discriminant order.
    pub const ALL: [PixelFormat; 11] = [
        Self::Rgba8888,
        Self::Rgbx8888,
        Self::Rgb888,
        Self::Rgb565,
        Self::Bgra8888,
        Self::A8,
        Self::Yv12,
        Self::I420,
        Self::Nv12,
        Self::Nv21,
        Self::Nv12Tiled,
    ];

    /// Convert a legacy numeric format code. `0` (invalid) and unknown codes yield `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| *f as u32 == raw)
    }

    /// Bytes per pixel of the first (or only) plane.
    pub const fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Rgba8888 | Self::Rgbx8888 | Self::Bgra8888 => 4,
            Self::Rgb888 => 3,
            Self::Rgb565 => 2,
            Self::A8 => 1,
            Self::Yv12 | Self::I420 | Self::Nv12 | Self::Nv21 | Self::Nv12Tiled => 1,
        }
    }

    /// Whether this is a 4:2:0 YUV format (planar or semi-planar).
    pub const fn is_yuv420(&self) -> bool {
        matches!(
            self,
            Self::Yv12 | Self::I420 | Self::Nv12 | Self::Nv21 | Self::Nv12Tiled
        )
    }

    /// Whether chroma is stored in two separate planes (YV12 / I420).
    pub const fn is_planar(&self) -> bool {
        matches!(self, Self::Yv12 | Self::I420)
    }

    /// Number of planes for this format.
    pub const fn plane_count(&self) -> u32 {
        match self {
            Self::Yv12 | Self::I420 => 3,
            Self::Nv12 | Self::Nv21 | Self::Nv12Tiled => 2,
            _ => 1,
        }
    }

    /// Whether a presentable surface can back a buffer of this format.
    pub const fn is_render_target_compatible(&self) -> bool {
        matches!(
            self,
            Self::Rgba8888 | Self::Bgra8888 | Self::Rgb888 | Self::Rgbx8888
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rgba8888 => "rgba8888",
            Self::Rgbx8888 => "rgbx8888",
            Self::Rgb888 => "rgb888",
            Self::Rgb565 => "rgb565",
            Self::Bgra8888 => "bgra8888",
            Self::A8 => "a8",
            Self::Yv12 => "yv12",
            Self::I420 => "i420",
            Self::Nv12 => "nv12",
            Self::Nv21 => "nv21",
            Self::Nv12Tiled => "nv12t",
        }
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == lower)
            .ok_or_else(|| format!("Unknown pixel format '{}'", s))
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
