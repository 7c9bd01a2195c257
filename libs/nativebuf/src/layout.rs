// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stride and total-size computation per pixel format.
//!
//! Pure functions only. The alignment constant is a backend policy picked once
//! through configuration, never a per-call argument.

use std::num::NonZeroU32;
use std::str::FromStr;

use serde::Deserialize;

use crate::format::PixelFormat;

/// Row alignment policy of the allocation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentPolicy {
    /// Generic backends: rows padded to 32 pixels.
    #[default]
    Generic,
    /// Tile-based GPUs: rows padded to 16 pixels.
    Tiled,
}

impl AlignmentPolicy {
    /// Luma/packed row alignment, in pixels.
    pub const fn row_alignment(&self) -> u32 {
        match self {
            Self::Generic => 32,
            Self::Tiled => 16,
        }
    }

    /// Chroma row alignment in bytes, applied only when the stride was auto-computed.
    pub const fn chroma_alignment(&self) -> u32 {
        self.row_alignment()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Tiled => "tiled",
        }
    }
}

impl FromStr for AlignmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "tiled" | "tile" => Ok(Self::Tiled),
            _ => Err(format!(
                "Unknown alignment policy '{}'. Valid values: generic, tiled",
                s
            )),
        }
    }
}

impl std::fmt::Display for AlignmentPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Effective stride and byte size of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelLayout {
    /// Bytes between the starts of consecutive (luma) rows.
    pub stride: u32,
    /// Total bytes backing the buffer, chroma planes included.
    pub size: usize,
}

impl PixelLayout {
    /// Compute the layout of a `width` x `height` buffer.
    ///
    /// A caller-supplied stride is taken verbatim and chroma rows are assumed
    /// tightly packed (`stride / 2`). An auto-computed stride pads luma rows to
    /// the policy's row alignment and pads chroma rows the same way.
    ///
    /// Returns `None` only when the result does not fit the address space.
    pub fn compute(
        width: u32,
        height: u32,
        format: PixelFormat,
        requested_stride: Option<NonZeroU32>,
        policy: AlignmentPolicy,
    ) -> Option<Self> {
        let stride = match requested_stride {
            Some(stride) => u64::from(stride.get()),
            None => Self::aligned_stride(width, format, policy),
        };

        let height = u64::from(height);
        let size = if format.is_yuv420() {
            let chroma_row = match requested_stride {
                Some(_) => stride / 2,
                None => align_up(stride / 2, u64::from(policy.chroma_alignment())),
            };
            height.checked_mul(stride.checked_add(chroma_row)?)?
        } else {
            stride.checked_mul(height)?
        };

        Some(Self {
            stride: u32::try_from(stride).ok()?,
            size: usize::try_from(size).ok()?,
        })
    }

    /// Minimum bytes one row of `width` pixels occupies without padding.
    pub fn packed_row_bytes(width: u32, format: PixelFormat) -> u64 {
        u64::from(width) * u64::from(format.bytes_per_pixel())
    }

    fn aligned_stride(width: u32, format: PixelFormat, policy: AlignmentPolicy) -> u64 {
        let aligned_width = align_up(u64::from(width), u64::from(policy.row_alignment()));
        if format.is_yuv420() {
            aligned_width
        } else {
            aligned_width * u64::from(format.bytes_per_pixel())
        }
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auto(width: u32, height: u32, format: PixelFormat) -> PixelLayout {
        PixelLayout::compute(width, height, format, None, AlignmentPolicy::Generic).unwrap()
    }

    #[test]
    fn test_packed_auto_stride() {
        assert_eq!(auto(512, 512, PixelFormat::Rgba8888).stride, 2048);
        assert_eq!(auto(100, 10, PixelFormat::Rgba8888).stride, 128 * 4);
        assert_eq!(auto(100, 10, PixelFormat::Rgb888).stride, 128 * 3);
        assert_eq!(auto(100, 10, PixelFormat::Rgb565).stride, 128 * 2);
        assert_eq!(auto(1, 1, PixelFormat::A8).stride, 32);
        assert_eq!(auto(100, 10, PixelFormat::Rgb565).size, 256 * 10);
    }

    #[test]
    fn test_tiled_policy() {
        let layout =
            PixelLayout::compute(100, 4, PixelFormat::Bgra8888, None, AlignmentPolicy::Tiled)
                .unwrap();
        assert_eq!(layout.stride, 112 * 4);
        assert_eq!(layout.size, 112 * 4 * 4);
    }

    #[test]
    fn test_yuv_auto_stride_aligns_chroma() {
        // 16 px -> luma stride 32, half 16 -> chroma padded to 32.
        let layout = auto(16, 8, PixelFormat::Nv12);
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.size, 8 * (32 + 32));

        // 64 px -> luma stride 64, half 32 already aligned.
        let layout = auto(64, 8, PixelFormat::I420);
        assert_eq!(layout.stride, 64);
        assert_eq!(layout.size, 8 * (64 + 32));
    }

    #[test]
    fn test_yuv_explicit_stride_keeps_tight_chroma() {
        let layout = PixelLayout::compute(
            16,
            8,
            PixelFormat::Yv12,
            NonZeroU32::new(40),
            AlignmentPolicy::Generic,
        )
        .unwrap();
        assert_eq!(layout.stride, 40);
        assert_eq!(layout.size, 8 * (40 + 20));
    }

    #[test]
    fn test_explicit_stride_is_verbatim() {
        let layout = PixelLayout::compute(
            512,
            2,
            PixelFormat::Rgba8888,
            NonZeroU32::new(7),
            AlignmentPolicy::Generic,
        )
        .unwrap();
        assert_eq!(layout.stride, 7);
        assert_eq!(layout.size, 14);
    }

    #[test]
    fn test_auto_stride_properties_hold_for_every_format() {
        for format in PixelFormat::ALL {
            for &(w, h) in &[(1u32, 1u32), (31, 7), (33, 2), (640, 480), (1920, 1080)] {
                let layout = auto(w, h, format);
                assert!(layout.stride > 0);
                assert_eq!(layout.stride % AlignmentPolicy::Generic.row_alignment(), 0);
                assert!(layout.size >= (w as usize) * (h as usize));
            }
        }
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(
            PixelLayout::compute(
                u32::MAX,
                u32::MAX,
                PixelFormat::Rgba8888,
                None,
                AlignmentPolicy::Generic
            )
            .is_none()
        );
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("Generic".parse::<AlignmentPolicy>(), Ok(AlignmentPolicy::Generic));
        assert_eq!("tiled".parse::<AlignmentPolicy>(), Ok(AlignmentPolicy::Tiled));
        assert!("mali".parse::<AlignmentPolicy>().is_err());
    }
}
