// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Accessor integration tests.

use nativebuf::{
    BufferDescriptor, BufferInfo, BufferRegistry, BufferUsage, HostPlatform, PixelFormat,
    ProviderKind,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_getters_report_creation_parameters() {
    init_tracing();
    let registry = BufferRegistry::new(HostPlatform::new());
    let provider = registry.create_provider(ProviderKind::Core).unwrap();
    let desc = BufferDescriptor::new(480, 800, PixelFormat::Bgra8888)
        .with_usage(BufferUsage::CPU | BufferUsage::TEXTURE_3D);
    let buffer = registry.create_buffer(provider, &desc).unwrap();

    assert_eq!(registry.width(buffer), Some(480));
    assert_eq!(registry.height(buffer), Some(800));
    assert_eq!(registry.stride(buffer), Some(480 * 4));
    assert_eq!(registry.size(buffer), Some(480 * 4 * 800));
    assert_eq!(registry.format(buffer), Some(PixelFormat::Bgra8888));
    assert_eq!(
        registry.usage(buffer),
        Some(BufferUsage::CPU | BufferUsage::TEXTURE_3D)
    );
    assert_eq!(registry.provider(buffer), Some(provider));
    assert_eq!(registry.is_external(buffer), Some(false));
    assert!(registry.allocation(buffer).is_some());
    assert_eq!(registry.surface(buffer), None);

    let info = registry.info(buffer).unwrap();
    assert_eq!(
        info,
        BufferInfo {
            handle: buffer,
            provider,
            width: 480,
            height: 800,
            stride: 1920,
            size: 1920 * 800,
            format: PixelFormat::Bgra8888,
            usage: BufferUsage::CPU | BufferUsage::TEXTURE_3D,
            external: false,
        }
    );
}

#[test]
fn test_getters_are_none_after_destroy() {
    init_tracing();
    let registry = BufferRegistry::new(HostPlatform::new());
    let provider = registry.create_provider(ProviderKind::Core).unwrap();
    let buffer = registry
        .create_buffer(provider, &BufferDescriptor::new(8, 8, PixelFormat::Rgb888))
        .unwrap();
    registry.destroy_buffer(buffer).unwrap();

    assert_eq!(registry.width(buffer), None);
    assert_eq!(registry.height(buffer), None);
    assert_eq!(registry.stride(buffer), None);
    assert_eq!(registry.size(buffer), None);
    assert_eq!(registry.format(buffer), None);
    assert_eq!(registry.usage(buffer), None);
    assert_eq!(registry.provider(buffer), None);
    assert_eq!(registry.is_external(buffer), None);
    assert_eq!(registry.allocation(buffer), None);
    assert_eq!(registry.surface(buffer), None);
    assert_eq!(registry.info(buffer), None);
    assert_eq!(registry.lock_count(buffer), None);
}

#[test]
fn test_getters_have_no_side_effects() {
    init_tracing();
    let platform = HostPlatform::new();
    let registry = BufferRegistry::new(platform.clone());
    let provider = registry.create_provider(ProviderKind::Core).unwrap();
    let buffer = registry
        .create_buffer(
            provider,
            &BufferDescriptor::new(64, 64, PixelFormat::Rgba8888).with_usage(BufferUsage::DISPLAY),
        )
        .unwrap();
    let before = platform.stats();

    for _ in 0..3 {
        let _ = registry.info(buffer);
        let _ = registry.surface(buffer);
        let _ = registry.allocation(buffer);
        let _ = registry.lock_count(buffer);
    }

    assert_eq!(platform.stats(), before);
    assert_eq!(registry.lock_count(buffer), Some(0));
    assert!(registry.surface(buffer).is_some());
}

#[test]
fn test_handles_are_never_reused() {
    init_tracing();
    let registry = BufferRegistry::new(HostPlatform::new());
    let provider = registry.create_provider(ProviderKind::Core).unwrap();
    let desc = BufferDescriptor::new(4, 4, PixelFormat::A8);

    let first = registry.create_buffer(provider, &desc).unwrap();
    registry.destroy_buffer(first).unwrap();
    let second = registry.create_buffer(provider, &desc).unwrap();

    assert_ne!(first, second);
    assert_eq!(registry.width(first), None);
    assert_eq!(registry.width(second), Some(4));
}
