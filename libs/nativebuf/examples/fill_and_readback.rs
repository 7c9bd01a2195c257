// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Allocate a 512x512 RGBA buffer on the host platform, fill it with a solid
//! color through a CPU lock, read it back through a second lock, and tear
//! everything down.
//!
//! ```text
//! RUST_LOG=debug cargo run -p nativebuf --example fill_and_readback
//! ```

use nativebuf::{
    AccessOptions, BufferDescriptor, BufferRegistry, BufferUsage, HostPlatform, NativeBufConfig,
    PixelFormat,
};
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 512;
const HEIGHT: u32 = 512;
const COLOR: [u8; 4] = [0x20, 0x80, 0xe0, 0xff];

fn main() -> nativebuf::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = NativeBufConfig::load_or_default(std::path::Path::new("."));
    let platform = HostPlatform::new();
    let registry = BufferRegistry::with_config(platform.clone(), config);

    tracing::info!(
        "nativebuf {} ({} alignment)",
        nativebuf::version_string(),
        registry.alignment()
    );

    let provider = registry.create_default_provider()?;
    let buffer = registry.create_buffer(
        provider,
        &BufferDescriptor::new(WIDTH, HEIGHT, PixelFormat::Rgba8888)
            .with_usage(BufferUsage::CPU | BufferUsage::TEXTURE_3D),
    )?;
    let info = registry
        .info(buffer)
        .ok_or(nativebuf::BufferError::NullArgument("buffer"))?;
    tracing::info!(
        "Buffer {}: {}x{} {} stride={} size={}",
        buffer.id(),
        info.width,
        info.height,
        info.format,
        info.stride,
        info.size
    );

    {
        let mapping = registry.lock_scoped(
            buffer,
            BufferUsage::CPU,
            AccessOptions::READ | AccessOptions::WRITE,
        )?;
        mapping.fill_pattern(&COLOR)?;
    }

    let mut mismatched_rows = 0;
    {
        let mapping = registry.lock_scoped(buffer, BufferUsage::CPU, AccessOptions::READ)?;
        let mut row = vec![0u8; info.stride as usize];
        for y in 0..info.height as usize {
            mapping.read_at(y * info.stride as usize, &mut row)?;
            let visible = &row[..WIDTH as usize * COLOR.len()];
            if !visible.chunks_exact(COLOR.len()).all(|px| px == COLOR) {
                mismatched_rows += 1;
            }
        }
    }
    if mismatched_rows == 0 {
        tracing::info!("Read back {} rows of {:02x?}", info.height, COLOR);
    } else {
        tracing::error!("{} rows did not read back as {:02x?}", mismatched_rows, COLOR);
    }

    registry.destroy_buffer(buffer)?;
    registry.destroy_provider(provider)?;
    tracing::info!("Host resources after teardown: {:?}", platform.stats());
    Ok(())
}
