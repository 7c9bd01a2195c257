// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Cross-process transfer and memory advice always fail, after validating
//! their arguments.

use nativebuf::{
    Advice, BufferDescriptor, BufferError, BufferRegistry, ErrorKind, HostPlatform, PixelFormat,
    ProviderKind, Status,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_advise_is_unimplemented() {
    init_tracing();
    let registry = BufferRegistry::new(HostPlatform::new());
    let provider = registry.create_provider(ProviderKind::Core).unwrap();
    let buffer = registry
        .create_buffer(provider, &BufferDescriptor::new(8, 8, PixelFormat::A8))
        .unwrap();

    for advice in [
        Advice::Normal,
        Advice::WillNeed,
        Advice::DontNeed,
        Advice::Resident,
    ] {
        let err = registry.advise(buffer, 0, 64, advice).unwrap_err();
        assert!(matches!(err, BufferError::Unimplemented("advise")));
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        assert_eq!(err.status(), Status::Error);
    }

    registry.destroy_buffer(buffer).unwrap();
    let err = registry.advise(buffer, 0, 64, Advice::Normal).unwrap_err();
    assert!(matches!(err, BufferError::NullArgument("buffer")));
}

#[cfg(unix)]
#[test]
fn test_handle_transfer_is_unimplemented() {
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    init_tracing();
    let registry = BufferRegistry::new(HostPlatform::new());
    let provider = registry.create_provider(ProviderKind::Core).unwrap();
    let buffer = registry
        .create_buffer(provider, &BufferDescriptor::new(8, 8, PixelFormat::Rgba8888))
        .unwrap();
    let (tx, rx) = UnixStream::pair().unwrap();

    let err = registry.send_handle(buffer, tx.as_fd()).unwrap_err();
    assert!(matches!(err, BufferError::Unimplemented("send_handle")));

    let err = registry.receive_handle(provider, rx.as_fd()).unwrap_err();
    assert!(matches!(err, BufferError::Unimplemented("receive_handle")));
    assert_eq!(registry.buffer_count(), 1);

    registry.destroy_buffer(buffer).unwrap();
    registry.destroy_provider(provider).unwrap();

    let err = registry.send_handle(buffer, tx.as_fd()).unwrap_err();
    assert_eq!(err.status(), Status::NullPointer);
    let err = registry.receive_handle(provider, rx.as_fd()).unwrap_err();
    assert_eq!(err.status(), Status::NullPointer);
}
