// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Capabilities this backend does not provide. Arguments are still validated
//! so an invalid handle reports the same error as everywhere else.

#[cfg(unix)]
use std::os::fd::BorrowedFd;

use super::BufferRegistry;
use crate::buffer::BufferHandle;
use crate::error::{BufferError, Result};
#[cfg(unix)]
use crate::provider::ProviderHandle;
use crate::usage::Advice;

impl BufferRegistry {
    /// Send a buffer to another process over a Unix socket. Not supported.
    #[cfg(unix)]
    pub fn send_handle(&self, buffer: BufferHandle, _socket: BorrowedFd<'_>) -> Result<()> {
        self.buffer_record(buffer)?;
        tracing::warn!("[BufferRegistry] send_handle is not supported yet");
        Err(BufferError::Unimplemented("send_handle"))
    }

    /// Receive a buffer sent by another process. Not supported.
    #[cfg(unix)]
    pub fn receive_handle(
        &self,
        provider: ProviderHandle,
        _socket: BorrowedFd<'_>,
    ) -> Result<BufferHandle> {
        self.provider_record(provider)?;
        tracing::warn!("[BufferRegistry] receive_handle is not supported yet");
        Err(BufferError::Unimplemented("receive_handle"))
    }

    /// Advise the backend how a range of the buffer will be used. Not supported.
    pub fn advise(
        &self,
        buffer: BufferHandle,
        offset: usize,
        len: usize,
        advice: Advice,
    ) -> Result<()> {
        self.buffer_record(buffer)?;
        tracing::warn!(
            "[BufferRegistry] advise({:?}, {}..{}) is not supported yet",
            advice,
            offset,
            offset.saturating_add(len)
        );
        Err(BufferError::Unimplemented("advise"))
    }
}
