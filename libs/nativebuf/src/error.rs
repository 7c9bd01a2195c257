// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Error taxonomy for provider and buffer operations.

use thiserror::Error;

use crate::format::PixelFormat;
use crate::usage::BufferUsage;

#[derive(Error, Debug)]
pub enum BufferError {
    /// A required handle was missing, stale, or already destroyed.
    #[error("Invalid {0} handle")]
    NullArgument(&'static str),

    #[error("Invalid buffer dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Format {format} is not permitted for usage {usage:?}")]
    UnsupportedFormat {
        format: PixelFormat,
        usage: BufferUsage,
    },

    #[error("Provider kind is not supported by this backend")]
    UnsupportedProviderKind,

    #[error("Allocation size {actual} does not match computed layout size {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Buffer is not locked")]
    NotLocked,

    #[error("Provider has been torn down")]
    ProviderTornDown,

    #[error("Backend operation failed: {0}")]
    Backend(String),

    #[error("Operation not supported: {0}")]
    Unimplemented(&'static str),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Coarse classification of a [`BufferError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NullArgument,
    OutOfMemory,
    UnsupportedConfiguration,
    InvalidState,
    BackendFailure,
    Unimplemented,
}

/// Numeric status codes of the legacy C interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    Error = 1,
    NoMemory = 2,
    NullPointer = 3,
    EmptyPool = 4,
    EglError = 5,
    InvalidBufferState = 6,
}

impl BufferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NullArgument(_) => ErrorKind::NullArgument,
            Self::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Self::InvalidDimensions { .. }
            | Self::UnsupportedFormat { .. }
            | Self::UnsupportedProviderKind
            | Self::SizeMismatch { .. }
            | Self::Configuration(_) => ErrorKind::UnsupportedConfiguration,
            Self::NotLocked | Self::ProviderTornDown => ErrorKind::InvalidState,
            Self::Backend(_) => ErrorKind::BackendFailure,
            Self::Unimplemented(_) => ErrorKind::Unimplemented,
        }
    }

    /// Status code a legacy caller would have observed for this failure.
    pub fn status(&self) -> Status {
        match self.kind() {
            ErrorKind::NullArgument => Status::NullPointer,
            ErrorKind::OutOfMemory => Status::NoMemory,
            ErrorKind::InvalidState => Status::InvalidBufferState,
            ErrorKind::UnsupportedConfiguration
            | ErrorKind::BackendFailure
            | ErrorKind::Unimplemented => Status::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, BufferError>;
