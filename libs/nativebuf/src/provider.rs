// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Providers: one backend connection plus the live-buffer bookkeeping that
//! gates its teardown.
//!
//! ```text
//! Active --destroy, no buffers--> torn down
//! Active --destroy, buffers live--> PendingDestroy --last buffer gone--> torn down
//! ```

use std::str::FromStr;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::backend::{Allocator, Device, DisplayConnection, Platform};
use crate::error::{BufferError, Result};

/// Allocation backend a provider connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ProviderKind {
    /// Native allocator behind an authenticated display connection.
    #[default]
    Core,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "core" => Ok(Self::Core),
            _ => Err(format!("Unknown provider kind '{}'. Valid values: core", s)),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle to a provider owned by a [`crate::BufferRegistry`].
///
/// Ids are never reused; a handle to a torn-down provider stays invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderHandle(pub(crate) u64);

impl ProviderHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Observable state of a provider that has not been torn down yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderState {
    Active,
    /// Destroy was requested while buffers were live.
    PendingDestroy,
}

/// Backend resources of one provider.
///
/// Field order is teardown order: allocator, then device, then display.
pub(crate) struct CoreConnection {
    pub(crate) allocator: Box<dyn Allocator>,
    _device: Box<dyn Device>,
    pub(crate) display: Box<dyn DisplayConnection>,
}

impl CoreConnection {
    /// Open, authenticate and initialize. Anything acquired before a failing
    /// step is released on the way out.
    pub(crate) fn connect(platform: &dyn Platform) -> Result<Self> {
        let display = platform.open_display().inspect_err(|e| {
            tracing::error!("[Provider] Failed to open display connection: {}", e);
        })?;

        let device_name = display.device_name().inspect_err(|e| {
            tracing::error!("[Provider] Failed to query device name: {}", e);
        })?;

        let device = platform.open_device(&device_name).inspect_err(|e| {
            tracing::error!("[Provider] Failed to open device {}: {}", device_name, e);
        })?;

        let magic = device.magic().inspect_err(|e| {
            tracing::error!("[Provider] Failed to get magic for {}: {}", device_name, e);
        })?;

        display.authenticate(magic).inspect_err(|e| {
            tracing::error!("[Provider] Failed to authenticate {}: {}", device_name, e);
        })?;

        let allocator = device.create_allocator().inspect_err(|e| {
            tracing::error!("[Provider] Failed to initialize allocator: {}", e);
        })?;

        tracing::debug!(
            "[Provider] Connected to {} via {}",
            device_name,
            platform.name()
        );

        Ok(Self {
            allocator,
            _device: device,
            display,
        })
    }
}

impl Drop for CoreConnection {
    fn drop(&mut self) {
        tracing::debug!("[Provider] Closing backend connection");
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    live_buffers: usize,
    destroy_requested: bool,
    torn_down: bool,
}

/// What the caller must do after a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    Now,
    Deferred,
}

/// A provider as stored in the registry.
pub(crate) struct ProviderRecord {
    pub(crate) handle: ProviderHandle,
    pub(crate) kind: ProviderKind,
    pub(crate) connection: CoreConnection,
    lifecycle: Mutex<Lifecycle>,
}

impl ProviderRecord {
    pub(crate) fn new(handle: ProviderHandle, kind: ProviderKind, connection: CoreConnection) -> Self {
        Self {
            handle,
            kind,
            connection,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Count one more buffer against this provider.
    ///
    /// Allowed while a destroy is pending; fails once torn down.
    pub(crate) fn register_buffer(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.torn_down {
            return Err(BufferError::ProviderTornDown);
        }
        lifecycle.live_buffers += 1;
        Ok(())
    }

    /// Drop one buffer from the count. Returns [`Teardown::Now`] exactly once,
    /// when the last buffer of a provider with a pending destroy goes away.
    pub(crate) fn unregister_buffer(&self) -> Teardown {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.live_buffers = lifecycle.live_buffers.saturating_sub(1);
        if lifecycle.live_buffers == 0 && lifecycle.destroy_requested && !lifecycle.torn_down {
            lifecycle.torn_down = true;
            Teardown::Now
        } else {
            Teardown::Deferred
        }
    }

    /// Record a destroy request. Repeated requests are no-ops.
    pub(crate) fn request_destroy(&self) -> Result<Teardown> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.torn_down {
            return Err(BufferError::NullArgument("provider"));
        }
        lifecycle.destroy_requested = true;
        if lifecycle.live_buffers == 0 {
            lifecycle.torn_down = true;
            Ok(Teardown::Now)
        } else {
            Ok(Teardown::Deferred)
        }
    }

    pub(crate) fn live_buffers(&self) -> usize {
        self.lifecycle.lock().live_buffers
    }

    pub(crate) fn state(&self) -> ProviderState {
        if self.lifecycle.lock().destroy_requested {
            ProviderState::PendingDestroy
        } else {
            ProviderState::Active
        }
    }
}
