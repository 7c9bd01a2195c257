// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Registry configuration, loadable from `nativebuf.toml`.
//!
//! The row alignment policy can be selected via:
//! 1. An explicit value in the config file
//! 2. `NATIVEBUF_ALIGNMENT` environment variable (`generic` / `tiled`)
//! 3. Platform default (`generic`)

use std::path::Path;

use serde::Deserialize;

use crate::error::{BufferError, Result};
use crate::layout::AlignmentPolicy;
use crate::provider::ProviderKind;

/// Configuration consumed by [`crate::BufferRegistry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NativeBufConfig {
    /// Row alignment policy. `None` defers to [`NativeBufConfig::ALIGNMENT_ENV_VAR`].
    pub alignment: Option<AlignmentPolicy>,

    /// Depth for render/scanout surfaces. `None` uses the display's native depth.
    pub display_depth: Option<u32>,

    /// Provider kind used when the caller does not name one.
    pub default_provider: ProviderKind,
}

impl NativeBufConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "nativebuf.toml";

    /// Environment variable name for the alignment override.
    pub const ALIGNMENT_ENV_VAR: &'static str = "NATIVEBUF_ALIGNMENT";

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BufferError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory. Returns error if the file is
    /// missing or cannot be parsed.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            BufferError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| {
            BufferError::Configuration(format!("{}: {}", config_path.display(), e))
        })?;

        tracing::info!("Loaded nativebuf config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a directory, returning defaults if the file is
    /// missing or unparseable.
    pub fn load_or_default(dir: &Path) -> Self {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                dir.display()
            );
            return Self::default();
        }

        match Self::load(dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Resolve the alignment policy to use.
    ///
    /// Resolution priority:
    /// 1. Explicit value (if configured)
    /// 2. `NATIVEBUF_ALIGNMENT` environment variable
    /// 3. Platform default
    pub fn resolve_alignment(&self) -> AlignmentPolicy {
        if let Some(policy) = self.alignment {
            return policy;
        }

        if let Ok(env_value) = std::env::var(Self::ALIGNMENT_ENV_VAR) {
            match env_value.parse() {
                Ok(policy) => return policy,
                Err(e) => tracing::warn!("[NativeBufConfig] Ignoring {}: {}", Self::ALIGNMENT_ENV_VAR, e),
            }
        }

        AlignmentPolicy::default()
    }

    fn validate(&self) -> Result<()> {
        match self.display_depth {
            Some(depth) if !matches!(depth, 8 | 16 | 24 | 32) => Err(BufferError::Configuration(
                format!("display_depth must be 8, 16, 24 or 32, got {}", depth),
            )),
            _ => Ok(()),
        }
    }
}
