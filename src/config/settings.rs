// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Engine settings
//!
//! Loaded from `checkflow.toml` or `checkflow.yaml`; every field has a
//! default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::BaseTypeDefaults;
use crate::errors::{CheckflowError, CheckflowResult};
use crate::utils::duration::parse_duration;

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Let resources with identical configuration share one version history
    pub enable_global_resources: bool,

    /// Check interval used when a resource or type doesn't set
    /// `check_every`. Read through `check_interval()` on either handle.
    pub default_check_interval: String,

    /// Timeout attached to plans from `scheduled_check_plan`
    pub default_check_timeout: String,

    /// YAML file with base resource type defaults
    pub base_resource_type_defaults: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_global_resources: false,
            default_check_interval: "1m".to_string(),
            default_check_timeout: "1h".to_string(),
            base_resource_type_defaults: None,
        }
    }
}

impl Settings {
    /// Load settings from a `.toml`, `.yaml` or `.yml` file
    pub fn from_file(path: &Path) -> CheckflowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CheckflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Err(CheckflowError::UnsupportedSettingsFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn from_toml(content: &str) -> CheckflowResult<Self> {
        toml::from_str(content).map_err(Into::into)
    }

    pub fn from_yaml(content: &str) -> CheckflowResult<Self> {
        serde_yaml::from_str(content).map_err(Into::into)
    }

    pub fn check_interval(&self) -> CheckflowResult<Duration> {
        parse_duration(&self.default_check_interval)
    }

    pub fn check_timeout(&self) -> CheckflowResult<Duration> {
        parse_duration(&self.default_check_timeout)
    }

    /// Load the configured base type defaults file, if any, into `defaults`
    pub fn apply(&self, defaults: &BaseTypeDefaults) -> CheckflowResult<()> {
        if let Some(ref path) = self.base_resource_type_defaults {
            defaults.load_from_file(path)?;
        }
        Ok(())
    }
}
