// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Error types
//!
//! Every fallible operation in checkflow returns a [`CheckflowError`].
//! Absence is never an error: lookups return `Ok(None)` instead.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigVersion;

/// Result type for checkflow operations
pub type CheckflowResult<T> = Result<T, CheckflowError>;

/// Main error type for checkflow
#[derive(Error, Debug, Diagnostic)]
pub enum CheckflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline '{pipeline}' was saved against config version {given}, but the current version is {current}")]
    #[diagnostic(
        code(checkflow::config_version_conflict),
        help("Reload the pipeline and save again against its current config version")
    )]
    ConfigVersionConflict {
        pipeline: String,
        given: ConfigVersion,
        current: ConfigVersion,
    },

    #[error("Pipeline '{pipeline}' declares resource type '{name}' more than once")]
    #[diagnostic(
        code(checkflow::duplicate_resource_type),
        help("Resource type names must be unique within a pipeline")
    )]
    DuplicateResourceType { pipeline: String, name: String },

    #[error("Pipeline '{pipeline}' declares resource '{name}' more than once")]
    #[diagnostic(
        code(checkflow::duplicate_resource),
        help("Resource names must be unique within a pipeline")
    )]
    DuplicateResource { pipeline: String, name: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Unique constraint violated on '{table}' for key '{key}'")]
    #[diagnostic(code(checkflow::unique_violation))]
    UniqueViolation { table: &'static str, key: String },

    #[error("Row '{key}' in '{table}' was changed by a concurrent transaction")]
    #[diagnostic(
        code(checkflow::transaction_conflict),
        help("Reload and apply the change again")
    )]
    TransactionConflict { table: &'static str, key: String },

    #[error("Storage error: {message}")]
    #[diagnostic(code(checkflow::storage_error))]
    Storage { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Build Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Build {build} cannot move from '{from}' to '{to}'")]
    #[diagnostic(
        code(checkflow::invalid_build_transition),
        help("Builds go pending -> started -> one of succeeded, failed, errored or aborted")
    )]
    InvalidBuildTransition {
        build: u64,
        from: String,
        to: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Value Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid duration '{value}': {reason}")]
    #[diagnostic(
        code(checkflow::invalid_duration),
        help("Durations look like '30s', '1m0s', '1h30m' or '250ms'")
    )]
    InvalidDuration { value: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/Parsing Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(checkflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Unsupported settings file format: {path}")]
    #[diagnostic(
        code(checkflow::unsupported_settings_format),
        help("Settings files must end in .toml, .yaml or .yml")
    )]
    UnsupportedSettingsFormat { path: PathBuf },

    #[error("IO error: {message}")]
    #[diagnostic(code(checkflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(checkflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(checkflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(checkflow::toml_error))]
    Toml { message: String },
}

impl From<std::io::Error> for CheckflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for CheckflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for CheckflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for CheckflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl CheckflowError {
    /// Create a storage error for a row that should exist but does not
    pub fn missing_row(table: &str, id: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: format!("{} row {} does not exist", table, id),
        }
    }

    /// Whether this error came from a uniqueness constraint
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// Whether a concurrent commit changed a row this one also changed
    pub fn is_transaction_conflict(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. })
    }
}
