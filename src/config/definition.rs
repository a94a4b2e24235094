// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Pipeline configuration structures
//!
//! The already-parsed shape of a pipeline's `resources` and
//! `resource_types` sections.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{Params, Source};
use crate::errors::{CheckflowError, CheckflowResult};

/// Generation number of a saved pipeline config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigVersion(pub u64);

impl ConfigVersion {
    /// The version a pipeline gets on its first save
    pub const INITIAL: ConfigVersion = ConfigVersion(1);

    pub fn next(self) -> ConfigVersion {
        ConfigVersion(self.0 + 1)
    }
}

impl std::fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The part of a pipeline config this engine cares about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Declared resources
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,

    /// Declared custom resource types
    #[serde(default)]
    pub resource_types: Vec<ResourceTypeDecl>,
}

impl PipelineConfig {
    /// Parse a pipeline config from YAML
    pub fn from_yaml(yaml: &str) -> CheckflowResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Get a resource type declaration by name
    pub fn resource_type(&self, name: &str) -> Option<&ResourceTypeDecl> {
        self.resource_types.iter().find(|t| t.name == name)
    }

    /// Get a resource declaration by name
    pub fn resource(&self, name: &str) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Reject configs that declare the same resource or resource type twice
    pub fn check_unique_names(&self, pipeline: &str) -> CheckflowResult<()> {
        let mut seen = HashSet::new();
        for resource_type in &self.resource_types {
            if !seen.insert(resource_type.name.as_str()) {
                return Err(CheckflowError::DuplicateResourceType {
                    pipeline: pipeline.to_string(),
                    name: resource_type.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.name.as_str()) {
                return Err(CheckflowError::DuplicateResource {
                    pipeline: pipeline.to_string(),
                    name: resource.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// A resource declared in a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Resource name (unique within the pipeline)
    pub name: String,

    /// Name of a custom resource type or a base type
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Source::is_empty")]
    pub source: Source,

    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,

    /// Worker tags the check must run on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Override for the check interval, e.g. "10m" or "never"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_every: Option<String>,
}

/// A custom resource type declared in a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceTypeDecl {
    /// Type name (unique within the pipeline)
    pub name: String,

    /// Parent type: another declared type or a base type
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default, skip_serializing_if = "Source::is_empty")]
    pub source: Source,

    /// Run the type's containers privileged
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,

    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,

    /// Source fragment inherited by everything built on this type
    #[serde(default, skip_serializing_if = "Source::is_empty")]
    pub defaults: Source,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_every: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}
