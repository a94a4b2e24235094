// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Check plans
//!
//! A check plan is everything a worker needs to run one check: the type to
//! run, the fully merged source, and the versioned resource types needed to
//! fetch any custom type images.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{Source, Version};
use crate::errors::CheckflowResult;
use crate::graph::{DeclaredType, TypeGraph, VersionedResourceTypes};
use crate::utils::duration::{format_duration, parse_duration};

/// `check_every` value that disables periodic checks
pub const NEVER: &str = "never";

/// Anything that can be checked
pub trait Checkable {
    fn name(&self) -> &str;

    /// Declared type: a custom type name or a base type
    fn type_name(&self) -> &str;

    fn source(&self) -> &Source;

    fn tags(&self) -> &[String];

    /// Custom resource types check their own image; resources check
    /// external state
    fn is_resource_type(&self) -> bool;
}

/// Scheduling descriptor for one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPlan {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    pub source: Source,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version: Option<Version>,

    /// Duration string, e.g. "1m0s"
    pub interval: String,

    /// Duration string, e.g. "1h0m0s"
    pub timeout: String,

    #[serde(default)]
    pub versioned_resource_types: VersionedResourceTypes,

    /// Set when checking a resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Set when checking a custom resource type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

/// Build the check plan for `entity`.
///
/// The entity's own source wins over its ancestors' `defaults`, which win
/// over `external_defaults`.
pub fn build_check_plan<E: Checkable + ?Sized>(
    entity: &E,
    from_version: Option<Version>,
    interval: Duration,
    timeout: Duration,
    resource_types: &VersionedResourceTypes,
    external_defaults: &Source,
) -> CheckPlan {
    let graph = TypeGraph::build(resource_types.as_slice());
    let ancestors = if entity.is_resource_type() {
        graph.chain_for_type(entity.name(), entity.type_name())
    } else {
        graph.chain_for_resource(entity.type_name())
    };

    let mut source = entity.source().clone();
    for ancestor in &ancestors {
        source = source.with_defaults(ancestor.defaults());
    }

    let owner = entity.name().to_string();
    let (resource, resource_type) = if entity.is_resource_type() {
        (None, Some(owner))
    } else {
        (Some(owner), None)
    };

    CheckPlan {
        name: entity.name().to_string(),
        type_name: entity.type_name().to_string(),
        source: source.with_defaults(external_defaults),
        tags: entity.tags().to_vec(),
        from_version,
        interval: format_duration(interval),
        timeout: format_duration(timeout),
        versioned_resource_types: resource_types.clone(),
        resource,
        resource_type,
    }
}

/// How often to check, given a `check_every` override.
///
/// `None` means periodic checks are disabled.
pub fn check_interval(check_every: Option<&str>, default: Duration) -> CheckflowResult<Option<Duration>> {
    match check_every {
        None | Some("") => Ok(Some(default)),
        Some(NEVER) => Ok(None),
        Some(value) => parse_duration(value).map(Some),
    }
}
