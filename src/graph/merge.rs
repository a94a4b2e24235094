// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Default merging along type chains
//!
//! Precedence, highest first: the entity's own source, then each ancestor's
//! `defaults` (nearest first), then the base type defaults table.

use serde::{Deserialize, Serialize};

use super::{base_type, DeclaredType, TypeGraph};
use crate::config::{DefaultsTable, ResourceTypeDecl, Source, Version};

/// Compute the effective source of an entity from its ancestor chain
pub fn effective_source<T: DeclaredType>(
    own: &Source,
    own_type: &str,
    chain: &[&T],
    base_defaults: &DefaultsTable,
) -> Source {
    let mut merged = own.clone();

    for ancestor in chain {
        merged = merged.with_defaults(ancestor.defaults());
    }

    if let Some(defaults) = base_defaults.get(base_type(chain, own_type)) {
        merged = merged.with_defaults(defaults);
    }

    merged
}

/// A resource type with its merged source and current version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedResourceType {
    #[serde(flatten)]
    pub resource_type: ResourceTypeDecl,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl DeclaredType for VersionedResourceType {
    fn name(&self) -> &str {
        &self.resource_type.name
    }

    fn type_name(&self) -> &str {
        &self.resource_type.type_name
    }

    fn defaults(&self) -> &Source {
        &self.resource_type.defaults
    }
}

/// The resource types visible to one pipeline generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionedResourceTypes(Vec<VersionedResourceType>);

impl VersionedResourceTypes {
    pub fn new(types: Vec<VersionedResourceType>) -> Self {
        Self(types)
    }

    /// Merge every declaration against its own chain
    pub fn resolve(types: &[ResourceTypeDecl], base_defaults: &DefaultsTable) -> Self {
        let graph = TypeGraph::build(types);
        let resolved = types
            .iter()
            .map(|declared| {
                let chain = graph.chain_for_type(&declared.name, &declared.type_name);
                let source = effective_source(
                    &declared.source,
                    &declared.type_name,
                    &chain,
                    base_defaults,
                );
                VersionedResourceType {
                    resource_type: ResourceTypeDecl {
                        source,
                        ..declared.clone()
                    },
                    version: None,
                }
            })
            .collect();
        Self(resolved)
    }

    pub fn lookup(&self, name: &str) -> Option<&VersionedResourceType> {
        self.0.iter().find(|t| t.resource_type.name == name)
    }

    /// Copy without the named type
    pub fn without(&self, name: &str) -> Self {
        Self(
            self.0
                .iter()
                .filter(|t| t.resource_type.name != name)
                .cloned()
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[VersionedResourceType] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VersionedResourceType> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a VersionedResourceTypes {
    type Item = &'a VersionedResourceType;
    type IntoIter = std::slice::Iter<'a, VersionedResourceType>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
