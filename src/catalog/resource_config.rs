// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Content-addressed resource configs
//!
//! A resource config is the identity of "what a check looks at": the base
//! type it ultimately runs on, every custom type image in between, and the
//! effective source. Identical inputs always resolve to the same row, no
//! matter which pipeline or resource asks.

use blake3::Hasher;

use crate::config::Source;
use crate::errors::CheckflowResult;
use crate::graph::{base_type, TypeGraph, VersionedResourceTypes};
use crate::store::{ConfigOrigin, ResourceConfigId, ResourceConfigRow, Store, Tables};

use super::{scope, Resource, ResourceConfigScope};

/// Handle to a resource config
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    store: Store,
    row: ResourceConfigRow,
}

impl ResourceConfig {
    pub(crate) fn new(store: Store, row: ResourceConfigRow) -> Self {
        Self { store, row }
    }

    pub fn id(&self) -> ResourceConfigId {
        self.row.id
    }

    pub fn origin(&self) -> ConfigOrigin {
        self.row.origin
    }

    pub fn source(&self) -> &Source {
        &self.row.source
    }

    /// Identity digest
    pub fn digest(&self) -> &str {
        &self.row.digest
    }

    /// Find or create the version history for this config.
    ///
    /// `None` asks for the shared scope. A resource gets its own exclusive
    /// scope unless a shared one already exists.
    pub async fn find_or_create_scope(
        &self,
        owner: Option<&Resource>,
    ) -> CheckflowResult<ResourceConfigScope> {
        let owner = owner.map(Resource::id);
        let row = super::find_or_create(&self.store, |tx| {
            scope::find_or_create_in(tx, self.row.id, owner)
        })?;
        Ok(ResourceConfigScope::new(self.store.clone(), row))
    }
}

/// Looks up or creates resource configs
#[derive(Debug, Clone)]
pub struct ResourceConfigFactory {
    store: Store,
}

impl ResourceConfigFactory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Resolve the config for a `type_name` entity with the given effective
    /// source, creating it and every ancestor type's config as needed.
    pub async fn find_or_create_resource_config(
        &self,
        type_name: &str,
        source: &Source,
        resource_types: &VersionedResourceTypes,
    ) -> CheckflowResult<ResourceConfig> {
        let row = super::find_or_create(&self.store, |tx| {
            find_or_create_in(tx, type_name, source, resource_types)
        })?;
        Ok(ResourceConfig::new(self.store.clone(), row))
    }

    pub async fn find_resource_config_by_id(
        &self,
        id: ResourceConfigId,
    ) -> CheckflowResult<Option<ResourceConfig>> {
        let row = self.store.read(|t| t.resource_config(id).cloned());
        Ok(row.map(|row| ResourceConfig::new(self.store.clone(), row)))
    }
}

/// Fold the type chain from the base upward, one config per level
pub(crate) fn find_or_create_in(
    tables: &mut Tables,
    type_name: &str,
    source: &Source,
    resource_types: &VersionedResourceTypes,
) -> CheckflowResult<ResourceConfigRow> {
    let graph = TypeGraph::build(resource_types.as_slice());
    let chain = graph.chain_for_resource(type_name);

    let base = tables.find_or_insert_base_resource_type(base_type(&chain, type_name))?;
    let mut origin = ConfigOrigin::BaseType(base.id);
    let mut origin_key = format!("base:{}", base.name);

    for ancestor in chain.iter().rev() {
        let parent = find_or_create_row(tables, origin, &origin_key, &ancestor.resource_type.source)?;
        origin = ConfigOrigin::CustomType(parent.id);
        origin_key = format!("custom:{}", parent.digest);
    }

    find_or_create_row(tables, origin, &origin_key, source)
}

fn find_or_create_row(
    tables: &mut Tables,
    origin: ConfigOrigin,
    origin_key: &str,
    source: &Source,
) -> CheckflowResult<ResourceConfigRow> {
    let digest = config_digest(origin_key, source)?;

    if let Some(existing) = tables.resource_config_by_digest(&digest) {
        return Ok(existing.clone());
    }

    let row = tables.insert_resource_config(origin, source.clone(), digest)?;
    tracing::debug!(
        resource_config_id = %row.id,
        origin = origin_key,
        "created resource config"
    );
    Ok(row)
}

/// BLAKE3 over the origin identity and the canonical source JSON
fn config_digest(origin_key: &str, source: &Source) -> CheckflowResult<String> {
    let mut hasher = Hasher::new();
    hasher.update(&(origin_key.len() as u64).to_le_bytes());
    hasher.update(origin_key.as_bytes());
    hasher.update(source.canonical_json()?.as_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}
