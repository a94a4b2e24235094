// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Saved pipelines

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{ConfigVersion, ResourceDecl, ResourceTypeDecl};
use crate::errors::CheckflowResult;
use crate::store::{PipelineId, PipelineRow, Store, Tables, TeamId};

use super::{Resource, ResourceType, ResourceTypes};

/// Handle to a saved pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    store: Store,
    row: PipelineRow,
}

impl Pipeline {
    pub(crate) fn new(store: Store, row: PipelineRow) -> Self {
        Self { store, row }
    }

    pub fn id(&self) -> PipelineId {
        self.row.id
    }

    pub fn name(&self) -> &str {
        &self.row.name
    }

    pub fn team_id(&self) -> TeamId {
        self.row.team_id
    }

    pub fn config_version(&self) -> ConfigVersion {
        self.row.config_version
    }

    pub fn paused(&self) -> bool {
        self.row.paused
    }

    pub async fn reload(&mut self) -> CheckflowResult<bool> {
        let id = self.row.id;
        match self.store.read(|t| t.pipeline(id).cloned()) {
            Some(row) => {
                self.row = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Active resource types, oldest first
    pub async fn resource_types(&self) -> CheckflowResult<ResourceTypes> {
        let (id, team_id) = (self.row.id, self.row.team_id);
        let types = self
            .store
            .read(|t| {
                t.resource_types(id)
                    .filter(|row| row.active)
                    .map(|row| ResourceType::load(self.store.clone(), t, row.clone(), team_id))
                    .collect()
            });

        Ok(ResourceTypes::new(
            types,
            Arc::clone(self.store.base_type_defaults()),
        ))
    }

    /// An active resource type by name
    pub async fn resource_type(&self, name: &str) -> CheckflowResult<Option<ResourceType>> {
        let (id, team_id) = (self.row.id, self.row.team_id);
        Ok(self
            .store
            .read(|t| {
                t.resource_type_by_name(id, name)
                    .filter(|row| row.active)
                    .map(|row| ResourceType::load(self.store.clone(), t, row.clone(), team_id))
            }))
    }

    /// Active resources, oldest first
    pub async fn resources(&self) -> CheckflowResult<Vec<Resource>> {
        let (id, team_id) = (self.row.id, self.row.team_id);
        Ok(self
            .store
            .read(|t| {
                t.resources(id)
                    .filter(|row| row.active)
                    .map(|row| Resource::new(self.store.clone(), row.clone(), team_id))
                    .collect()
            }))
    }

    /// An active resource by name
    pub async fn resource(&self, name: &str) -> CheckflowResult<Option<Resource>> {
        let (id, team_id) = (self.row.id, self.row.team_id);
        Ok(self
            .store
            .read(|t| {
                t.resource_by_name(id, name)
                    .filter(|row| row.active)
                    .map(|row| Resource::new(self.store.clone(), row.clone(), team_id))
            }))
    }
}

/// Upsert declared types, deactivate the rest
pub(crate) fn sync_resource_types(
    tables: &mut Tables,
    pipeline_id: PipelineId,
    declared: &[ResourceTypeDecl],
) -> CheckflowResult<()> {
    let names: HashSet<&str> = declared.iter().map(|d| d.name.as_str()).collect();
    let stale: Vec<_> = tables
        .resource_types(pipeline_id)
        .filter(|row| row.active && !names.contains(row.config.name.as_str()))
        .map(|row| row.id)
        .collect();

    for id in stale {
        tables.resource_type_mut(id)?.active = false;
    }

    for decl in declared {
        match tables.resource_type_by_name(pipeline_id, &decl.name).map(|row| row.id) {
            Some(id) => {
                let row = tables.resource_type_mut(id)?;
                // A new identity needs a new scope; the old history stays put
                if row.config.type_name != decl.type_name || row.config.source != decl.source {
                    row.scope_id = None;
                }
                row.config = decl.clone();
                row.active = true;
            }
            None => {
                tables.insert_resource_type(pipeline_id, decl.clone())?;
            }
        }
    }

    Ok(())
}

/// Upsert declared resources, deactivate the rest
pub(crate) fn sync_resources(
    tables: &mut Tables,
    pipeline_id: PipelineId,
    declared: &[ResourceDecl],
) -> CheckflowResult<()> {
    let names: HashSet<&str> = declared.iter().map(|d| d.name.as_str()).collect();
    let stale: Vec<_> = tables
        .resources(pipeline_id)
        .filter(|row| row.active && !names.contains(row.config.name.as_str()))
        .map(|row| row.id)
        .collect();

    for id in stale {
        tables.resource_mut(id)?.active = false;
    }

    for decl in declared {
        match tables.resource_by_name(pipeline_id, &decl.name).map(|row| row.id) {
            Some(id) => {
                let row = tables.resource_mut(id)?;
                if row.config.type_name != decl.type_name || row.config.source != decl.source {
                    row.scope_id = None;
                }
                row.config = decl.clone();
                row.active = true;
            }
            None => {
                tables.insert_resource(pipeline_id, decl.clone())?;
            }
        }
    }

    Ok(())
}
