// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Custom resource types of a pipeline

use std::sync::Arc;
use std::time::Duration;

use crate::check::{build_check_plan, check_interval, CheckPlan, Checkable};
use crate::config::{BaseTypeDefaults, DefaultsTable, Params, ResourceTypeDecl, Source, Version};
use crate::errors::CheckflowResult;
use crate::graph::{
    effective_source, DeclaredType, TypeGraph, VersionedResourceType, VersionedResourceTypes,
};
use crate::store::{PipelineId, ResourceTypeId, ResourceTypeRow, ScopeId, Store, Tables, TeamId};
use crate::telemetry::TraceContext;

use super::{current_version, resource_config, scope, Build, BuildFactory, BuildOwner, Resource, ResourceConfigScope};

/// Handle to a declared resource type, as loaded from the store
#[derive(Debug, Clone)]
pub struct ResourceType {
    store: Store,
    row: ResourceTypeRow,
    team_id: TeamId,
    version: Option<Version>,
}

impl ResourceType {
    pub(crate) fn load(store: Store, tables: &Tables, row: ResourceTypeRow, team_id: TeamId) -> Self {
        let version = current_version(tables, row.scope_id);
        Self {
            store,
            row,
            team_id,
            version,
        }
    }

    pub fn id(&self) -> ResourceTypeId {
        self.row.id
    }

    pub fn pipeline_id(&self) -> PipelineId {
        self.row.pipeline_id
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    /// The declaration this type was saved with
    pub fn config(&self) -> &ResourceTypeDecl {
        &self.row.config
    }

    pub fn name(&self) -> &str {
        &self.row.config.name
    }

    pub fn type_name(&self) -> &str {
        &self.row.config.type_name
    }

    pub fn source(&self) -> &Source {
        &self.row.config.source
    }

    pub fn defaults(&self) -> &Source {
        &self.row.config.defaults
    }

    pub fn params(&self) -> &Params {
        &self.row.config.params
    }

    pub fn privileged(&self) -> bool {
        self.row.config.privileged
    }

    pub fn tags(&self) -> &[String] {
        &self.row.config.tags
    }

    pub fn check_every(&self) -> Option<&str> {
        self.row.config.check_every.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.row.active
    }

    pub fn resource_config_scope_id(&self) -> Option<ScopeId> {
        self.row.scope_id
    }

    /// Latest version of the type's image, as of the last load
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Refresh from the store. Returns `false` if the row is gone.
    pub async fn reload(&mut self) -> CheckflowResult<bool> {
        let id = self.row.id;
        let loaded = self
            .store
            .read(|t| {
                t.resource_type(id)
                    .map(|row| (row.clone(), current_version(t, row.scope_id)))
            });

        match loaded {
            Some((row, version)) => {
                self.row = row;
                self.version = version;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resolve this type's config and attach its shared scope, atomically.
    ///
    /// The type itself is never part of its own chain, so it is dropped from
    /// `resource_types` before resolving.
    pub async fn set_resource_config(
        &self,
        source: &Source,
        resource_types: &VersionedResourceTypes,
    ) -> CheckflowResult<ResourceConfigScope> {
        let parents = resource_types.without(self.name());

        let (config, scope) = super::find_or_create(&self.store, |tx| {
            let config = resource_config::find_or_create_in(tx, self.type_name(), source, &parents)?;
            let scope = scope::find_or_create_in(tx, config.id, None)?;
            tx.resource_type_mut(self.row.id)?.scope_id = Some(scope.id);
            Ok((config, scope))
        })?;

        tracing::debug!(
            resource_type = self.name(),
            resource_config_id = %config.id,
            scope_id = %scope.id,
            "resource type config set"
        );
        Ok(ResourceConfigScope::new(self.store.clone(), scope))
    }

    /// Point this type at an existing scope
    pub async fn set_resource_config_scope(&self, scope: &ResourceConfigScope) -> CheckflowResult<()> {
        let mut tx = self.store.begin();
        tx.resource_type_mut(self.row.id)?.scope_id = Some(scope.id());
        tx.commit()
    }

    /// How often to check the image, from `check_every` or the configured
    /// default. `None` when periodic checks are disabled.
    pub fn check_interval(&self) -> CheckflowResult<Option<Duration>> {
        check_interval(self.check_every(), self.store.settings().check_interval()?)
    }

    /// Plan a check of this type's image
    pub fn check_plan(
        &self,
        from_version: Option<Version>,
        interval: Duration,
        timeout: Duration,
        resource_types: &ResourceTypes,
        source_defaults: &Source,
    ) -> CheckPlan {
        let (types, defaults) = resource_types.plan_inputs(self, source_defaults);
        build_check_plan(self, from_version, interval, timeout, &types, &defaults)
    }

    /// Plan a periodic check with the configured interval and timeout.
    /// `None` when periodic checks are disabled.
    pub fn scheduled_check_plan(
        &self,
        from_version: Option<Version>,
        resource_types: &ResourceTypes,
        source_defaults: &Source,
    ) -> CheckflowResult<Option<CheckPlan>> {
        let Some(interval) = self.check_interval()? else {
            return Ok(None);
        };
        let timeout = self.store.settings().check_timeout()?;
        Ok(Some(self.check_plan(from_version, interval, timeout, resource_types, source_defaults)))
    }

    /// Create a check build for this type, or return the one in flight
    pub async fn create_build(
        &self,
        context: &TraceContext,
        manually_triggered: bool,
    ) -> CheckflowResult<(Build, bool)> {
        BuildFactory::new(self.store.clone())
            .create_check_build(
                self.team_id,
                self.row.pipeline_id,
                BuildOwner::ResourceType(self.row.id),
                context,
                manually_triggered,
            )
            .await
    }
}

impl DeclaredType for ResourceType {
    fn name(&self) -> &str {
        ResourceType::name(self)
    }

    fn type_name(&self) -> &str {
        ResourceType::type_name(self)
    }

    fn defaults(&self) -> &Source {
        ResourceType::defaults(self)
    }
}

impl Checkable for ResourceType {
    fn name(&self) -> &str {
        ResourceType::name(self)
    }

    fn type_name(&self) -> &str {
        ResourceType::type_name(self)
    }

    fn source(&self) -> &Source {
        ResourceType::source(self)
    }

    fn tags(&self) -> &[String] {
        ResourceType::tags(self)
    }

    fn is_resource_type(&self) -> bool {
        true
    }
}

/// The active resource types of one pipeline
#[derive(Debug, Clone)]
pub struct ResourceTypes {
    types: Vec<ResourceType>,
    base_type_defaults: Arc<BaseTypeDefaults>,
}

impl ResourceTypes {
    pub(crate) fn new(types: Vec<ResourceType>, base_type_defaults: Arc<BaseTypeDefaults>) -> Self {
        Self {
            types,
            base_type_defaults,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResourceType> {
        self.types.iter().find(|t| t.name() == name)
    }

    /// Ancestor chain of `resource`'s type, nearest first
    pub fn filter(&self, resource: &Resource) -> Vec<ResourceType> {
        TypeGraph::build(&self.types)
            .chain_for_resource(resource.type_name())
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every type with its merged source and current version.
    ///
    /// Base type defaults are read once, at call time.
    pub fn deserialize(&self) -> VersionedResourceTypes {
        self.deserialize_with(&self.base_type_defaults.snapshot())
    }

    /// Versioned types and the fallback source for a check of `entity`,
    /// both read from one base type defaults snapshot.
    ///
    /// The fallback is the entity's effective source (chain defaults, then
    /// base type defaults) layered over `source_defaults`.
    pub(crate) fn plan_inputs<E: Checkable + ?Sized>(
        &self,
        entity: &E,
        source_defaults: &Source,
    ) -> (VersionedResourceTypes, Source) {
        let defaults = self.base_type_defaults.snapshot();
        let types = self.deserialize_with(&defaults);

        let graph = TypeGraph::build(types.as_slice());
        let chain = if entity.is_resource_type() {
            graph.chain_for_type(entity.name(), entity.type_name())
        } else {
            graph.chain_for_resource(entity.type_name())
        };
        let source = effective_source(entity.source(), entity.type_name(), &chain, &defaults)
            .with_defaults(source_defaults);

        (types, source)
    }

    fn deserialize_with(&self, defaults: &DefaultsTable) -> VersionedResourceTypes {
        let decls: Vec<ResourceTypeDecl> = self.types.iter().map(|t| t.config().clone()).collect();
        let resolved = VersionedResourceTypes::resolve(&decls, defaults);

        VersionedResourceTypes::new(
            resolved
                .iter()
                .zip(&self.types)
                .map(|(resolved, loaded)| VersionedResourceType {
                    version: loaded.version.clone(),
                    ..resolved.clone()
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl<'a> IntoIterator for &'a ResourceTypes {
    type Item = &'a ResourceType;
    type IntoIter = std::slice::Iter<'a, ResourceType>;

    fn into_iter(self) -> Self::IntoIter {
        self.types.iter()
    }
}

impl std::ops::Index<usize> for ResourceTypes {
    type Output = ResourceType;

    fn index(&self, index: usize) -> &ResourceType {
        &self.types[index]
    }
}
