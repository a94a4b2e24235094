// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Table rows and constraint-checked mutations
//!
//! Every write enforces the table's uniqueness constraint and fails with
//! [`CheckflowError::UniqueViolation`] rather than writing a duplicate.
//! Writes are recorded so a transaction can replay them on top of state
//! committed after it began.

use im::OrdMap;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::ops::Range;
use std::sync::Arc;
use std::time::SystemTime;

use super::ids::*;
use crate::catalog::{BuildOwner, BuildStatus};
use crate::config::{ConfigVersion, ResourceDecl, ResourceTypeDecl, Source, Version};
use crate::errors::{CheckflowError, CheckflowResult};
use crate::telemetry::SpanCarrier;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRow {
    pub id: TeamId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRow {
    pub id: PipelineId,
    pub team_id: TeamId,
    pub name: String,
    pub config_version: ConfigVersion,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceTypeRow {
    pub id: ResourceTypeId,
    pub pipeline_id: PipelineId,
    pub config: ResourceTypeDecl,
    pub active: bool,
    pub scope_id: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRow {
    pub id: ResourceId,
    pub pipeline_id: PipelineId,
    pub config: ResourceDecl,
    pub active: bool,
    pub scope_id: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaseResourceTypeRow {
    pub id: BaseResourceTypeId,
    pub name: String,
}

/// What a resource config's image comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    BaseType(BaseResourceTypeId),
    CustomType(ResourceConfigId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfigRow {
    pub id: ResourceConfigId,
    pub origin: ConfigOrigin,
    pub source: Source,
    /// Content digest of (origin identity, source); unique
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeRow {
    pub id: ScopeId,
    pub resource_config_id: ResourceConfigId,
    /// Set for exclusive scopes
    pub resource_id: Option<ResourceId>,
    pub last_check_order: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionRow {
    pub id: VersionId,
    pub scope_id: ScopeId,
    pub version: Version,
    pub digest: String,
    pub check_order: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildRow {
    pub id: BuildId,
    pub name: String,
    pub team_id: TeamId,
    pub pipeline_id: PipelineId,
    pub owner: BuildOwner,
    pub manually_triggered: bool,
    pub status: BuildStatus,
    pub span_context: SpanCarrier,
    pub created_at: SystemTime,
}

#[derive(Debug, Default)]
struct Sequences {
    teams: Sequence,
    pipelines: Sequence,
    resources: Sequence,
    resource_types: Sequence,
    base_resource_types: Sequence,
    resource_configs: Sequence,
    scopes: Sequence,
    versions: Sequence,
    builds: Sequence,
}

/// A row written since the tables were snapshotted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Change {
    Team(TeamId),
    Pipeline(PipelineId),
    ResourceType(ResourceTypeId),
    Resource(ResourceId),
    BaseResourceType(BaseResourceTypeId),
    ResourceConfig(ResourceConfigId),
    Scope(ScopeId),
    Version(VersionId),
    Build(BuildId),
}

/// All tables of the store.
///
/// Maps are persistent, so cloning a `Tables` is cheap and clones share
/// structure until one of them is written. Secondary indexes back every
/// uniqueness constraint and every per-owner lookup.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    sequences: Arc<Sequences>,
    changes: BTreeSet<Change>,

    teams: OrdMap<TeamId, TeamRow>,
    team_names: OrdMap<String, TeamId>,

    pipelines: OrdMap<PipelineId, PipelineRow>,
    pipeline_names: OrdMap<(TeamId, String), PipelineId>,

    resource_types: OrdMap<ResourceTypeId, ResourceTypeRow>,
    resource_type_names: OrdMap<(PipelineId, String), ResourceTypeId>,

    resources: OrdMap<ResourceId, ResourceRow>,
    resource_names: OrdMap<(PipelineId, String), ResourceId>,

    base_resource_types: OrdMap<BaseResourceTypeId, BaseResourceTypeRow>,
    base_resource_type_names: OrdMap<String, BaseResourceTypeId>,

    resource_configs: OrdMap<ResourceConfigId, ResourceConfigRow>,
    resource_config_digests: OrdMap<String, ResourceConfigId>,

    scopes: OrdMap<ScopeId, ScopeRow>,
    scope_owners: OrdMap<(ResourceConfigId, Option<ResourceId>), ScopeId>,

    versions: OrdMap<VersionId, VersionRow>,
    version_digests: OrdMap<(ScopeId, String), VersionId>,
    version_order: OrdMap<(ScopeId, u64), VersionId>,

    builds: OrdMap<BuildId, BuildRow>,
    in_flight_builds: OrdMap<BuildOwner, BuildId>,
}

fn unique(table: &'static str, key: impl Into<String>) -> CheckflowError {
    CheckflowError::UniqueViolation {
        table,
        key: key.into(),
    }
}

/// Point `key` at `id` unless another row already holds it
fn claim<K: Ord + Clone, I: Copy + Eq>(
    index: &mut OrdMap<K, I>,
    key: K,
    id: I,
    table: &'static str,
    display: impl FnOnce() -> String,
) -> CheckflowResult<()> {
    match index.get(&key) {
        Some(holder) if *holder != id => Err(unique(table, display())),
        _ => {
            index.insert(key, id);
            Ok(())
        }
    }
}

/// The row this transaction wrote
fn written<'a, I: Ord + Clone + Display, R: Clone>(
    rows: &'a OrdMap<I, R>,
    table: &'static str,
    id: &I,
) -> CheckflowResult<&'a R> {
    rows.get(id)
        .ok_or_else(|| CheckflowError::missing_row(table, id))
}

/// Fail if a row this transaction updated changed after it was read
fn unchanged<I: Ord + Clone + Display, R: Clone + PartialEq>(
    base: &OrdMap<I, R>,
    current: &OrdMap<I, R>,
    table: &'static str,
    id: &I,
) -> CheckflowResult<()> {
    match base.get(id) {
        Some(before) if current.get(id) != Some(before) => Err(CheckflowError::TransactionConflict {
            table,
            key: id.to_string(),
        }),
        _ => Ok(()),
    }
}

fn pipeline_range(pipeline_id: PipelineId) -> Range<(PipelineId, String)> {
    (pipeline_id, String::new())..(PipelineId(pipeline_id.0.saturating_add(1)), String::new())
}

impl Tables {
    /// Take the set of rows written so far, leaving it empty
    pub(crate) fn take_changes(&mut self) -> BTreeSet<Change> {
        std::mem::take(&mut self.changes)
    }

    /// Re-apply one row written in `working` (which started from `base`) on
    /// top of these newer tables, re-checking every constraint
    pub(crate) fn replay(&mut self, base: &Tables, working: &Tables, change: Change) -> CheckflowResult<()> {
        match change {
            Change::Team(id) => {
                unchanged(&base.teams, &self.teams, "teams", &id)?;
                self.put_team(written(&working.teams, "teams", &id)?.clone())
            }
            Change::Pipeline(id) => {
                unchanged(&base.pipelines, &self.pipelines, "pipelines", &id)?;
                self.put_pipeline(written(&working.pipelines, "pipelines", &id)?.clone())
            }
            Change::ResourceType(id) => {
                unchanged(&base.resource_types, &self.resource_types, "resource_types", &id)?;
                self.put_resource_type(written(&working.resource_types, "resource_types", &id)?.clone())
            }
            Change::Resource(id) => {
                unchanged(&base.resources, &self.resources, "resources", &id)?;
                self.put_resource(written(&working.resources, "resources", &id)?.clone())
            }
            Change::BaseResourceType(id) => {
                unchanged(&base.base_resource_types, &self.base_resource_types, "base_resource_types", &id)?;
                self.put_base_resource_type(
                    written(&working.base_resource_types, "base_resource_types", &id)?.clone(),
                )
            }
            Change::ResourceConfig(id) => {
                unchanged(&base.resource_configs, &self.resource_configs, "resource_configs", &id)?;
                self.put_resource_config(written(&working.resource_configs, "resource_configs", &id)?.clone())
            }
            Change::Scope(id) => {
                unchanged(&base.scopes, &self.scopes, "resource_config_scopes", &id)?;
                self.put_scope(written(&working.scopes, "resource_config_scopes", &id)?.clone())
            }
            Change::Version(id) => {
                unchanged(&base.versions, &self.versions, "resource_config_versions", &id)?;
                self.put_version(written(&working.versions, "resource_config_versions", &id)?.clone())
            }
            Change::Build(id) => {
                unchanged(&base.builds, &self.builds, "builds", &id)?;
                self.put_build(written(&working.builds, "builds", &id)?.clone())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Teams
    // ─────────────────────────────────────────────────────────────────────────

    pub fn team(&self, id: TeamId) -> Option<&TeamRow> {
        self.teams.get(&id)
    }

    pub fn team_by_name(&self, name: &str) -> Option<&TeamRow> {
        self.team_names.get(name).and_then(|id| self.teams.get(id))
    }

    pub fn insert_team(&mut self, name: &str) -> CheckflowResult<TeamRow> {
        let row = TeamRow {
            id: TeamId(self.sequences.teams.next()),
            name: name.to_string(),
        };
        self.put_team(row.clone())?;
        self.changes.insert(Change::Team(row.id));
        Ok(row)
    }

    fn put_team(&mut self, row: TeamRow) -> CheckflowResult<()> {
        claim(&mut self.team_names, row.name.clone(), row.id, "teams", || row.name.clone())?;
        self.teams.insert(row.id, row);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pipelines
    // ─────────────────────────────────────────────────────────────────────────

    pub fn pipeline(&self, id: PipelineId) -> Option<&PipelineRow> {
        self.pipelines.get(&id)
    }

    pub fn pipeline_by_name(&self, team_id: TeamId, name: &str) -> Option<&PipelineRow> {
        self.pipeline_names
            .get(&(team_id, name.to_string()))
            .and_then(|id| self.pipelines.get(id))
    }

    pub fn pipeline_mut(&mut self, id: PipelineId) -> CheckflowResult<&mut PipelineRow> {
        let row = self
            .pipelines
            .get_mut(&id)
            .ok_or_else(|| CheckflowError::missing_row("pipelines", id))?;
        self.changes.insert(Change::Pipeline(id));
        Ok(row)
    }

    pub fn insert_pipeline(
        &mut self,
        team_id: TeamId,
        name: &str,
        paused: bool,
    ) -> CheckflowResult<PipelineRow> {
        let row = PipelineRow {
            id: PipelineId(self.sequences.pipelines.next()),
            team_id,
            name: name.to_string(),
            config_version: ConfigVersion::INITIAL,
            paused,
        };
        self.put_pipeline(row.clone())?;
        self.changes.insert(Change::Pipeline(row.id));
        Ok(row)
    }

    fn put_pipeline(&mut self, row: PipelineRow) -> CheckflowResult<()> {
        claim(
            &mut self.pipeline_names,
            (row.team_id, row.name.clone()),
            row.id,
            "pipelines",
            || format!("{}/{}", row.team_id, row.name),
        )?;
        self.pipelines.insert(row.id, row);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resource types
    // ─────────────────────────────────────────────────────────────────────────

    /// All resource types of a pipeline, active or not, in creation order
    pub fn resource_types(&self, pipeline_id: PipelineId) -> impl Iterator<Item = &ResourceTypeRow> {
        let mut ids: Vec<ResourceTypeId> = self
            .resource_type_names
            .range(pipeline_range(pipeline_id))
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(move |id| self.resource_types.get(&id))
    }

    pub fn resource_type(&self, id: ResourceTypeId) -> Option<&ResourceTypeRow> {
        self.resource_types.get(&id)
    }

    pub fn resource_type_by_name(
        &self,
        pipeline_id: PipelineId,
        name: &str,
    ) -> Option<&ResourceTypeRow> {
        self.resource_type_names
            .get(&(pipeline_id, name.to_string()))
            .and_then(|id| self.resource_types.get(id))
    }

    /// Mutable access for fields outside the name key
    pub fn resource_type_mut(&mut self, id: ResourceTypeId) -> CheckflowResult<&mut ResourceTypeRow> {
        let row = self
            .resource_types
            .get_mut(&id)
            .ok_or_else(|| CheckflowError::missing_row("resource_types", id))?;
        self.changes.insert(Change::ResourceType(id));
        Ok(row)
    }

    pub fn insert_resource_type(
        &mut self,
        pipeline_id: PipelineId,
        config: ResourceTypeDecl,
    ) -> CheckflowResult<ResourceTypeId> {
        let id = ResourceTypeId(self.sequences.resource_types.next());
        self.put_resource_type(ResourceTypeRow {
            id,
            pipeline_id,
            config,
            active: true,
            scope_id: None,
        })?;
        self.changes.insert(Change::ResourceType(id));
        Ok(id)
    }

    fn put_resource_type(&mut self, row: ResourceTypeRow) -> CheckflowResult<()> {
        claim(
            &mut self.resource_type_names,
            (row.pipeline_id, row.config.name.clone()),
            row.id,
            "resource_types",
            || format!("{}/{}", row.pipeline_id, row.config.name),
        )?;
        self.resource_types.insert(row.id, row);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    /// All resources of a pipeline, active or not, in creation order
    pub fn resources(&self, pipeline_id: PipelineId) -> impl Iterator<Item = &ResourceRow> {
        let mut ids: Vec<ResourceId> = self
            .resource_names
            .range(pipeline_range(pipeline_id))
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(move |id| self.resources.get(&id))
    }

    pub fn resource(&self, id: ResourceId) -> Option<&ResourceRow> {
        self.resources.get(&id)
    }

    pub fn resource_by_name(&self, pipeline_id: PipelineId, name: &str) -> Option<&ResourceRow> {
        self.resource_names
            .get(&(pipeline_id, name.to_string()))
            .and_then(|id| self.resources.get(id))
    }

    /// Mutable access for fields outside the name key
    pub fn resource_mut(&mut self, id: ResourceId) -> CheckflowResult<&mut ResourceRow> {
        let row = self
            .resources
            .get_mut(&id)
            .ok_or_else(|| CheckflowError::missing_row("resources", id))?;
        self.changes.insert(Change::Resource(id));
        Ok(row)
    }

    pub fn insert_resource(
        &mut self,
        pipeline_id: PipelineId,
        config: ResourceDecl,
    ) -> CheckflowResult<ResourceId> {
        let id = ResourceId(self.sequences.resources.next());
        self.put_resource(ResourceRow {
            id,
            pipeline_id,
            config,
            active: true,
            scope_id: None,
        })?;
        self.changes.insert(Change::Resource(id));
        Ok(id)
    }

    fn put_resource(&mut self, row: ResourceRow) -> CheckflowResult<()> {
        claim(
            &mut self.resource_names,
            (row.pipeline_id, row.config.name.clone()),
            row.id,
            "resources",
            || format!("{}/{}", row.pipeline_id, row.config.name),
        )?;
        self.resources.insert(row.id, row);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Base resource types and resource configs
    // ─────────────────────────────────────────────────────────────────────────

    pub fn base_resource_type(&self, id: BaseResourceTypeId) -> Option<&BaseResourceTypeRow> {
        self.base_resource_types.get(&id)
    }

    pub fn find_or_insert_base_resource_type(&mut self, name: &str) -> CheckflowResult<BaseResourceTypeRow> {
        if let Some(existing) = self
            .base_resource_type_names
            .get(name)
            .and_then(|id| self.base_resource_types.get(id))
        {
            return Ok(existing.clone());
        }
        let row = BaseResourceTypeRow {
            id: BaseResourceTypeId(self.sequences.base_resource_types.next()),
            name: name.to_string(),
        };
        self.put_base_resource_type(row.clone())?;
        self.changes.insert(Change::BaseResourceType(row.id));
        Ok(row)
    }

    fn put_base_resource_type(&mut self, row: BaseResourceTypeRow) -> CheckflowResult<()> {
        claim(
            &mut self.base_resource_type_names,
            row.name.clone(),
            row.id,
            "base_resource_types",
            || row.name.clone(),
        )?;
        self.base_resource_types.insert(row.id, row);
        Ok(())
    }

    pub fn resource_config(&self, id: ResourceConfigId) -> Option<&ResourceConfigRow> {
        self.resource_configs.get(&id)
    }

    pub fn resource_config_by_digest(&self, digest: &str) -> Option<&ResourceConfigRow> {
        self.resource_config_digests
            .get(digest)
            .and_then(|id| self.resource_configs.get(id))
    }

    pub fn resource_config_count(&self) -> usize {
        self.resource_configs.len()
    }

    pub fn insert_resource_config(
        &mut self,
        origin: ConfigOrigin,
        source: Source,
        digest: String,
    ) -> CheckflowResult<ResourceConfigRow> {
        let row = ResourceConfigRow {
            id: ResourceConfigId(self.sequences.resource_configs.next()),
            origin,
            source,
            digest,
        };
        self.put_resource_config(row.clone())?;
        self.changes.insert(Change::ResourceConfig(row.id));
        Ok(row)
    }

    fn put_resource_config(&mut self, row: ResourceConfigRow) -> CheckflowResult<()> {
        claim(
            &mut self.resource_config_digests,
            row.digest.clone(),
            row.id,
            "resource_configs",
            || row.digest.clone(),
        )?;
        self.resource_configs.insert(row.id, row);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scopes and versions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn scope(&self, id: ScopeId) -> Option<&ScopeRow> {
        self.scopes.get(&id)
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> CheckflowResult<&mut ScopeRow> {
        let row = self
            .scopes
            .get_mut(&id)
            .ok_or_else(|| CheckflowError::missing_row("resource_config_scopes", id))?;
        self.changes.insert(Change::Scope(id));
        Ok(row)
    }

    /// The shared scope (`resource_id == None`) or a resource's exclusive scope
    pub fn find_scope(
        &self,
        resource_config_id: ResourceConfigId,
        resource_id: Option<ResourceId>,
    ) -> Option<&ScopeRow> {
        self.scope_owners
            .get(&(resource_config_id, resource_id))
            .and_then(|id| self.scopes.get(id))
    }

    pub fn insert_scope(
        &mut self,
        resource_config_id: ResourceConfigId,
        resource_id: Option<ResourceId>,
    ) -> CheckflowResult<ScopeRow> {
        let row = ScopeRow {
            id: ScopeId(self.sequences.scopes.next()),
            resource_config_id,
            resource_id,
            last_check_order: 0,
        };
        self.put_scope(row.clone())?;
        self.changes.insert(Change::Scope(row.id));
        Ok(row)
    }

    fn put_scope(&mut self, row: ScopeRow) -> CheckflowResult<()> {
        claim(
            &mut self.scope_owners,
            (row.resource_config_id, row.resource_id),
            row.id,
            "resource_config_scopes",
            || {
                let owner = row
                    .resource_id
                    .map_or_else(|| "shared".to_string(), |r| r.to_string());
                format!("{}/{}", row.resource_config_id, owner)
            },
        )?;
        self.scopes.insert(row.id, row);
        Ok(())
    }

    /// A scope's versions in discovery order
    pub fn versions(&self, scope_id: ScopeId) -> Vec<&VersionRow> {
        self.version_order
            .range((scope_id, 0)..=(scope_id, u64::MAX))
            .filter_map(|(_, id)| self.versions.get(id))
            .collect()
    }

    pub fn latest_version(&self, scope_id: ScopeId) -> Option<&VersionRow> {
        self.version_order
            .range((scope_id, 0)..=(scope_id, u64::MAX))
            .next_back()
            .and_then(|(_, id)| self.versions.get(id))
    }

    pub fn version_by_digest(&self, scope_id: ScopeId, digest: &str) -> Option<&VersionRow> {
        self.version_digests
            .get(&(scope_id, digest.to_string()))
            .and_then(|id| self.versions.get(id))
    }

    /// Give an existing version a new check order
    pub fn set_check_order(&mut self, id: VersionId, check_order: u64) -> CheckflowResult<()> {
        let mut row = self
            .versions
            .get(&id)
            .cloned()
            .ok_or_else(|| CheckflowError::missing_row("resource_config_versions", id))?;
        row.check_order = check_order;
        self.put_version(row)?;
        self.changes.insert(Change::Version(id));
        Ok(())
    }

    pub fn insert_version(
        &mut self,
        scope_id: ScopeId,
        version: Version,
        check_order: u64,
    ) -> CheckflowResult<VersionId> {
        let id = VersionId(self.sequences.versions.next());
        let digest = version.digest();
        self.put_version(VersionRow {
            id,
            scope_id,
            version,
            digest,
            check_order,
        })?;
        self.changes.insert(Change::Version(id));
        Ok(id)
    }

    fn put_version(&mut self, row: VersionRow) -> CheckflowResult<()> {
        claim(
            &mut self.version_digests,
            (row.scope_id, row.digest.clone()),
            row.id,
            "resource_config_versions",
            || format!("{}/{}", row.scope_id, row.digest),
        )?;
        if let Some(previous) = self.versions.get(&row.id) {
            self.version_order
                .remove(&(previous.scope_id, previous.check_order));
        }
        self.version_order
            .insert((row.scope_id, row.check_order), row.id);
        self.versions.insert(row.id, row);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builds
    // ─────────────────────────────────────────────────────────────────────────

    pub fn build(&self, id: BuildId) -> Option<&BuildRow> {
        self.builds.get(&id)
    }

    /// The owner's check build that has not completed yet, if any
    pub fn in_flight_check_build(&self, owner: BuildOwner) -> Option<&BuildRow> {
        self.in_flight_builds
            .get(&owner)
            .and_then(|id| self.builds.get(id))
    }

    /// Insert a pending build. At most one in-flight build per owner.
    pub fn insert_build(
        &mut self,
        name: &str,
        team_id: TeamId,
        pipeline_id: PipelineId,
        owner: BuildOwner,
        manually_triggered: bool,
        span_context: SpanCarrier,
    ) -> CheckflowResult<BuildRow> {
        let row = BuildRow {
            id: BuildId(self.sequences.builds.next()),
            name: name.to_string(),
            team_id,
            pipeline_id,
            owner,
            manually_triggered,
            status: BuildStatus::Pending,
            span_context,
            created_at: SystemTime::now(),
        };
        self.put_build(row.clone())?;
        self.changes.insert(Change::Build(row.id));
        Ok(row)
    }

    pub fn set_build_status(&mut self, id: BuildId, status: BuildStatus) -> CheckflowResult<BuildRow> {
        let mut row = self
            .builds
            .get(&id)
            .cloned()
            .ok_or_else(|| CheckflowError::missing_row("builds", id))?;
        row.status = status;
        self.put_build(row.clone())?;
        self.changes.insert(Change::Build(id));
        Ok(row)
    }

    fn put_build(&mut self, row: BuildRow) -> CheckflowResult<()> {
        if row.status.is_completed() {
            if self.in_flight_builds.get(&row.owner) == Some(&row.id) {
                self.in_flight_builds.remove(&row.owner);
            }
        } else {
            claim(
                &mut self.in_flight_builds,
                row.owner,
                row.id,
                "builds",
                || row.owner.to_string(),
            )?;
        }
        self.builds.insert(row.id, row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_never_reuse_ids() {
        let mut tables = Tables::default();
        let a = tables.insert_team("a").unwrap();
        let b = tables.insert_team("b").unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.id > a.id);
    }

    #[test]
    fn test_unique_constraints() {
        let mut tables = Tables::default();
        let team = tables.insert_team("main").unwrap();
        assert!(tables.insert_team("main").unwrap_err().is_unique_violation());

        let pipeline = tables.insert_pipeline(team.id, "p", false).unwrap();
        assert!(tables
            .insert_pipeline(team.id, "p", false)
            .unwrap_err()
            .is_unique_violation());

        let base = tables.find_or_insert_base_resource_type("git").unwrap();
        assert_eq!(tables.find_or_insert_base_resource_type("git").unwrap().id, base.id);

        let config = tables
            .insert_resource_config(ConfigOrigin::BaseType(base.id), Source::new(), "d".into())
            .unwrap();
        assert!(tables
            .insert_resource_config(ConfigOrigin::BaseType(base.id), Source::new(), "d".into())
            .unwrap_err()
            .is_unique_violation());

        tables.insert_scope(config.id, None).unwrap();
        assert!(tables.insert_scope(config.id, None).unwrap_err().is_unique_violation());

        let rt = ResourceTypeDecl {
            name: "t".into(),
            type_name: "git".into(),
            ..Default::default()
        };
        tables.insert_resource_type(pipeline.id, rt.clone()).unwrap();
        assert!(tables
            .insert_resource_type(pipeline.id, rt)
            .unwrap_err()
            .is_unique_violation());
    }

    #[test]
    fn test_latest_version_follows_check_order() {
        let mut tables = Tables::default();
        let base = tables.find_or_insert_base_resource_type("git").unwrap();
        let config = tables
            .insert_resource_config(ConfigOrigin::BaseType(base.id), Source::new(), "d".into())
            .unwrap();
        let scope = tables.insert_scope(config.id, None).unwrap();

        let v1 = tables
            .insert_version(scope.id, Version::from_iter([("ref", "1")]), 1)
            .unwrap();
        tables
            .insert_version(scope.id, Version::from_iter([("ref", "2")]), 2)
            .unwrap();
        assert_eq!(tables.latest_version(scope.id).unwrap().version.get("ref"), Some("2"));

        tables.set_check_order(v1, 3).unwrap();
        assert_eq!(tables.latest_version(scope.id).unwrap().version.get("ref"), Some("1"));
        assert_eq!(tables.versions(scope.id).len(), 2);
    }

    #[test]
    fn test_versions_stay_within_their_scope() {
        let mut tables = Tables::default();
        let base = tables.find_or_insert_base_resource_type("git").unwrap();
        let config = tables
            .insert_resource_config(ConfigOrigin::BaseType(base.id), Source::new(), "d".into())
            .unwrap();
        let shared = tables.insert_scope(config.id, None).unwrap();
        let exclusive = tables.insert_scope(config.id, Some(ResourceId(9))).unwrap();

        let version = Version::from_iter([("ref", "1")]);
        tables.insert_version(shared.id, version.clone(), 1).unwrap();
        tables.insert_version(exclusive.id, version.clone(), 1).unwrap();
        assert!(tables
            .insert_version(shared.id, version.clone(), 2)
            .unwrap_err()
            .is_unique_violation());

        tables
            .insert_version(exclusive.id, Version::from_iter([("ref", "2")]), 2)
            .unwrap();
        assert_eq!(tables.versions(shared.id).len(), 1);
        assert_eq!(tables.versions(exclusive.id).len(), 2);
        assert_eq!(
            tables.version_by_digest(shared.id, &version.digest()).unwrap().scope_id,
            shared.id
        );
        assert!(tables.latest_version(ScopeId(404)).is_none());
    }

    #[test]
    fn test_in_flight_build_index_follows_status() {
        let mut tables = Tables::default();
        let owner = BuildOwner::Resource(ResourceId(1));
        let insert = |tables: &mut Tables| {
            tables.insert_build(
                "check",
                TeamId(1),
                PipelineId(1),
                owner,
                false,
                SpanCarrier::new(),
            )
        };

        let first = insert(&mut tables).unwrap();
        assert!(insert(&mut tables).unwrap_err().is_unique_violation());
        assert_eq!(tables.in_flight_check_build(owner).unwrap().id, first.id);

        tables.set_build_status(first.id, BuildStatus::Started).unwrap();
        assert_eq!(tables.in_flight_check_build(owner).unwrap().id, first.id);

        tables.set_build_status(first.id, BuildStatus::Failed).unwrap();
        assert!(tables.in_flight_check_build(owner).is_none());
        assert_ne!(insert(&mut tables).unwrap().id, first.id);
    }

    #[test]
    fn test_writes_are_recorded() {
        let mut tables = Tables::default();
        let team = tables.insert_team("main").unwrap();
        let pipeline = tables.insert_pipeline(team.id, "p", false).unwrap();
        tables.pipeline_mut(pipeline.id).unwrap().paused = true;
        assert!(tables.pipeline_mut(PipelineId(404)).is_err());

        let changes = tables.take_changes();
        assert_eq!(
            changes.into_iter().collect::<Vec<_>>(),
            vec![Change::Team(team.id), Change::Pipeline(pipeline.id)]
        );
        assert!(tables.take_changes().is_empty());
    }
}
