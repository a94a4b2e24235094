// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Version histories
//!
//! A scope owns the ordered list of versions discovered for one resource
//! config. It is either exclusive to a single resource or shared by every
//! entity that resolves to the same config.

use crate::config::Version;
use crate::errors::{CheckflowError, CheckflowResult};
use crate::store::{ResourceConfigId, ResourceId, ScopeId, ScopeRow, Store, Tables};

use super::ResourceConfig;

/// Handle to a version history
#[derive(Debug, Clone)]
pub struct ResourceConfigScope {
    store: Store,
    row: ScopeRow,
}

impl ResourceConfigScope {
    pub(crate) fn new(store: Store, row: ScopeRow) -> Self {
        Self { store, row }
    }

    pub fn id(&self) -> ScopeId {
        self.row.id
    }

    pub fn resource_config_id(&self) -> ResourceConfigId {
        self.row.resource_config_id
    }

    /// The owning resource of an exclusive scope
    pub fn resource_id(&self) -> Option<ResourceId> {
        self.row.resource_id
    }

    pub fn is_shared(&self) -> bool {
        self.row.resource_id.is_none()
    }

    pub async fn resource_config(&self) -> CheckflowResult<Option<ResourceConfig>> {
        let id = self.row.resource_config_id;
        let row = self.store.read(|t| t.resource_config(id).cloned());
        Ok(row.map(|row| ResourceConfig::new(self.store.clone(), row)))
    }

    /// Record versions reported by a check, oldest first.
    ///
    /// Re-reporting the current latest version changes nothing. Re-reporting
    /// an older version moves it to the head. Returns whether any version
    /// was new to this scope.
    pub async fn save_versions(&self, versions: &[Version]) -> CheckflowResult<bool> {
        let scope_id = self.row.id;
        let mut tx = self.store.begin();

        let mut check_order = tx
            .scope(scope_id)
            .ok_or_else(|| CheckflowError::missing_row("resource_config_scopes", scope_id))?
            .last_check_order;
        let mut added = false;

        for version in versions {
            let latest = tx.latest_version(scope_id).map(|v| v.id);
            let existing = tx.version_by_digest(scope_id, &version.digest()).map(|v| v.id);

            match existing {
                Some(id) if Some(id) == latest => continue,
                Some(id) => {
                    check_order += 1;
                    tx.set_check_order(id, check_order)?;
                }
                None => {
                    check_order += 1;
                    tx.insert_version(scope_id, version.clone(), check_order)?;
                    added = true;
                }
            }
        }

        tx.scope_mut(scope_id)?.last_check_order = check_order;
        tx.commit()?;

        tracing::debug!(
            scope_id = %scope_id,
            reported = versions.len(),
            added,
            "saved versions"
        );
        Ok(added)
    }

    /// The most recently discovered version
    pub async fn latest_version(&self) -> CheckflowResult<Option<Version>> {
        let scope_id = self.row.id;
        Ok(self
            .store
            .read(|t| t.latest_version(scope_id).map(|v| v.version.clone())))
    }

    /// Every version in discovery order, oldest first
    pub async fn versions(&self) -> CheckflowResult<Vec<Version>> {
        let scope_id = self.row.id;
        Ok(self
            .store
            .read(|t| {
                t.versions(scope_id)
                    .into_iter()
                    .map(|v| v.version.clone())
                    .collect()
            }))
    }
}

/// Find or create the scope `owner` should use for a config.
///
/// An existing shared scope always wins; with no owner the shared scope is
/// created.
pub(crate) fn find_or_create_in(
    tables: &mut Tables,
    resource_config_id: ResourceConfigId,
    owner: Option<ResourceId>,
) -> CheckflowResult<ScopeRow> {
    if let Some(shared) = tables.find_scope(resource_config_id, None) {
        return Ok(shared.clone());
    }
    if let Some(existing) = tables.find_scope(resource_config_id, owner) {
        return Ok(existing.clone());
    }

    let row = tables.insert_scope(resource_config_id, owner)?;
    tracing::debug!(
        scope_id = %row.id,
        resource_config_id = %resource_config_id,
        shared = owner.is_none(),
        "created resource config scope"
    );
    Ok(row)
}
