// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Teams and pipeline saves

use crate::config::{ConfigVersion, PipelineConfig};
use crate::errors::{CheckflowError, CheckflowResult};
use crate::graph::TypeGraph;
use crate::store::{Store, TeamId, TeamRow};

use super::pipeline::{sync_resource_types, sync_resources};
use super::Pipeline;

/// Handle to a team
#[derive(Debug, Clone)]
pub struct Team {
    store: Store,
    row: TeamRow,
}

impl Team {
    pub async fn find(store: &Store, name: &str) -> CheckflowResult<Option<Team>> {
        let row = store.read(|t| t.team_by_name(name).cloned());
        Ok(row.map(|row| Team {
            store: store.clone(),
            row,
        }))
    }

    pub async fn find_or_create(store: &Store, name: &str) -> CheckflowResult<Team> {
        let row = super::find_or_create(store, |tx| match tx.team_by_name(name).cloned() {
            Some(row) => Ok(row),
            None => tx.insert_team(name),
        })?;

        Ok(Team {
            store: store.clone(),
            row,
        })
    }

    pub fn id(&self) -> TeamId {
        self.row.id
    }

    pub fn name(&self) -> &str {
        &self.row.name
    }

    /// Save a pipeline config.
    ///
    /// `from` must match the pipeline's current config version; it is
    /// ignored when the pipeline is new. `paused` applies only to a new
    /// pipeline. Types and resources missing from `config` are deactivated,
    /// never deleted. Returns the saved pipeline and whether it was created.
    pub async fn save_pipeline(
        &self,
        name: &str,
        config: &PipelineConfig,
        from: ConfigVersion,
        paused: bool,
    ) -> CheckflowResult<(Pipeline, bool)> {
        config.check_unique_names(name)?;

        let mut tx = self.store.begin();

        let (row, created) = match tx.pipeline_by_name(self.row.id, name).cloned() {
            None => (tx.insert_pipeline(self.row.id, name, paused)?, true),
            Some(existing) => {
                if existing.config_version != from {
                    return Err(CheckflowError::ConfigVersionConflict {
                        pipeline: name.to_string(),
                        given: from,
                        current: existing.config_version,
                    });
                }
                let row = tx.pipeline_mut(existing.id)?;
                row.config_version = row.config_version.next();
                (row.clone(), false)
            }
        };

        sync_resource_types(&mut tx, row.id, &config.resource_types)?;
        sync_resources(&mut tx, row.id, &config.resources)?;

        if let Err(e) = tx.commit() {
            // A concurrent save of the same pipeline committed first
            let team_id = self.row.id;
            let current = self
                .store
                .read(|t| t.pipeline_by_name(team_id, name).map(|p| p.config_version));
            return Err(match current {
                Some(current) if e.is_unique_violation() || e.is_transaction_conflict() => {
                    CheckflowError::ConfigVersionConflict {
                        pipeline: name.to_string(),
                        given: from,
                        current,
                    }
                }
                _ => e,
            });
        }

        for cycle in TypeGraph::build(&config.resource_types).cycles() {
            tracing::warn!(
                pipeline = name,
                resource_types = ?cycle,
                "resource types depend on each other in a loop"
            );
        }

        tracing::info!(
            team = %self.row.name,
            pipeline = name,
            config_version = %row.config_version,
            created,
            resource_types = config.resource_types.len(),
            resources = config.resources.len(),
            "saved pipeline"
        );

        Ok((Pipeline::new(self.store.clone(), row), created))
    }

    /// A pipeline of this team by name
    pub async fn pipeline(&self, name: &str) -> CheckflowResult<Option<Pipeline>> {
        let team_id = self.row.id;
        let row = self
            .store
            .read(|t| t.pipeline_by_name(team_id, name).cloned());
        Ok(row.map(|row| Pipeline::new(self.store.clone(), row)))
    }
}
