// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Check builds

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

use crate::errors::{CheckflowError, CheckflowResult};
use crate::store::{BuildId, BuildRow, PipelineId, ResourceId, ResourceTypeId, Store, TeamId};
use crate::telemetry::{Propagator, SpanCarrier, TraceContext, W3cTraceContext};

/// Name given to every check build. Job builds are numbered, so this never
/// collides with one.
pub const CHECK_BUILD_NAME: &str = "check";

/// Lifecycle state of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Started,
    Succeeded,
    Failed,
    Errored,
    Aborted,
}

impl BuildStatus {
    /// Whether the build has reached a terminal state
    pub fn is_completed(self) -> bool {
        !matches!(self, Self::Pending | Self::Started)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// The entity a check build checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOwner {
    Resource(ResourceId),
    ResourceType(ResourceTypeId),
}

impl std::fmt::Display for BuildOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource(id) => write!(f, "resource:{}", id),
            Self::ResourceType(id) => write!(f, "resource_type:{}", id),
        }
    }
}

/// Creates check builds, one in flight per owner
#[derive(Clone)]
pub struct BuildFactory {
    store: Store,
    propagator: Arc<dyn Propagator>,
}

impl BuildFactory {
    /// Factory that propagates trace context as W3C `traceparent`
    pub fn new(store: Store) -> Self {
        Self {
            store,
            propagator: Arc::new(W3cTraceContext),
        }
    }

    pub fn with_propagator(mut self, propagator: Arc<dyn Propagator>) -> Self {
        self.propagator = propagator;
        self
    }

    /// Create a pending check build for `owner`.
    ///
    /// Returns the owner's in-flight build and `false` instead when one
    /// exists.
    pub async fn create_check_build(
        &self,
        team_id: TeamId,
        pipeline_id: PipelineId,
        owner: BuildOwner,
        context: &TraceContext,
        manually_triggered: bool,
    ) -> CheckflowResult<(Build, bool)> {
        let (row, created) = super::find_or_create(&self.store, |tx| {
            if let Some(existing) = tx.in_flight_check_build(owner) {
                return Ok((existing.clone(), false));
            }

            let mut carrier = SpanCarrier::new();
            self.propagator.inject(context, &mut carrier);

            let row = tx.insert_build(
                CHECK_BUILD_NAME,
                team_id,
                pipeline_id,
                owner,
                manually_triggered,
                carrier,
            )?;
            Ok((row, true))
        })?;

        if !created {
            tracing::debug!(
                build_id = %row.id,
                %owner,
                "check build already in flight"
            );
            return Ok((Build::new(self.store.clone(), row), false));
        }

        tracing::info!(
            build_id = %row.id,
            %owner,
            manually_triggered,
            "created check build"
        );

        Ok((Build::new(self.store.clone(), row), true))
    }

    pub async fn build(&self, id: BuildId) -> CheckflowResult<Option<Build>> {
        let row = self.store.read(|t| t.build(id).cloned());
        Ok(row.map(|row| Build::new(self.store.clone(), row)))
    }
}

/// Handle to a persisted build
#[derive(Debug, Clone)]
pub struct Build {
    store: Store,
    row: BuildRow,
}

impl Build {
    pub(crate) fn new(store: Store, row: BuildRow) -> Self {
        Self { store, row }
    }

    pub fn id(&self) -> BuildId {
        self.row.id
    }

    pub fn name(&self) -> &str {
        &self.row.name
    }

    pub fn team_id(&self) -> TeamId {
        self.row.team_id
    }

    pub fn pipeline_id(&self) -> PipelineId {
        self.row.pipeline_id
    }

    pub fn owner(&self) -> BuildOwner {
        self.row.owner
    }

    pub fn is_manually_triggered(&self) -> bool {
        self.row.manually_triggered
    }

    pub fn status(&self) -> BuildStatus {
        self.row.status
    }

    pub fn created_at(&self) -> SystemTime {
        self.row.created_at
    }

    /// Trace context serialized at creation time
    pub fn span_context(&self) -> &SpanCarrier {
        &self.row.span_context
    }

    /// Restore the creating caller's trace context
    pub fn trace_context(&self, propagator: &dyn Propagator) -> TraceContext {
        propagator.extract(&self.row.span_context)
    }

    /// Refresh from the store. Returns `false` if the build is gone.
    pub async fn reload(&mut self) -> CheckflowResult<bool> {
        let id = self.row.id;
        match self.store.read(|t| t.build(id).cloned()) {
            Some(row) => {
                self.row = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Mark a pending build as started
    pub async fn start(&mut self) -> CheckflowResult<()> {
        self.transition(BuildStatus::Started, |from| from == BuildStatus::Pending)
            .await
    }

    /// Record a terminal status, freeing the owner for a new check build
    pub async fn finish(&mut self, status: BuildStatus) -> CheckflowResult<()> {
        self.transition(status, |from| !from.is_completed() && status.is_completed())
            .await
    }

    async fn transition(
        &mut self,
        to: BuildStatus,
        allowed: impl FnOnce(BuildStatus) -> bool,
    ) -> CheckflowResult<()> {
        let mut tx = self.store.begin();
        let from = tx
            .build(self.row.id)
            .map(|row| row.status)
            .ok_or_else(|| CheckflowError::missing_row("builds", self.row.id))?;

        if !allowed(from) {
            return Err(CheckflowError::InvalidBuildTransition {
                build: self.row.id.0,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let updated = tx.set_build_status(self.row.id, to)?;
        tx.commit()?;

        tracing::debug!(build_id = %updated.id, status = %to, "build status changed");
        self.row = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::SpanContext;

    fn factory() -> BuildFactory {
        BuildFactory::new(Store::new())
    }

    fn owner() -> BuildOwner {
        BuildOwner::ResourceType(ResourceTypeId(1))
    }

    #[tokio::test]
    async fn test_creates_pending_check_build() {
        let (build, created) = factory()
            .create_check_build(TeamId(1), PipelineId(2), owner(), &TraceContext::none(), true)
            .await
            .unwrap();

        assert!(created);
        assert_eq!(build.name(), CHECK_BUILD_NAME);
        assert_eq!(build.team_id(), TeamId(1));
        assert_eq!(build.pipeline_id(), PipelineId(2));
        assert_eq!(build.status(), BuildStatus::Pending);
        assert!(build.is_manually_triggered());
        assert!(build.span_context().is_empty());
    }

    #[tokio::test]
    async fn test_one_in_flight_build_per_owner() {
        let factory = factory();
        let ctx = TraceContext::none();

        let (mut first, _) = factory
            .create_check_build(TeamId(1), PipelineId(1), owner(), &ctx, false)
            .await
            .unwrap();

        let (second, created) = factory
            .create_check_build(TeamId(1), PipelineId(1), owner(), &ctx, false)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id(), first.id());

        // Other owners are independent
        let other = BuildOwner::Resource(ResourceId(1));
        let (_, created) = factory
            .create_check_build(TeamId(1), PipelineId(1), other, &ctx, false)
            .await
            .unwrap();
        assert!(created);

        first.start().await.unwrap();
        let (_, created) = factory
            .create_check_build(TeamId(1), PipelineId(1), owner(), &ctx, false)
            .await
            .unwrap();
        assert!(!created);

        first.finish(BuildStatus::Succeeded).await.unwrap();
        let (third, created) = factory
            .create_check_build(TeamId(1), PipelineId(1), owner(), &ctx, false)
            .await
            .unwrap();
        assert!(created);
        assert_ne!(third.id(), first.id());
    }

    #[tokio::test]
    async fn test_trace_context_round_trips_through_build() {
        let span = SpanContext::new(0x0af7651916cd43dd8448eb211c80319c, 0xb7ad6b7169203331);
        let ctx = TraceContext::with_span(span);

        let (build, _) = factory()
            .create_check_build(TeamId(1), PipelineId(1), owner(), &ctx, false)
            .await
            .unwrap();

        let traceparent = build.span_context().get("traceparent").unwrap();
        assert!(traceparent.contains("0af7651916cd43dd8448eb211c80319c"));
        assert_eq!(build.trace_context(&W3cTraceContext), ctx);
    }

    #[tokio::test]
    async fn test_invalid_transitions_rejected() {
        let (mut build, _) = factory()
            .create_check_build(TeamId(1), PipelineId(1), owner(), &TraceContext::none(), false)
            .await
            .unwrap();

        let err = build.finish(BuildStatus::Started).await.unwrap_err();
        assert!(matches!(err, CheckflowError::InvalidBuildTransition { .. }));

        build.finish(BuildStatus::Aborted).await.unwrap();
        assert!(build.start().await.is_err());

        let mut copy = build.clone();
        assert!(copy.reload().await.unwrap());
        assert_eq!(copy.status(), BuildStatus::Aborted);
    }

    #[tokio::test]
    async fn test_racing_check_builds_keep_one_in_flight() {
        let factory = factory();
        let insert = |tx: &mut crate::store::Transaction| {
            tx.insert_build(
                CHECK_BUILD_NAME,
                TeamId(1),
                PipelineId(1),
                owner(),
                false,
                SpanCarrier::new(),
            )
        };

        let mut first = factory.store.begin();
        let mut second = factory.store.begin();
        let winner = insert(&mut first).unwrap();
        insert(&mut second).unwrap();
        first.commit().unwrap();
        assert!(second.commit().unwrap_err().is_unique_violation());

        let (build, created) = factory
            .create_check_build(TeamId(1), PipelineId(1), owner(), &TraceContext::none(), false)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(build.id(), winner.id);
    }
}
