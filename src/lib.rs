// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! # checkflow - Resource Type Resolution for CI Pipelines
//!
//! `checkflow` is the part of a CI control plane that decides what a
//! resource check looks at and records what it found.
//!
//! ## Features
//!
//! - **Type chains** - Resolve custom resource types down to a base type,
//!   terminating on self-reference and cycles
//! - **Default merging** - Own source over ancestor `defaults` over
//!   operator-configured base type defaults
//! - **Config deduplication** - Identical effective configs share one
//!   content-addressed version history
//! - **Check plans and builds** - Deterministic descriptors for the
//!   scheduler, with trace context carried on every build
//!
//! ## Quick Start
//!
//! ```no_run
//! use checkflow::{ConfigVersion, PipelineConfig, Store, Team, TraceContext};
//!
//! # async fn example() -> checkflow::CheckflowResult<()> {
//! let store = Store::new();
//! let team = Team::find_or_create(&store, "main").await?;
//!
//! let config = PipelineConfig::from_yaml(r#"
//! resources:
//!   - name: repo
//!     type: git
//!     source: { uri: "https://example.com/repo.git" }
//! "#)?;
//! let (pipeline, _) = team.save_pipeline("ci", &config, ConfigVersion::default(), false).await?;
//!
//! let Some(resource) = pipeline.resource("repo").await? else { return Ok(()) };
//! let types = pipeline.resource_types().await?;
//! let scope = resource.set_resource_config(resource.source(), &types.deserialize()).await?;
//! let (build, created) = resource.create_build(&TraceContext::none(), false).await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod check;
pub mod config;
pub mod errors;
pub mod graph;
pub mod store;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types
pub use catalog::{
    Build, BuildFactory, BuildOwner, BuildStatus, Pipeline, Resource, ResourceConfig,
    ResourceConfigFactory, ResourceConfigScope, ResourceType, ResourceTypes, Team,
    CHECK_BUILD_NAME,
};
pub use check::{build_check_plan, CheckPlan};
pub use config::{
    BaseTypeDefaults, ConfigVersion, PipelineConfig, ResourceDecl, ResourceTypeDecl, Settings,
    Source, Version,
};
pub use errors::{CheckflowError, CheckflowResult};
pub use graph::{TypeGraph, VersionedResourceType, VersionedResourceTypes};
pub use store::Store;
pub use telemetry::{Propagator, SpanCarrier, SpanContext, TraceContext, W3cTraceContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub(crate) mod testing {
    //! Shared test fixtures

    use std::sync::Arc;

    use crate::catalog::Team;
    use crate::config::{BaseTypeDefaults, ResourceTypeDecl, Source};
    use crate::store::Store;

    /// Route `tracing` output through the test harness. Safe to call often.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("checkflow=debug")),
            )
            .with_test_writer()
            .try_init();
    }

    /// A store with its own empty base type defaults
    pub fn store() -> Store {
        init_tracing();
        Store::new().with_base_type_defaults(Arc::new(BaseTypeDefaults::new()))
    }

    pub async fn team() -> (Store, Team) {
        let store = store();
        let team = Team::find_or_create(&store, "main").await.unwrap();
        (store, team)
    }

    pub async fn team_with_defaults(defaults: Arc<BaseTypeDefaults>) -> (Store, Team) {
        init_tracing();
        let store = Store::new().with_base_type_defaults(defaults);
        let team = Team::find_or_create(&store, "main").await.unwrap();
        (store, team)
    }

    pub fn decl<'a>(
        name: &str,
        type_name: &str,
        source: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> ResourceTypeDecl {
        ResourceTypeDecl {
            name: name.to_string(),
            type_name: type_name.to_string(),
            source: Source::from_iter(source),
            ..Default::default()
        }
    }
}
