// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Pipeline resources

use std::time::Duration;

use crate::check::{build_check_plan, check_interval, CheckPlan, Checkable};
use crate::config::{Params, ResourceDecl, Source, Version};
use crate::errors::CheckflowResult;
use crate::graph::VersionedResourceTypes;
use crate::store::{PipelineId, ResourceId, ResourceRow, ScopeId, Store, TeamId};
use crate::telemetry::TraceContext;

use super::{resource_config, scope, Build, BuildFactory, BuildOwner, ResourceConfigScope, ResourceTypes};

/// Handle to a declared resource
#[derive(Debug, Clone)]
pub struct Resource {
    store: Store,
    row: ResourceRow,
    team_id: TeamId,
}

impl Resource {
    pub(crate) fn new(store: Store, row: ResourceRow, team_id: TeamId) -> Self {
        Self { store, row, team_id }
    }

    pub fn id(&self) -> ResourceId {
        self.row.id
    }

    pub fn pipeline_id(&self) -> PipelineId {
        self.row.pipeline_id
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn config(&self) -> &ResourceDecl {
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

    pub fn params(&self) -> &Params {
        &self.row.config.params
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

    pub async fn reload(&mut self) -> CheckflowResult<bool> {
        let id = self.row.id;
        match self.store.read(|t| t.resource(id).cloned()) {
            Some(row) => {
                self.row = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resolve this resource's config and attach a scope, atomically.
    ///
    /// The scope is exclusive to this resource unless global resources are
    /// enabled, in which case every resource with the same config shares
    /// one history.
    pub async fn set_resource_config(
        &self,
        source: &Source,
        resource_types: &VersionedResourceTypes,
    ) -> CheckflowResult<ResourceConfigScope> {
        let owner = if self.store.settings().enable_global_resources {
            None
        } else {
            Some(self.row.id)
        };

        let (config, scope) = super::find_or_create(&self.store, |tx| {
            let config = resource_config::find_or_create_in(tx, self.type_name(), source, resource_types)?;
            let scope = scope::find_or_create_in(tx, config.id, owner)?;
            tx.resource_mut(self.row.id)?.scope_id = Some(scope.id);
            Ok((config, scope))
        })?;

        tracing::debug!(
            resource = self.name(),
            resource_config_id = %config.id,
            scope_id = %scope.id,
            "resource config set"
        );
        Ok(ResourceConfigScope::new(self.store.clone(), scope))
    }

    pub async fn set_resource_config_scope(&self, scope: &ResourceConfigScope) -> CheckflowResult<()> {
        let mut tx = self.store.begin();
        tx.resource_mut(self.row.id)?.scope_id = Some(scope.id());
        tx.commit()
    }

    /// Latest version in the resource's current scope
    pub async fn current_version(&self) -> CheckflowResult<Option<Version>> {
        let id = self.row.id;
        Ok(self
            .store
            .read(|t| {
                let scope_id = t.resource(id)?.scope_id;
                super::current_version(t, scope_id)
            }))
    }

    /// How often to check, from `check_every` or the configured default.
    /// `None` when periodic checks are disabled.
    pub fn check_interval(&self) -> CheckflowResult<Option<Duration>> {
        check_interval(self.check_every(), self.store.settings().check_interval()?)
    }

    /// Plan a check of this resource.
    ///
    /// The source falls back to the type chain's defaults, then the base
    /// type's configured defaults, then `source_defaults`.
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

    pub async fn create_build(
        &self,
        context: &TraceContext,
        manually_triggered: bool,
    ) -> CheckflowResult<(Build, bool)> {
        BuildFactory::new(self.store.clone())
            .create_check_build(
                self.team_id,
                self.row.pipeline_id,
                BuildOwner::Resource(self.row.id),
                context,
                manually_triggered,
            )
            .await
    }
}

impl Checkable for Resource {
    fn name(&self) -> &str {
        Resource::name(self)
    }

    fn type_name(&self) -> &str {
        Resource::type_name(self)
    }

    fn source(&self) -> &Source {
        Resource::source(self)
    }

    fn tags(&self) -> &[String] {
        Resource::tags(self)
    }

    fn is_resource_type(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BaseTypeDefaults, ConfigVersion, PipelineConfig, ResourceTypeDecl, Settings};
    use crate::testing::{self, decl};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn config() -> PipelineConfig {
        PipelineConfig {
            resources: vec![ResourceDecl {
                name: "repo".into(),
                type_name: "git-with-keys".into(),
                source: Source::from_iter([("uri", "https://example.com/repo.git")]),
                tags: vec!["linux".into()],
                ..Default::default()
            }],
            resource_types: vec![ResourceTypeDecl {
                defaults: Source::from_iter([("private_key", "((key))"), ("uri", "unused")]),
                ..decl("git-with-keys", "registry-image", [("repository", "example/git")])
            }],
        }
    }

    #[tokio::test]
    async fn test_exclusive_scope_by_default() {
        let (_store, team) = testing::team().await;
        let (pipeline, _) = team
            .save_pipeline("p", &config(), ConfigVersion::default(), false)
            .await
            .unwrap();
        let mut resource = pipeline.resource("repo").await.unwrap().unwrap();
        let types = pipeline.resource_types().await.unwrap().deserialize();

        let scope = resource
            .set_resource_config(resource.source(), &types)
            .await
            .unwrap();
        assert_eq!(scope.resource_id(), Some(resource.id()));

        resource.reload().await.unwrap();
        assert_eq!(resource.resource_config_scope_id(), Some(scope.id()));

        scope
            .save_versions(&[Version::from_iter([("ref", "abc")])])
            .await
            .unwrap();
        assert_eq!(
            resource.current_version().await.unwrap(),
            Some(Version::from_iter([("ref", "abc")]))
        );
    }

    #[tokio::test]
    async fn test_global_resources_share_history_across_pipelines() {
        let store = crate::store::Store::with_settings(Settings {
            enable_global_resources: true,
            ..Default::default()
        })
        .with_base_type_defaults(Arc::new(Default::default()));
        let team = crate::catalog::Team::find_or_create(&store, "main").await.unwrap();

        let mut scopes = Vec::new();
        for name in ["a", "b"] {
            let (pipeline, _) = team
                .save_pipeline(name, &config(), ConfigVersion::default(), false)
                .await
                .unwrap();
            let resource = pipeline.resource("repo").await.unwrap().unwrap();
            let types = pipeline.resource_types().await.unwrap().deserialize();
            scopes.push(
                resource
                    .set_resource_config(resource.source(), &types)
                    .await
                    .unwrap(),
            );
        }

        assert!(scopes[0].is_shared());
        assert_eq!(scopes[0].id(), scopes[1].id());
    }

    #[tokio::test]
    async fn test_check_plan_merges_type_defaults() {
        let (_store, team) = testing::team().await;
        let (pipeline, _) = team
            .save_pipeline("p", &config(), ConfigVersion::default(), false)
            .await
            .unwrap();
        let resource = pipeline.resource("repo").await.unwrap().unwrap();
        let types = pipeline.resource_types().await.unwrap();

        let plan = resource.check_plan(
            None,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            &types,
            &Source::from_iter([("insecure", "false")]),
        );

        assert_eq!(plan.name, "repo");
        assert_eq!(plan.type_name, "git-with-keys");
        assert_eq!(plan.resource.as_deref(), Some("repo"));
        assert!(plan.resource_type.is_none());
        assert_eq!(plan.tags, vec!["linux".to_string()]);
        assert_eq!(plan.timeout, "1h0m0s");
        assert_eq!(plan.source.get("uri"), Some(&json!("https://example.com/repo.git")));
        assert_eq!(plan.source.get("private_key"), Some(&json!("((key))")));
        assert_eq!(plan.source.get("insecure"), Some(&json!("false")));
        assert_eq!(plan.versioned_resource_types.len(), 1);
    }

    #[tokio::test]
    async fn test_check_plan_reaches_base_type_defaults_through_the_chain() {
        let defaults = Arc::new(BaseTypeDefaults::new());
        defaults.load(HashMap::from([(
            "registry-image".to_string(),
            Source::from_iter([("mirror", "base"), ("depth", "base"), ("uri", "base")]),
        )]));
        let (_store, team) = testing::team_with_defaults(defaults).await;

        let config = PipelineConfig {
            resources: vec![ResourceDecl {
                name: "r".into(),
                type_name: "a".into(),
                source: Source::from_iter([("uri", "own")]),
                ..Default::default()
            }],
            resource_types: vec![
                ResourceTypeDecl {
                    defaults: Source::from_iter([("depth", "a")]),
                    ..decl("a", "b", [("repository", "a")])
                },
                ResourceTypeDecl {
                    defaults: Source::from_iter([("depth", "b"), ("branch", "b")]),
                    ..decl("b", "c", [("repository", "b")])
                },
                ResourceTypeDecl {
                    defaults: Source::from_iter([("branch", "c"), ("tag", "c")]),
                    ..decl("c", "registry-image", [("repository", "c")])
                },
            ],
        };
        let (pipeline, _) = team
            .save_pipeline("p", &config, ConfigVersion::default(), false)
            .await
            .unwrap();
        let resource = pipeline.resource("r").await.unwrap().unwrap();
        let types = pipeline.resource_types().await.unwrap();

        let plan = resource.check_plan(
            None,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            &types,
            &Source::from_iter([("mirror", "external"), ("insecure", "external")]),
        );

        assert_eq!(plan.type_name, "a");
        assert_eq!(
            plan.source,
            Source::from_iter([
                ("uri", "own"),
                ("depth", "a"),
                ("branch", "b"),
                ("tag", "c"),
                ("mirror", "base"),
                ("insecure", "external"),
            ])
        );

        // A type's own check reaches the same base defaults
        let c = types.get("c").unwrap();
        let plan = c.check_plan(None, Duration::from_secs(60), Duration::from_secs(10), &types, &Source::new());
        assert_eq!(plan.source.get("mirror"), Some(&json!("base")));
        assert_eq!(plan.source.get("repository"), Some(&json!("c")));
    }

    #[tokio::test]
    async fn test_check_interval_uses_settings_default() {
        let store = crate::store::Store::with_settings(Settings {
            default_check_interval: "2m".into(),
            ..Default::default()
        })
        .with_base_type_defaults(Arc::new(Default::default()));
        let team = crate::catalog::Team::find_or_create(&store, "main").await.unwrap();

        let mut config = config();
        config.resources.push(ResourceDecl {
            name: "never".into(),
            type_name: "git".into(),
            check_every: Some("never".into()),
            ..Default::default()
        });
        config.resources.push(ResourceDecl {
            name: "fast".into(),
            type_name: "git".into(),
            check_every: Some("10s".into()),
            ..Default::default()
        });
        let (pipeline, _) = team
            .save_pipeline("p", &config, ConfigVersion::default(), false)
            .await
            .unwrap();

        let interval = |name: &'static str| {
            let pipeline = pipeline.clone();
            async move {
                pipeline
                    .resource(name)
                    .await
                    .unwrap()
                    .unwrap()
                    .check_interval()
                    .unwrap()
            }
        };
        assert_eq!(interval("repo").await, Some(Duration::from_secs(120)));
        assert_eq!(interval("never").await, None);
        assert_eq!(interval("fast").await, Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_scheduled_check_plan_uses_settings() {
        let store = crate::store::Store::with_settings(Settings {
            default_check_interval: "2m".into(),
            default_check_timeout: "5m".into(),
            ..Default::default()
        })
        .with_base_type_defaults(Arc::new(Default::default()));
        let team = crate::catalog::Team::find_or_create(&store, "main").await.unwrap();

        let mut config = config();
        config.resources.push(ResourceDecl {
            name: "never".into(),
            type_name: "git".into(),
            check_every: Some("never".into()),
            ..Default::default()
        });
        let (pipeline, _) = team
            .save_pipeline("p", &config, ConfigVersion::default(), false)
            .await
            .unwrap();
        let types = pipeline.resource_types().await.unwrap();

        let repo = pipeline.resource("repo").await.unwrap().unwrap();
        let plan = repo.scheduled_check_plan(None, &types, &Source::new()).unwrap().unwrap();
        assert_eq!(plan.interval, "2m0s");
        assert_eq!(plan.timeout, "5m0s");

        let never = pipeline.resource("never").await.unwrap().unwrap();
        assert!(never.scheduled_check_plan(None, &types, &Source::new()).unwrap().is_none());

        let git_with_keys = types.get("git-with-keys").unwrap();
        let plan = git_with_keys
            .scheduled_check_plan(None, &types, &Source::new())
            .unwrap()
            .unwrap();
        assert_eq!(plan.timeout, "5m0s");
    }

    #[tokio::test]
    async fn test_create_build_per_resource() {
        let (_store, team) = testing::team().await;
        let (pipeline, _) = team
            .save_pipeline("p", &config(), ConfigVersion::default(), false)
            .await
            .unwrap();
        let resource = pipeline.resource("repo").await.unwrap().unwrap();
        let resource_type = pipeline.resource_type("git-with-keys").await.unwrap().unwrap();

        let (build, created) = resource.create_build(&TraceContext::none(), true).await.unwrap();
        assert!(created);
        assert_eq!(build.owner(), BuildOwner::Resource(resource.id()));
        assert!(build.is_manually_triggered());

        // The resource's build does not block its type's
        let (_, created) = resource_type
            .create_build(&TraceContext::none(), false)
            .await
            .unwrap();
        assert!(created);
    }
}
