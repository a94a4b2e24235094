// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Base resource type defaults
//!
//! Operators can configure source defaults for base types (e.g. a registry
//! mirror for `registry-image`). The table is replaced as a whole; readers
//! take a snapshot so a merge pass never observes half of a reload.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::Source;
use crate::errors::{CheckflowError, CheckflowResult};

/// Base type name -> source defaults
pub type DefaultsTable = HashMap<String, Source>;

static GLOBAL: Lazy<Arc<BaseTypeDefaults>> = Lazy::new(|| Arc::new(BaseTypeDefaults::new()));

/// Copy-on-write registry of base resource type defaults
#[derive(Debug, Default)]
pub struct BaseTypeDefaults {
    table: RwLock<Arc<DefaultsTable>>,
}

impl BaseTypeDefaults {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> Arc<BaseTypeDefaults> {
        Arc::clone(&*GLOBAL)
    }

    /// Atomically replace the whole table
    pub fn load(&self, table: DefaultsTable) {
        let types: Vec<&str> = table.keys().map(String::as_str).collect();
        tracing::info!(base_types = ?types, "loaded base resource type defaults");
        *self.table.write() = Arc::new(table);
    }

    /// Remove all defaults
    pub fn clear(&self) {
        self.load(DefaultsTable::new());
    }

    /// Current table. Later `load` calls do not affect a taken snapshot.
    pub fn snapshot(&self) -> Arc<DefaultsTable> {
        Arc::clone(&*self.table.read())
    }

    /// Defaults for one base type, empty when none are configured
    pub fn for_type(&self, base_type: &str) -> Source {
        self.table.read().get(base_type).cloned().unwrap_or_default()
    }

    /// Load the table from a YAML file mapping base type names to sources
    pub fn load_from_file(&self, path: &Path) -> CheckflowResult<()> {
        let content = std::fs::read_to_string(path).map_err(|e| CheckflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let table: DefaultsTable = serde_yaml::from_str(&content)?;
        self.load(table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_replaces_whole_table() {
        let defaults = BaseTypeDefaults::new();
        defaults.load(HashMap::from([
            ("s3".to_string(), Source::from_iter([("region", "eu")])),
            ("git".to_string(), Source::from_iter([("depth", "1")])),
        ]));
        defaults.load(HashMap::from([(
            "s3".to_string(),
            Source::from_iter([("region", "us")]),
        )]));

        assert_eq!(defaults.for_type("s3").get("region"), Some(&json!("us")));
        assert!(defaults.for_type("git").is_empty());
    }

    #[test]
    fn test_snapshot_is_not_affected_by_reload() {
        let defaults = BaseTypeDefaults::new();
        defaults.load(HashMap::from([(
            "s3".to_string(),
            Source::from_iter([("region", "eu")]),
        )]));

        let before = defaults.snapshot();
        defaults.clear();

        assert_eq!(before["s3"].get("region"), Some(&json!("eu")));
        assert!(defaults.snapshot().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "registry-image:\n  registry_mirror:\n    host: mirror.local\ns3:\n  region: eu-west-1"
        )
        .unwrap();

        let defaults = BaseTypeDefaults::new();
        defaults.load_from_file(file.path()).unwrap();

        assert_eq!(
            defaults.for_type("registry-image").get("registry_mirror"),
            Some(&json!({"host": "mirror.local"}))
        );
        assert_eq!(defaults.for_type("s3").get("region"), Some(&json!("eu-west-1")));
    }

    #[test]
    fn test_load_from_missing_file() {
        let defaults = BaseTypeDefaults::new();
        let result = defaults.load_from_file(Path::new("/nonexistent/defaults.yml"));
        assert!(matches!(result, Err(CheckflowError::FileReadError { .. })));
    }
}
