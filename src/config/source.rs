// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Source, params and version values
//!
//! All maps are `BTreeMap`s so their JSON form is canonical (sorted keys),
//! which is what identity digests are computed over.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::CheckflowResult;

/// Free-form parameters passed to a resource type
pub type Params = BTreeMap<String, Value>;

/// Configuration handed to a resource type's check/get/put scripts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(BTreeMap<String, Value>);

impl Source {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Layer `defaults` beneath this source.
    ///
    /// Keys present here win; keys only present in `defaults` fall through.
    pub fn with_defaults(&self, defaults: &Source) -> Source {
        let mut merged = defaults.0.clone();
        merged.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Source(merged)
    }

    /// Canonical JSON encoding (sorted keys)
    pub fn canonical_json(&self) -> CheckflowResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Source {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Source(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A fingerprint of external resource state, e.g. `{"ref": "abc123"}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(BTreeMap<String, String>);

impl Version {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Content digest identifying this version within a scope
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (k, v) in &self.0 {
            // Length-prefix both halves so ("ab","c") and ("a","bc") differ
            hasher.update(&(k.len() as u64).to_le_bytes());
            hasher.update(k.as_bytes());
            hasher.update(&(v.len() as u64).to_le_bytes());
            hasher.update(v.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Version {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Version(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
