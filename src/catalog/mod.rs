// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Typed handles over stored rows
//!
//! Every handle carries a [`Store`](crate::store::Store) clone and a copy of
//! its row as of the last load. Mutating operations open their own
//! transaction; call `reload` to observe changes made elsewhere.

mod build;
mod pipeline;
mod resource;
mod resource_config;
mod resource_type;
mod scope;
mod team;

pub use build::{Build, BuildFactory, BuildOwner, BuildStatus, CHECK_BUILD_NAME};
pub use pipeline::Pipeline;
pub use resource::Resource;
pub use resource_config::{ResourceConfig, ResourceConfigFactory};
pub use resource_type::{ResourceType, ResourceTypes};
pub use scope::ResourceConfigScope;
pub use team::Team;

use crate::config::Version;
use crate::errors::CheckflowResult;
use crate::store::{ScopeId, Store, Tables, Transaction};

/// Attempts a find-or-create makes before giving up on a contended key
const CREATE_ATTEMPTS: u32 = 3;

/// Run a find-or-create in its own transaction.
///
/// A commit that loses a creation race runs `op` again on a fresh
/// snapshot, where its lookups find the winner's rows.
pub(crate) fn find_or_create<T>(
    store: &Store,
    mut op: impl FnMut(&mut Transaction) -> CheckflowResult<T>,
) -> CheckflowResult<T> {
    let mut attempt = 1;
    loop {
        let mut tx = store.begin();
        let value = op(&mut tx)?;
        match tx.commit() {
            Ok(()) => return Ok(value),
            Err(e) if e.is_unique_violation() && attempt < CREATE_ATTEMPTS => {
                tracing::debug!(attempt, error = %e, "lost a creation race; re-reading");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Latest version in a scope, if the entity has one
pub(crate) fn current_version(tables: &Tables, scope_id: Option<ScopeId>) -> Option<Version> {
    tables
        .latest_version(scope_id?)
        .map(|v| v.version.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CheckflowError;

    #[test]
    fn test_find_or_create_rereads_after_losing_a_race() {
        let store = Store::new();
        let mut attempts = 0;

        let team = find_or_create(&store, |tx| {
            attempts += 1;
            if attempts == 1 {
                // Someone else commits the same team after we began
                let mut rival = store.begin();
                rival.insert_team("main")?;
                rival.commit()?;
            }
            match tx.team_by_name("main").cloned() {
                Some(row) => Ok(row),
                None => tx.insert_team("main"),
            }
        })
        .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(store.read(|t| t.team_by_name("main").map(|r| r.id)), Some(team.id));
    }

    #[test]
    fn test_find_or_create_gives_up_eventually() {
        let store = Store::new();
        let mut attempts = 0;

        let err = find_or_create(&store, |tx| {
            attempts += 1;
            let name = format!("team-{}", attempts);
            let mut rival = store.begin();
            rival.insert_team(&name)?;
            rival.commit()?;
            tx.insert_team(&name)
        })
        .unwrap_err();

        assert!(matches!(err, CheckflowError::UniqueViolation { table: "teams", .. }));
        assert_eq!(attempts, CREATE_ATTEMPTS);
    }
}
