// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! In-process transactional store
//!
//! Committed state is an immutable [`Tables`] snapshot behind a
//! copy-on-write pointer. Reads clone the pointer and never wait on
//! writers. A [`Transaction`] mutates its own copy of the snapshot it began
//! from; [`Transaction::commit`] publishes it, replaying the written rows
//! on top of anything committed in the meantime and re-checking every
//! uniqueness constraint. Dropping a transaction, including when the future
//! that owns it is cancelled, discards every change.

mod ids;
mod tables;

pub use ids::*;
pub use tables::*;

use parking_lot::RwLock;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::config::{BaseTypeDefaults, Settings};
use crate::errors::CheckflowResult;

/// Shared handle to the tables plus the engine settings
#[derive(Clone)]
pub struct Store {
    tables: Arc<RwLock<Arc<Tables>>>,
    settings: Arc<Settings>,
    base_type_defaults: Arc<BaseTypeDefaults>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Empty store with default settings and the process-wide defaults table
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Arc::new(Tables::default()))),
            settings: Arc::new(settings),
            base_type_defaults: BaseTypeDefaults::global(),
        }
    }

    /// Use a private base type defaults table instead of the global one
    pub fn with_base_type_defaults(mut self, defaults: Arc<BaseTypeDefaults>) -> Self {
        self.base_type_defaults = defaults;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn base_type_defaults(&self) -> &Arc<BaseTypeDefaults> {
        &self.base_type_defaults
    }

    /// Committed state as of now. Later commits do not affect it.
    pub fn snapshot(&self) -> Arc<Tables> {
        Arc::clone(&*self.tables.read())
    }

    /// Start a transaction on the current snapshot
    pub fn begin(&self) -> Transaction {
        let base = self.snapshot();
        let working = Tables::clone(&base);
        Transaction {
            tables: Arc::clone(&self.tables),
            base,
            working,
        }
    }

    /// Run a read-only closure against committed state
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.snapshot())
    }
}

/// All-or-nothing unit of work over one snapshot
pub struct Transaction {
    tables: Arc<RwLock<Arc<Tables>>>,
    base: Arc<Tables>,
    working: Tables,
}

impl Transaction {
    /// Make every change visible.
    ///
    /// Fails with `UniqueViolation` when a concurrent commit claimed a key
    /// this transaction also inserted, and with `TransactionConflict` when
    /// it changed a row this transaction updated. Nothing is published on
    /// failure.
    pub fn commit(self) -> CheckflowResult<()> {
        let Transaction {
            tables,
            base,
            mut working,
        } = self;

        let changes = working.take_changes();
        if changes.is_empty() {
            return Ok(());
        }

        let mut committed = tables.write();
        if Arc::ptr_eq(&*committed, &base) {
            *committed = Arc::new(working);
            return Ok(());
        }

        let mut merged = Tables::clone(&**committed);
        for change in &changes {
            merged.replay(&base, &working, *change)?;
        }
        tracing::trace!(changes = changes.len(), "replayed transaction onto newer commit");
        *committed = Arc::new(merged);
        Ok(())
    }

    /// Discard every change. Same as dropping the transaction.
    pub fn rollback(self) {}
}

impl Deref for Transaction {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.working
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Tables {
        &mut self.working
    }
}
