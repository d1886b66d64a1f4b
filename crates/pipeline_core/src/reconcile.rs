//! What to do with an optimistic stage change once the store rejects it.

use std::{fmt, str::FromStr, sync::Arc};

use serde::Deserialize;
use shared::domain::Lead;
use storage::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Leave the optimistic record in the cache; the board shows the new
    /// stage until the next reload.
    KeepLocal,
    /// Put the pre-drop record back.
    Restore,
}

pub trait ReconciliationPolicy: Send + Sync {
    fn on_failed_transition(
        &self,
        previous: &Lead,
        optimistic: &Lead,
        error: &StoreError,
    ) -> Reconciliation;

    fn name(&self) -> &'static str;
}

pub struct KeepLocal;

impl ReconciliationPolicy for KeepLocal {
    fn on_failed_transition(&self, _: &Lead, _: &Lead, _: &StoreError) -> Reconciliation {
        Reconciliation::KeepLocal
    }

    fn name(&self) -> &'static str {
        "keep_local"
    }
}

pub struct RevertToSnapshot;

impl ReconciliationPolicy for RevertToSnapshot {
    fn on_failed_transition(&self, _: &Lead, _: &Lead, _: &StoreError) -> Reconciliation {
        Reconciliation::Restore
    }

    fn name(&self) -> &'static str {
        "revert"
    }
}

/// Configuration-facing selector for the built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationMode {
    #[default]
    KeepLocal,
    Revert,
}

impl ReconciliationMode {
    pub fn into_policy(self) -> Arc<dyn ReconciliationPolicy> {
        match self {
            ReconciliationMode::KeepLocal => Arc::new(KeepLocal),
            ReconciliationMode::Revert => Arc::new(RevertToSnapshot),
        }
    }
}

impl fmt::Display for ReconciliationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconciliationMode::KeepLocal => "keep_local",
            ReconciliationMode::Revert => "revert",
        })
    }
}

impl FromStr for ReconciliationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_local" | "keep" => Ok(ReconciliationMode::KeepLocal),
            "revert" | "revert_to_snapshot" | "rollback" => Ok(ReconciliationMode::Revert),
            other => Err(format!("unknown reconciliation mode '{other}'")),
        }
    }
}
