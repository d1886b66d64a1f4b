//! Lead persistence: the store contract consumed by the pipeline board and
//! its in-memory and SQLite implementations.

use async_trait::async_trait;
use shared::{
    domain::{Lead, LeadId, NewLead},
    error::{ErrorCode, ValidationError},
};
use thiserror::Error;

mod memory;
mod sqlite;

pub use memory::{InMemoryLeadStore, Latency};
pub use sqlite::Storage;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lead {0} not found")]
    NotFound(LeadId),
    #[error("invalid lead: {0}")]
    Validation(#[from] ValidationError),
    #[error("lead store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::NotFound(_) => ErrorCode::NotFound,
            StoreError::Validation(_) => ErrorCode::Validation,
            StoreError::Unavailable(_) => ErrorCode::Unavailable,
            StoreError::Backend(_) => ErrorCode::Internal,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Asynchronous CRUD over lead records. Implementations are the durable
/// source of truth; callers keep their own cache.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get_all(&self) -> StoreResult<Vec<Lead>>;
    async fn get(&self, id: &LeadId) -> StoreResult<Option<Lead>>;
    /// Persists `lead` under a freshly assigned id.
    async fn create(&self, lead: NewLead) -> StoreResult<Lead>;
    /// Replaces the stored record. The stored id and `created_at` are kept.
    async fn update(&self, id: &LeadId, lead: Lead) -> StoreResult<Lead>;
    async fn delete(&self, id: &LeadId) -> StoreResult<Lead>;
}

/// Store-side checks applied on create, independent of any form validation
/// done by callers.
pub fn validate_new_lead(lead: &NewLead) -> Result<(), ValidationError> {
    if lead.name.trim().is_empty() {
        return Err(ValidationError::required("name"));
    }
    if lead.email.trim().is_empty() {
        return Err(ValidationError::required("email"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
