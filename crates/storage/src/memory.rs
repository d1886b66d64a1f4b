use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use shared::domain::{Lead, LeadId, NewLead};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{validate_new_lead, LeadStore, StoreError, StoreResult};

/// Artificial per-operation latency for the in-memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Latency {
    pub get_all: Duration,
    pub get: Duration,
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Latency {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn uniform(delay: Duration) -> Self {
        Self {
            get_all: delay,
            get: delay,
            create: delay,
            update: delay,
            delete: delay,
        }
    }

    /// Delays of a slow remote API, for demos.
    pub fn demo() -> Self {
        Self {
            get_all: Duration::from_millis(300),
            get: Duration::from_millis(200),
            create: Duration::from_millis(400),
            update: Duration::from_millis(300),
            delete: Duration::from_millis(250),
        }
    }
}

/// Process-local lead store. Constructed with seed data, serves calls, and
/// hands its remaining records back on `teardown`.
pub struct InMemoryLeadStore {
    leads: RwLock<Vec<Lead>>,
    latency: Latency,
}

impl Default for InMemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::with_seed(Vec::new())
    }

    pub fn with_seed(leads: Vec<Lead>) -> Self {
        Self {
            leads: RwLock::new(leads),
            latency: Latency::none(),
        }
    }

    pub fn with_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    /// Reads a JSON array of leads, e.g. a mock-data fixture.
    pub fn load_seed_file(path: &Path) -> anyhow::Result<Vec<Lead>> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file '{}'", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse seed file '{}'", path.display()))
    }

    pub async fn len(&self) -> usize {
        self.leads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.leads.read().await.is_empty()
    }

    /// Drains the store. Later calls see an empty collection.
    pub async fn teardown(&self) -> Vec<Lead> {
        std::mem::take(&mut *self.leads.write().await)
    }

    async fn wait(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn get_all(&self) -> StoreResult<Vec<Lead>> {
        Self::wait(self.latency.get_all).await;
        Ok(self.leads.read().await.clone())
    }

    async fn get(&self, id: &LeadId) -> StoreResult<Option<Lead>> {
        Self::wait(self.latency.get).await;
        Ok(self
            .leads
            .read()
            .await
            .iter()
            .find(|lead| &lead.id == id)
            .cloned())
    }

    async fn create(&self, lead: NewLead) -> StoreResult<Lead> {
        Self::wait(self.latency.create).await;
        validate_new_lead(&lead)?;
        let created = lead.into_lead(LeadId::new(Uuid::new_v4().to_string()));
        self.leads.write().await.push(created.clone());
        debug!(lead_id = %created.id, "created lead in memory store");
        Ok(created)
    }

    async fn update(&self, id: &LeadId, lead: Lead) -> StoreResult<Lead> {
        Self::wait(self.latency.update).await;
        let mut leads = self.leads.write().await;
        let slot = leads
            .iter_mut()
            .find(|existing| &existing.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        *slot = Lead {
            id: slot.id.clone(),
            created_at: slot.created_at,
            ..lead
        };
        Ok(slot.clone())
    }

    async fn delete(&self, id: &LeadId) -> StoreResult<Lead> {
        Self::wait(self.latency.delete).await;
        let mut leads = self.leads.write().await;
        let index = leads
            .iter()
            .position(|existing| &existing.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok(leads.remove(index))
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
