//! Pipeline board controller: the lead cache, the drag session, and the
//! optimistic stage transitions issued against a [`LeadStore`].

use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{Lead, LeadId},
    error::{ErrorCode, UnknownStage, ValidationError},
    stage::{stages, Stage, StageId},
};
use storage::{LeadStore, StoreError};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    events::{self, BoardEvent, Notification},
    form::LeadForm,
    reconcile::{KeepLocal, Reconciliation, ReconciliationPolicy},
    search::search_filter,
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("lead {0} is not on the board")]
    UnknownLead(LeadId),
}

impl BoardError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BoardError::Validation(_) => ErrorCode::Validation,
            BoardError::Store(err) => err.code(),
            BoardError::UnknownLead(_) => ErrorCode::NotFound,
        }
    }
}

impl From<UnknownStage> for BoardError {
    fn from(value: UnknownStage) -> Self {
        BoardError::Validation(value.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// No drag session was active.
    NoDrag,
    /// Dropped onto the lead's own stage; nothing was written.
    Unchanged,
    Moved {
        lead: Lead,
        from: String,
        to: StageId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageColumn {
    pub stage: &'static Stage,
    pub leads: Vec<Lead>,
}

/// What a view renders: registry-ordered columns built from the
/// search-filtered cache.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub columns: Vec<StageColumn>,
    /// Leads whose stage is not a registry id.
    pub unassigned: Vec<Lead>,
    pub total: usize,
    /// Number of leads matching the active query, if any.
    pub filtered: Option<usize>,
    pub load_state: LoadState,
}

impl BoardSnapshot {
    pub fn column(&self, stage: StageId) -> &StageColumn {
        &self.columns[stage.position()]
    }

    pub fn summary(&self) -> String {
        match self.filtered {
            Some(filtered) => format!("{} total leads • Filtered: {filtered}", self.total),
            None => format!("{} total leads", self.total),
        }
    }
}

/// Leads in `stage`, in cache order.
pub fn leads_in_stage(leads: &[Lead], stage: StageId) -> impl Iterator<Item = &Lead> {
    leads.iter().filter(move |lead| lead.is_in_stage(stage))
}

/// Buckets `leads` into registry-ordered columns plus the unassigned rest.
pub fn group_by_stage<'a>(
    leads: impl IntoIterator<Item = &'a Lead>,
) -> (Vec<StageColumn>, Vec<Lead>) {
    let mut columns: Vec<StageColumn> = stages()
        .iter()
        .map(|stage| StageColumn {
            stage,
            leads: Vec::new(),
        })
        .collect();
    let mut unassigned = Vec::new();
    for lead in leads {
        match lead.stage_id() {
            Some(stage) => columns[stage.position()].leads.push(lead.clone()),
            None => unassigned.push(lead.clone()),
        }
    }
    (columns, unassigned)
}

#[derive(Default)]
struct BoardState {
    leads: Vec<Lead>,
    dragged: Option<Lead>,
    load_state: LoadState,
}

impl BoardState {
    /// Swaps in `lead` at the position of the cached record with the same id.
    fn replace(&mut self, lead: Lead) -> Option<Lead> {
        let slot = self.leads.iter_mut().find(|cached| cached.id == lead.id)?;
        Some(std::mem::replace(slot, lead))
    }
}

pub struct BoardController {
    store: Arc<dyn LeadStore>,
    policy: Arc<dyn ReconciliationPolicy>,
    inner: Mutex<BoardState>,
    events: broadcast::Sender<BoardEvent>,
}

impl BoardController {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            policy: Arc::new(KeepLocal),
            inner: Mutex::new(BoardState::default()),
            events,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ReconciliationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: BoardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notify(&self, notification: Notification) {
        self.emit(BoardEvent::Notify(notification));
    }

    /// Replaces the cache with the store's collection. On failure the cache
    /// is emptied rather than left stale.
    pub async fn load(&self) -> Result<usize, BoardError> {
        self.inner.lock().await.load_state = LoadState::Loading;

        match self.store.get_all().await {
            Ok(leads) => {
                let count = leads.len();
                for lead in leads.iter().filter(|lead| lead.stage_id().is_none()) {
                    warn!(lead_id = %lead.id, stage = %lead.stage, "lead has unrecognized stage; showing as unassigned");
                }
                {
                    let mut state = self.inner.lock().await;
                    state.leads = leads;
                    state.load_state = LoadState::Ready;
                }
                info!(count, "loaded leads");
                self.emit(BoardEvent::Loaded { count });
                Ok(count)
            }
            Err(err) => {
                let message = match err.to_string() {
                    raw if raw.trim().is_empty() => events::LOAD_FAILED.to_string(),
                    raw => raw,
                };
                {
                    let mut state = self.inner.lock().await;
                    state.leads.clear();
                    state.load_state = LoadState::Failed(message.clone());
                }
                warn!(error = %err, "failed to load leads");
                self.emit(BoardEvent::LoadFailed { message });
                Err(err.into())
            }
        }
    }

    /// Starts a drag session. A second call before the drop replaces the
    /// first lead.
    pub async fn begin_drag(&self, lead: Lead) {
        debug!(lead_id = %lead.id, "drag started");
        self.inner.lock().await.dragged = Some(lead);
    }

    /// Starts a drag session for a cached lead.
    pub async fn begin_drag_by_id(&self, id: &LeadId) -> Result<(), BoardError> {
        let mut state = self.inner.lock().await;
        let lead = state
            .leads
            .iter()
            .find(|lead| &lead.id == id)
            .cloned()
            .ok_or_else(|| BoardError::UnknownLead(id.clone()))?;
        debug!(lead_id = %lead.id, "drag started");
        state.dragged = Some(lead);
        Ok(())
    }

    pub async fn dragged_lead(&self) -> Option<Lead> {
        self.inner.lock().await.dragged.clone()
    }

    /// Ends the drag session on `target`.
    ///
    /// The cache is updated before the store is asked; if the store fails the
    /// reconciliation policy decides whether the change stays. The drag
    /// session is released on every path, including no-ops and failures.
    pub async fn drop_on_stage(&self, target: StageId) -> Result<DropOutcome, BoardError> {
        let (previous, optimistic) = {
            let mut state = self.inner.lock().await;
            let Some(dragged) = state.dragged.take() else {
                return Ok(DropOutcome::NoDrag);
            };
            if dragged.is_in_stage(target) {
                debug!(lead_id = %dragged.id, stage = %target, "dropped on own stage");
                return Ok(DropOutcome::Unchanged);
            }
            let optimistic = dragged.with_stage(target);
            let previous = state.replace(optimistic.clone()).unwrap_or(dragged);
            (previous, optimistic)
        };

        match self.store.update(&optimistic.id, optimistic.clone()).await {
            Ok(stored) => {
                self.inner.lock().await.replace(stored.clone());
                info!(lead_id = %stored.id, from = %previous.stage, to = %target, "lead moved");
                self.notify(Notification::success(events::moved_message(target)));
                self.emit(BoardEvent::LeadMoved {
                    lead_id: stored.id.clone(),
                    to: target,
                });
                Ok(DropOutcome::Moved {
                    lead: stored,
                    from: previous.stage,
                    to: target,
                })
            }
            Err(err) => {
                warn!(lead_id = %optimistic.id, to = %target, error = %err, "stage update failed");
                let decision = self.policy.on_failed_transition(&previous, &optimistic, &err);
                if decision == Reconciliation::Restore {
                    self.restore(&previous, &optimistic).await;
                }
                self.notify(Notification::error(events::MOVE_FAILED));
                Err(err.into())
            }
        }
    }

    /// Restores `previous` unless a later transition already replaced the
    /// optimistic record.
    async fn restore(&self, previous: &Lead, optimistic: &Lead) {
        let mut state = self.inner.lock().await;
        let still_optimistic = state
            .leads
            .iter()
            .any(|cached| cached.id == optimistic.id && cached.stage == optimistic.stage);
        if !still_optimistic {
            debug!(lead_id = %optimistic.id, "skip revert; lead changed since drop");
            return;
        }
        state.replace(previous.clone());
        drop(state);
        info!(lead_id = %previous.id, stage = %previous.stage, "reverted failed transition");
        self.emit(BoardEvent::TransitionReverted {
            lead_id: previous.id.clone(),
            stage: previous.stage.clone(),
        });
    }

    /// Drop target forwarded by a view as a raw id. An id outside the
    /// registry ends the drag session without touching the store.
    pub async fn drop_on_stage_id(&self, raw: &str) -> Result<DropOutcome, BoardError> {
        match raw.parse::<StageId>() {
            Ok(target) => self.drop_on_stage(target).await,
            Err(err) => {
                self.inner.lock().await.dragged = None;
                warn!(stage = raw, "drop on unknown stage");
                Err(err.into())
            }
        }
    }

    /// Validates the form, creates the lead in the store, and appends the
    /// stored record to the cache. Nothing is cached when the store fails.
    pub async fn create_lead(&self, form: &LeadForm) -> Result<Lead, BoardError> {
        let draft = form.to_new_lead(Utc::now())?;

        match self.store.create(draft).await {
            Ok(created) => {
                self.inner.lock().await.leads.push(created.clone());
                info!(lead_id = %created.id, "lead created");
                self.notify(Notification::success(events::CREATE_SUCCEEDED));
                self.emit(BoardEvent::LeadCreated {
                    lead_id: created.id.clone(),
                });
                Ok(created)
            }
            Err(err) => {
                warn!(error = %err, "lead creation failed");
                self.notify(Notification::error(events::CREATE_FAILED));
                Err(err.into())
            }
        }
    }

    pub async fn leads(&self) -> Vec<Lead> {
        self.inner.lock().await.leads.clone()
    }

    pub async fn lead(&self, id: &LeadId) -> Option<Lead> {
        self.inner
            .lock()
            .await
            .leads
            .iter()
            .find(|lead| &lead.id == id)
            .cloned()
    }

    pub async fn leads_for_stage(&self, stage: StageId) -> Vec<Lead> {
        let state = self.inner.lock().await;
        leads_in_stage(&state.leads, stage).cloned().collect()
    }

    pub async fn load_state(&self) -> LoadState {
        self.inner.lock().await.load_state.clone()
    }

    /// Columns for display. A non-empty `query` narrows every column; the
    /// cache itself is untouched.
    pub async fn snapshot(&self, query: &str) -> BoardSnapshot {
        let state = self.inner.lock().await;
        let visible = search_filter(&state.leads, query);
        let filtered = (!query.is_empty()).then_some(visible.len());
        let (columns, unassigned) = group_by_stage(visible);
        BoardSnapshot {
            columns,
            unassigned,
            total: state.leads.len(),
            filtered,
            load_state: state.load_state.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
