use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Map;
use shared::domain::NewLead;
use storage::{InMemoryLeadStore, StoreResult};
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::*;
use crate::{
    commands::{BoardCommand, CommandOutcome},
    events::NotificationLevel,
    reconcile::RevertToSnapshot,
};

#[derive(Clone, Copy, Default)]
struct UpdateStep {
    delay: Duration,
    fail: bool,
}

struct TestLeadStore {
    inner: InMemoryLeadStore,
    fail_get_all: AtomicBool,
    fail_create: AtomicBool,
    fail_updates: AtomicBool,
    update_script: StdMutex<VecDeque<UpdateStep>>,
    get_all_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl TestLeadStore {
    fn seeded(leads: Vec<Lead>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryLeadStore::with_seed(leads),
            fail_get_all: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            update_script: StdMutex::new(VecDeque::new()),
            get_all_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        })
    }

    fn script_update(&self, delay_ms: u64, fail: bool) {
        self.update_script
            .lock()
            .expect("script lock")
            .push_back(UpdateStep {
                delay: Duration::from_millis(delay_ms),
                fail,
            });
    }

    fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    async fn stored(&self, id: &str) -> Lead {
        self.inner
            .get(&LeadId::new(id))
            .await
            .expect("get")
            .expect("stored lead")
    }
}

#[async_trait]
impl LeadStore for TestLeadStore {
    async fn get_all(&self) -> StoreResult<Vec<Lead>> {
        self.get_all_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get_all.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.get_all().await
    }

    async fn get(&self, id: &LeadId) -> StoreResult<Option<Lead>> {
        self.inner.get(id).await
    }

    async fn create(&self, lead: NewLead) -> StoreResult<Lead> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write timed out".into()));
        }
        self.inner.create(lead).await
    }

    async fn update(&self, id: &LeadId, lead: Lead) -> StoreResult<Lead> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .update_script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(UpdateStep {
                delay: Duration::ZERO,
                fail: self.fail_updates.load(Ordering::SeqCst),
            });
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        if step.fail {
            return Err(StoreError::Unavailable("network down".into()));
        }
        self.inner.update(id, lead).await
    }

    async fn delete(&self, id: &LeadId) -> StoreResult<Lead> {
        self.inner.delete(id).await
    }
}

fn lead(id: &str, name: &str, stage: &str) -> Lead {
    Lead {
        id: LeadId::new(id),
        name: name.into(),
        email: format!("{}@example.com", name.to_ascii_lowercase()),
        phone: None,
        source: Some("website".into()),
        stage: stage.into(),
        created_at: Utc::now(),
        last_contact: Some(Utc::now()),
        notes: Vec::new(),
        property_preferences: Map::new(),
    }
}

fn sample_leads() -> Vec<Lead> {
    vec![
        lead("1", "Amy", "inquiry"),
        lead("2", "Ben", "qualified"),
        lead("3", "Cara", "inquiry"),
    ]
}

async fn loaded(store: &Arc<TestLeadStore>) -> BoardController {
    let controller = BoardController::new(store.clone());
    controller.load().await.expect("load");
    controller
}

fn drain(rx: &mut broadcast::Receiver<BoardEvent>) -> Vec<BoardEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

fn notifications(events: &[BoardEvent]) -> Vec<Notification> {
    events
        .iter()
        .filter_map(BoardEvent::notification)
        .cloned()
        .collect()
}

fn ids(leads: &[Lead]) -> Vec<&str> {
    leads.iter().map(|lead| lead.id.as_str()).collect()
}

#[tokio::test]
async fn load_replaces_cache_and_marks_ready() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = BoardController::new(store.clone());
    assert_eq!(controller.load_state().await, LoadState::Idle);

    let mut rx = controller.subscribe_events();
    assert_eq!(controller.load().await.expect("load"), 3);
    assert_eq!(controller.load_state().await, LoadState::Ready);
    assert_eq!(ids(&controller.leads().await), vec!["1", "2", "3"]);
    assert_eq!(drain(&mut rx), vec![BoardEvent::Loaded { count: 3 }]);
    assert_eq!(store.get_all_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn load_failure_empties_cache_instead_of_keeping_stale_leads() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    store.fail_get_all.store(true, Ordering::SeqCst);

    let mut rx = controller.subscribe_events();
    let err = controller.load().await.expect_err("load fails");
    assert_eq!(err.code(), ErrorCode::Unavailable);
    assert!(controller.leads().await.is_empty());
    match controller.load_state().await {
        LoadState::Failed(message) => assert!(message.contains("connection refused")),
        other => panic!("expected failed state, got {other:?}"),
    }
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [BoardEvent::LoadFailed { .. }]
    ));
}

#[tokio::test]
async fn successful_drop_moves_lead_into_target_bucket_only() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    let amy = controller.lead(&LeadId::new("1")).await.expect("amy");
    let mut rx = controller.subscribe_events();

    controller.begin_drag(amy).await;
    let outcome = controller.drop_on_stage(StageId::Viewing).await.expect("drop");

    match outcome {
        DropOutcome::Moved { lead, from, to } => {
            assert_eq!(lead.stage, "viewing");
            assert_eq!(from, "inquiry");
            assert_eq!(to, StageId::Viewing);
        }
        other => panic!("expected move, got {other:?}"),
    }
    for stage in StageId::ALL {
        let bucket = controller.leads_for_stage(stage).await;
        let has_amy = bucket.iter().any(|lead| lead.id.as_str() == "1");
        assert_eq!(has_amy, stage == StageId::Viewing, "stage {stage}");
    }
    assert_eq!(store.stored("1").await.stage, "viewing");
    assert_eq!(store.updates(), 1);
    assert!(controller.dragged_lead().await.is_none());

    let events = drain(&mut rx);
    assert_eq!(
        notifications(&events),
        vec![Notification::success("Lead moved to Property Viewing")]
    );
    assert!(events.contains(&BoardEvent::LeadMoved {
        lead_id: LeadId::new("1"),
        to: StageId::Viewing,
    }));
}

#[tokio::test]
async fn drop_on_own_stage_is_a_strict_noop() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    let before = controller.leads().await;
    let ben = controller.lead(&LeadId::new("2")).await.expect("ben");
    let mut rx = controller.subscribe_events();

    controller.begin_drag(ben).await;
    let outcome = controller
        .drop_on_stage(StageId::Qualified)
        .await
        .expect("drop");

    assert_eq!(outcome, DropOutcome::Unchanged);
    assert_eq!(store.updates(), 0);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(controller.leads().await, before);
    assert!(controller.dragged_lead().await.is_none());
}

#[tokio::test]
async fn drop_without_drag_session_does_nothing() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;

    let outcome = controller.drop_on_stage(StageId::Closed).await.expect("drop");
    assert_eq!(outcome, DropOutcome::NoDrag);
    assert_eq!(store.updates(), 0);
}

#[tokio::test]
async fn failed_drop_keeps_optimistic_stage_by_default() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    assert_eq!(controller.policy_name(), "keep_local");
    store.fail_updates.store(true, Ordering::SeqCst);
    let amy = controller.lead(&LeadId::new("1")).await.expect("amy");
    let mut rx = controller.subscribe_events();

    controller.begin_drag(amy).await;
    let err = controller
        .drop_on_stage(StageId::Closed)
        .await
        .expect_err("store rejects update");

    assert!(matches!(err, BoardError::Store(StoreError::Unavailable(_))));
    assert_eq!(store.updates(), 1);
    assert!(controller.dragged_lead().await.is_none());
    assert_eq!(
        ids(&controller.leads_for_stage(StageId::Closed).await),
        vec!["1"]
    );
    // The store never saw the change.
    assert_eq!(store.stored("1").await.stage, "inquiry");

    let events = drain(&mut rx);
    assert_eq!(
        notifications(&events),
        vec![Notification::error("Failed to update lead stage")]
    );
    assert!(notifications(&events).iter().all(Notification::is_error));
}

#[tokio::test]
async fn reload_after_failed_drop_shows_store_truth() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    store.fail_updates.store(true, Ordering::SeqCst);

    controller
        .begin_drag_by_id(&LeadId::new("1"))
        .await
        .expect("drag");
    controller
        .drop_on_stage(StageId::Closed)
        .await
        .expect_err("fails");
    controller.load().await.expect("reload");

    assert!(controller.leads_for_stage(StageId::Closed).await.is_empty());
}

#[tokio::test]
async fn revert_policy_restores_previous_stage() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = BoardController::new(store.clone()).with_policy(Arc::new(RevertToSnapshot));
    controller.load().await.expect("load");
    store.fail_updates.store(true, Ordering::SeqCst);
    let mut rx = controller.subscribe_events();

    controller
        .begin_drag_by_id(&LeadId::new("3"))
        .await
        .expect("drag");
    controller
        .drop_on_stage(StageId::Negotiating)
        .await
        .expect_err("fails");

    assert_eq!(
        controller.lead(&LeadId::new("3")).await.expect("cara").stage,
        "inquiry"
    );
    assert_eq!(
        ids(&controller.leads_for_stage(StageId::Inquiry).await),
        vec!["1", "3"]
    );
    let events = drain(&mut rx);
    assert!(events.contains(&BoardEvent::TransitionReverted {
        lead_id: LeadId::new("3"),
        stage: "inquiry".into(),
    }));
    assert_eq!(
        notifications(&events),
        vec![Notification::error("Failed to update lead stage")]
    );
}

struct CountingPolicy {
    calls: AtomicUsize,
}

impl ReconciliationPolicy for CountingPolicy {
    fn on_failed_transition(
        &self,
        previous: &Lead,
        optimistic: &Lead,
        error: &StoreError,
    ) -> Reconciliation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(previous.stage, "qualified");
        assert_eq!(optimistic.stage, "viewing");
        assert!(matches!(error, StoreError::Unavailable(_)));
        Reconciliation::KeepLocal
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

#[tokio::test]
async fn custom_policy_sees_snapshot_and_optimistic_record() {
    let store = TestLeadStore::seeded(sample_leads());
    let policy = Arc::new(CountingPolicy {
        calls: AtomicUsize::new(0),
    });
    let controller = BoardController::new(store.clone()).with_policy(policy.clone());
    controller.load().await.expect("load");
    store.fail_updates.store(true, Ordering::SeqCst);

    controller
        .begin_drag_by_id(&LeadId::new("2"))
        .await
        .expect("drag");
    controller
        .drop_on_stage(StageId::Viewing)
        .await
        .expect_err("fails");

    assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.policy_name(), "counting");
    // Policies are not consulted on success.
    store.fail_updates.store(false, Ordering::SeqCst);
    controller
        .begin_drag_by_id(&LeadId::new("1"))
        .await
        .expect("drag");
    controller.drop_on_stage(StageId::Closed).await.expect("drop");
    assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_drops_apply_last_response() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = Arc::new(loaded(&store).await);
    store.script_update(300, false);
    store.script_update(10, false);

    controller
        .begin_drag_by_id(&LeadId::new("1"))
        .await
        .expect("drag");
    let slow = tokio::spawn({
        let controller = controller.clone();
        async move { controller.drop_on_stage(StageId::Viewing).await }
    });
    while controller.dragged_lead().await.is_some() {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        controller.lead(&LeadId::new("1")).await.expect("amy").stage,
        "viewing"
    );

    controller
        .begin_drag_by_id(&LeadId::new("1"))
        .await
        .expect("second drag");
    controller.drop_on_stage(StageId::Closed).await.expect("fast drop");
    assert_eq!(
        controller.lead(&LeadId::new("1")).await.expect("amy").stage,
        "closed"
    );

    slow.await.expect("join").expect("slow drop");
    // The slow response lands last and wins, in the cache and in the store.
    assert_eq!(
        controller.lead(&LeadId::new("1")).await.expect("amy").stage,
        "viewing"
    );
    assert_eq!(store.stored("1").await.stage, "viewing");
    assert_eq!(store.updates(), 2);
}

#[tokio::test(start_paused = true)]
async fn revert_does_not_clobber_a_later_transition() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = Arc::new(
        BoardController::new(store.clone()).with_policy(Arc::new(RevertToSnapshot)),
    );
    controller.load().await.expect("load");
    store.script_update(300, true);
    store.script_update(10, false);

    controller
        .begin_drag_by_id(&LeadId::new("2"))
        .await
        .expect("drag");
    let failing = tokio::spawn({
        let controller = controller.clone();
        async move { controller.drop_on_stage(StageId::Viewing).await }
    });
    while controller.dragged_lead().await.is_some() {
        tokio::task::yield_now().await;
    }

    controller
        .begin_drag_by_id(&LeadId::new("2"))
        .await
        .expect("second drag");
    controller.drop_on_stage(StageId::Closed).await.expect("drop");

    assert!(failing.await.expect("join").is_err());
    assert_eq!(
        controller.lead(&LeadId::new("2")).await.expect("ben").stage,
        "closed"
    );
}

#[tokio::test]
async fn unknown_drop_target_is_rejected_without_store_call() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    controller
        .begin_drag_by_id(&LeadId::new("1"))
        .await
        .expect("drag");

    let err = controller
        .drop_on_stage_id("archived")
        .await
        .expect_err("unknown stage");

    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(store.updates(), 0);
    assert!(controller.dragged_lead().await.is_none());
}

#[tokio::test]
async fn second_drag_overwrites_the_first() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;

    controller
        .begin_drag_by_id(&LeadId::new("1"))
        .await
        .expect("drag amy");
    controller
        .begin_drag_by_id(&LeadId::new("2"))
        .await
        .expect("drag ben");
    controller.drop_on_stage(StageId::Closed).await.expect("drop");

    assert_eq!(ids(&controller.leads_for_stage(StageId::Closed).await), vec!["2"]);
    assert_eq!(
        controller.lead(&LeadId::new("1")).await.expect("amy").stage,
        "inquiry"
    );
}

#[tokio::test]
async fn dragging_an_unknown_lead_fails() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    let err = controller
        .begin_drag_by_id(&LeadId::new("missing"))
        .await
        .expect_err("unknown");
    assert!(matches!(err, BoardError::UnknownLead(_)));
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn stage_buckets_keep_cache_order_across_transitions() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;

    for (id, stage) in [
        ("3", StageId::Qualified),
        ("1", StageId::Qualified),
        ("2", StageId::Closed),
        ("2", StageId::Qualified),
    ] {
        controller
            .begin_drag_by_id(&LeadId::new(id))
            .await
            .expect("drag");
        controller.drop_on_stage(stage).await.expect("drop");
    }

    assert_eq!(
        ids(&controller.leads_for_stage(StageId::Qualified).await),
        vec!["1", "2", "3"]
    );
    assert_eq!(ids(&controller.leads().await), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn closed_leads_can_move_backwards() {
    let store = TestLeadStore::seeded(vec![lead("9", "Dan", "closed")]);
    let controller = loaded(&store).await;
    controller
        .begin_drag_by_id(&LeadId::new("9"))
        .await
        .expect("drag");
    controller.drop_on_stage(StageId::Inquiry).await.expect("drop");
    assert_eq!(store.stored("9").await.stage, "inquiry");
}

#[tokio::test]
async fn create_with_blank_name_fails_validation_without_store_call() {
    let store = TestLeadStore::seeded(Vec::new());
    let controller = loaded(&store).await;
    let mut rx = controller.subscribe_events();

    let err = controller
        .create_lead(&LeadForm::new("", "a@b.com"))
        .await
        .expect_err("validation");

    assert!(matches!(err, BoardError::Validation(ref v) if v.field == "name"));
    assert_eq!(store.creates(), 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn create_appends_store_record_with_assigned_id() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    let mut rx = controller.subscribe_events();

    let form = LeadForm::new("Jane", "jane@x.com").with_notes("first call");
    let created = controller.create_lead(&form).await.expect("create");

    assert_eq!(created.stage, "inquiry");
    assert_eq!(created.notes, vec!["first call".to_string()]);
    assert!(!created.id.as_str().is_empty());
    assert_eq!(created.last_contact, Some(created.created_at));
    let cached = controller.leads().await;
    assert_eq!(cached.len(), 4);
    assert_eq!(cached.last(), Some(&created));
    assert_eq!(store.creates(), 1);

    let events = drain(&mut rx);
    assert_eq!(
        notifications(&events),
        vec![Notification::success("New lead added successfully")]
    );
    assert!(events.contains(&BoardEvent::LeadCreated {
        lead_id: created.id.clone(),
    }));
}

#[tokio::test]
async fn create_failure_leaves_cache_untouched() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = loaded(&store).await;
    store.fail_create.store(true, Ordering::SeqCst);
    let mut rx = controller.subscribe_events();

    let form = LeadForm::new("Jane", "jane@x.com");
    let err = controller.create_lead(&form).await.expect_err("fails");

    assert!(matches!(err, BoardError::Store(_)));
    assert_eq!(controller.leads().await.len(), 3);
    let notes = notifications(&drain(&mut rx));
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Error);
    assert_eq!(notes[0].message, "Failed to add new lead");
}

#[tokio::test]
async fn snapshot_filters_columns_without_touching_cache() {
    let mut leads = sample_leads();
    leads.push(lead("4", "Ash", "archived"));
    let store = TestLeadStore::seeded(leads);
    let controller = loaded(&store).await;

    let full = controller.snapshot("").await;
    assert_eq!(full.summary(), "4 total leads");
    assert_eq!(full.columns.len(), 5);
    assert_eq!(full.column(StageId::Inquiry).stage.name, "New Inquiry");
    assert_eq!(ids(&full.column(StageId::Inquiry).leads), vec!["1", "3"]);
    assert_eq!(ids(&full.unassigned), vec!["4"]);
    assert_eq!(full.load_state, LoadState::Ready);

    let narrowed = controller.snapshot("qualif").await;
    assert_eq!(narrowed.filtered, Some(1));
    assert_eq!(ids(&narrowed.column(StageId::Qualified).leads), vec!["2"]);

    let narrowed = controller.snapshot("amy").await;
    assert_eq!(narrowed.summary(), "4 total leads • Filtered: 1");
    assert_eq!(ids(&narrowed.column(StageId::Inquiry).leads), vec!["1"]);
    assert!(narrowed.column(StageId::Qualified).leads.is_empty());
    assert!(narrowed.unassigned.is_empty());
    assert_eq!(controller.leads().await.len(), 4);
}

#[tokio::test]
async fn dispatch_routes_view_commands() {
    let store = TestLeadStore::seeded(sample_leads());
    let controller = BoardController::new(store.clone());

    assert_eq!(
        controller.dispatch(BoardCommand::Reload).await.expect("reload"),
        CommandOutcome::Loaded { count: 3 }
    );
    assert_eq!(
        controller
            .dispatch(BoardCommand::DragStart {
                lead_id: LeadId::new("2"),
            })
            .await
            .expect("drag"),
        CommandOutcome::DragStarted {
            lead_id: LeadId::new("2"),
        }
    );
    let dropped = controller
        .dispatch(BoardCommand::DropOnStage {
            stage_id: "negotiating".into(),
        })
        .await
        .expect("drop");
    assert!(matches!(
        dropped,
        CommandOutcome::Dropped(DropOutcome::Moved {
            to: StageId::Negotiating,
            ..
        })
    ));

    let created = controller
        .dispatch(BoardCommand::SubmitNewLead(LeadForm::new(
            "Jane",
            "jane@x.com",
        )))
        .await
        .expect("create");
    assert!(matches!(created, CommandOutcome::Created(ref lead) if lead.name == "Jane"));

    let err = controller
        .dispatch(BoardCommand::SubmitNewLead(LeadForm::new("Jane", "")))
        .await
        .expect_err("invalid form");
    assert_eq!(err.code(), ErrorCode::Validation);
}
