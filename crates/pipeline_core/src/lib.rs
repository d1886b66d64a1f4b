//! Pipeline board core: lead cache, drag-and-drop stage transitions, lead
//! creation, and display-time search.

pub mod board;
pub mod commands;
pub mod display;
pub mod events;
pub mod form;
pub mod reconcile;
pub mod search;

pub use board::{
    group_by_stage, leads_in_stage, BoardController, BoardError, BoardSnapshot, DropOutcome,
    LoadState, StageColumn,
};
pub use commands::{BoardCommand, CommandOutcome};
pub use events::{BoardEvent, Notification, NotificationLevel};
pub use form::LeadForm;
pub use reconcile::{
    KeepLocal, Reconciliation, ReconciliationMode, ReconciliationPolicy, RevertToSnapshot,
};
pub use search::search_filter;
