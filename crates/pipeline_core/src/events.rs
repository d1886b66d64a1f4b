//! Board events and user-facing notifications.

use shared::{domain::LeadId, stage::StageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A transient, user-visible message (a toast in a graphical view).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    Loaded {
        count: usize,
    },
    LoadFailed {
        message: String,
    },
    LeadMoved {
        lead_id: LeadId,
        to: StageId,
    },
    LeadCreated {
        lead_id: LeadId,
    },
    /// A failed transition was undone in the cache by the reconciliation policy.
    TransitionReverted {
        lead_id: LeadId,
        stage: String,
    },
    Notify(Notification),
}

impl BoardEvent {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            BoardEvent::Notify(notification) => Some(notification),
            _ => None,
        }
    }
}

pub(crate) const MOVE_FAILED: &str = "Failed to update lead stage";
pub(crate) const CREATE_SUCCEEDED: &str = "New lead added successfully";
pub(crate) const CREATE_FAILED: &str = "Failed to add new lead";
pub(crate) const LOAD_FAILED: &str = "Failed to load leads.";

pub(crate) fn moved_message(stage: StageId) -> String {
    format!("Lead moved to {}", stage.stage().name)
}
