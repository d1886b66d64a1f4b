//! Plain-text rendering of the board for the terminal.

use std::fmt::Write as _;

use pipeline_core::{display::format_last_contact, BoardSnapshot, LoadState, Notification};
use shared::domain::Lead;

pub fn render_board(snapshot: &BoardSnapshot) -> String {
    let mut out = String::new();
    match &snapshot.load_state {
        LoadState::Loading => {
            out.push_str("Loading leads...\n");
            return out;
        }
        LoadState::Failed(message) => {
            let _ = writeln!(out, "Error: {message}");
            return out;
        }
        LoadState::Idle | LoadState::Ready => {}
    }

    let _ = writeln!(out, "Pipeline Overview - {}", snapshot.summary());
    for column in &snapshot.columns {
        let _ = writeln!(
            out,
            "\n== {} ({}) [{}]",
            column.stage.name,
            column.leads.len(),
            column.stage.id
        );
        for lead in &column.leads {
            out.push_str(&render_card(lead));
        }
    }
    if !snapshot.unassigned.is_empty() {
        let _ = writeln!(out, "\n== Unassigned ({})", snapshot.unassigned.len());
        for lead in &snapshot.unassigned {
            out.push_str(&render_card(lead));
        }
    }
    out
}

pub fn render_card(lead: &Lead) -> String {
    let mut card = format!(
        "  [{}] {} <{}>",
        lead.source_kind().icon(),
        lead.name,
        lead.email
    );
    if let Some(phone) = lead.phone.as_deref().filter(|phone| !phone.is_empty()) {
        let _ = write!(card, " {phone}");
    }
    let _ = write!(
        card,
        " | Last contact: {}",
        format_last_contact(lead.last_contact)
    );
    if let Some(source) = lead.source.as_deref().filter(|source| !source.is_empty()) {
        let _ = write!(card, " | {source}");
    }
    let _ = writeln!(card, " | id {}", lead.id);
    card
}

pub fn render_notification(notification: &Notification) -> String {
    let tag = if notification.is_error() { "error" } else { "ok" };
    format!("[{tag}] {}", notification.message)
}
