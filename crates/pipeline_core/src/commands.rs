//! View intents and their dispatch onto the board controller.

use shared::domain::{Lead, LeadId};
use tracing::debug;

use crate::{
    board::{BoardController, BoardError, DropOutcome},
    form::LeadForm,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardCommand {
    Reload,
    DragStart { lead_id: LeadId },
    DropOnStage { stage_id: String },
    SubmitNewLead(LeadForm),
}

impl BoardCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BoardCommand::Reload => "reload",
            BoardCommand::DragStart { .. } => "drag_start",
            BoardCommand::DropOnStage { .. } => "drop_on_stage",
            BoardCommand::SubmitNewLead(_) => "submit_new_lead",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Loaded { count: usize },
    DragStarted { lead_id: LeadId },
    Dropped(DropOutcome),
    /// The view should close and reset its form.
    Created(Lead),
}

impl BoardController {
    pub async fn dispatch(&self, command: BoardCommand) -> Result<CommandOutcome, BoardError> {
        debug!(command = command.name(), "dispatching board command");
        match command {
            BoardCommand::Reload => {
                let count = self.load().await?;
                Ok(CommandOutcome::Loaded { count })
            }
            BoardCommand::DragStart { lead_id } => {
                self.begin_drag_by_id(&lead_id).await?;
                Ok(CommandOutcome::DragStarted { lead_id })
            }
            BoardCommand::DropOnStage { stage_id } => {
                let outcome = self.drop_on_stage_id(&stage_id).await?;
                Ok(CommandOutcome::Dropped(outcome))
            }
            BoardCommand::SubmitNewLead(form) => {
                let lead = self.create_lead(&form).await?;
                Ok(CommandOutcome::Created(lead))
            }
        }
    }
}
