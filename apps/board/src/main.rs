use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeline_core::{BoardCommand, BoardController, BoardEvent, CommandOutcome, LeadForm};
use shared::{domain::LeadId, stage::stages};
use storage::{InMemoryLeadStore, Latency, LeadStore, Storage};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, normalize_database_url, Settings, StoreBackend};
use render::{render_board, render_card, render_notification};

#[derive(Parser, Debug)]
#[command(about = "Sales pipeline board")]
struct Cli {
    #[arg(long, default_value = "pipeline.toml")]
    config: PathBuf,
    /// Overrides `database_url` from settings.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the board, optionally filtered.
    Show {
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Drag a lead onto another stage column.
    Move { lead_id: String, stage: String },
    /// Submit the new-lead form.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        source: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List the stage registry.
    Stages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log_filter)?)
        .with_writer(std::io::stderr)
        .init();

    let command = cli.command.unwrap_or(Command::Show {
        search: String::new(),
    });
    if let Command::Stages = command {
        for stage in stages() {
            println!("{:<12} {}", stage.id, stage.name);
        }
        return Ok(());
    }

    let store = open_store(&settings).await?;
    let controller = BoardController::new(store).with_policy(settings.reconciliation.into_policy());
    info!(
        store = ?settings.store,
        policy = controller.policy_name(),
        "board ready"
    );
    let mut events = controller.subscribe_events();

    controller.dispatch(BoardCommand::Reload).await?;

    let result = match command {
        Command::Show { search } => {
            print!("{}", render_board(&controller.snapshot(&search).await));
            Ok(())
        }
        Command::Move { lead_id, stage } => {
            run_move(&controller, LeadId::new(lead_id), stage).await
        }
        Command::Add {
            name,
            email,
            phone,
            source,
            notes,
        } => {
            let form = LeadForm::new(name, email)
                .with_phone(phone)
                .with_source(source)
                .with_notes(notes);
            controller
                .dispatch(BoardCommand::SubmitNewLead(form))
                .await
                .map(|outcome| {
                    if let CommandOutcome::Created(lead) = outcome {
                        print!("{}", render_card(&lead));
                    }
                })
                .map_err(Into::into)
        }
        Command::Stages => Ok(()),
    };

    print_notifications(&mut events);
    result
}

async fn run_move(controller: &BoardController, lead_id: LeadId, stage: String) -> Result<()> {
    controller
        .dispatch(BoardCommand::DragStart { lead_id })
        .await?;
    match controller
        .dispatch(BoardCommand::DropOnStage { stage_id: stage })
        .await?
    {
        CommandOutcome::Dropped(outcome) => {
            info!(?outcome, "drop finished");
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn open_store(settings: &Settings) -> Result<Arc<dyn LeadStore>> {
    let seed = match &settings.seed_path {
        Some(path) => InMemoryLeadStore::load_seed_file(path)?,
        None => Vec::new(),
    };

    match settings.store {
        StoreBackend::Memory => {
            let latency = Latency::uniform(Duration::from_millis(settings.latency_ms));
            Ok(Arc::new(
                InMemoryLeadStore::with_seed(seed).with_latency(latency),
            ))
        }
        StoreBackend::Sqlite => {
            let database_url = normalize_database_url(&settings.database_url);
            let storage = Storage::new(&database_url).await.map_err(|error| {
                error!(
                    %database_url,
                    %error,
                    "failed to open lead database"
                );
                error
            })?;
            let mut imported = 0;
            for lead in &seed {
                if storage
                    .import_lead(lead)
                    .await
                    .with_context(|| format!("failed to import seed lead '{}'", lead.id))?
                {
                    imported += 1;
                }
            }
            if imported > 0 {
                info!(imported, "seeded lead store");
            }
            Ok(Arc::new(storage))
        }
    }
}

fn print_notifications(events: &mut broadcast::Receiver<BoardEvent>) {
    while let Ok(event) = events.try_recv() {
        if let Some(notification) = event.notification() {
            println!("{}", render_notification(notification));
        }
    }
}
