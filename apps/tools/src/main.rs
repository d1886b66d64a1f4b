use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{Lead, LeadId};
use storage::{LeadStore, Storage};
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/leads.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import leads from a JSON array, skipping ids already present.
    Seed { path: PathBuf },
    List,
    Get { id: String },
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Seed { path } => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let leads: Vec<Lead> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
            let mut imported = 0;
            for lead in &leads {
                if storage.import_lead(lead).await? {
                    imported += 1;
                }
            }
            info!(imported, skipped = leads.len() - imported, "seed finished");
            println!("imported {imported} of {} leads", leads.len());
        }
        Command::List => {
            for lead in storage.get_all().await? {
                println!("{}\t{}\t{}\t{}", lead.id, lead.stage, lead.name, lead.email);
            }
        }
        Command::Get { id } => {
            let id = LeadId::new(id);
            match storage.get(&id).await? {
                Some(lead) => println!("{}", serde_json::to_string_pretty(&lead)?),
                None => println!("no lead with id={id}"),
            }
        }
        Command::Delete { id } => {
            let id = LeadId::new(id);
            storage.delete(&id).await?;
            println!("deleted lead id={id}");
        }
    }

    storage.close().await;
    Ok(())
}
