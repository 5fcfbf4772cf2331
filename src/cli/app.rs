use super::demo;
use anyhow::{Context, Result};
use app_migrations::prelude::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "app-migrations")]
#[command(about = "Run and inspect the demo application migrations")]
pub struct Cli {
    /// Snapshot file backing the store; in-memory only when omitted
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply pending schema changes and data migrations
    Run {
        /// Turn migrations off for this run, as APP_MIGRATIONS_ENABLED=false would
        #[arg(long)]
        disable: bool,
    },
    /// Show current and target versions and what the next run would apply
    Status,
    /// List recorded versions
    History,
}

pub struct App {
    store: MemoryStore,
    config: MigrationConfig,
}

impl App {
    pub fn open(data: Option<PathBuf>) -> Result<Self> {
        let config = MigrationConfig::from_env().context("Invalid migration configuration")?;
        let store = match data {
            Some(path) => MemoryStore::open(&path)
                .with_context(|| format!("Failed to open store '{}'", path.display()))?,
            None => MemoryStore::new(),
        };
        Ok(Self { store, config })
    }

    pub async fn execute(self, command: Command) -> Result<()> {
        match command {
            Command::Run { disable } => self.run(disable).await,
            Command::Status => self.status().await,
            Command::History => self.history().await,
        }
    }

    fn orchestrator(&self, config: MigrationConfig) -> Result<MigrationOrchestrator<MemoryStore>> {
        let orchestrator = MigrationOrchestrator::builder(self.store.clone())
            .engine(demo::engine(&self.store, &config))
            .registry(demo::registry()?)
            .schema_migrator(demo::schema(&config)?)
            .config(config)
            .build()?;
        Ok(orchestrator)
    }

    async fn run(&self, disable: bool) -> Result<()> {
        let config = self.config.clone().enabled(self.config.enabled && !disable);
        let mut orchestrator = self.orchestrator(config)?;
        let report = orchestrator.run().await.context("Migration run failed")?;

        match report.outcome {
            RunOutcome::Skipped => println!("Migrations are disabled; nothing was run."),
            RunOutcome::HistoryAhead => println!(
                "History ({}) is ahead of the registered migrations ({}); nothing to apply.",
                report.current, report.target
            ),
            RunOutcome::Completed => {
                println!("Migrated {} -> {}", report.current, report.target);
                if report.schema_migrated {
                    println!("  schema changes applied");
                }
                for step in &report.steps {
                    println!(
                        "  {} {:<20} first_time={} registered={} ({:?})",
                        step.version, step.name, step.first_time, step.registered, step.elapsed
                    );
                }
            }
        }
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let orchestrator = self.orchestrator(self.config.clone())?;
        let plan = orchestrator.plan().await?;

        println!("Enabled: {}", plan.enabled);
        println!("Current version: {}", plan.current);
        println!("Target version:  {}", plan.target);
        if plan.history_ahead() {
            println!("History is ahead of the registered migrations.");
        }
        if plan.pending.is_empty() {
            println!("Nothing pending.");
        }
        for step in &plan.pending {
            let marker = if step.first_time { "new" } else { "rerun" };
            println!("  {} ({})", step.version, marker);
        }
        Ok(())
    }

    async fn history(&self) -> Result<()> {
        let engine = demo::engine(&self.store, &self.config);
        let records = engine.records().await?;

        if records.is_empty() {
            println!("No versions recorded in '{}'.", engine.table_name());
        }
        for record in records {
            println!(
                "{:>4}  {:<10} {}",
                record.id,
                record.version,
                record.applied_at.to_rfc3339()
            );
        }
        Ok(())
    }
}
