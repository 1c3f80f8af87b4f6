//! stigmer-admin: operator CLI for store maintenance and supervisor
//! status/recovery.
//!
//! Grounded directly on teacher `src/bin/admin.rs`'s `clap::Parser`
//! structure and `--confirm`-gated destructive subcommands, repointed from
//! NATS cleanup at stream granularity to the sled-backed resource store
//! and subprocess/container supervisor this daemon actually runs.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use stigmer::config::DaemonConfig;
use stigmer::models::{
    Agent, AgentExecution, AgentInstance, Environment, HasMetadata, Session, Skill, Workflow,
    WorkflowExecution, WorkflowInstance, KIND_AGENT, KIND_AGENT_EXECUTION, KIND_AGENT_INSTANCE,
    KIND_ENVIRONMENT, KIND_SESSION, KIND_SKILL, KIND_WORKFLOW, KIND_WORKFLOW_EXECUTION,
    KIND_WORKFLOW_INSTANCE,
};
use stigmer::storage::codec::{decode, StorageCodec};
use stigmer::storage::sled_store::SledStore;
use stigmer::storage::Store;
use stigmer::supervisor::container::ContainerSupervisor;
use stigmer::supervisor::{process, Supervisor};

/// Every resource kind this daemon persists, in the order `store stats`
/// reports them.
const ALL_KINDS: &[&str] = &[
    KIND_AGENT,
    KIND_AGENT_INSTANCE,
    KIND_SESSION,
    KIND_AGENT_EXECUTION,
    KIND_WORKFLOW,
    KIND_WORKFLOW_INSTANCE,
    KIND_WORKFLOW_EXECUTION,
    KIND_SKILL,
    KIND_ENVIRONMENT,
];

#[derive(Parser)]
#[command(name = "stigmer-admin")]
#[command(about = "stigmer Admin CLI - store maintenance and supervisor status")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon home directory (defaults to the same `~/.stigmer` stigmerd uses).
    #[arg(long, env = "STIGMER_HOME")]
    home: Option<std::path::PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resource store maintenance
    Store {
        #[command(subcommand)]
        action: StoreCommands,
    },

    /// Supervisor status and recovery
    Supervisor {
        #[command(subcommand)]
        action: SupervisorCommands,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Resource counts per kind
    Stats,

    /// List resource ids of a kind
    List {
        /// Resource kind, e.g. "agent", "workflow", "agent-execution"
        kind: String,
    },

    /// Delete a single resource by kind and id
    Delete {
        kind: String,
        id: String,

        /// Confirm the deletion
        #[arg(long)]
        confirm: bool,
    },

    /// Delete every resource of a kind
    DeleteByKind {
        kind: String,

        /// Confirm the deletion
        #[arg(long)]
        confirm: bool,
    },

    /// Delete every resource of every kind
    DeleteAll {
        /// Confirm the deletion
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum SupervisorCommands {
    /// Workflow-runner and agent-runner liveness
    Status,

    /// Restart the workflow-runner subprocess
    RestartWorkflowRunner {
        /// Confirm the restart
        #[arg(long)]
        confirm: bool,
    },

    /// Stop the agent-runner container
    StopAgentRunner {
        /// Confirm the stop
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let mut config = DaemonConfig::load()?;
    if let Some(home) = cli.home.clone() {
        config.home_dir = home;
    }

    match cli.command {
        Commands::Store { action } => run_store_command(&config, action).await?,
        Commands::Supervisor { action } => run_supervisor_command(&config, action).await?,
    }

    Ok(())
}

async fn run_store_command(config: &DaemonConfig, action: StoreCommands) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(SledStore::open(&config.data_dir())?);

    match action {
        StoreCommands::Stats => store_stats(store.as_ref()).await?,
        StoreCommands::List { kind } => store_list(store.as_ref(), &kind).await?,
        StoreCommands::Delete { kind, id, confirm } => {
            if !confirm {
                error!("{} delete requires --confirm", "❌".red());
                return Ok(());
            }
            store_delete(store.as_ref(), &kind, &id).await?;
        }
        StoreCommands::DeleteByKind { kind, confirm } => {
            if !confirm {
                error!("{} delete-by-kind requires --confirm", "❌".red());
                return Ok(());
            }
            store_delete_by_kind(store.as_ref(), &kind).await?;
        }
        StoreCommands::DeleteAll { confirm } => {
            if !confirm {
                error!("{} delete-all requires --confirm", "❌".red());
                return Ok(());
            }
            let bar = ProgressBar::new(ALL_KINDS.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} kinds")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            for kind in ALL_KINDS {
                store_delete_by_kind(store.as_ref(), kind).await?;
                bar.inc(1);
            }
            bar.finish_with_message("done");
            info!("{} all kinds cleared", "✅".green());
        }
    }

    Ok(())
}

fn validate_kind(kind: &str) -> Result<&'static str> {
    ALL_KINDS
        .iter()
        .find(|&&k| k == kind)
        .copied()
        .ok_or_else(|| anyhow::anyhow!("unknown kind {kind:?}; expected one of {ALL_KINDS:?}"))
}

async fn store_stats(store: &dyn Store) -> Result<()> {
    println!("\n{}", "stigmer store statistics".bold());
    println!("==========================");
    let mut total = 0usize;
    for kind in ALL_KINDS {
        let count = store.list_resources(kind).await?.len();
        total += count;
        println!("  {:<20} {}", kind, count);
    }
    println!("  {:<20} {}", "total".bold(), total);
    Ok(())
}

/// Decodes each record with the kind's own `StorageCodec` (spec §4.5:
/// the store holds proto bytes, not JSON) and prints its id/slug/name.
/// A single corrupt record is skipped rather than failing the whole
/// listing.
fn print_records<T: StorageCodec + HasMetadata>(records: Vec<Vec<u8>>) {
    for bytes in records {
        match decode::<T>(&bytes) {
            Ok(value) => {
                let metadata = value.metadata();
                println!("  {}  {}  {}", metadata.id, metadata.slug, metadata.name);
            }
            Err(err) => warn!(error = %err, "skipping corrupt record while listing"),
        }
    }
}

async fn store_list(store: &dyn Store, kind: &str) -> Result<()> {
    let kind = validate_kind(kind)?;
    let records = store.list_resources(kind).await?;

    println!("\n{} ({})", kind.bold(), records.len());
    println!("=====================================");
    if records.is_empty() {
        println!("No resources found.");
        return Ok(());
    }

    match kind {
        KIND_AGENT => print_records::<Agent>(records),
        KIND_AGENT_INSTANCE => print_records::<AgentInstance>(records),
        KIND_SESSION => print_records::<Session>(records),
        KIND_AGENT_EXECUTION => print_records::<AgentExecution>(records),
        KIND_WORKFLOW => print_records::<Workflow>(records),
        KIND_WORKFLOW_INSTANCE => print_records::<WorkflowInstance>(records),
        KIND_WORKFLOW_EXECUTION => print_records::<WorkflowExecution>(records),
        KIND_SKILL => print_records::<Skill>(records),
        KIND_ENVIRONMENT => print_records::<Environment>(records),
        other => unreachable!("validate_kind admitted an unhandled kind {other:?}"),
    }
    Ok(())
}

async fn store_delete(store: &dyn Store, kind: &str, id: &str) -> Result<()> {
    let kind = validate_kind(kind)?;
    match store.delete_resource(kind, id).await? {
        Some(_) => info!("🗑️  deleted {kind}/{id}"),
        None => warn!("no such resource: {kind}/{id}"),
    }
    Ok(())
}

async fn store_delete_by_kind(store: &dyn Store, kind: &str) -> Result<()> {
    let kind = validate_kind(kind)?;
    let deleted = store.delete_resources_by_kind(kind).await?;
    info!("🗑️  deleted {deleted} resources of kind {kind}");
    Ok(())
}

async fn run_supervisor_command(config: &DaemonConfig, action: SupervisorCommands) -> Result<()> {
    match action {
        SupervisorCommands::Status => supervisor_status(config).await?,
        SupervisorCommands::RestartWorkflowRunner { confirm } => {
            if !confirm {
                error!("{} restart requires --confirm", "❌".red());
                return Ok(());
            }
            let mut supervisor = Supervisor::new(config.clone())?;
            supervisor.acquire_temporal_lock()?;
            let pid = supervisor.start_workflow_runner()?;
            info!("{} workflow-runner restarted, pid {pid}", "✅".green());
        }
        SupervisorCommands::StopAgentRunner { confirm } => {
            if !confirm {
                error!("{} stop requires --confirm", "❌".red());
                return Ok(());
            }
            let agent_runner = ContainerSupervisor::connect(config.supervisor.agent_runner_container_name.clone())?;
            agent_runner.stop(10).await?;
            info!("{} agent-runner stopped", "✅".green());
        }
    }
    Ok(())
}

async fn supervisor_status(config: &DaemonConfig) -> Result<()> {
    println!("\n{}", "stigmer supervisor status".bold());
    println!("===========================");

    let startup_path = config.startup_config_path();
    match stigmer::supervisor::StartupConfig::load(&startup_path) {
        Ok(startup) => match startup.workflow_runner_pid {
            Some(pid) => {
                let alive = process::process_exists(pid);
                let status = if alive { "running".green() } else { "not running".red() };
                println!("  workflow-runner   pid={pid}  {status}");
            }
            None => println!("  workflow-runner   {}", "not started".yellow()),
        },
        Err(err) => println!("  workflow-runner   {} ({err})", "unreadable startup record".yellow()),
    }

    match ContainerSupervisor::connect(config.supervisor.agent_runner_container_name.clone()) {
        Ok(agent_runner) => match agent_runner.is_healthy().await {
            Ok(true) => println!("  agent-runner      {}", "healthy".green()),
            Ok(false) => println!("  agent-runner      {}", "unhealthy".red()),
            Err(err) => println!("  agent-runner      {} ({err})", "unknown".yellow()),
        },
        Err(err) => println!("  agent-runner      {} ({err})", "unavailable".yellow()),
    }

    Ok(())
}
