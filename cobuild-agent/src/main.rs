//! COBUILD Agent Entry Point
//!
//! Exit status: 0 after the deadline (whatever happened to the world session
//! or the archive) or an interrupt, 1 when configuration is invalid or the
//! hub stays unreachable.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use cobuild_agent::config::ArchiveMode;
use cobuild_agent::telemetry::{init_tracer, log_snapshot, telemetry_config};
use cobuild_agent::{
    AgentConfig, AgentRunResult, CheckpointCoordinator, Cli, ControlLoop, HubClient, LoopSettings,
    RconConfig, TerminationReason, TerminationSignal,
};
use cobuild_llm::{OllamaConfig, OllamaPlanner};
use cobuild_storage::{Archiver, CheckpointStore, GitArchiver, GitArchiverConfig, NoopArchiver};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("cobuild-agent: {}", err);
            tracing::error!(error = %err, "Agent stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AgentRunResult<()> {
    let config = AgentConfig::load(&cli)?;
    init_tracer(&telemetry_config(cli.log_json))?;
    let identity = config.identity()?;

    // The deadline counts from process start, not from the first cycle.
    let signal = TerminationSignal::new();
    let _deadline = signal.spawn_deadline(config.deadline());
    let interrupt = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && interrupt.request(TerminationReason::Interrupted) {
            tracing::info!("Interrupt received");
        }
    });

    tracing::info!(
        agent = %identity.name,
        partner = %identity.partner,
        pair_id = %identity.pair,
        role = %identity.role,
        hub = %config.hub.url,
        "Starting COBUILD agent"
    );

    let hub = HubClient::new(&config.hub.url, Duration::from_millis(config.hub.request_timeout_ms))?;
    let planner = OllamaPlanner::new(OllamaConfig {
        endpoint: config.planner.endpoint.clone(),
        model: config.planner.model.clone(),
        timeout: Duration::from_millis(config.planner.timeout_ms),
        json_mode: config.planner.json_mode,
    })?;
    // Connected by the loop once the hub has answered.
    let world = RconConfig {
        host: config.world.host.clone(),
        port: config.world.port,
        password: config.world.password.clone(),
        agent_name: identity.name.clone(),
        command_timeout: Duration::from_millis(config.world.command_timeout_ms),
    };

    let archiver: Arc<dyn Archiver> = match config.archive.mode {
        ArchiveMode::None => Arc::new(NoopArchiver),
        ArchiveMode::Git => Arc::new(GitArchiver::new(GitArchiverConfig {
            repo_dir: config.archive.repo_dir.clone(),
            remote: config.archive.remote.clone(),
            branch: config.archive.branch.clone(),
            author_name: config.archive.author_name.clone(),
            author_email: config.archive.author_email.clone(),
            command_timeout: Duration::from_millis(config.archive.command_timeout_ms),
        })),
    };
    let coordinator = CheckpointCoordinator::new(
        identity.role,
        identity.pair,
        CheckpointStore::new(config.archive.checkpoint_dir.clone()),
        archiver,
    );

    let control = ControlLoop::new(
        identity,
        LoopSettings::from(&config),
        Arc::new(hub),
        Arc::new(planner),
        Arc::new(world),
        coordinator,
    );
    let summary = control.run(signal.subscribe()).await;
    log_snapshot();
    let summary = summary?;

    tracing::info!(
        reason = ?summary.reason,
        cycles = summary.cycles,
        memo = %summary.memo,
        checkpoint = ?summary.checkpoint,
        "Agent terminated"
    );
    Ok(())
}
