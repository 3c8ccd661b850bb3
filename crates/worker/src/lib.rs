//! Worker entry points shared by the plain and RAG binaries
//!
//! Startup order: `.env.local`, layered settings, tracing, then the chosen
//! subcommand. Room sessions initialize the agent context before connecting,
//! so a bad prompt file or index fails fast without joining the room.

pub mod cli;
pub mod telemetry;

pub use cli::{Cli, Command};
pub use telemetry::init_tracing;

use anyhow::{bail, Context};
use clap::Parser;
use room_assistant_agent::{provision_index, run_session, AgentContext, AgentVariant};
use room_assistant_config::{load_env_file, load_settings, Settings};

const ENV_FILE: &str = ".env.local";

/// Parse the command line and run the assistant variant
pub async fn main_for(variant: AgentVariant) -> anyhow::Result<()> {
    run(variant, Cli::parse()).await
}

pub async fn run(variant: AgentVariant, cli: Cli) -> anyhow::Result<()> {
    load_env_file(ENV_FILE)?;
    let settings = load_settings(cli.env.as_deref()).context("loading settings")?;
    init_tracing(&settings.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        variant = %variant,
        env = cli.env.as_deref().unwrap_or("default"),
        "Starting room assistant"
    );

    let result = match cli.command {
        Command::Provision => provision(variant, &settings).await,
        Command::Start => {
            let room = settings.transport.room.clone();
            serve(variant, settings, room).await
        }
        Command::Connect { room } => serve(variant, settings, room).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %format!("{:#}", e), "Room assistant exited with error");
    }
    result
}

async fn provision(variant: AgentVariant, settings: &Settings) -> anyhow::Result<()> {
    if variant != AgentVariant::Rag {
        bail!("`provision` is only available for the RAG assistant");
    }

    let (index, outcome) = provision_index(&settings.rag)
        .await
        .context("provisioning index")?;
    tracing::info!(
        outcome = %outcome,
        index_id = index.index_id(),
        nodes = index.len(),
        path = %settings.rag.persist_dir.display(),
        "Index ready"
    );
    Ok(())
}

/// Initialize, connect, then run one session until the room goes away
async fn serve(variant: AgentVariant, settings: Settings, room_name: String) -> anyhow::Result<()> {
    let ctx = AgentContext::init(settings, variant)
        .await
        .context("initializing agent")?;
    let assistant = ctx.assistant().context("assembling voice assistant")?;

    let room = room_assistant_transport::connect(&ctx.settings().transport, &room_name)
        .await
        .map_err(room_assistant_core::Error::from)
        .with_context(|| format!("connecting to room {}", room_name))?;

    let session_config = ctx.session_config();
    let session = run_session(&assistant, room.clone(), &session_config);
    tokio::pin!(session);

    let end = tokio::select! {
        end = &mut session => end?,
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal, leaving room");
            room.disconnect().await?;
            session.await?
        }
    };

    if let Err(e) = room.disconnect().await {
        tracing::warn!(error = %e, "Room disconnect failed");
    }
    tracing::info!(room = %room_name, state = %end.final_state, "Session finished");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}
