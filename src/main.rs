use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use vigiltak_core::AgentConfig;
use vigiltak_relay::Agent;

/// VigilTAK - CoT situational awareness relay agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML). Environment variables with a
    /// VIGILTAK__ prefix override file values.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for rustls
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config =
        AgentConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    info!(
        callsign = %config.callsign,
        team = %config.team,
        links = ?config.links,
        "starting vigiltak agent"
    );

    let agent = Agent::new(config);
    tokio::select! {
        result = agent.run() => result.context("agent stopped")?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
