#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use wagate::control::http;
use wagate::link::memory::MemoryTransport;
use wagate::{Config, Controller, Engine};

#[derive(Parser)]
#[command(name = "wagate", about = "Multi-session WhatsApp bot gateway", version)]
struct Cli {
    /// Path to a config file; defaults to ~/.wagate/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the control API bind address.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_init()?,
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    let bind_addr = config.bind_addr.clone();
    let engine = Engine::new(config, Arc::new(MemoryTransport::new()))?;

    // Enabled sessions come back up without operator action.
    for session in engine.sessions().list()? {
        if session.enabled {
            if let Err(error) = engine.connect(&session.id).await {
                tracing::warn!(session = %session.id, %error, "startup connect failed");
            }
        }
    }

    let controller = Controller::new(engine.clone());
    let result = http::serve(controller, &bind_addr).await;

    tracing::info!("shutting down; closing live links");
    engine.shutdown().await;
    result
}
