mod authority;
mod config;
mod handlers;
mod routes;
mod scheduler;
mod state;
mod tick_loop;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::SchedulerConfig;
use crate::handlers::{register_defaults, HandlerContext};
use crate::scheduler::Scheduler;
use crate::state::{AppState, HostState};

#[derive(Parser)]
#[command(name = "yard_daemon", about = "Shipyard automation daemon")]
struct Cli {
    /// Scenario JSON to load. Mutually exclusive with --seed.
    #[arg(long, conflicts_with = "seed")]
    scenario: Option<PathBuf>,
    /// Generate a scenario with this seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Loose wrecks in a generated scenario.
    #[arg(long, default_value_t = 4)]
    wrecks: usize,
    /// Scheduler config JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 3001)]
    port: u16,
    /// Host ticks per second; 0 runs as fast as possible.
    #[arg(long, default_value_t = 10.0)]
    ticks_per_sec: f64,
    #[arg(long)]
    max_ticks: Option<u64>,
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };
    let scenario = match &cli.scenario {
        Some(path) => yard_world::load_scenario(path)?,
        None => yard_world::generate_scenario(cli.seed.unwrap_or_default(), cli.wrecks),
    };
    tracing::info!(
        scenario = %scenario.name,
        yards = scenario.yards.len(),
        structures = scenario.structures.len(),
        "scenario loaded"
    );

    let app = AppState::new(cli.ticks_per_sec);
    let (authority, inbox) = authority::channel();
    let context = HandlerContext {
        registry: yard_world::build_registry(&scenario, config.authoritative),
        authority,
        app: app.clone(),
    };
    let scheduler = Scheduler::new(config.clone(), context);
    register_defaults(&scheduler.registrar(), &config);

    let router = routes::make_router_with_cors(app.clone(), &cli.cors_origin)?;
    let addr = format!("0.0.0.0:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, ticks_per_sec = cli.ticks_per_sec, "listening");

    let host = HostState::from_scenario(&scenario);
    let server = axum::serve(listener, router);
    tokio::select! {
        result = tick_loop::run_tick_loop(host, inbox, scheduler, app, cli.max_ticks) => {
            let host = result?;
            tracing::info!(tick = host.tick, "tick loop finished");
        }
        result = server => {
            result.context("serving HTTP")?;
        }
    }
    Ok(())
}
