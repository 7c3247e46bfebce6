use std::sync::Arc;

use clap::Parser;
use cloudpulse::{
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{Config, read_config_file},
    control::ControlPlane,
    dispatcher::{Cadences, DispatcherHandle},
    events::BroadcastPublisher,
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Buffered events per WebSocket subscriber before it starts lagging
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults plus environment overrides when omitted)
    #[arg(short)]
    file: Option<String>,

    /// Log at trace level instead of info
    #[arg(long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("cloudpulse", level),
        ("cloudpulse_hub", level),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    }
    .with_env_overrides();
    config.validate()?;

    if config.agents.is_empty() {
        info!("no agents configured, metrics cycles will be empty");
    }

    let events = BroadcastPublisher::new(EVENT_CAPACITY);
    let control = ControlPlane::from_config(&config, Arc::new(events.clone()))?;

    let dispatcher = DispatcherHandle::spawn(control.clone(), Cadences::from(&config.intervals));

    let addr = spawn_api_server(
        ApiConfig::from(&config.api),
        ApiState::new(control, events),
    )
    .await?;
    info!("cloudpulse hub ready on http://{addr}/api");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Err(e) = dispatcher.shutdown().await {
        error!("{e:#}");
    }

    Ok(())
}
