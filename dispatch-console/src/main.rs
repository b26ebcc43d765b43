//! # Dispatch Console
//!
//! Headless operator console. `run` keeps the engine live and logs alerts
//! and map summaries; `snapshot` performs one poll cycle and prints the
//! projected markers as JSON.

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use dispatch_config::{Config, ConfigLoad, ConfigLoader};
use dispatch_core::{
    EngineParts, EnrichmentState, MarkerList, Signal, SyncEngine, SystemClock,
    Topic,
    channel::WsTransport,
    enrichment::HttpAssetFetcher,
    poll::HttpPollSource,
};
use dispatch_model::EntityKind;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "dispatch-console")]
#[command(about = "Real-time incident, responder and post sync for dispatch operators")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct GlobalArgs {
    /// Config file (TOML or JSON); takes precedence over DISPATCH_CONFIG_PATH
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Explicit .env file to load instead of ./.env
    #[arg(long, env = "DISPATCH_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// REST API base URL (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Push channel WebSocket URL (overrides config)
    #[arg(long)]
    push_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Keep the engine running until interrupted
    Run(RunArgs),
    /// Poll once and print the projected markers as JSON
    Snapshot(SnapshotArgs),
}

#[derive(ClapArgs, Debug, Clone)]
struct RunArgs {
    /// Quiet period before a burst of changes is summarized
    #[arg(long, default_value_t = 250)]
    debounce_ms: u64,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self { debounce_ms: 250 }
    }
}

#[derive(ClapArgs, Debug, Clone)]
struct SnapshotArgs {
    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// How long to wait for marker photos before printing
    #[arg(long, default_value_t = 3_000)]
    enrichment_wait_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dispatch_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli.global)?;
    let engine = build_engine(&config)?;

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(&engine, args).await,
        Command::Snapshot(args) => snapshot(&engine, args).await,
    }
}

fn load_config(args: &GlobalArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad { config, warnings } = loader
        .load_with_overrides(|env| {
            if let Some(path) = &args.config {
                env.config_path = Some(path.clone());
            }
            if let Some(url) = &args.api_url {
                env.api_url = Some(url.clone());
            }
            if let Some(url) = &args.push_url {
                env.push_url = Some(url.clone());
            }
        })
        .context("failed to load configuration")?;

    if let Some(path) = &config.metadata.env_file {
        info!(path = %path.display(), "loaded .env file");
    }
    for warning in &warnings {
        warn!(key = warning.key, message = %warning.message, "configuration warning");
    }

    let poll = &config.engine.poll;
    info!(
        source = %config.metadata.source,
        api = %config.api.base_url,
        push = %config.push.url,
        poll.connected_ms = poll.connected_interval_ms,
        poll.disconnected_ms = poll.disconnected_interval_ms,
        poll.prune_missing = poll.prune_missing,
        "configuration in effect"
    );
    Ok(config)
}

fn build_engine(config: &Config) -> anyhow::Result<SyncEngine> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("dispatch-console/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let token = config.api.token.clone();

    let parts = EngineParts {
        transport: Arc::new(WsTransport::new(
            config.push.url.clone(),
            token.clone(),
        )),
        source: Arc::new(
            HttpPollSource::new(client.clone(), config.api.base_url.clone())
                .with_token(token.clone()),
        ),
        fetcher: Arc::new(
            HttpAssetFetcher::new(client, config.api.base_url.clone())
                .with_token(token),
        ),
        clock: Arc::new(SystemClock),
    };
    Ok(SyncEngine::new(config.engine.clone(), parts))
}

async fn run(engine: &SyncEngine, args: RunArgs) -> anyhow::Result<()> {
    let _alerts = engine.bus().subscribe(Topic::Alerts, |signal| match signal {
        Signal::AlertRaised(record) if record.kind.is_audible() => warn!(
            incident = %record.incident,
            priority = ?record.priority,
            "call to action"
        ),
        Signal::AlertRaised(record) => info!(
            incident = %record.incident,
            priority = ?record.priority,
            "new incident"
        ),
        Signal::AlertDismissed(incident) => {
            debug!(incident = %incident, "alert dismissed")
        }
        _ => {}
    });
    let _health = engine.bus().subscribe(Topic::ConnectionHealth, |signal| {
        if let Signal::ConnectionHealth(health) = signal {
            debug!(
                state = ?health.state,
                rtt_ms = health.rtt.map(|rtt| rtt.as_millis() as u64),
                stale = health.stale_heartbeats,
                "push channel health"
            );
        }
    });

    engine.start();
    let debounce = Duration::from_millis(args.debounce_ms);
    let mut revision = engine.watch_revision();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    error!(error = %err, "failed to listen for ctrl-c");
                }
                info!("shutdown requested");
                break;
            }
            changed = revision.changed() => {
                if changed.is_err() {
                    break;
                }
                tokio::time::sleep(debounce).await;
                let current = *revision.borrow_and_update();
                summarize(engine, current);
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn summarize(engine: &SyncEngine, revision: u64) {
    let markers = engine.project();
    info!(
        revision,
        state = ?engine.connection_state(),
        incidents = markers.count(EntityKind::Incident),
        personnel = markers.count(EntityKind::Personnel),
        posts = markers.count(EntityKind::Post),
        urgent = markers.iter().filter(|marker| marker.urgent).count(),
        alerts = engine.showing_alerts().len(),
        "map updated"
    );
}

fn pending(markers: &MarkerList) -> usize {
    markers
        .iter()
        .filter(|marker| marker.icon.state == EnrichmentState::Pending)
        .count()
}

async fn snapshot(engine: &SyncEngine, args: SnapshotArgs) -> anyhow::Result<()> {
    if let Err(err) = engine.poll_once().await {
        warn!(error = %err, "snapshot is incomplete");
    }

    let mut revision = engine.watch_revision();
    let deadline = tokio::time::Instant::now()
        + Duration::from_millis(args.enrichment_wait_ms);
    let markers = loop {
        let _ = revision.borrow_and_update();
        let markers = engine.project();
        let waiting = pending(&markers);
        if waiting == 0 {
            break markers;
        }
        match tokio::time::timeout_at(deadline, revision.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => break markers,
            Err(_) => {
                warn!(pending = waiting, "printing before all photos resolved");
                break markers;
            }
        }
    };

    let output = if args.pretty {
        serde_json::to_string_pretty(&markers)
    } else {
        serde_json::to_string(&markers)
    }
    .context("failed to serialize markers")?;
    println!("{output}");
    Ok(())
}
