//! wsbar daemon
//!
//! Tracks compositor workspaces and prints the render-ready list as one JSON
//! line each time it changes.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter};

use wsbar_config::Config;
use wsbar_daemon::hypr_ipc::{CompositorClient, ConnectionState, DEFAULT_MAX_RETRIES};
use wsbar_daemon::reconciler::Reconciler;
use wsbar_daemon::render::{JsonLineSink, RenderSink};

#[derive(Parser, Debug)]
#[command(name = "wsbard")]
#[command(about = "Workspace state daemon for Hyprland bars")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/wsbar/config.kdl")]
    config: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

/// Why the event loop returned
enum Exit {
    Shutdown,
    Disconnected,
}

type ShutdownSignal = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG, then --log-level, then the config file once it is loaded
    let env_filter = EnvFilter::try_from_default_env().ok();
    let level_fixed = env_filter.is_some() || args.log_level.is_some();
    let (filter, filter_handle) = reload::Layer::new(env_filter.unwrap_or_else(|| {
        EnvFilter::new(args.log_level.as_deref().unwrap_or("info"))
    }));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();

    info!("Loading configuration from {}", config_path.display());

    let config = wsbar_config::parse_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    if !level_fixed {
        let directive = config.global.log_level.as_directive();
        if let Err(e) = filter_handle.modify(|filter| *filter = EnvFilter::new(directive)) {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    info!(
        output = config.workspaces.output.as_deref().unwrap_or("<all>"),
        rules = config.workspaces.window_rewrite.len(),
        "Loaded configuration"
    );

    let mut sink = JsonLineSink::new(io::stdout());
    let mut shutdown: ShutdownSignal = Box::pin(tokio::signal::ctrl_c());

    loop {
        let client = CompositorClient::connect_with_retry(
            DEFAULT_MAX_RETRIES,
            config.global.request_timeout,
        )
        .await
        .context("Failed to connect to the compositor")?;

        info!(
            events = %client.paths().events.display(),
            "Connected to compositor"
        );

        let exit = run(&client, &config, &mut sink, &mut shutdown).await;
        client.shutdown().await;

        match exit? {
            Exit::Shutdown => break,
            Exit::Disconnected => warn!("Compositor connection lost, reconnecting"),
        }
    }

    info!("Shutting down...");

    Ok(())
}

/// Reconcile and render until shutdown or disconnect
async fn run(
    client: &Arc<CompositorClient>,
    config: &Config,
    sink: &mut impl RenderSink,
    shutdown: &mut ShutdownSignal,
) -> Result<Exit> {
    let mut reconciler = Reconciler::new(config.workspaces.clone());
    let subscription = reconciler.attach(client);

    let exit = reconcile(client, &mut reconciler, config, sink, shutdown).await;
    client.unsubscribe(subscription);
    exit
}

async fn reconcile(
    client: &Arc<CompositorClient>,
    reconciler: &mut Reconciler,
    config: &Config,
    sink: &mut impl RenderSink,
    shutdown: &mut ShutdownSignal,
) -> Result<Exit> {
    let queue = Arc::clone(reconciler.queue());

    let mut state = client.connection_state();
    if !client.is_connected() {
        return Ok(Exit::Disconnected);
    }

    let mut ticker = tokio::time::interval(config.global.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        match reconciler.refresh(client).await {
            Ok(rendered) => sink
                .render(&rendered)
                .context("Failed to write workspace list")?,
            Err(e) => warn!("Failed to refresh workspaces: {}", e),
        }

        tokio::select! {
            _ = queue.notified() => {}
            _ = ticker.tick() => {}
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Disconnected {
                    return Ok(Exit::Disconnected);
                }
            }
            result = &mut *shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                return Ok(Exit::Shutdown);
            }
        }
    }
}
