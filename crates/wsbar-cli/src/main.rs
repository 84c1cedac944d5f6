//! wsbar CLI
//!
//! Check configuration, try rewrite rules and inspect or focus workspaces
//! without running the daemon.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

use wsbar_config::Config;
use wsbar_daemon::context::ModuleContext;
use wsbar_daemon::hypr_ipc::CompositorClient;
use wsbar_daemon::reconciler::Reconciler;
use wsbar_daemon::rewrite::RewriteEngine;
use wsbar_daemon::workspace::ConfigLookup;

#[derive(Parser, Debug)]
#[command(name = "wsbar")]
#[command(about = "Workspace state tool for Hyprland bars")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/wsbar/config.kdl")]
    config: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// Show what a window would be displayed as
    Rewrite {
        /// Window class
        class: String,

        /// Window title
        title: Option<String>,
    },

    /// Print the reconciled workspace list once
    Workspaces {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Focus a workspace by name
    Focus {
        /// Workspace name, e.g. `3`, `web` or `special:magic`
        name: String,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate => cmd_validate(&config_path),
        Commands::Rewrite { class, title } => {
            cmd_rewrite(&config_path, &class, title.as_deref().unwrap_or(""))
        }
        Commands::Workspaces { json } => cmd_workspaces(&config_path, json).await,
        Commands::Focus { name } => cmd_focus(&config_path, &name).await,
    }
}

fn load(config_path: &Path) -> miette::Result<Config> {
    Ok(wsbar_config::parse_config(config_path)?)
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = load(config_path)?;
    let workspaces = &config.workspaces;
    let context = ModuleContext::new(workspaces.clone());

    println!("Configuration is valid!");
    println!(
        "  Output: {}",
        workspaces.output.as_deref().unwrap_or("<all>")
    );
    println!("  Sort: {:?}", workspaces.sort_by);
    println!("  Format: {:?}", workspaces.format);

    let persistent = context.persistent_names();
    if !persistent.is_empty() {
        println!("  Persistent workspaces: {}", persistent.join(", "));
    }

    let engine = context.rewrite_engine();
    println!(
        "  Rewrite rules: {} ({} usable)",
        workspaces.window_rewrite.len(),
        engine.rule_count()
    );
    if engine.rule_count() < workspaces.window_rewrite.len() {
        return Err(miette::miette!(
            "{} rewrite rule(s) have invalid patterns",
            workspaces.window_rewrite.len() - engine.rule_count()
        ));
    }

    Ok(())
}

fn cmd_rewrite(config_path: &Path, class: &str, title: &str) -> miette::Result<()> {
    let config = load(config_path)?;
    let engine = RewriteEngine::from_config(&config.workspaces);

    let key = engine.window_key(class, title);
    let (_, matched) = engine.resolve_with_match(&key);

    println!("Input:  {}", key);
    println!("Output: {}", engine.resolve_window(class, title));
    if !matched {
        println!("(no rule matched, default used)");
    }

    Ok(())
}

async fn cmd_workspaces(config_path: &Path, json: bool) -> miette::Result<()> {
    let config = load(config_path)?;
    let client = CompositorClient::connect(config.global.request_timeout)
        .await
        .into_diagnostic()?;

    let mut reconciler = Reconciler::new(config.workspaces);
    let rendered = reconciler.refresh(&client).await.into_diagnostic()?;
    client.shutdown().await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rendered).into_diagnostic()?
        );
        return Ok(());
    }

    for ws in &rendered {
        println!(
            "{:>4}  {:<16} {:<12} [{}]",
            ws.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            ws.label,
            ws.output,
            ws.classes.join(" ")
        );
        for line in ws.tooltip.lines().skip(1) {
            println!("        {}", line);
        }
    }

    Ok(())
}

async fn cmd_focus(config_path: &Path, name: &str) -> miette::Result<()> {
    let config = load(config_path)?;
    let client = CompositorClient::connect(config.global.request_timeout)
        .await
        .into_diagnostic()?;

    let mut reconciler = Reconciler::new(config.workspaces);
    reconciler.refresh(&client).await.into_diagnostic()?;

    let result = match reconciler.click_command(name) {
        Some(command) => client.execute(&command).await.into_diagnostic(),
        None => Err(miette::miette!("No workspace named `{}` on this bar", name)),
    };
    client.shutdown().await;

    result
}
