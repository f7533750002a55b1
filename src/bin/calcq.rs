//! calcq CLI: run the service or manage its persisted configuration.

use calcq::config::{ConfigStore, Settings, persist};
use calcq::engine::{Engine, PoolConfig};
use calcq::eval::{evaluate, format_result};
use calcq::http::{self, AppState};
use calcq::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "calcq", about = "Elastic arithmetic evaluation service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service and worker pool
    Serve {
        /// Address to listen on (overrides CALCQ_LISTEN)
        #[arg(long)]
        listen: Option<SocketAddr>,
        /// Persisted configuration file (overrides CALCQ_CONFIG_PATH)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Persisted configuration operations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Evaluate one expression without the pool
    Eval {
        #[arg(allow_hyphen_values = true)]
        expression: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the persisted configuration
    Show {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Set KEY=VALUE pairs; values must be non-negative integers
    Set {
        #[arg(required = true)]
        pairs: Vec<String>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Command::Serve { listen, config } => {
            cmd_serve(settings.clone(), listen.unwrap_or(settings.listen), config).await
        }
        Command::Config { action } => match action {
            ConfigAction::Show { config } => {
                cmd_config_show(config.unwrap_or(settings.config_path))
            }
            ConfigAction::Set { pairs, config } => {
                cmd_config_set(config.unwrap_or(settings.config_path), pairs)
            }
        },
        Command::Eval { expression } => cmd_eval(&expression),
    }
}

async fn cmd_serve(
    settings: Settings,
    listen: SocketAddr,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: settings.otel_endpoint.clone(),
        service_name: "calcq".to_string(),
        log_level: settings.log_level.clone(),
    })?;

    let config_path = config_path.unwrap_or(settings.config_path);
    let initial = persist::load(&config_path).unwrap_or_else(|e| {
        tracing::warn!(path = %config_path.display(), "unreadable config, starting empty: {e}");
        Default::default()
    });
    info!(path = %config_path.display(), entries = initial.len(), "config loaded");

    let engine = Arc::new(Engine::new(
        initial,
        PoolConfig {
            shrink_retry: settings.shrink_retry,
        },
    ));
    let workers = engine.reconcile().await;
    info!(workers, "worker pool started");

    let eng = Arc::clone(&engine);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        eng.shutdown();
    });

    let listener = tokio::net::TcpListener::bind(listen).await?;
    http::serve(listener, AppState::new(engine, Some(config_path))).await?;

    info!("stopped");
    Ok(())
}

fn cmd_config_show(path: PathBuf) -> anyhow::Result<()> {
    let store = ConfigStore::new(persist::load(&path)?);
    let snapshot = store.snapshot();
    if snapshot.is_empty() {
        println!("No configuration in {}.", path.display());
        return Ok(());
    }

    println!("{:<16}  VALUE", "KEY");
    println!("{}", "-".repeat(28));
    for (key, value) in &snapshot {
        println!("{key:<16}  {value}");
    }
    Ok(())
}

fn cmd_config_set(path: PathBuf, pairs: Vec<String>) -> anyhow::Result<()> {
    let mut parsed = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("expected KEY=VALUE, got '{pair}'");
        };
        parsed.push((key.to_string(), value.to_string()));
    }

    let store = ConfigStore::new(persist::load(&path)?);
    let outcome = store.apply_edit(parsed);
    for key in &outcome.rejected {
        eprintln!("Rejected: {key} (value must be a non-negative integer)");
    }
    for (key, value) in &outcome.applied {
        println!("Set: {key} = {value}");
    }
    if outcome.applied.is_empty() {
        anyhow::bail!("nothing to save");
    }

    persist::save(&path, &store.snapshot())?;
    Ok(())
}

fn cmd_eval(expression: &str) -> anyhow::Result<()> {
    match evaluate(expression) {
        Ok(value) => {
            println!("{}", format_result(value));
            Ok(())
        }
        Err(e) => anyhow::bail!("bad expression: {e}"),
    }
}
