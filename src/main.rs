use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use unamentis_core::config::{AppConfig, LogFormat, LoggingConfig};
use unamentis_core::InMemoryServerConfigStore;
use unamentis_discovery::{
    DeviceDiscoveryManager, DiscoveredServer, DiscoveryState, FileCacheStore, ServerConfigBridge,
};

/// UnaMentis - locate the gateway on the local network
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "UNAMENTIS_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run tiered discovery (cached, mDNS, subnet scan)
    Discover,

    /// Verify and use a gateway at a known address
    Connect {
        #[arg(long)]
        host: String,

        #[arg(long)]
        port: u16,

        /// Display name (defaults to the name the gateway reports)
        #[arg(long)]
        name: Option<String>,
    },

    /// Inspect or clear the cached gateway address
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    init_tracing(&config.logging);

    let cache_path = config.cache.resolved_path();
    info!(cache = %cache_path.display(), "Using gateway cache");

    let store = Arc::new(FileCacheStore::new(cache_path));
    let manager = Arc::new(
        DeviceDiscoveryManager::from_config(&config.discovery, store)
            .context("Failed to create discovery manager")?,
    );
    let bridge = ServerConfigBridge::new(manager.clone(), Arc::new(InMemoryServerConfigStore::new()));

    match args.command.unwrap_or(Command::Discover) {
        Command::Discover => {
            let watcher = watch_state(&manager);
            let signal = cancel_on_ctrl_c(&manager);

            let registered = bridge.connect_with_auto_discovery().await;
            signal.abort();
            watcher.abort();

            match (registered, manager.connected_server()) {
                (Some(_), Some(server)) => report(&server, args.json)?,
                _ => match manager.state() {
                    DiscoveryState::ManualConfigRequired => bail!(
                        "No gateway found. Run `unamentis connect --host <host> --port <port>`"
                    ),
                    DiscoveryState::Idle => bail!("Discovery cancelled"),
                    state => bail!("Discovery did not complete: {}", state),
                },
            }
        }

        Command::Connect { host, port, name } => {
            if bridge
                .configure_server_manually(&host, port, name.as_deref())
                .await
                .is_none()
            {
                bail!("{}", manager.state());
            }
            if let Some(server) = manager.connected_server() {
                report(&server, args.json)?;
            }
        }

        Command::Cache { action } => match action {
            CacheAction::Show => match manager.cache().cached_record() {
                Some(record) if args.json => println!("{}", serde_json::to_string_pretty(&record)?),
                Some(record) => println!(
                    "{} at http://{}:{} (found via {}, saved {})",
                    record.name, record.host, record.port, record.method, record.saved_at
                ),
                None => println!("No cached gateway"),
            },
            CacheAction::Clear => {
                bridge
                    .clear_discovery_cache()
                    .context("Failed to clear gateway cache")?;
                println!("Cleared cached gateway");
            }
        },
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Logs every state transition of the orchestrator.
fn watch_state(manager: &DeviceDiscoveryManager) -> tokio::task::JoinHandle<()> {
    let mut states = manager.subscribe_state();
    let progress = manager.subscribe_progress();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            let percent = (*progress.borrow() * 100.0).round() as u32;
            info!(state = %state, progress = percent, "Discovery");
        }
    })
}

fn cancel_on_ctrl_c(manager: &Arc<DeviceDiscoveryManager>) -> tokio::task::JoinHandle<()> {
    let manager = Arc::clone(manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling discovery");
            manager.cancel_discovery();
        }
    })
}

fn report(server: &DiscoveredServer, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(server)?);
    } else {
        println!(
            "{} at {} (via {})",
            server.name,
            server.base_url(),
            server.discovery_method
        );
    }
    Ok(())
}
