//! wgtunnel - WireGuard tunnel manager CLI
//!
//! Manages the tunnels stored under the configured tunnel directory and
//! runs them through `wg-quick`.
//!
//! # Usage
//!
//! ```bash
//! # List tunnels and whether they are running
//! wgtunnel list
//!
//! # Import a config and bring it up (requires root)
//! sudo wgtunnel create home --file home.conf
//! sudo wgtunnel up home
//!
//! # Key helpers, no privileges needed
//! wgtunnel genkey | tee private.key | wgtunnel pubkey
//! ```

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use libwgtunnel::app_config::DEFAULT_CONFIG_PATH;
use libwgtunnel::*;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// WireGuard tunnel manager
#[derive(Parser, Debug)]
#[command(name = "wgtunnel")]
#[command(version)]
#[command(about = "WireGuard tunnel manager - create, rename, start and stop tunnels", long_about = None)]
struct Args {
    /// Application config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tunnels with their state
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print a tunnel's config
    Show {
        name: String,
        /// Also print live transfer statistics
        #[arg(long)]
        stats: bool,
    },
    /// Create a tunnel from a config file or a fresh key pair
    Create {
        name: String,
        /// Config file to import
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Generate a new private key for the interface
        #[arg(short, long)]
        generate_key: bool,
    },
    /// Delete a tunnel, stopping it first if running
    Delete { name: String },
    /// Rename a tunnel
    Rename { name: String, new_name: String },
    /// Bring a tunnel up
    Up { name: String },
    /// Bring a tunnel down
    Down { name: String },
    /// Remember which tunnels are running
    SaveState,
    /// Bring back the tunnels remembered by save-state
    RestoreState {
        /// Restore even if restore-on-boot is disabled
        #[arg(long)]
        force: bool,
    },
    /// Generate a private key
    Genkey,
    /// Read a private key on stdin and print its public key
    Pubkey,
    /// Parse and validate a config file, printing it normalised
    Check { file: PathBuf },
}

#[derive(Serialize)]
struct TunnelSummary {
    name: String,
    state: State,
}

fn init_logging(args: &Args) {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("wgtunnel={},libwgtunnel={}", log_level, log_level))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

async fn open_manager(app: &AppConfig) -> anyhow::Result<TunnelManager> {
    let settings = FileSettings::open(&app.paths.settings_file)
        .with_context(|| format!("Failed to open settings {}", app.paths.settings_file.display()))?;
    let manager = TunnelManager::new(
        Arc::new(WgQuickBackend::new(&app.paths.runtime_dir)),
        Arc::new(FileConfigStore::new(&app.paths.config_dir)),
        Arc::new(settings),
        AsyncWorker::new(app.worker.max_concurrency),
    );
    manager.load().await?;
    Ok(manager)
}

fn find(manager: &TunnelManager, name: &str) -> anyhow::Result<Arc<Tunnel>> {
    manager
        .tunnel(name)
        .ok_or_else(|| anyhow!(TunnelError::NotFound(name.to_string())))
}

fn read_config(path: &PathBuf) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Config::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    // Commands that need no tunnel state
    match &args.command {
        Command::Genkey => {
            println!("{}", KeyPair::generate().private_key());
            return Ok(());
        }
        Command::Pubkey => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let public_key = crypto::public_key_for(input.trim())
                .ok_or_else(|| anyhow!("Invalid private key"))?;
            println!("{}", public_key);
            return Ok(());
        }
        Command::Check { file } => {
            let config = read_config(file)?;
            config.validate()?;
            print!("{}", config);
            return Ok(());
        }
        _ => {}
    }

    let app = AppConfig::load_or_default(&args.config)?;
    debug!("Using tunnel directory {}", app.paths.config_dir.display());
    let manager = open_manager(&app).await?;
    run(&app, &manager, args.command).await
}

async fn run(app: &AppConfig, manager: &TunnelManager, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List { json } => {
            let summaries: Vec<TunnelSummary> = manager
                .tunnels()
                .to_vec()
                .iter()
                .map(|t| TunnelSummary { name: t.name(), state: t.state() })
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                let last_used = manager.last_used_tunnel().map(|t| t.name());
                println!("{:<16} {:<6}", "NAME", "STATE");
                for summary in summaries {
                    let marker = if last_used.as_deref() == Some(summary.name.as_str()) { "*" } else { "" };
                    println!("{:<16} {:<6} {}", summary.name, summary.state.to_string(), marker);
                }
            }
        }
        Command::Show { name, stats } => {
            let tunnel = find(manager, &name)?;
            print!("{}", tunnel.get_config_async().await?);
            if stats {
                let statistics = tunnel.get_statistics_async().await?;
                println!();
                for (public_key, peer) in statistics.peers() {
                    let handshake = peer
                        .latest_handshake
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "peer {}: rx {} B, tx {} B, handshake {}",
                        public_key, peer.rx_bytes, peer.tx_bytes, handshake
                    );
                }
            }
        }
        Command::Create { name, file, generate_key } => {
            let mut config = match &file {
                Some(path) => read_config(path)?,
                None if generate_key => Config::new(),
                None => bail!("Either --file or --generate-key is required"),
            };
            if generate_key {
                config.interface.generate_keypair();
            }
            app.ensure_directories()?;
            let tunnel = manager.create(&name, config).await?;
            info!("Created tunnel {}", tunnel.name());
            if let Some(public_key) = tunnel.config().and_then(|c| c.interface.public_key().map(str::to_string)) {
                println!("{}", public_key);
            }
        }
        Command::Delete { name } => {
            find(manager, &name)?.delete().await?;
        }
        Command::Rename { name, new_name } => {
            let renamed = find(manager, &name)?.set_name(&new_name).await?;
            println!("{}", renamed);
        }
        Command::Up { name } => {
            let state = find(manager, &name)?.set_state(State::Up).await?;
            println!("{} {}", name, state);
        }
        Command::Down { name } => {
            let state = find(manager, &name)?.set_state(State::Down).await?;
            println!("{} {}", name, state);
        }
        Command::SaveState => {
            manager.save_state()?;
        }
        Command::RestoreState { force } => {
            let mut failed = 0;
            for (name, result) in manager.restore_state(force).await {
                match result {
                    Ok(state) => println!("{} {}", name, state),
                    Err(e) => {
                        eprintln!("{}: {}", name, e);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} tunnel(s) could not be restored", failed);
            }
        }
        // Handled before the manager is opened
        Command::Genkey | Command::Pubkey | Command::Check { .. } => {}
    }

    Ok(())
}
