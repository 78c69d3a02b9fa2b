//! Chain Ledger Daemon
//!
//! Serves the credit ledger and chain state machine over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (requires a JWT secret)
//! LEDGER_JWT_SECRET=... chain-ledger
//!
//! # Start with custom config
//! chain-ledger --config /path/to/config.toml
//!
//! # Local development with the built-in token secret
//! chain-ledger --dev --storage-dir ./data --http-port 8096
//! ```

use anyhow::Context;
use clap::Parser;
use chain_ledger::{auth, services, Config, HttpServer, LedgerDb, Services};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chain-ledger")]
#[command(about = "Chain reward and credit ledger service")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory (holds ledger.db)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long)]
    http_port: Option<u16>,

    /// HS256 secret for bearer tokens
    #[arg(long, env = "LEDGER_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Accept tokens signed with the development secret
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chain_ledger=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path).with_context(|| format!("Failed to load {:?}", config_path))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if args.jwt_secret.is_some() {
        config.jwt_secret = args.jwt_secret;
    }
    if args.dev {
        config.dev_mode = true;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("Failed to create {:?}", config.storage_dir))?;

    // Save defaults on first start, without persisting the secret
    let config_path = config.config_path();
    if args.config.is_none() && !config_path.exists() {
        let to_save = Config { jwt_secret: None, ..config.clone() };
        if let Err(e) = to_save.save(&config_path) {
            warn!(error = %e, "Could not write default config");
        }
    }

    let validator = auth::validator_from_config(&config)?;
    if config.dev_mode && config.jwt_secret.is_none() {
        warn!("Dev mode: accepting tokens signed with the development secret");
    }

    info!("Chain ledger starting");
    info!("  Storage: {:?}", config.storage_dir);
    info!("  Awards: join_chain={} others_joined={}", config.join_chain_credits, config.others_joined_credits);
    info!("  Remainder policy: {:?}", config.remainder_policy);

    let db = Arc::new(LedgerDb::open(
        &config.storage_dir,
        &chain_ledger::db::DbOptions {
            pool_size: config.pool_size,
            busy_timeout_ms: config.busy_timeout_ms,
        },
    )?);
    let stats = db.stats()?;
    info!(
        transactions = stats.transaction_count,
        accounts = stats.account_count,
        requests = stats.request_count,
        pending_claims = stats.pending_claims,
        "Ledger opened"
    );

    let services = Arc::new(Services::new(db.clone(), &config));
    let listener = services::spawn_logging_listener(services.events.clone());

    let bind_addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    let http_server = Arc::new(HttpServer::new(services, validator, bind_addr));

    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();

    if let Ok(stats) = db.stats() {
        info!(
            transactions = stats.transaction_count,
            accounts = stats.account_count,
            "Final ledger stats"
        );
    }

    Ok(())
}
