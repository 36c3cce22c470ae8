//! profbin daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (ports 443/80, database under the data dir)
//! profbin
//!
//! # Start with a config file
//! profbin --config /etc/profbin.toml
//!
//! # Development ports and a local database
//! profbin --secure-port 8443 --plain-port 8080 --db-path ./profiles.db
//! ```
//!
//! Under a process manager that passes pre-bound sockets (`LISTEN_PID` /
//! `LISTEN_FDS`), the inherited listeners are used instead of fresh binds.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use profbin::{listener, Config, HttpServer, ProfileStore, SqliteBackend};

#[derive(Parser, Debug)]
#[command(name = "profbin")]
#[command(about = "Host for profiling snapshots with short shareable URLs")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Port for the secure listener
    #[arg(long)]
    secure_port: Option<u16>,

    /// Port for the plain listener
    #[arg(long)]
    plain_port: Option<u16>,

    /// Public domain used in URLs echoed back to uploaders
    #[arg(long, env = "PROFBIN_DOMAIN")]
    domain: Option<String>,

    /// Maximum accepted upload size in bytes
    #[arg(long)]
    max_upload_bytes: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("profbin=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(path) = args.db_path {
        config.db_path = path;
    }
    if let Some(port) = args.secure_port {
        config.secure_port = port;
    }
    if let Some(port) = args.plain_port {
        config.plain_port = port;
    }
    if let Some(domain) = args.domain {
        config.domain = domain;
    }
    if let Some(max) = args.max_upload_bytes {
        config.max_upload_bytes = max;
    }

    info!(
        db = %config.db_path.display(),
        secure_port = config.secure_port,
        plain_port = config.plain_port,
        "starting profbin"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let backend = Arc::new(SqliteBackend::open(&config.db_path)?);
    let store = ProfileStore::new(backend);

    // Sockets are acquired once, before anything is served; a failure here
    // is fatal and leaves no descriptor behind.
    let pair = listener::acquire(config.secure_port, config.plain_port)?;
    pair.secure.set_nonblocking(true)?;
    pair.plain.set_nonblocking(true)?;
    let secure = tokio::net::TcpListener::from_std(pair.secure)?;
    let plain = tokio::net::TcpListener::from_std(pair.plain)?;

    let server = Arc::new(HttpServer::new(
        store,
        config.domain.clone(),
        config.max_upload_bytes,
        config.recent_limit,
    ));

    tokio::try_join!(
        Arc::clone(&server).serve(secure),
        Arc::clone(&server).serve(plain),
    )?;

    Ok(())
}
