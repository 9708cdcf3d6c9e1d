//! Harness server binary.
//!
//! Run with: cargo run --bin sftp-harness-server

use clap::Parser;
use sftp_harness::{Config, LogFormat, Server};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on (0 picks an ephemeral port)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Root directory served to clients (default: a fresh temp directory)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Host key path (generated on first use)
    #[arg(long)]
    host_key: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Log format (json or text)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = if let Some(config_path) = args.config {
        match Config::from_file(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                std::process::exit(1);
            }
        }
    } else {
        let mut config = Config::default();
        config.bind_address = args.bind;
        config.port = args.port;
        config.root_dir = args.root;

        if let Some(host_key) = args.host_key {
            config.host_key_path = host_key;
        }
        if let Some(log_format) = args.log_format {
            config.logging.format = log_format;
        }

        config
    };

    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(EnvFilter::new(config.logging.level.clone()))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(config.logging.level.clone()))
                .init();
        }
    }

    // A configured root must exist before validation; a missing --root is
    // created rather than refused, matching the fixture's purpose.
    if let Some(root) = &config.root_dir {
        if !root.exists() {
            info!(directory = ?root, "creating root directory");
            if let Err(e) = std::fs::create_dir_all(root) {
                error!(directory = ?root, error = %e, "failed to create root directory");
                std::process::exit(1);
            }
        }
    }

    let mut server = match Server::bind(config).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to bind server");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start() {
        error!(error = %e, "failed to start server");
        std::process::exit(1);
    }

    info!(
        host = %server.host(),
        port = server.port(),
        root = ?server.root_dir(),
        host_key = ?server.host_key_path(),
        "server running; press Ctrl-C to stop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to wait for shutdown signal");
    }

    server.stop().await;
}
