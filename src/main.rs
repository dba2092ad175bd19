//! Courier - send site assets to the stage and production servers
//!
//! Assembles one explicit config from CLI flags over optional TOML presets,
//! builds the transport selected by the port, and hands the manifest to the
//! delivery orchestrator. The log stream carries every per-item failure;
//! the exit code makes partial failure visible without log-scraping.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use courier::config::{trim_path, DeliveryConfig, Presets, Transport};
use courier::connector::{FtpConnector, RemoteConnector, RemoteEndpoint, SftpConnector};
use courier::convert::MasterConverter;
use courier::deliver::{Category, Delivery};
use courier::manifest::parse_manifest;
use courier::sync::SyncEngine;

const EXIT_PARTIAL_FAILURE: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Courier - send images, PDFs, translations, XML and databases from a local site to the stage and production servers"
)]
struct Args {
    /// Type of data to send; all categories when omitted
    #[arg(short = 't', long, value_enum)]
    category: Option<Category>,

    /// Directory holding the database conversion utilities; omit when they
    /// are on the PATH
    #[arg(short = 'r', long)]
    tool_dir: Option<String>,

    /// Path to the work-list manifest
    #[arg(short = 'i', long)]
    manifest: Option<PathBuf>,

    /// Local root containing the bases, htdocs and serial directories
    #[arg(short = 's', long)]
    source_dir: Option<String>,

    /// Remote root (server side) with the same layout
    #[arg(short = 'd', long)]
    destiny_dir: Option<String>,

    /// Convert databases for the destination operating system before sending
    #[arg(short = 'm', long)]
    compatibility_mode: bool,

    /// Server hostname
    #[arg(short = 'f', long)]
    server: Option<String>,

    /// 22 for an SFTP connection, 21 for FTP
    #[arg(short = 'x', long)]
    port: Option<u16>,

    /// Server username
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Server password
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Settings presets file (TOML); COURIER_SETTINGS_FILE is consulted
    /// when omitted
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Layer CLI flags over presets and built-in defaults
fn build_config(args: &Args) -> Result<DeliveryConfig> {
    let presets = match &args.settings {
        Some(path) => Presets::from_file(path)
            .with_context(|| format!("loading settings presets ({})", path.display()))?,
        None => Presets::from_env(),
    };

    Ok(DeliveryConfig {
        category: args.category,
        tool_dir: args.tool_dir.clone().or(presets.tool_dir),
        manifest: args
            .manifest
            .clone()
            .or(presets.manifest)
            .unwrap_or_else(|| PathBuf::from("./serial/scilista.lst")),
        source_dir: trim_path(
            &args
                .source_dir
                .clone()
                .or(presets.source_dir)
                .unwrap_or_else(|| ".".to_string()),
        ),
        destiny_dir: trim_path(
            &args
                .destiny_dir
                .clone()
                .or(presets.destiny_dir)
                .unwrap_or_else(|| ".".to_string()),
        ),
        compatibility_mode: args.compatibility_mode,
        server: args
            .server
            .clone()
            .or(presets.server)
            .unwrap_or_else(|| "localhost".to_string()),
        port: args.port.or(presets.port).unwrap_or(22),
        user: args
            .user
            .clone()
            .or(presets.user)
            .unwrap_or_else(|| "anonymous".to_string()),
        password: args
            .password
            .clone()
            .or(presets.password)
            .unwrap_or_else(|| "anonymous".to_string()),
    })
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match build_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let transport = match config.transport() {
        Ok(t) => t,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let endpoint = RemoteEndpoint {
        host: config.server.clone(),
        port: config.port,
        user: config.user.clone(),
        password: config.password.clone(),
    };
    let connector: Box<dyn RemoteConnector> = match transport {
        Transport::Sftp => Box::new(SftpConnector::new(endpoint)),
        Transport::Ftp => Box::new(FtpConnector::new(endpoint)),
    };
    let converter = Box::new(MasterConverter::new(config.tool_dir.clone()));
    let engine = SyncEngine::new(
        connector,
        converter,
        &config.source_dir,
        &config.destiny_dir,
    );

    let manifest = parse_manifest(&config.manifest);
    let mut delivery = Delivery::new(
        engine,
        manifest,
        config.manifest.clone(),
        config.compatibility_mode,
    );

    let stats = delivery.run(config.category);

    info!(
        "delivery finished: {} files sent, {} directories created, {} failed, {} conversions failed",
        stats.files_sent, stats.dirs_created, stats.failed, stats.conversions_failed
    );

    if !delivery.session_established() || stats.has_failures() {
        ExitCode::from(EXIT_PARTIAL_FAILURE)
    } else {
        ExitCode::SUCCESS
    }
}
