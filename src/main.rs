use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cloudmock::config::Config;
use cloudmock::server;
use cloudmock::state::AppState;
use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// In-memory emulator for the EC2 and Compute Engine control planes
#[derive(Parser, Debug)]
#[command(name = "cloudmock", version = cloudmock::VERSION, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (defaults to ~/.config/cloudmock/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GCP zones to serve, comma separated
    #[arg(long, value_delimiter = ',')]
    zones: Option<Vec<String>>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Write logs to a file instead of stderr; without a value, logs go to
    /// ~/.config/cloudmock/cloudmock.log
    #[arg(long)]
    log_file: Option<Option<PathBuf>>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// RUST_LOG wins over `--log-level` when set. Logs go to stderr, or to
/// `--log-file` through a non-blocking writer whose guard must outlive main.
fn setup_logging(
    level: LogLevel,
    log_file: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.to_string().to_lowercase()));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    Ok(Some(guard))
}

fn default_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudmock").join("cloudmock.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudmock").join("cloudmock.log");
    }
    PathBuf::from("cloudmock.log")
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(bind) = &args.bind {
        config.bind = Some(bind.clone());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(zones) = &args.zones {
        config.zones = Some(zones.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .as_ref()
        .map(|path| path.clone().unwrap_or_else(default_log_path));
    let _log_guard = setup_logging(args.log_level, log_file.as_ref())?;
    tracing::info!("cloudmock {} started with log level: {:?}", cloudmock::VERSION, args.log_level);

    let config = load_config(&args)?;
    let addr = format!("{}:{}", config.effective_bind(), config.effective_port());
    tracing::info!(
        "AWS region {}, GCP zones {:?}",
        config.effective_region(),
        config.effective_zones()
    );

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    server::serve(listener, AppState::from_config(&config)).await
}
