//! lmstudio-relay: SSE relay for LM Studio
//!
//! Serves a browser chat client and relays streaming completions from an
//! LM Studio server, with per-session stop support.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use lmstudio_relay::{
    config::{AppConfig, LogFormat},
    run_server, LmStudioClient,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "lmstudio-relay")]
#[command(version)]
#[command(about = "SSE relay for an LM Studio server")]
#[command(long_about = "
lmstudio-relay sits between a browser chat client and LM Studio:
  - Streams chat completions to the browser as Server-Sent Events
  - Stops a running generation by session id
  - Keeps a short in-memory conversation history

Example usage:
  lmstudio-relay run --config config.yaml
  lmstudio-relay list-models
")]
struct Cli {
    /// Path to config file (defaults to config.yaml, config.yml or ./config/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override LM Studio URL
        #[arg(short, long)]
        backend_url: Option<String>,
    },

    /// Validate configuration file
    CheckConfig,

    /// List models known to the LM Studio server plus the fallback list
    ListModels,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::CheckConfig = cli.command {
        return check_config(cli.config);
    }

    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("Error loading configuration")?;
    init_tracing(cli.log_level, config.logging.format);

    match AppConfig::find_file(cli.config.as_deref()) {
        Some(path) => tracing::info!("Loaded configuration from {:?}", path),
        None => tracing::warn!("No configuration file found, using built-in defaults"),
    }

    match cli.command {
        Commands::Run { port, backend_url } => run_relay(config, port, backend_url).await,
        Commands::ListModels => list_models(config).await,
        Commands::CheckConfig => Ok(()),
    }
}

fn init_tracing(log_level: Option<LogLevel>, format: LogFormat) {
    let level_filter = if let Some(level) = log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };
    let builder = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter));

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Run the relay server
async fn run_relay(
    mut config: AppConfig,
    port_override: Option<u16>,
    backend_url_override: Option<String>,
) -> anyhow::Result<()> {
    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(url) = backend_url_override {
        config.backend.url = url;
        config.validate().context("Invalid --backend-url")?;
    }

    tracing::info!(
        on_collision = ?config.sessions.on_collision,
        history = config.history.enabled,
        "Session settings"
    );

    run_server(config).await.map_err(|e| anyhow::anyhow!(e))
}

/// Validate configuration file
fn check_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let Some(path) = AppConfig::find_file(config_path.as_deref()) else {
        eprintln!("✗ No configuration file found");
        eprintln!("\nYou can copy config.yaml.default and modify it:");
        eprintln!("  cp config.yaml.default config.yaml");
        std::process::exit(1);
    };

    match AppConfig::from_file(&path) {
        Ok(config) => {
            println!("✓ Configuration file is valid ({})\n", path.display());
            println!("Server:");
            println!("  Listen: {}:{}", config.server.host, config.server.port);
            println!("\nBackend:");
            println!("  URL: {}", config.backend.url);
            println!("  TLS: {}", if config.backend.is_tls() { "enabled" } else { "disabled" });
            if let Some(ref tls) = config.backend.tls {
                if tls.accept_invalid_certs {
                    println!("  TLS: Accepting invalid certificates");
                }
                if let Some(ref ca) = tls.ca_cert_path {
                    println!("  TLS CA: {}", ca);
                }
            }
            println!("  API key: {}", if config.backend.api_key.is_some() { "set" } else { "none" });
            println!("  Timeout: {}s (models: {}s)", config.backend.timeout_seconds, config.backend.models_timeout_seconds);
            println!("\nGeneration:");
            println!("  Temperature: {}", config.generation.temperature);
            println!("  Max tokens: {}", config.generation.max_tokens);
            println!("\nModels:");
            println!("  Fallback: {}", config.models.fallback.len());
            println!("\nSessions:");
            println!("  On collision: {:?}", config.sessions.on_collision);
            println!("  Channel capacity: {}", config.sessions.channel_capacity);
            println!("\nHistory:");
            println!("  Enabled: {}", config.history.enabled);
            println!("  Max entries: {}", config.history.max_entries);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the merged model list
async fn list_models(config: AppConfig) -> anyhow::Result<()> {
    let client = LmStudioClient::from_config(&config).map_err(|e| anyhow::anyhow!(e))?;

    println!("Models available via {}:\n", client.base_url());
    for model in client.get_models().await {
        println!("  - {}", model);
    }
    Ok(())
}
