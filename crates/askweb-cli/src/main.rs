use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use askweb_core::config::{Config, LoggingConfig};
use askweb_gateway::function::{FunctionEvent, handle_event};
use askweb_gateway::health::health_report;
use askweb_gateway::{ChatService, GatewayState, start_gateway};

#[derive(Parser)]
#[command(
    name = "askweb",
    about = "Chat assistant that searches the web when it needs fresh information",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: 3000)
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },

    /// Ask a single question and print the answer
    Ask {
        /// Message to send
        #[arg(short, long)]
        message: String,
    },

    /// Run a serverless function event through the function adapter
    Invoke {
        /// Event JSON file (reads stdin when omitted)
        #[arg(long)]
        event: Option<PathBuf>,
    },

    /// Show credential status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    init_logging(&config.logging_config(), cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.server_port());
            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("{w}");
            }
            if !errors.is_empty() {
                anyhow::bail!("invalid configuration: {}", errors.join("; "));
            }

            let state = GatewayState::from_config(Arc::new(config));
            #[cfg(feature = "metrics")]
            let state = state.with_metrics(askweb_gateway::metrics::install_prometheus_recorder()?);

            tracing::info!("Starting askweb on port {port}");
            start_gateway(Arc::new(state), port).await?;
        }
        Commands::Ask { message } => {
            let state = GatewayState::from_config(Arc::new(config));
            let answer = ask(&state.chat, &message, &cancel_on_ctrl_c()).await?;
            println!("{answer}");
        }
        Commands::Invoke { event } => {
            let raw = match event {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let event: FunctionEvent =
                serde_json::from_str(&raw).context("event is not a valid function event")?;

            let state = GatewayState::from_config(Arc::new(config));
            let response = handle_event(&state.chat, &event, &cancel_on_ctrl_c()).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Status => {
            println!("askweb v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Model: {} ({})", config.model_id(), config.model_config().provider.id());
            println!("Search backend: {}", config.search_config().backend.id());
            println!("Port: {}", config.server_port());
            println!("{}", serde_json::to_string_pretty(&health_report(&config))?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Configuration OK");
            }
        },
    }

    Ok(())
}

/// Run one message through the chat contract, returning the answer text.
async fn ask(chat: &ChatService, message: &str, cancel: &CancellationToken) -> anyhow::Result<String> {
    let body = serde_json::to_vec(&serde_json::json!({ "message": message }))?;
    let reply = chat.handle(&body, cancel).await;
    match reply.body.get("response").and_then(|r| r.as_str()) {
        Some(answer) if reply.status.is_success() => Ok(answer.to_string()),
        _ => anyhow::bail!("{}: {}", reply.status, reply.body),
    }
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

/// Filter directives: configured level (or verbose/info), then per-crate filters.
fn filter_directives(logging: &LoggingConfig, verbose: bool) -> String {
    let base = logging
        .level
        .clone()
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());
    std::iter::once(base)
        .chain(logging.filters.iter().cloned())
        .collect::<Vec<_>>()
        .join(",")
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    // RUST_LOG wins over config.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(filter_directives(logging, verbose))
    });

    let writer = if logging.output == "stdout" {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
