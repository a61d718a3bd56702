use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gaze_relay::client::RelayClient;
use gaze_relay::{
    CliOverrides, Command, ConfigError, FileConfig, RelayConfig, RelayServer, SourceKind,
    load_config,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "gaze-relay")]
#[command(about = "Buffers eye-tracker gaze samples and serves them over WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay in the foreground (default)
    Serve(ServeArgs),

    /// Send one command to a running relay and print the reply
    Query(QueryArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Config file (defaults to ./gaze-relay.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port to listen on (0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Sampling interval in seconds
    #[arg(short, long)]
    interval: Option<f64>,

    /// Maximum number of buffered samples
    #[arg(long)]
    cache_size: Option<usize>,

    /// Drop pending samples after this many seconds without clients (0 = never)
    #[arg(long)]
    idle_clear_secs: Option<u64>,

    /// Where samples come from
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// File or named pipe for `--source stream`
    #[arg(long)]
    source_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct QueryArgs {
    /// get_movements, get_current_location or check_status
    command: String,

    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:8765/")]
    url: String,
}

/// Grace period for blocking work left behind at exit.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    let result = runtime.block_on(async move {
        match cli.command {
            None => serve(ServeArgs::default()).await,
            Some(Commands::Serve(args)) => serve(args).await,
            Some(Commands::Query(args)) => query(args).await,
        }
    });

    // A stream source can still be blocked opening a FIFO that never got a writer.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn serve(args: ServeArgs) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "gaze_relay=debug,gaze_source=debug,tower_http=debug,info"
    } else {
        "gaze_relay=info,gaze_source=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    if let Some(path) = &args.config {
        if !path.exists() {
            bail!("config file not found: {}", path.display());
        }
    }

    let mut file_config: FileConfig = load_config(args.config.as_deref())
        .extract()
        .map_err(ConfigError::from)
        .context("failed to load configuration")?;

    CliOverrides {
        host: args.host,
        port: args.port,
        interval_secs: args.interval,
        cache_capacity: args.cache_size,
        idle_clear_secs: args.idle_clear_secs,
        source: args.source,
        source_path: args.source_path,
    }
    .apply(&mut file_config);

    let config = RelayConfig::from_file(&file_config).context("invalid configuration")?;
    info!(
        interval_ms = config.interval.as_millis() as u64,
        cache_capacity = config.cache_capacity,
        source = config.source.kind.as_str(),
        "Starting gaze relay"
    );

    let source = config.source.build()?;
    let server = RelayServer::bind(config, source)
        .await
        .context("failed to start relay")?;

    tokio::spawn(shutdown_signal(server.cancel_token()));

    server.run().await.context("relay error")
}

/// Cancel the relay on Ctrl-C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => return,
    }

    info!("Received shutdown signal, stopping relay...");
    cancel.cancel();
}

async fn query(args: QueryArgs) -> Result<()> {
    let command: Command = args.command.parse().with_context(|| {
        format!(
            "expected one of: {}",
            Command::ALL.map(|c| c.as_str()).join(", ")
        )
    })?;

    let mut client = RelayClient::connect(&args.url).await?;
    let response = client.request(command).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    client.close().await?;
    Ok(())
}
