use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use heatwatch::duration::{format_duration, parse_duration};
use heatwatch::{
    Dashboard, DashboardHandle, HttpSnapshotLoader, LogSink, Settings, SnapshotLoader,
    Synchronizer, TimeRange, WebSocketChannel,
};

#[derive(Parser, Debug, Default)]
#[command(name = "heatwatch")]
#[command(about = "Live sync client for heat-pump telemetry dashboards")]
struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Telemetry server base URL (e.g., "http://heatpump.local:5000")
    #[arg(short, long)]
    url: Option<String>,

    /// Live channel URL (default: derived from --url, path /ws)
    #[arg(long)]
    ws_url: Option<String>,

    /// Initial time range (e.g., "24h", "7d")
    #[arg(short, long)]
    range: Option<String>,

    /// Electricity price per kWh, sent with refresh requests
    #[arg(long)]
    price: Option<f64>,

    /// Request and connect timeout (e.g., "10s", "500ms")
    #[arg(long)]
    timeout: Option<String>,

    /// Delay between reconnect attempts (e.g., "1s")
    #[arg(long)]
    reconnect_delay: Option<String>,

    /// Consecutive failed connects before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Fetch one snapshot, write it to a JSON file and exit
    #[arg(short, long)]
    export: Option<PathBuf>,
}

/// A line typed on stdin.
#[derive(Debug, Clone, PartialEq)]
enum UserCommand {
    Range(TimeRange),
    Refresh,
    Reconnect,
    Quit,
    Help,
}

const HELP: &str = "commands: <range> (e.g. 24h, 7d) | refresh | reconnect | quit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("heatwatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = apply_overrides(Settings::load(args.config.as_deref())?, &args)?;

    let loader = HttpSnapshotLoader::builder()
        .base_url(&settings.server_url)
        .timeout(settings.request_timeout)
        .build()?;

    // Handle export mode (non-interactive)
    if let Some(export_path) = args.export {
        return export_to_file(&loader, &settings.time_range, &export_path).await;
    }

    run_interactive(settings, loader).await
}

/// Apply command line flags on top of loaded settings.
fn apply_overrides(mut settings: Settings, args: &Args) -> Result<Settings> {
    if let Some(url) = &args.url {
        settings.server_url = url.trim_end_matches('/').to_string();
    }
    if let Some(ws_url) = &args.ws_url {
        settings.websocket_url = Some(ws_url.clone());
    }
    if let Some(range) = &args.range {
        settings.time_range = TimeRange::new(range)?;
    }
    if let Some(price) = args.price {
        settings.price_per_kwh = Some(price);
    }
    if let Some(timeout) = &args.timeout {
        settings.request_timeout = parse_duration(timeout).context("Invalid --timeout")?;
    }
    if let Some(delay) = &args.reconnect_delay {
        settings.reconnect_delay = parse_duration(delay).context("Invalid --reconnect-delay")?;
    }
    if let Some(max_attempts) = args.max_attempts {
        settings.max_reconnect_attempts = max_attempts;
    }
    settings.validate()?;
    Ok(settings)
}

async fn run_interactive(settings: Settings, loader: HttpSnapshotLoader) -> Result<()> {
    let ws_url = settings.websocket_url()?;
    info!(
        server = %settings.server_url,
        live = %ws_url,
        timeout = %format_duration(settings.request_timeout),
        reconnect_delay = %format_duration(settings.reconnect_delay),
        max_attempts = settings.max_reconnect_attempts,
        "Starting heatwatch"
    );

    let channel = WebSocketChannel::spawn(
        ws_url,
        settings.reconnect_policy(),
        settings.request_timeout,
    );
    let sync = Synchronizer::new(settings.time_range.clone()).with_price(settings.price_per_kwh);
    let (dashboard, handle) = Dashboard::new(sync, LogSink::new(), Arc::new(loader), channel);
    let task = tokio::spawn(dashboard.run());

    tokio::spawn(read_commands(handle.clone(), stdin_lines()));

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            interrupt.shutdown().await;
        }
    });
    drop(handle);

    let sink = task.await.context("Dashboard task failed")?;
    let view = sink.into_view();
    info!(
        snapshots = view.snapshots_applied(),
        updates = view.updates_applied(),
        notices = view.notices().len(),
        "Stopped"
    );
    Ok(())
}

/// Read stdin lines on a plain thread so it never joins runtime shutdown.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    return;
                }
            }
        }
    });
    rx
}

/// Forward typed commands to the dashboard until quit or end of input.
async fn read_commands(handle: DashboardHandle, mut lines: mpsc::Receiver<String>) {
    eprintln!("{}", HELP);

    while let Some(line) = lines.recv().await {
        let running = match parse_command(&line) {
            Ok(None) => true,
            Ok(Some(UserCommand::Range(range))) => handle.change_range(range).await,
            Ok(Some(UserCommand::Refresh)) => handle.refresh().await,
            Ok(Some(UserCommand::Reconnect)) => handle.reconnect().await,
            Ok(Some(UserCommand::Help)) => {
                eprintln!("{}", HELP);
                true
            }
            Ok(Some(UserCommand::Quit)) => {
                handle.shutdown().await;
                false
            }
            Err(e) => {
                eprintln!("{}", e);
                true
            }
        };
        if !running {
            return;
        }
    }
}

fn parse_command(line: &str) -> Result<Option<UserCommand>, String> {
    let line = line.trim();
    let command = match line.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "refresh" | "r" => UserCommand::Refresh,
        "reconnect" => UserCommand::Reconnect,
        "quit" | "q" | "exit" => UserCommand::Quit,
        "help" | "?" => UserCommand::Help,
        _ => UserCommand::Range(
            TimeRange::new(line).map_err(|e| format!("{} ({})", e, HELP))?,
        ),
    };
    Ok(Some(command))
}

/// Fetch one snapshot and write it as pretty JSON
async fn export_to_file(
    loader: &HttpSnapshotLoader,
    range: &TimeRange,
    export_path: &Path,
) -> Result<()> {
    let snapshot = loader
        .load(range)
        .await
        .with_context(|| format!("Failed to load {} snapshot from {}", range, loader.base_url()))?;

    let json = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(export_path, json)
        .with_context(|| format!("Failed to write {}", export_path.display()))?;

    println!(
        "Exported {} panels for range {} to {}",
        snapshot.len(),
        range,
        export_path.display()
    );
    Ok(())
}
