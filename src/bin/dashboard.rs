use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pavers_dashboard::{
    panels::{MapPanel, Page, ReportsTablePanel, SubmitOutcome},
    render::text::{render_markers, render_table},
    server::{create_router, AppState},
    Config, DashboardShell, Detection, ReportsClient, UploadFile,
};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pavers-dashboard", version, about = "Smart Pavers defect-report dashboard")]
struct Cli {
    /// Base URL of the reports backend; overrides PAVERS_API_URL
    #[arg(long)]
    api_url: Option<String>,

    /// Map refresh interval such as "30s"; overrides MAP_REFRESH_INTERVAL
    #[arg(long, value_parser = humantime::parse_duration)]
    refresh: Option<Duration>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the dashboard page to browsers.
    Serve {
        /// Listen port; overrides HTTP_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the reports table once.
    Reports,
    /// Print map markers on every refresh until interrupted.
    Watch,
    /// Upload an image or video for analysis.
    Upload {
        path: PathBuf,
        /// low, medium or high; the backend estimates it when omitted
        #[arg(long)]
        traffic_density: Option<String>,
    },
    /// Submit detector output (a JSON array of detections) for a location.
    SubmitDetections {
        path: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        traffic_density: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pavers_dashboard=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url.trim_end_matches('/').to_string();
    }
    if let Some(refresh) = cli.refresh {
        config.map_refresh_interval = refresh;
    }
    if let Command::Serve { port: Some(port) } = cli.command {
        config.http_port = port;
    }
    config.validate()?;
    tracing::debug!("configuration: {:?}", config);

    let client = Arc::new(ReportsClient::new(&config)?);

    match cli.command {
        Command::Serve { .. } => serve(client, config).await,
        Command::Reports => print_reports(client, &config).await,
        Command::Watch => watch(client, &config).await,
        Command::Upload {
            path,
            traffic_density,
        } => upload(client, config, path, traffic_density).await,
        Command::SubmitDetections {
            path,
            lat,
            lon,
            traffic_density,
        } => submit_detections(&client, path, lat, lon, traffic_density).await,
    }
}

async fn serve(client: Arc<ReportsClient>, config: Config) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!(
        "serving dashboard for {} (map refresh {:?})",
        config.api_url,
        config.map_refresh_interval
    );

    let shell = DashboardShell::mount(client, config);
    let app = create_router(AppState::new(shell));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("dashboard listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("dashboard shut down");
    Ok(())
}

async fn print_reports(client: Arc<ReportsClient>, config: &Config) -> Result<()> {
    let table = ReportsTablePanel::mount(client, config.timestamp_format.clone());
    if !table.settled(config.request_timeout).await {
        tracing::warn!("no answer from {} within {:?}", config.api_url, config.request_timeout);
    }
    print!("{}", render_table(&table.view()));
    if let Some(e) = table.snapshot().last_error {
        bail!("could not load reports: {}", e);
    }
    table.unmount();
    Ok(())
}

async fn watch(client: Arc<ReportsClient>, config: &Config) -> Result<()> {
    let panel = MapPanel::mount(client, config.map.clone(), config.map_refresh_interval);
    let mut rx = panel.subscribe();
    tracing::info!(
        "watching {} every {:?}; Ctrl+C to stop",
        config.reports_url(),
        panel.refresh_interval()
    );

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, stopping");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                match &snapshot.last_error {
                    Some(e) => println!("-- refresh #{} failed ({}); showing {} markers --", snapshot.attempts, e, snapshot.items.len()),
                    None => println!("-- refresh #{}: {} markers --", snapshot.attempts, snapshot.items.len()),
                }
                print!("{}", render_markers(&snapshot.items));
            }
        }
    }

    panel.unmount();
    Ok(())
}

/// Alerts go to stdout; a reload is reported and then shown by the caller.
struct TerminalPage;

impl Page for TerminalPage {
    fn alert(&self, message: &str) {
        println!("{}", message);
    }

    fn reload(&self) {
        tracing::info!("reloading reports");
    }
}

async fn upload(
    client: Arc<ReportsClient>,
    config: Config,
    path: PathBuf,
    traffic_density: Option<String>,
) -> Result<()> {
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file = UploadFile::from_path(&path, bytes)?;
    let timeout = config.request_timeout;

    let mut shell = DashboardShell::mount(client, config);
    shell.select_upload(file, traffic_density)?;
    let outcome = shell.submit_upload(&TerminalPage).await;
    match outcome {
        SubmitOutcome::Submitted => {
            shell.settled(timeout).await;
            print!("{}", render_table(&shell.view().table));
            shell.unmount();
            Ok(())
        }
        SubmitOutcome::Failed => {
            shell.unmount();
            bail!("upload of {} failed", path.display())
        }
        SubmitOutcome::NothingSelected => {
            shell.unmount();
            Ok(())
        }
    }
}

async fn submit_detections(
    client: &ReportsClient,
    path: PathBuf,
    lat: f64,
    lon: f64,
    traffic_density: Option<String>,
) -> Result<()> {
    let raw = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let detections: Vec<Detection> = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing detections in {}", path.display()))?;
    if detections.is_empty() {
        bail!("no detections in {}", path.display());
    }

    let receipt = client
        .submit_detections(&detections, lat, lon, traffic_density.as_deref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down gracefully...");
        },
    }
}
