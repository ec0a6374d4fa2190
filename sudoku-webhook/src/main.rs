//! sudoku-webhook - Puzzle screenshot ingestion service
//!
//! Accepts `{"file_id": ...}` notifications, reads the solved-puzzle
//! screenshot from Google Drive and stores difficulty and solve time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use sudoku_common::config::{SecretBackend, TomlConfig};
use sudoku_webhook::credentials::CredentialManager;
use sudoku_webhook::db::{self, PgResultStore};
use sudoku_webhook::drive::DriveClient;
use sudoku_webhook::inference::AnthropicClient;
use sudoku_webhook::pipeline::Pipeline;
use sudoku_webhook::secrets::{
    discover_project_id, FileSecretProvider, GcpSecretManager, SecretProvider,
};
use sudoku_webhook::{build_router, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sudoku-webhook
#[derive(Parser, Debug)]
#[command(name = "sudoku-webhook")]
#[command(about = "Records solved puzzle screenshots from Google Drive")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind (overrides server.host)
    #[arg(short, long)]
    bind: Option<String>,

    /// Config file path
    #[arg(short, long, env = "SUDOKU_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::resolve(args.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sudoku-webhook v{}", env!("CARGO_PKG_VERSION"));
    match &config.source {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No config file found, using defaults"),
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let secrets = build_secret_provider(&config, &http).await?;
    info!("Secret backend: {}", secrets.backend_name());

    let database_url = db::resolve_database_url(secrets.as_ref())
        .await
        .context("Failed to resolve database URL")?;
    let pool = db::connect(
        &database_url,
        config.database.max_connections,
        config.database.acquire_timeout(),
    )
    .context("Failed to configure database pool")?;
    if config.database.ensure_schema {
        if let Err(e) = db::ensure_schema(&pool).await {
            error!("Failed to prepare database schema: {}", e);
            return Err(e).context("Database schema setup failed");
        }
    }

    let credentials = Arc::new(CredentialManager::new(secrets.clone(), http.clone()));
    let drive = DriveClient::new(http.clone(), credentials, &config.google.drive_url)
        .context("Invalid Drive URL")?;
    let extractor = AnthropicClient::new(
        http.clone(),
        secrets.clone(),
        &config.inference.api_url,
        &config.inference.model,
        config.inference.max_tokens,
    );
    info!("Vision model: {}", config.inference.model);

    let pipeline = Pipeline::new(
        Arc::new(drive),
        Arc::new(extractor),
        Arc::new(PgResultStore::new(pool)),
        config.image.jpeg_quality,
    );

    let state = AppState::new(secrets, Arc::new(pipeline));
    let app = build_router(state);

    let mut server = config.server.clone();
    if let Some(host) = args.bind {
        server.host = host;
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    let addr = server.socket_addr().context("Invalid bind address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("sudoku-webhook listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn build_secret_provider(
    config: &TomlConfig,
    http: &reqwest::Client,
) -> Result<Arc<dyn SecretProvider>> {
    match config.secrets.backend {
        SecretBackend::Gcp => {
            let project_id = match &config.google.project_id {
                Some(project_id) => project_id.clone(),
                None => discover_project_id(http, &config.google.metadata_url)
                    .await
                    .ok_or_else(|| {
                        anyhow!("Google Cloud project id not configured and metadata server unavailable")
                    })?,
            };
            info!("Google Cloud project: {}", project_id);
            Ok(Arc::new(GcpSecretManager::new(
                http.clone(),
                config.google.secret_manager_url.as_str(),
                config.google.metadata_url.as_str(),
                project_id,
            )))
        }
        SecretBackend::File => {
            let path = config
                .secrets
                .file
                .clone()
                .ok_or_else(|| anyhow!("secrets.file is required for the file backend"))?;
            warn!("Using local secrets file {} (development only)", path.display());
            Ok(Arc::new(FileSecretProvider::new(path)))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
