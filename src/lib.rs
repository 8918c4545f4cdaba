//! advisord - urban space improvement advisor
//!
//! Analyzes a street photo with a hosted generative model and visualizes the
//! recommended improvements one step at a time.

pub mod analysis;
pub mod api;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod images;
pub mod pipeline;
pub mod protocol;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::{AppState, RateLimiter};
use backend::{GeminiClient, GenerativeBackend};
use images::{ResultStore, UploadStore};
use pipeline::Orchestrator;

pub use config::Config;
pub use error::AdvisorError;

/// The advisord server instance
pub struct Server {
    config: Config,
    backend: Arc<dyn GenerativeBackend>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a server talking to the configured Gemini endpoint
    pub fn new(config: Config) -> Result<Self> {
        let client = GeminiClient::new(&config.gemini)?;
        if !client.is_configured() {
            warn!("Gemini API key not configured; analysis requests will fail");
        }
        Ok(Self::with_backend(config, Arc::new(client)))
    }

    /// Create a server with a custom model backend
    pub fn with_backend(config: Config, backend: Arc<dyn GenerativeBackend>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            backend,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the router
    fn router(&self) -> Router {
        // In-flight generation stops awaiting the model once shutdown starts
        let orchestrator = Orchestrator::new(
            self.backend.clone(),
            ResultStore::new(self.config.results_dir()),
        )
        .with_cancel(self.shutdown_rx.clone());

        api::router(AppState {
            backend: self.backend.clone(),
            orchestrator,
            uploads: UploadStore::new(self.config.uploads_dir()),
            limiter: Arc::new(RateLimiter::per_minute(self.config.rate_limit_per_minute)),
            max_upload_bytes: self.config.max_upload_bytes,
        })
    }

    /// Run the server until shutdown
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;
        tokio::fs::create_dir_all(self.config.results_dir()).await?;
        tokio::fs::create_dir_all(self.config.uploads_dir()).await?;

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("advisord listening on {}", local_addr);

        let sweeper = images::spawn_sweeper(
            vec![self.config.uploads_dir(), self.config.results_dir()],
            self.config.purge_interval(),
            self.config.purge_max_age(),
            self.shutdown_rx.clone(),
        );

        let router = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_rx.changed().await.ok();
        })
        .await?;

        if let Err(e) = sweeper.await {
            error!("Cleanup sweeper failed: {}", e);
        }
        info!("advisord shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
