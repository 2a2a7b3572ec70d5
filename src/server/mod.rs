//! HTTP surface of the scanner.
//!
//! Serves the live MJPEG preview, capture and still endpoints, project
//! folders on the remote drive, the local cache and Prometheus metrics.
//! Remote storage calls are blocking and run on tokio's blocking pool,
//! as do the crop and encode pipelines.

mod error;
pub mod pipeline;
mod routes;

pub use error::{ApiError, ServerError};
pub use pipeline::{EncodedImage, NormalizedRegion, OutputFormat};
pub use routes::{router, Target};

use crate::capture::{CommandStill, FileConfig, FrameStream, StillSource};
use crate::metrics::ScannerMetrics;
use crate::session::{OAuthClient, SessionToken};
use crate::storage::{DriveClient, LocalCache, StorageClient, StorageError};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Builds a storage client for a signed-in user. Called on a blocking thread.
pub type StorageFactory =
    Arc<dyn Fn(&SessionToken) -> Result<Arc<dyn StorageClient>, StorageError> + Send + Sync>;

/// Produces a still source for each still request.
pub type StillFactory = Arc<dyn Fn() -> Box<dyn StillSource + Send> + Send + Sync>;

/// Storage backed by the user's Google Drive.
pub fn drive_storage() -> StorageFactory {
    Arc::new(
        |token: &SessionToken| -> Result<Arc<dyn StorageClient>, StorageError> {
            let client = DriveClient::new(token.access_token.clone())?;
            Ok(Arc::new(client))
        },
    )
}

/// Stills taken by the configured external command.
pub fn command_stills(still: CommandStill) -> StillFactory {
    Arc::new(move || Box::new(still.clone()) as Box<dyn StillSource + Send>)
}

/// Shared state of all handlers.
pub struct AppState {
    /// Loaded configuration.
    pub config: FileConfig,
    /// `None` when no camera could be opened; preview and capture then
    /// answer 503.
    pub stream: Option<Arc<FrameStream>>,
    /// Local image cache.
    pub cache: LocalCache,
    /// Scanner counters.
    pub metrics: Arc<ScannerMetrics>,
    /// Login and code exchange.
    pub oauth: OAuthClient,
    /// Builds a storage client per request.
    pub storage: StorageFactory,
    /// Builds a still source per request.
    pub stills: StillFactory,
    /// Flips to `true` when the server should stop.
    pub shutdown: watch::Receiver<bool>,
}

/// The scanner's HTTP server.
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// A server over `state`.
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.state.config.server.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until shutdown.
    ///
    /// Open preview streams end when shutdown is signalled, so graceful
    /// shutdown does not wait on them.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Film scanner listening");

        let mut shutdown = self.state.shutdown.clone();
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move {
                wait_for_shutdown(&mut shutdown).await;
                tracing::info!("Shutting down server");
            })
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }
}

/// Resolves once `shutdown` holds `true` or its sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
