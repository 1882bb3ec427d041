//! HTTP server for the LOB session surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, FreePolicyKind};
use crate::database::Database;
use crate::error::LobResult;
use crate::router::{create_router, AppState};
use crate::session::SessionRegistry;
use crate::storage::SpillCollector;

/// LOB engine server.
pub struct LobServer {
    config: Arc<Config>,
    db: Arc<Database>,
}

impl LobServer {
    /// Opens the engine described by `config`.
    pub fn new(config: Config) -> LobResult<Self> {
        let db = Database::open(config.clone())?;
        Ok(Self {
            config: Arc::new(config),
            db,
        })
    }

    /// Returns the engine behind the server.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Binds the configured address and runs the server.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.config.bind_address().parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Runs the server on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let collector = SpillCollector::new(
            Arc::clone(self.db.spill_directory()),
            self.config.gc_interval,
        );
        tokio::spawn(async move {
            collector.run().await;
        });

        let state = AppState {
            config: self.config.clone(),
            sessions: Arc::new(SessionRegistry::new(Arc::clone(&self.db))),
        };

        // Create router with middleware
        let app = create_router(state)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .expose_headers(Any),
            )
            .layer(TraceLayer::new_for_http());

        info!("LOB session service is starting at http://{}", listener.local_addr()?);
        info!(
            "Spill directory: {}, threshold: {} bytes, lock timeout: {:?}, free policy: {}",
            self.config.spill_dir.display(),
            self.config.spill_threshold,
            self.config.lock_timeout,
            self.db.free_policy().name()
        );

        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Returns the bind address.
    pub fn bind_address(&self) -> String {
        self.config.bind_address()
    }

    /// Returns the base URL of the session surface.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.bind_address())
    }
}

/// Builder for creating a LOB server.
pub struct LobServerBuilder {
    config: Config,
}

impl LobServerBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the spill directory.
    pub fn spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.spill_dir = dir.into();
        self
    }

    /// Sets the in-memory size limit of a single LOB.
    pub fn spill_threshold(mut self, bytes: usize) -> Self {
        self.config.spill_threshold = bytes;
        self
    }

    /// Sets the row lock wait timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Sets the post-free policy.
    pub fn free_policy(mut self, policy: FreePolicyKind) -> Self {
        self.config.free_policy = policy;
        self
    }

    /// Builds the server.
    pub fn build(self) -> LobResult<LobServer> {
        LobServer::new(self.config)
    }
}

impl Default for LobServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
