//! API Server
//!
//! Binds the HTTP front door and serves it until the shutdown future resolves.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::{config::ServerConfig, errors::ConnectionError};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Create the application with its middleware stack
    pub fn create_app(&self) -> axum::Router {
        create_router(self.state.clone(), &self.config.route)
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))

            // CORS layer (before timeout to handle preflight)
            .layer(create_cors_layer(self.config.allowed_origins.clone()))

            .layer(TimeoutLayer::new(Duration::from_secs(self.config.request_timeout_secs)))

            // Tracing layer (last for complete request tracing)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, ConnectionError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| ConnectionError::Listener {
                addr,
                reason: e.to_string(),
            })
    }

    /// Serve on `listener` until `shutdown` resolves. In-flight workers are
    /// not awaited here.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.create_app();
        let local: Option<SocketAddr> = listener.local_addr().ok();

        info!("🌐 Starting random number bridge (HTTP)");
        if let Some(addr) = local {
            info!("   Listen: http://{}", addr);
        }
        self.log_server_info();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("🛑 API Server stopped");
        Ok(())
    }

    fn log_server_info(&self) {
        let settings = self.state.pool.settings();
        info!("📋 Server Configuration:");
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);
        info!("   Poll interval: {:?}", settings.poll_interval);
        info!("   Delivery deadline: {:?}", settings.deadline);
        info!("   Max concurrent workers: {}", settings.max_concurrent_workers);

        info!("📊 Available endpoints:");
        info!("   GET     /{}/:game   - Request a round's random number", self.config.route);
        info!("   OPTIONS /{}/:game   - CORS preflight", self.config.route);
        info!("   GET     /test/{}    - Publish a test token", self.config.route);
        info!("   GET     /health     - Health check");
        info!("   GET     /metrics    - Prometheus metrics");
    }
}

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(unix)]
    let hangup = async {
        signal::unix::signal(signal::unix::SignalKind::hangup())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
        _ = hangup => {
            info!("Received hangup signal");
        },
    }
}
