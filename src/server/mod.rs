// Local HTTP server for the presentation layer
// Serves the REST API + session event stream, and optionally a static UI bundle

pub mod events;
pub mod routes;

use axum::{
    http::{HeaderValue, Method},
    Router,
};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::ai::{CatalogMode, CredentialManager};
use crate::catalog::Catalog;
use crate::search::SearchMachine;

/// Shared state for the HTTP handlers
pub struct AppState {
    pub machine: Arc<SearchMachine>,
    pub credentials: Arc<CredentialManager>,
    pub catalog: Arc<Catalog>,
    pub mode: CatalogMode,
}

/// Holds the running server's shutdown mechanism
pub struct RunningServer {
    pub shutdown_tx: oneshot::Sender<()>,
    pub addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

impl RunningServer {
    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            tracing::error!("Server task failed: {}", e);
        }
    }
}

/// Build the full application router
pub fn router(state: Arc<AppState>, ui_dir: Option<PathBuf>) -> Router {
    // Browser UIs served from another origin (dev servers) need CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_origin(HeaderValue::from_static("*"));

    let api = Router::new()
        .merge(routes::api_routes())
        .merge(events::event_routes())
        .with_state(state);

    let app = match ui_dir.filter(|p| p.exists()) {
        Some(dir) => {
            tracing::info!("Serving UI from {:?}", dir);
            let index = dir.join("index.html");
            api.fallback_service(ServeDir::new(&dir).fallback(ServeFile::new(index)))
        }
        None => {
            tracing::info!("No UI directory configured, API-only mode");
            api
        }
    };

    app.layer(cors).layer(TraceLayer::new_for_http())
}

/// Start the server on `bind:port` (falling back to nearby ports).
pub async fn start_server(
    bind: IpAddr,
    port: u16,
    app: Router,
) -> std::io::Result<RunningServer> {
    let listener = try_bind(bind, port).await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tracing::info!("Server listening on http://{}", addr);

    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Shutdown signal received, draining connections...");
            })
            .await;
        if let Err(e) = result {
            tracing::error!("Server error: {}", e);
        }
        tracing::info!("Server stopped");
    });

    Ok(RunningServer {
        shutdown_tx,
        addr,
        handle,
    })
}

/// Bind the preferred port, then the next ten, then an OS-assigned one
async fn try_bind(bind: IpAddr, preferred_port: u16) -> std::io::Result<tokio::net::TcpListener> {
    let first_err = match tokio::net::TcpListener::bind(SocketAddr::new(bind, preferred_port)).await {
        Ok(listener) => return Ok(listener),
        Err(e) => e,
    };

    for offset in 1..=10u16 {
        let port = preferred_port.saturating_add(offset);
        if let Ok(listener) = tokio::net::TcpListener::bind(SocketAddr::new(bind, port)).await {
            tracing::warn!("Port {} unavailable ({}), using {}", preferred_port, first_err, port);
            return Ok(listener);
        }
    }

    let listener = tokio::net::TcpListener::bind(SocketAddr::new(bind, 0)).await?;
    tracing::warn!(
        "All preferred ports unavailable, OS assigned port {}",
        listener.local_addr()?.port()
    );
    Ok(listener)
}
