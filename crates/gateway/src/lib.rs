//! # Gateway
//!
//! HTTP control surface of the relay: binding management, outbound OSC and MIDI,
//! message injection, sink stats and a per-destination SSE stream for
//! browser overlays.

mod error;
mod routes;

pub use error::GatewayError;
pub use routes::{
    AppState, BindingRequest, DispatchRequest, DispatchResponse, MidiData, MidiSendRequest,
    SendRequest,
};

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Build the API router
pub fn build_router(state: AppState, cors: bool) -> Router {
    let router = Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/bindings", get(routes::list_bindings))
        .route(
            "/api/bindings/{id}",
            put(routes::put_binding).delete(routes::delete_binding),
        )
        .route("/api/osc/send", post(routes::osc_send))
        .route("/api/midi/send", post(routes::midi_send))
        .route("/api/dispatch", post(routes::dispatch))
        .route("/api/events/{id}", get(routes::events))
        .route("/api/stats", get(routes::stats))
        .with_state(state);

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve the API on `listener` until `shutdown` flips to `true`
///
/// Graceful shutdown waits for open connections, including SSE streams;
/// callers bound that wait.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cors: bool,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, cors, "HTTP gateway listening");

    axum::serve(listener, build_router(state, cors))
        .with_graceful_shutdown(async move {
            // A dropped sender also ends the server
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("HTTP gateway stopped");
    Ok(())
}

/// Spawn [`serve`] as a background task
pub fn spawn(
    listener: TcpListener,
    state: AppState,
    cors: bool,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(listener, state, cors, shutdown).await {
            warn!(error = %e, "HTTP gateway terminated");
        }
    })
}
