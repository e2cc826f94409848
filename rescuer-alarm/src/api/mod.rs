//! HTTP control surface
//!
//! Exposes the command channel, session status, the host notification shade,
//! the change-feed webhook and the SSE event stream.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::platform::host::HostNotifier;
use crate::platform::FeedHub;
use crate::session::SessionController;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: Arc<SessionController>,
    /// Host notification shade (read-only over HTTP)
    pub notifier: Arc<HostNotifier>,
    /// Change feed the webhook publishes into
    pub feed: FeedHub,
    pub port: u16,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/events", get(handlers::event_stream))
        .nest(
            "/api/v1",
            Router::new()
                // Command channel
                .route("/command", post(handlers::command))
                // Session control
                .route("/initialize", post(handlers::initialize))
                .route("/service/start", post(handlers::start_service))
                .route("/service/stop", post(handlers::stop_service))
                .route("/alarm/stop", post(handlers::stop_alarm))
                .route("/status", get(handlers::status))
                // Host platform
                .route("/notifications", get(handlers::notifications))
                .route(
                    "/notifications/:id/dismiss",
                    post(handlers::dismiss_notification),
                )
                .route("/feed/changes", post(handlers::feed_changes)),
        )
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `signal` resolves
///
/// On the signal the session is torn down (volume restored, wake lock and
/// playback released) and the event stream is cancelled. The SSE response
/// never ends on its own, so graceful shutdown would otherwise wait on a
/// connected UI forever.
pub async fn serve<F>(listener: TcpListener, ctx: AppContext, signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let controller = Arc::clone(&ctx.controller);
    let app = create_router(ctx);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutting down: stopping monitoring");
            if let Err(e) = controller.stop_monitoring().await {
                warn!("Failed to stop monitoring during shutdown: {}", e);
            }
            controller.events().cancel();
        })
        .await
}
