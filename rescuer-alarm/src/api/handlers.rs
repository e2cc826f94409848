//! HTTP request handlers

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{info, warn};

use super::AppContext;
use crate::command::{Command, CommandReply};
use crate::error::{Error, Result};
use crate::notification::{Notification, NotificationId};
use crate::platform::ChangeEvent;
use crate::session::SessionStatus;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
}

/// Missing fields are answered with `INVALID_ARGUMENT`, like the command channel
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    municipality: Option<String>,
    #[serde(default, alias = "rescuerName")]
    operator_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedChangesRequest {
    /// Collection path, e.g. `EMERGENCY/riverside/LISTS`
    collection: String,
    #[serde(default)]
    changes: Vec<ChangeEvent>,
    /// Report a feed failure instead of changes
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedChangesResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DismissResponse {
    pub dismissed: bool,
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "rescuer-alarm".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: ctx.port,
    })
}

// ============================================================================
// Command channel
// ============================================================================

/// POST /api/v1/command - one request, one reply
///
/// Failures are part of the reply body, so the HTTP status is always 200.
pub async fn command(
    State(ctx): State<AppContext>,
    Json(body): Json<serde_json::Value>,
) -> Json<CommandReply> {
    let reply = match Command::parse(body) {
        Ok(command) => ctx.controller.handle(command).await,
        Err(reply) => reply,
    };
    if let CommandReply::Error { code, message } = &reply {
        warn!("Command failed ({:?}): {}", code, message);
    }
    Json(reply)
}

// ============================================================================
// Session control
// ============================================================================

/// POST /api/v1/initialize
pub async fn initialize(State(ctx): State<AppContext>) -> Result<Json<CommandReply>> {
    ctx.controller.initialize()?;
    Ok(Json(CommandReply::empty()))
}

/// POST /api/v1/service/start
pub async fn start_service(
    State(ctx): State<AppContext>,
    Json(req): Json<StartRequest>,
) -> Result<Json<CommandReply>> {
    let municipality = req
        .municipality
        .ok_or_else(|| Error::InvalidArgument("Municipality cannot be null".to_string()))?;
    let operator_name = req
        .operator_name
        .ok_or_else(|| Error::InvalidArgument("Rescuer name cannot be null".to_string()))?;

    info!("Start request: {} / {}", municipality, operator_name);
    ctx.controller
        .start_monitoring(&municipality, &operator_name)
        .await?;
    Ok(Json(CommandReply::success("Service started successfully")))
}

/// POST /api/v1/service/stop
pub async fn stop_service(State(ctx): State<AppContext>) -> Result<Json<CommandReply>> {
    ctx.controller.stop_monitoring().await?;
    Ok(Json(CommandReply::success("Service stopped successfully")))
}

/// POST /api/v1/alarm/stop
pub async fn stop_alarm(State(ctx): State<AppContext>) -> Result<Json<CommandReply>> {
    ctx.controller.stop_alarm().await?;
    Ok(Json(CommandReply::success("Alarm stopped")))
}

/// GET /api/v1/status
pub async fn status(State(ctx): State<AppContext>) -> Json<SessionStatus> {
    Json(ctx.controller.status().await)
}

// ============================================================================
// Host platform
// ============================================================================

/// GET /api/v1/notifications - notifications currently shown
pub async fn notifications(State(ctx): State<AppContext>) -> Json<Vec<Notification>> {
    Json(ctx.notifier.active())
}

/// POST /api/v1/notifications/:id/dismiss - user tap or swipe
pub async fn dismiss_notification(
    State(ctx): State<AppContext>,
    Path(id): Path<NotificationId>,
) -> Result<Json<DismissResponse>> {
    let dismissed = ctx.notifier.dismiss(id)?;
    Ok(Json(DismissResponse { dismissed }))
}

/// POST /api/v1/feed/changes - change-feed webhook
pub async fn feed_changes(
    State(ctx): State<AppContext>,
    Json(req): Json<FeedChangesRequest>,
) -> Result<Json<FeedChangesResponse>> {
    if req.collection.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "Collection cannot be empty".to_string(),
        ));
    }

    let delivered = match req.error {
        Some(message) => ctx.feed.fail(&req.collection, &message),
        None => ctx.feed.publish(&req.collection, &req.changes),
    };

    // Let the coordinator apply the batch before answering
    if delivered > 0 {
        ctx.controller.status().await;
    }

    Ok(Json(FeedChangesResponse { delivered }))
}

// ============================================================================
// Events
// ============================================================================

/// GET /events - SSE event stream; a new connection replaces the previous one
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    rescuer_common::sse::create_event_sse_stream(
        "rescuer-alarm",
        ctx.controller.events().listen(),
    )
}
