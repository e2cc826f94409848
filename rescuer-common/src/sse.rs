//! Server-Sent Events (SSE) utilities
//!
//! Turns an [`EventStream`](crate::events::EventStream) subscription into an
//! axum SSE response.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::events::RescuerEvent;

/// Create an SSE stream that forwards rescuer events to a single client
///
/// The stream starts with a `ConnectionStatus` event and ends when the
/// subscription is replaced or cancelled.
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream(
///     State(ctx): State<AppContext>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     rescuer_common::sse::create_event_sse_stream("rescuer-alarm", ctx.events.listen())
/// }
/// ```
pub fn create_event_sse_stream(
    service_name: &'static str,
    mut rx: mpsc::Receiver<RescuerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        while let Some(event) = rx.recv().await {
            match Event::default().event(event.event_type()).json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => warn!("SSE: failed to serialize {}: {}", event.event_type(), e),
            }
        }

        info!("SSE: {} event stream closed (subscriber replaced)", service_name);
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
