//! Server-Sent Events stream of campaign events

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use tokio::sync::broadcast;

use crate::AppState;

/// GET /events - subscribe to all campaign events.
///
/// Each SSE event is named after the campaign event variant and carries the
/// serialized event as JSON. Subscribers that fall behind skip the lagged
/// events and keep receiving.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data(json!({ "connected": true }).to_string()));

        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(data) => {
                        yield Ok(Event::default().event(event.event_name()).data(data));
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to serialize campaign event");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "SSE subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
