// Server-sent events for session transitions
// Each event carries the full session snapshot, so a client that lags behind
// only needs the latest one.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use super::AppState;
use crate::search::SearchSession;

pub fn event_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/events", get(session_events))
}

/// Current snapshot first, then every transition
async fn session_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before taking the snapshot so no transition falls in between
    let rx = state.machine.subscribe();
    let current = state.machine.snapshot();

    let updates = BroadcastStream::new(rx).filter_map(|r| match r {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::debug!("Event stream lagged: {}", e);
            None
        }
    });

    let stream = tokio_stream::once(current)
        .chain(updates)
        .filter_map(|session| to_event(&session).map(Ok));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_event(session: &SearchSession) -> Option<Event> {
    match Event::default().event("session").json_data(session) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::error!("Failed to encode session event: {}", e);
            None
        }
    }
}
