//! Server-Sent Events stream of board changes.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use canvas::core::board::{Board, BoardCells};
use canvas::core::types::MutationEvent;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::AppState;

const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    identity: Option<String>,
}

#[derive(Serialize)]
struct SnapshotPayload<'a> {
    board: BoardCells<'a>,
}

fn snapshot_event(board: &Board) -> Option<Event> {
    let payload = SnapshotPayload {
        board: board.cells(),
    };
    match serde_json::to_string(&payload) {
        Ok(json) => Some(Event::default().event("snapshot").data(json)),
        Err(err) => {
            warn!(error = %err, "failed to serialize board snapshot");
            None
        }
    }
}

fn pixel_event(event: &MutationEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event("pixel").data(json)),
        Err(err) => {
            warn!(error = %err, "failed to serialize pixel event");
            None
        }
    }
}

/// SSE endpoint handler.
///
/// The first event is the full board as of registration; every accepted
/// paint after that arrives as a `pixel` event. The stream ends when the
/// subscription is closed by the server, and dropping the stream on client
/// disconnect unregisters it.
pub async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let identity = query
        .identity
        .filter(|identity| !identity.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string());
    let (subscription, board) = state.engine.subscribe(identity);

    let stream = async_stream::stream! {
        if let Some(event) = snapshot_event(&board) {
            yield Ok(event);
        }
        drop(board);

        while let Some(change) = subscription.recv().await {
            if let Some(event) = pixel_event(&change) {
                yield Ok(event);
            }
        }

        debug!(
            connection = subscription.id(),
            reason = ?subscription.connection().close_reason(),
            "subscription closed by server"
        );
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
