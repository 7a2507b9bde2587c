//! HTTP route handlers for painting and reading the board.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use canvas::core::types::{MutationRequest, Rejection};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/board", get(get_board))
        .route("/update_pixel", post(update_pixel))
        .route("/update_pixel/exempt", post(update_pixel_exempt))
}

async fn health() -> &'static str {
    "ok"
}

/// Body of a paint request. `user_id` is the caller's already-authenticated
/// identity.
#[derive(Debug, Clone, Deserialize)]
pub struct PixelUpdate {
    pub x: i64,
    pub y: i64,
    pub color: String,
    pub user_id: String,
}

impl From<PixelUpdate> for MutationRequest {
    fn from(update: PixelUpdate) -> Self {
        MutationRequest::new(update.user_id, update.x, update.y, update.color)
    }
}

#[derive(Serialize)]
struct UpdateResponse {
    message: &'static str,
    /// False when the durable write failed; the update is live regardless.
    persisted: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_seconds: Option<f64>,
}

/// POST /update_pixel - paint one cell, subject to cooldown.
async fn update_pixel(State(state): State<AppState>, Json(update): Json<PixelUpdate>) -> Response {
    run_mutation(&state, update.into(), false).await
}

/// POST /update_pixel/exempt - paint one cell without consulting cooldown.
async fn update_pixel_exempt(
    State(state): State<AppState>,
    Json(update): Json<PixelUpdate>,
) -> Response {
    run_mutation(&state, update.into(), true).await
}

async fn run_mutation(state: &AppState, request: MutationRequest, exempt: bool) -> Response {
    let engine = Arc::clone(&state.engine);
    // Runs to completion even if the client goes away mid-request.
    let outcome = tokio::task::spawn_blocking(move || {
        if exempt {
            engine.apply_exempt(&request)
        } else {
            engine.apply(&request)
        }
    })
    .await;

    match outcome {
        Ok(Ok(accepted)) => Json(UpdateResponse {
            message: "Pixel updated successfully",
            persisted: accepted.persisted,
        })
        .into_response(),
        Ok(Err(rejection)) => rejection_response(&rejection),
        Err(err) => {
            warn!(error = %err, "mutation task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn rejection_response(rejection: &Rejection) -> Response {
    let (status, detail) = match rejection {
        Rejection::InvalidColor { .. } => (StatusCode::BAD_REQUEST, "Invalid color".to_string()),
        Rejection::OutOfBounds { .. } => {
            (StatusCode::BAD_REQUEST, "Invalid coordinates".to_string())
        }
        Rejection::CooldownActive { remaining } => (
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "Cooldown active. Please wait {:.1} seconds.",
                remaining.as_secs_f64()
            ),
        ),
    };
    let body = ErrorResponse {
        detail,
        remaining_seconds: rejection.remaining_secs(),
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct BoardQuery {
    /// Include the last editor of each cell.
    #[serde(default)]
    extended: bool,
}

#[derive(Serialize)]
struct BoardResponse<T: Serialize> {
    board: T,
}

/// GET /board - the whole board as `"x,y" -> color`, ordered by x then y.
async fn get_board(State(state): State<AppState>, Query(query): Query<BoardQuery>) -> Response {
    let board = state.engine.snapshot();
    if query.extended {
        Json(BoardResponse {
            board: board.cells(),
        })
        .into_response()
    } else {
        Json(BoardResponse {
            board: board.colors(),
        })
        .into_response()
    }
}
