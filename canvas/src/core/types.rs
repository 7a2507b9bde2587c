//! Shared value types for the mutation engine.
//!
//! These types are the contracts between the board, the cooldown gate, the
//! pipeline and the broadcaster. They carry no locks and perform no I/O.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::color::Color;

/// Current content of one board position.
///
/// Coordinates are not stored; a cell is always addressed through the board
/// that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub color: Color,
    /// Identity of the last accepted writer. `None` until first painted.
    pub editor: Option<String>,
}

impl Cell {
    /// An unpainted cell in `color`.
    pub fn blank(color: Color) -> Self {
        Self {
            color,
            editor: None,
        }
    }

    pub fn painted(color: Color, editor: impl Into<String>) -> Self {
        Self {
            color,
            editor: Some(editor.into()),
        }
    }
}

/// One inbound request to paint a cell.
///
/// Fields are kept raw (signed coordinates, free-form color) so validation
/// happens inside the pipeline, not at deserialization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub identity: String,
    pub x: i64,
    pub y: i64,
    pub color: String,
}

impl MutationRequest {
    pub fn new(identity: impl Into<String>, x: i64, y: i64, color: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            x,
            y,
            color: color.into(),
        }
    }
}

/// Broadcast payload for an accepted mutation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub x: u32,
    pub y: u32,
    pub color: Color,
    pub editor: String,
}

/// Why the pipeline refused a mutation. Scoped to the single request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("invalid color '{color}'")]
    InvalidColor { color: String },

    #[error("invalid coordinates ({x}, {y})")]
    OutOfBounds { x: i64, y: i64 },

    #[error("cooldown active, wait {:.1} seconds", .remaining.as_secs_f64())]
    CooldownActive { remaining: Duration },
}

impl Rejection {
    /// Validation failures are caller errors and never succeed on retry;
    /// a cooldown rejection succeeds once the reported wait has elapsed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Rejection::CooldownActive { .. })
    }

    pub fn remaining_secs(&self) -> Option<f64> {
        match self {
            Rejection::CooldownActive { remaining } => Some(remaining.as_secs_f64()),
            _ => None,
        }
    }
}
