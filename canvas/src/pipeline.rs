//! Validate -> admit -> apply -> persist -> publish for one mutation.
//!
//! Steps short-circuit on the first failure. Admission, the board write, the
//! durable write and the publish for a given cell all happen inside that
//! cell's commit section, so for any cell the order in which writes pass
//! admission is the order they land on the board and the order subscribers
//! see them. Requests for cells in different sections run in parallel.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::board::{BoardError, BoardStore};
use crate::core::broadcast::{Broadcaster, PublishReport};
use crate::core::color::Color;
use crate::core::cooldown::{Admission, CooldownGate};
use crate::core::types::{Cell, MutationEvent, MutationRequest, Rejection};
use crate::io::durability::Durability;

/// Number of commit sections cells are striped over.
const COMMIT_STRIPES: usize = 64;

/// Whether step 3 (cooldown admission) runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    Enforced,
    Exempt,
}

/// Result of an accepted mutation.
#[derive(Debug, Clone)]
pub struct Accepted {
    /// The event that was published.
    pub event: Arc<MutationEvent>,
    /// Cell contents before this write.
    pub previous: Cell,
    /// False when the durable write failed. The in-memory write and the
    /// broadcast happened regardless.
    pub persisted: bool,
    pub publish: PublishReport,
}

impl From<BoardError> for Rejection {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::OutOfBounds { x, y, .. } => Rejection::OutOfBounds { x, y },
        }
    }
}

pub struct MutationPipeline {
    board: Arc<BoardStore>,
    gate: Arc<CooldownGate>,
    broadcaster: Arc<Broadcaster>,
    durability: Arc<dyn Durability>,
    cooldown_enabled: bool,
    stripes: Vec<Mutex<()>>,
}

impl MutationPipeline {
    pub fn new(
        board: Arc<BoardStore>,
        gate: Arc<CooldownGate>,
        broadcaster: Arc<Broadcaster>,
        durability: Arc<dyn Durability>,
        cooldown_enabled: bool,
    ) -> Self {
        Self {
            board,
            gate,
            broadcaster,
            durability,
            cooldown_enabled,
            stripes: (0..COMMIT_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Apply `request` now, enforcing cooldown unless it is disabled in config.
    pub fn apply(&self, request: &MutationRequest) -> Result<Accepted, Rejection> {
        let mode = if self.cooldown_enabled {
            AdmissionMode::Enforced
        } else {
            AdmissionMode::Exempt
        };
        self.apply_at(request, mode, Instant::now())
    }

    /// Apply `request` now without consulting the cooldown gate.
    pub fn apply_exempt(&self, request: &MutationRequest) -> Result<Accepted, Rejection> {
        self.apply_at(request, AdmissionMode::Exempt, Instant::now())
    }

    pub fn apply_at(
        &self,
        request: &MutationRequest,
        mode: AdmissionMode,
        now: Instant,
    ) -> Result<Accepted, Rejection> {
        let color: Color = request
            .color
            .parse()
            .map_err(|_| Rejection::InvalidColor {
                color: request.color.clone(),
            })?;

        let dims = self.board.dimensions();
        let point = dims.point(request.x, request.y).ok_or(Rejection::OutOfBounds {
            x: request.x,
            y: request.y,
        })?;

        let _commit = self.stripes[dims.index(point) % self.stripes.len()].lock();

        if mode == AdmissionMode::Enforced
            && let Admission::Denied { remaining } = self.gate.admit(&request.identity, now)
        {
            return Err(Rejection::CooldownActive { remaining });
        }

        let previous = self
            .board
            .set(request.x, request.y, color, &request.identity)?;

        let persisted = match self
            .durability
            .persist_cell(point.x, point.y, color, &request.identity)
        {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    x = point.x,
                    y = point.y,
                    error = %err,
                    "durable write failed, keeping in-memory update"
                );
                false
            }
        };

        let event = Arc::new(MutationEvent {
            x: point.x,
            y: point.y,
            color,
            editor: request.identity.clone(),
        });
        let publish = self.broadcaster.publish(Arc::clone(&event));

        debug!(
            identity = %request.identity,
            x = point.x,
            y = point.y,
            color = %color,
            mode = ?mode,
            "mutation accepted"
        );

        Ok(Accepted {
            event,
            previous,
            persisted,
            publish,
        })
    }
}
