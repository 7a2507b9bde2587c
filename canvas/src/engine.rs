//! Process-wide canvas state, built once from configuration.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use crate::core::board::{Board, BoardError, BoardStore};
use crate::core::broadcast::{Broadcaster, Subscription};
use crate::core::cooldown::CooldownGate;
use crate::core::types::{Cell, MutationRequest, Rejection};
use crate::io::config::CanvasConfig;
use crate::io::durability::{Durability, load_board, open_durability};
use crate::pipeline::{Accepted, AdmissionMode, MutationPipeline};

/// Owns the board, cooldown gate, broadcaster and pipeline.
///
/// Everything inside is safe to share; wrap the engine in an `Arc` and hand
/// it to every worker.
pub struct Engine {
    config: CanvasConfig,
    board: Arc<BoardStore>,
    gate: Arc<CooldownGate>,
    broadcaster: Arc<Broadcaster>,
    pipeline: MutationPipeline,
}

impl Engine {
    /// Cold start using the storage backend named in `config`.
    pub fn open(config: CanvasConfig) -> Result<Self> {
        let durability = open_durability(&config.storage).context("open board storage")?;
        Self::with_durability(config, durability)
    }

    /// Cold start from `durability`: load the stored board, compact storage,
    /// and wire up the pipeline.
    pub fn with_durability(config: CanvasConfig, durability: Arc<dyn Durability>) -> Result<Self> {
        config.validate()?;
        let board = load_board(durability.as_ref(), config.dimensions(), config.default_color)
            .context("load board")?;
        durability.compact(&board).context("compact board storage")?;

        let board = Arc::new(BoardStore::from_board(board));
        let gate = Arc::new(CooldownGate::new(config.cooldown.duration()));
        let broadcaster = Arc::new(Broadcaster::new(
            config.subscribers.queue_capacity,
            config.subscribers.overflow,
        ));
        let pipeline = MutationPipeline::new(
            Arc::clone(&board),
            Arc::clone(&gate),
            Arc::clone(&broadcaster),
            durability,
            config.cooldown.enabled,
        );

        info!(
            width = config.width,
            height = config.height,
            cooldown_enabled = config.cooldown.enabled,
            cooldown_ms = config.cooldown.duration_ms,
            "canvas engine ready"
        );

        Ok(Self {
            config,
            board,
            gate,
            broadcaster,
            pipeline,
        })
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn apply(&self, request: &MutationRequest) -> Result<Accepted, Rejection> {
        self.pipeline.apply(request)
    }

    pub fn apply_exempt(&self, request: &MutationRequest) -> Result<Accepted, Rejection> {
        self.pipeline.apply_exempt(request)
    }

    pub fn apply_at(
        &self,
        request: &MutationRequest,
        mode: AdmissionMode,
        now: Instant,
    ) -> Result<Accepted, Rejection> {
        self.pipeline.apply_at(request, mode, now)
    }

    pub fn get(&self, x: i64, y: i64) -> Result<Cell, BoardError> {
        self.board.get(x, y)
    }

    pub fn snapshot(&self) -> Board {
        self.board.snapshot()
    }

    /// Register a live subscriber and return it with the current board.
    ///
    /// Registration happens before the snapshot is taken, so every accepted
    /// mutation is either in the snapshot, queued on the subscription, or
    /// both.
    pub fn subscribe(&self, identity: impl Into<String>) -> (Subscription, Board) {
        let subscription = self.broadcaster.register(identity);
        let board = self.board.snapshot();
        (subscription, board)
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.len()
    }

    /// Identities with a cooldown record, expired or not.
    pub fn cooldown_records(&self) -> usize {
        self.gate.len()
    }

    /// Reclaim expired cooldown records.
    pub fn prune_cooldowns(&self) -> usize {
        self.gate.prune(Instant::now())
    }

    /// Close every live subscription.
    pub fn shutdown(&self) -> usize {
        let closed = self.broadcaster.shutdown();
        info!(closed, "canvas engine shut down");
        closed
    }
}
