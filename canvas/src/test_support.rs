//! Test-only helpers: storage doubles and small engine configurations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::core::color::Color;
use crate::core::geometry::Point;
use crate::core::types::Cell;
use crate::engine::Engine;
use crate::io::config::{CanvasConfig, StorageBackend};
use crate::io::durability::Durability;

/// In-memory store that records every write and can be told to fail.
#[derive(Default)]
pub struct RecordingDurability {
    writes: Mutex<Vec<(u32, u32, Color, String)>>,
    failing: AtomicBool,
}

impl RecordingDurability {
    /// Make subsequent `persist_cell` calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful writes in call order.
    pub fn writes(&self) -> Vec<(u32, u32, Color, String)> {
        self.writes.lock().clone()
    }
}

impl Durability for RecordingDurability {
    fn persist_cell(&self, x: u32, y: u32, color: Color, editor: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated storage outage"));
        }
        self.writes.lock().push((x, y, color, editor.to_string()));
        Ok(())
    }

    fn load_all(&self) -> Result<HashMap<String, Cell>> {
        Ok(self
            .writes
            .lock()
            .iter()
            .map(|(x, y, color, editor)| {
                (Point { x: *x, y: *y }.key(), Cell::painted(*color, editor.clone()))
            })
            .collect())
    }
}

/// Memory-backed config for a `width` x `height` board.
pub fn memory_config(width: u32, height: u32, cooldown_ms: u64) -> CanvasConfig {
    let mut cfg = CanvasConfig {
        width,
        height,
        ..CanvasConfig::default()
    };
    cfg.cooldown.duration_ms = cooldown_ms;
    cfg.storage.backend = StorageBackend::Memory;
    cfg
}

/// Engine over a [`RecordingDurability`] the caller can inspect.
pub fn recording_engine(config: CanvasConfig) -> (Engine, Arc<RecordingDurability>) {
    let durability = Arc::new(RecordingDurability::default());
    let engine = Engine::with_durability(config, durability.clone()).expect("engine");
    (engine, durability)
}

/// File-backed config whose board log lives in a fresh temp directory.
///
/// Keep the returned `TempDir` alive for as long as the config is used.
pub fn temp_file_config(width: u32, height: u32, cooldown_ms: u64) -> (TempDir, CanvasConfig) {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cfg = memory_config(width, height, cooldown_ms);
    cfg.storage.backend = StorageBackend::File;
    cfg.storage.path = temp.path().join("board.jsonl");
    (temp, cfg)
}
