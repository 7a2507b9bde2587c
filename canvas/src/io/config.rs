//! Canvas configuration stored in `canvas.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::color::Color;
use crate::core::connection::OverflowPolicy;
use crate::core::geometry::Dimensions;

/// Canvas configuration (TOML).
///
/// Missing fields fall back to the defaults below, so an empty file is a
/// valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CanvasConfig {
    /// Board width in cells.
    pub width: u32,

    /// Board height in cells.
    pub height: u32,

    /// Color of every cell that has never been painted.
    pub default_color: Color,

    pub cooldown: CooldownConfig,
    pub subscribers: SubscriberConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CooldownConfig {
    /// When false, the regular mutation call behaves like the exempt one.
    pub enabled: bool,

    /// Minimum time between two accepted mutations from one identity.
    pub duration_ms: u64,

    /// How often expired records are reclaimed by the server.
    pub prune_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Maximum events queued per subscriber before the overflow policy applies.
    pub queue_capacity: usize,

    pub overflow: OverflowPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing survives a restart.
    Memory,
    /// Append-only JSON lines file, compacted on startup.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Board log location for the file backend. Relative paths resolve
    /// against the process working directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 5_000,
            prune_interval_ms: 60_000,
        }
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from("canvas-data").join("board.jsonl"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
            default_color: Color::White,
            cooldown: CooldownConfig::default(),
            subscribers: SubscriberConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl CooldownConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }
}

impl CanvasConfig {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("width and height must be > 0"));
        }
        if self.cooldown.enabled && self.cooldown.duration_ms == 0 {
            return Err(anyhow!("cooldown.duration_ms must be > 0 when enabled"));
        }
        if self.cooldown.prune_interval_ms == 0 {
            return Err(anyhow!("cooldown.prune_interval_ms must be > 0"));
        }
        if self.subscribers.queue_capacity == 0 {
            return Err(anyhow!("subscribers.queue_capacity must be > 0"));
        }
        if self.storage.backend == StorageBackend::File
            && self.storage.path.as_os_str().is_empty()
        {
            return Err(anyhow!("storage.path must be set for the file backend"));
        }
        if self.server.bind.trim().is_empty() {
            return Err(anyhow!("server.bind must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CanvasConfig::default()`.
pub fn load_config(path: &Path) -> Result<CanvasConfig> {
    if !path.exists() {
        let cfg = CanvasConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CanvasConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CanvasConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
