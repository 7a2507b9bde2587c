//! Advisory persistence for board cells.
//!
//! The live board is authoritative; a store only has to be good enough to
//! rebuild it after a restart. Writes are keyed by `"x,y"` and the last write
//! for a key wins.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::{StorageBackend, StorageConfig};
use crate::core::board::Board;
use crate::core::color::Color;
use crate::core::geometry::{Dimensions, Point};
use crate::core::types::Cell;

/// Key-value store for painted cells.
pub trait Durability: Send + Sync {
    /// Record that `(x, y)` is now `color`, last painted by `editor`.
    fn persist_cell(&self, x: u32, y: u32, color: Color, editor: &str) -> Result<()>;

    /// Every stored cell, keyed by `"x,y"`.
    fn load_all(&self) -> Result<HashMap<String, Cell>>;

    /// Rewrite storage to hold exactly the painted cells of `board`.
    fn compact(&self, _board: &Board) -> Result<()> {
        Ok(())
    }
}

/// Build a full board from `store`, filling unstored cells with `default_color`.
///
/// Keys that do not parse or fall outside `dims` are skipped with a warning.
pub fn load_board(store: &dyn Durability, dims: Dimensions, default_color: Color) -> Result<Board> {
    let stored = store.load_all()?;
    let mut board = Board::filled(dims, default_color);
    let mut restored = 0usize;
    for (key, cell) in stored {
        if Point::parse_key(&key).is_some_and(|point| board.put(point, cell)) {
            restored += 1;
        } else {
            warn!(key = %key, "skipping stored cell outside the board");
        }
    }
    info!(restored, width = dims.width, height = dims.height, "board loaded");
    Ok(board)
}

/// Open the store selected by `config`.
pub fn open_durability(config: &StorageConfig) -> Result<Arc<dyn Durability>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryDurability::default())),
        StorageBackend::File => Ok(Arc::new(FileDurability::open(&config.path)?)),
    }
}

/// Volatile store; useful when persistence is not wanted.
#[derive(Default)]
pub struct MemoryDurability {
    cells: Mutex<HashMap<String, Cell>>,
}

impl Durability for MemoryDurability {
    fn persist_cell(&self, x: u32, y: u32, color: Color, editor: &str) -> Result<()> {
        self.cells
            .lock()
            .insert(Point { x, y }.key(), Cell::painted(color, editor));
        Ok(())
    }

    fn load_all(&self) -> Result<HashMap<String, Cell>> {
        Ok(self.cells.lock().clone())
    }
}

/// One line of the board log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCell {
    key: String,
    color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    editor: Option<String>,
}

/// Append-only JSON lines log, one record per accepted write.
///
/// Loading replays the log in order. A torn trailing line (crash mid-write)
/// is skipped, not fatal. `compact` replaces the log with one line per
/// painted cell.
pub struct FileDurability {
    path: PathBuf,
    writer: Mutex<Option<File>>,
}

impl FileDurability {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        debug!(path = %path.display(), "opened board log");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the log for appending. A tail left without a newline by an
    /// earlier failed write is terminated first, so the next record starts
    /// on its own line.
    fn open_for_append(&self) -> Result<File> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open board log {}", self.path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("stat {}", self.path.display()))?
            .len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))
                .and_then(|_| file.read_exact(&mut last))
                .with_context(|| format!("read tail of {}", self.path.display()))?;
            if last[0] != b'\n' {
                warn!(path = %self.path.display(), "terminating torn board record");
                file.write_all(b"\n")
                    .with_context(|| format!("append to {}", self.path.display()))?;
            }
        }
        Ok(file)
    }

    fn append(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        let mut file = match writer.take() {
            Some(file) => file,
            None => self.open_for_append()?,
        };
        // A handle that failed a write is dropped and reopened next time.
        file.write_all(line.as_bytes())
            .with_context(|| format!("append to {}", self.path.display()))?;
        *writer = Some(file);
        Ok(())
    }
}

impl Durability for FileDurability {
    fn persist_cell(&self, x: u32, y: u32, color: Color, editor: &str) -> Result<()> {
        let record = StoredCell {
            key: Point { x, y }.key(),
            color,
            editor: Some(editor.to_string()),
        };
        let mut line = serde_json::to_string(&record).context("serialize board record")?;
        line.push('\n');
        self.append(&line)
    }

    fn load_all(&self) -> Result<HashMap<String, Cell>> {
        let mut cells = HashMap::new();
        if !self.path.exists() {
            return Ok(cells);
        }
        let file = File::open(&self.path)
            .with_context(|| format!("open board log {}", self.path.display()))?;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("read {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredCell>(&line) {
                Ok(record) => {
                    cells.insert(
                        record.key,
                        Cell {
                            color: record.color,
                            editor: record.editor,
                        },
                    );
                }
                Err(err) => {
                    warn!(line = index + 1, error = %err, "skipping unreadable board record");
                }
            }
        }
        debug!(path = %self.path.display(), cells = cells.len(), "board log replayed");
        Ok(cells)
    }

    fn compact(&self, board: &Board) -> Result<()> {
        let mut buf = String::new();
        let mut kept = 0usize;
        for (point, cell) in board.iter().filter(|(_, cell)| cell.editor.is_some()) {
            let record = StoredCell {
                key: point.key(),
                color: cell.color,
                editor: cell.editor.clone(),
            };
            buf.push_str(&serde_json::to_string(&record).context("serialize board record")?);
            buf.push('\n');
            kept += 1;
        }

        // Hold the writer lock so no append lands in the old file mid-swap.
        let mut writer = self.writer.lock();
        *writer = None;
        super::write_atomic(&self.path, &buf)?;
        info!(path = %self.path.display(), cells = kept, "board log compacted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_keeps_last_write_per_key() {
        let store = MemoryDurability::default();
        store.persist_cell(1, 0, Color::Red, "a").expect("persist");
        store.persist_cell(1, 0, Color::Blue, "b").expect("persist");

        let cells = store.load_all().expect("load");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells["1,0"], Cell::painted(Color::Blue, "b"));
    }

    #[test]
    fn empty_store_loads_default_board() {
        let store = MemoryDurability::default();
        let board = load_board(&store, Dimensions::new(3, 3), Color::White).expect("load");
        assert_eq!(board, Board::filled(Dimensions::new(3, 3), Color::White));
    }

    #[test]
    fn file_store_replays_log_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("data").join("board.jsonl");
        let store = FileDurability::open(&path).expect("open");
        store.persist_cell(0, 0, Color::Red, "a").expect("persist");
        store.persist_cell(1, 1, Color::Green, "b").expect("persist");
        store.persist_cell(0, 0, Color::Yellow, "c").expect("persist");

        let reopened = FileDurability::open(&path).expect("reopen");
        let board = load_board(&reopened, Dimensions::new(2, 2), Color::White).expect("load");
        assert_eq!(board.get(0, 0), Some(&Cell::painted(Color::Yellow, "c")));
        assert_eq!(board.get(1, 1), Some(&Cell::painted(Color::Green, "b")));
        assert_eq!(board.get(1, 0), Some(&Cell::blank(Color::White)));
    }

    #[test]
    fn file_store_skips_torn_and_out_of_range_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("board.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"key\":\"0,1\",\"color\":\"black\",\"editor\":\"a\"}\n",
                "{\"key\":\"9,9\",\"color\":\"black\",\"editor\":\"a\"}\n",
                "{\"key\":\"1,1\",\"color\":\"purple\",\"editor\":\"a\"}\n",
                "{\"key\":\"1,0\",\"col",
            ),
        )
        .expect("write");

        let store = FileDurability::open(&path).expect("open");
        let board = load_board(&store, Dimensions::new(2, 2), Color::White).expect("load");
        assert_eq!(board.get(0, 1), Some(&Cell::painted(Color::Black, "a")));
        assert_eq!(board.get(1, 1), Some(&Cell::blank(Color::White)));
        assert_eq!(board.get(1, 0), Some(&Cell::blank(Color::White)));
    }

    #[test]
    fn append_after_torn_tail_starts_a_new_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("board.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"key\":\"0,1\",\"color\":\"black\",\"editor\":\"a\"}\n",
                "{\"key\":\"1,1\",\"col",
            ),
        )
        .expect("write");

        let store = FileDurability::open(&path).expect("open");
        store.persist_cell(1, 0, Color::Blue, "b").expect("persist");
        store.persist_cell(0, 0, Color::Red, "c").expect("persist");

        let cells = store.load_all().expect("load");
        assert_eq!(cells.len(), 3);
        assert_eq!(cells["0,1"], Cell::painted(Color::Black, "a"));
        assert_eq!(cells["1,0"], Cell::painted(Color::Blue, "b"));
        assert_eq!(cells["0,0"], Cell::painted(Color::Red, "c"));
        assert!(!cells.contains_key("1,1"));
        assert!(fs::read_to_string(&path).expect("read").ends_with('\n'));
    }

    #[test]
    fn compact_rewrites_one_line_per_painted_cell() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("board.jsonl");
        let store = FileDurability::open(&path).expect("open");
        for color in [Color::Red, Color::Blue, Color::Green] {
            store.persist_cell(1, 0, color, "a").expect("persist");
        }

        let board = load_board(&store, Dimensions::new(2, 2), Color::White).expect("load");
        store.compact(&board).expect("compact");

        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(
            contents,
            "{\"key\":\"1,0\",\"color\":\"green\",\"editor\":\"a\"}\n"
        );

        // Appends after compaction land in the new file.
        store.persist_cell(0, 0, Color::Black, "b").expect("persist");
        let cells = store.load_all().expect("load");
        assert_eq!(cells.len(), 2);
    }
}
