//! Canonical board state.
//!
//! [`BoardStore`] owns the live grid and is the only place cells change.
//! [`Board`] is a detached, fully populated copy used for snapshots, cold
//! start, and serialization.

use parking_lot::{RwLock, RwLockReadGuard};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, trace};

use super::color::Color;
use super::geometry::{Dimensions, Point};
use super::types::Cell;

/// Upper bound on lock shards. Columns are interleaved across shards so
/// neighbouring columns land on different locks.
const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("cell ({x}, {y}) is outside the {width}x{height} board")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },
}

/// A complete copy of the board: one cell per coordinate, column-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    dims: Dimensions,
    cells: Vec<Cell>,
}

impl Board {
    /// Board with every cell blank in `color`.
    pub fn filled(dims: Dimensions, color: Color) -> Self {
        Self {
            dims,
            cells: vec![Cell::blank(color); dims.cell_count()],
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn get(&self, x: i64, y: i64) -> Option<&Cell> {
        let point = self.dims.point(x, y)?;
        self.cells.get(self.dims.index(point))
    }

    /// Overwrite one cell. Returns `false` (and does nothing) when `point`
    /// is not on this board.
    pub fn put(&mut self, point: Point, cell: Cell) -> bool {
        if point.x >= self.dims.width || point.y >= self.dims.height {
            return false;
        }
        let index = self.dims.index(point);
        self.cells[index] = cell;
        true
    }

    /// Cells in ascending x, then ascending y.
    pub fn iter(&self) -> impl Iterator<Item = (Point, &Cell)> {
        self.dims.points().zip(self.cells.iter())
    }

    /// Serializable `"x,y" -> color` view.
    pub fn colors(&self) -> BoardColors<'_> {
        BoardColors(self)
    }

    /// Serializable `"x,y" -> {color, editor}` view.
    pub fn cells(&self) -> BoardCells<'_> {
        BoardCells(self)
    }
}

/// Serializes as a map from `"x,y"` to color, ordered by x then y.
pub struct BoardColors<'a>(&'a Board);

impl Serialize for BoardColors<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.cells.len()))?;
        for (point, cell) in self.0.iter() {
            map.serialize_entry(&point.key(), &cell.color)?;
        }
        map.end()
    }
}

/// Serializes as a map from `"x,y"` to the full cell, ordered by x then y.
pub struct BoardCells<'a>(&'a Board);

impl Serialize for BoardCells<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.cells.len()))?;
        for (point, cell) in self.0.iter() {
            map.serialize_entry(&point.key(), cell)?;
        }
        map.end()
    }
}

/// Shared, lock-guarded owner of the live board.
///
/// Columns are spread over up to [`SHARD_COUNT`] reader-writer locks. `set`
/// takes one write lock, `get` one read lock, and `snapshot` holds every read
/// lock at once so it never sees a half-applied write.
pub struct BoardStore {
    dims: Dimensions,
    shards: Vec<RwLock<Vec<Cell>>>,
}

impl BoardStore {
    /// Fresh board with every cell blank in `default_color`.
    pub fn new(dims: Dimensions, default_color: Color) -> Self {
        Self::from_board(Board::filled(dims, default_color))
    }

    pub fn from_board(board: Board) -> Self {
        let dims = board.dims;
        let shard_count = SHARD_COUNT.min(dims.width.max(1) as usize);
        let height = dims.height as usize;

        let mut shards: Vec<Vec<Cell>> = (0..shard_count)
            .map(|shard| {
                let columns = (shard..dims.width as usize).step_by(shard_count).count();
                Vec::with_capacity(columns * height)
            })
            .collect();

        // Board cells are column-major, so each column is a contiguous run.
        for (x, column) in board.cells.chunks(height.max(1)).enumerate() {
            shards[x % shard_count].extend_from_slice(column);
        }

        debug!(
            width = dims.width,
            height = dims.height,
            shards = shard_count,
            "board store initialized"
        );

        Self {
            dims,
            shards: shards.into_iter().map(RwLock::new).collect(),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn get(&self, x: i64, y: i64) -> Result<Cell, BoardError> {
        let (shard, slot) = self.locate(x, y)?;
        let guard = self.shards[shard].read();
        Ok(guard[slot].clone())
    }

    /// Replace the cell at `(x, y)` and return what was there before.
    pub fn set(&self, x: i64, y: i64, color: Color, editor: &str) -> Result<Cell, BoardError> {
        let (shard, slot) = self.locate(x, y)?;
        let next = Cell::painted(color, editor);
        let previous = {
            let mut guard = self.shards[shard].write();
            std::mem::replace(&mut guard[slot], next)
        };
        trace!(x, y, color = %color, editor, "cell set");
        Ok(previous)
    }

    /// Consistent copy of the whole board.
    pub fn snapshot(&self) -> Board {
        let guards: Vec<RwLockReadGuard<'_, Vec<Cell>>> =
            self.shards.iter().map(|shard| shard.read()).collect();
        let shard_count = guards.len();
        let height = self.dims.height as usize;

        let mut cells = Vec::with_capacity(self.dims.cell_count());
        for x in 0..self.dims.width as usize {
            let start = (x / shard_count) * height;
            cells.extend_from_slice(&guards[x % shard_count][start..start + height]);
        }

        Board {
            dims: self.dims,
            cells,
        }
    }

    fn locate(&self, x: i64, y: i64) -> Result<(usize, usize), BoardError> {
        let point = self.dims.point(x, y).ok_or(BoardError::OutOfBounds {
            x,
            y,
            width: self.dims.width,
            height: self.dims.height,
        })?;
        let shard_count = self.shards.len();
        let column = point.x as usize;
        let slot = (column / shard_count) * self.dims.height as usize + point.y as usize;
        Ok((column % shard_count, slot))
    }
}
