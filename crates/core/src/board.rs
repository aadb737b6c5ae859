//! Board module - the BOARD entity
//!
//! The board is a 10x20 grid where each cell can be empty or filled with a piece kind.
//! Uses a flat array for better cache locality and zero-allocation.
//! Coordinates: (x, y) where x ranges 0..9 (left to right), y ranges 0..19 (top to bottom)
//!
//! Serialized form: `[width, height, cells]` where `cells` is one byte per
//! cell in row-major order, `0` for empty and `kind.index() + 1` otherwise.

use arrayvec::ArrayVec;

use crate::entity::EntityType;
use crate::error::{SnapshotError, SnapshotResult};
use crate::pieces::PieceShape;
use crate::types::{PieceKind, TypeTag, BOARD_HEIGHT, BOARD_WIDTH};
use crate::wire::{Reader, Writer};

/// A cell on the game board, `None` when empty.
pub type Cell = Option<PieceKind>;

/// Total number of cells on the board
const BOARD_SIZE: usize = (BOARD_WIDTH as usize) * (BOARD_HEIGHT as usize);

/// The game board - 10 columns x 20 rows using flat array storage
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    /// Row-major (y * WIDTH + x)
    cells: [Cell; BOARD_SIZE],
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: [None; BOARD_SIZE],
        }
    }

    #[inline(always)]
    fn index(x: i8, y: i8) -> Option<usize> {
        if x < 0 || x >= BOARD_WIDTH as i8 || y < 0 || y >= BOARD_HEIGHT as i8 {
            return None;
        }
        Some((y as usize) * (BOARD_WIDTH as usize) + (x as usize))
    }

    pub fn width(&self) -> u8 {
        BOARD_WIDTH
    }

    pub fn height(&self) -> u8 {
        BOARD_HEIGHT
    }

    /// Get cell at position (x, y)
    /// Returns None if out of bounds
    pub fn get(&self, x: i8, y: i8) -> Option<Cell> {
        Self::index(x, y).map(|idx| self.cells[idx])
    }

    /// Set cell at position (x, y)
    /// Returns false if out of bounds
    pub fn set(&mut self, x: i8, y: i8, cell: Cell) -> bool {
        match Self::index(x, y) {
            Some(idx) => {
                self.cells[idx] = cell;
                true
            }
            None => false,
        }
    }

    /// Within bounds and empty
    pub fn is_valid(&self, x: i8, y: i8) -> bool {
        matches!(self.get(x, y), Some(None))
    }

    pub fn is_row_full(&self, y: usize) -> bool {
        if y >= BOARD_HEIGHT as usize {
            return false;
        }
        let start = y * BOARD_WIDTH as usize;
        self.cells[start..start + BOARD_WIDTH as usize]
            .iter()
            .all(|cell| cell.is_some())
    }

    /// Clear all full rows and return their indices, bottom to top.
    pub fn clear_full_rows(&mut self) -> ArrayVec<usize, 4> {
        let mut cleared = ArrayVec::new();
        let width = BOARD_WIDTH as usize;
        let mut write_y = BOARD_HEIGHT as usize;

        for read_y in (0..BOARD_HEIGHT as usize).rev() {
            // A single lock fills at most four rows; anything beyond stays put.
            let clear = self.is_row_full(read_y) && cleared.try_push(read_y).is_ok();
            if !clear {
                write_y -= 1;
                if write_y != read_y {
                    let src = read_y * width;
                    self.cells.copy_within(src..src + width, write_y * width);
                }
            }
        }

        for cell in &mut self.cells[..write_y * width] {
            *cell = None;
        }
        cleared
    }

    /// Lock a piece onto the board.
    /// Returns false, leaving the board untouched, if any cell is blocked.
    pub fn lock_piece(&mut self, shape: &PieceShape, x: i8, y: i8, kind: PieceKind) -> bool {
        // Saturated coordinates are always off the board.
        let cells = shape.map(|(dx, dy)| (x.saturating_add(dx), y.saturating_add(dy)));
        if !cells.iter().all(|&(cx, cy)| self.is_valid(cx, cy)) {
            return false;
        }
        for (cx, cy) in cells {
            self.set(cx, cy, Some(kind));
        }
        true
    }

    /// Standard spawn area is blocked (game over condition)
    pub fn is_spawn_blocked(&self) -> bool {
        !self.is_valid(3, 0) || !self.is_valid(4, 0) || !self.is_valid(5, 0)
    }

    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn clear(&mut self) {
        self.cells = [None; BOARD_SIZE];
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityType for Board {
    const TAG: TypeTag = TypeTag::BOARD;

    fn serialize(&self, out: &mut Writer) -> SnapshotResult<()> {
        let packed: Vec<u8> = self
            .cells
            .iter()
            .map(|c| c.map_or(0, |k| k.index() + 1))
            .collect();
        out.seq(3)?;
        out.int(BOARD_WIDTH as i64)?;
        out.int(BOARD_HEIGHT as i64)?;
        out.str(&packed)
    }

    fn deserialize(input: &mut Reader<'_>) -> SnapshotResult<Self> {
        input.seq_of(3, "board")?;
        let width = input.int()?;
        let height = input.int()?;
        if width != BOARD_WIDTH as i64 || height != BOARD_HEIGHT as i64 {
            return Err(SnapshotError::corrupt(format!(
                "board is {width}x{height}, expected {BOARD_WIDTH}x{BOARD_HEIGHT}"
            )));
        }
        let packed = input.str()?;
        if packed.len() != BOARD_SIZE {
            return Err(SnapshotError::corrupt(format!(
                "board has {} cells, expected {BOARD_SIZE}",
                packed.len()
            )));
        }

        let mut board = Board::new();
        for (cell, &code) in board.cells.iter_mut().zip(&packed) {
            *cell = match code {
                0 => None,
                n => Some(PieceKind::from_index(n - 1).ok_or_else(|| {
                    SnapshotError::corrupt(format!("invalid board cell code {n}"))
                })?),
            };
        }
        Ok(board)
    }
}
