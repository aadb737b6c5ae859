//! The PIECE entity - one falling tetromino
//!
//! Besides its position the piece carries a small [`PieceConfig`], written as
//! a nested mapping inside the piece's own serialized form.

use crate::board::Board;
use crate::entity::EntityType;
use crate::error::{SnapshotError, SnapshotResult};
use crate::pieces::{get_shape, try_rotate, PieceShape, SPAWN_POSITION};
use crate::types::{PieceKind, Rotation, TypeTag};
use crate::wire::{Reader, Scalar, Writer};

/// Per-piece tuning carried alongside the piece state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceConfig {
    pub spawn_x: i8,
    pub spawn_y: i8,
    /// Tics a grounded piece may rest before it locks.
    pub lock_delay_tics: u32,
}

impl Default for PieceConfig {
    fn default() -> Self {
        Self {
            spawn_x: SPAWN_POSITION.0,
            spawn_y: SPAWN_POSITION.1,
            lock_delay_tics: 2,
        }
    }
}

impl PieceConfig {
    fn write(&self, out: &mut Writer) -> SnapshotResult<()> {
        out.map(3)?;
        out.str(b"spawn_x")?;
        out.int(self.spawn_x as i64)?;
        out.str(b"spawn_y")?;
        out.int(self.spawn_y as i64)?;
        out.str(b"lock_delay")?;
        out.int(self.lock_delay_tics as i64)
    }

    fn read(input: &mut Reader<'_>) -> SnapshotResult<Self> {
        let mut config = PieceConfig::default();
        for _ in 0..input.map()? {
            let key = match input.scalar()? {
                Scalar::Str(key) => key,
                other => {
                    return Err(SnapshotError::corrupt(format!(
                        "piece config key must be a string, found {other:?}"
                    )))
                }
            };
            match key.as_slice() {
                b"spawn_x" => config.spawn_x = input.int_as("spawn_x")?,
                b"spawn_y" => config.spawn_y = input.int_as("spawn_y")?,
                b"lock_delay" => config.lock_delay_tics = input.int_as("lock_delay")?,
                // Unknown settings are skipped so older builds can read newer configs.
                _ => {
                    input.scalar()?;
                }
            }
        }
        Ok(config)
    }
}

/// Active falling piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub rotation: Rotation,
    pub x: i8,
    pub y: i8,
    /// Tics spent grounded since the last successful move.
    pub grounded_tics: u32,
    pub config: PieceConfig,
}

impl Piece {
    /// Create a new piece at the configured spawn position
    pub fn spawn(kind: PieceKind, config: PieceConfig) -> Self {
        Self {
            kind,
            rotation: Rotation::North,
            x: config.spawn_x,
            y: config.spawn_y,
            grounded_tics: 0,
            config,
        }
    }

    pub fn shape(&self) -> PieceShape {
        get_shape(self.kind, self.rotation)
    }

    /// Absolute board cells covered by the piece. Coordinates saturate at
    /// the `i8` bounds, which are off the board.
    pub fn cells(&self) -> [(i8, i8); 4] {
        self.shape()
            .map(|(dx, dy)| (self.x.saturating_add(dx), self.y.saturating_add(dy)))
    }

    pub fn fits(&self, board: &Board) -> bool {
        self.cells().iter().all(|&(x, y)| board.is_valid(x, y))
    }

    pub fn is_grounded(&self, board: &Board) -> bool {
        self.cells().iter().any(|&(x, y)| !board.is_valid(x, y.saturating_add(1)))
    }

    pub fn try_move(&mut self, dx: i8, dy: i8, board: &Board) -> bool {
        let moved = Piece {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            ..*self
        };
        if !moved.fits(board) {
            return false;
        }
        *self = moved;
        self.grounded_tics = 0;
        true
    }

    pub fn try_rotate(&mut self, clockwise: bool, board: &Board) -> bool {
        match try_rotate(self.kind, self.rotation, self.x, self.y, clockwise, |x, y| {
            board.is_valid(x, y)
        }) {
            Some((_, rotation, (dx, dy))) => {
                self.rotation = rotation;
                self.x = self.x.saturating_add(dx);
                self.y = self.y.saturating_add(dy);
                true
            }
            None => false,
        }
    }

    /// Move down to the lowest valid row; returns rows dropped.
    pub fn hard_drop(&mut self, board: &Board) -> u32 {
        let mut rows = 0;
        while self.try_move(0, 1, board) {
            rows += 1;
        }
        rows
    }

    /// Write the piece into the board.
    pub fn lock(&self, board: &mut Board) -> bool {
        board.lock_piece(&self.shape(), self.x, self.y, self.kind)
    }
}

impl EntityType for Piece {
    const TAG: TypeTag = TypeTag::PIECE;

    fn serialize(&self, out: &mut Writer) -> SnapshotResult<()> {
        out.seq(6)?;
        out.int(self.kind.index() as i64)?;
        out.int(self.rotation.index() as i64)?;
        out.int(self.x as i64)?;
        out.int(self.y as i64)?;
        out.int(self.grounded_tics as i64)?;
        self.config.write(out)
    }

    fn deserialize(input: &mut Reader<'_>) -> SnapshotResult<Self> {
        input.seq_of(6, "piece")?;
        let kind = PieceKind::from_index(input.int_as("piece kind")?)
            .ok_or_else(|| SnapshotError::corrupt("invalid piece kind"))?;
        let rotation = Rotation::from_index(input.int_as("rotation")?)
            .ok_or_else(|| SnapshotError::corrupt("invalid rotation"))?;
        Ok(Self {
            kind,
            rotation,
            x: input.int_as("piece x")?,
            y: input.int_as("piece y")?,
            grounded_tics: input.int_as("grounded tics")?,
            config: PieceConfig::read(input)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Payload;

    #[test]
    fn test_spawn_uses_config() {
        let config = PieceConfig {
            spawn_x: 4,
            spawn_y: 1,
            lock_delay_tics: 5,
        };
        let piece = Piece::spawn(PieceKind::T, config);
        assert_eq!((piece.x, piece.y), (4, 1));
        assert_eq!(piece.rotation, Rotation::North);
    }

    #[test]
    fn test_move_blocked_by_wall() {
        let board = Board::new();
        let mut piece = Piece::spawn(PieceKind::O, PieceConfig::default());
        while piece.try_move(-1, 0, &board) {}
        // O occupies columns x+1..=x+2, so it stops with x == -1
        assert_eq!(piece.x, -1);
        assert!(!piece.try_move(-1, 0, &board));
    }

    #[test]
    fn test_hard_drop_lands_on_floor() {
        let board = Board::new();
        let mut piece = Piece::spawn(PieceKind::I, PieceConfig::default());
        let rows = piece.hard_drop(&board);
        assert_eq!(rows, 18);
        assert!(piece.is_grounded(&board));
    }

    #[test]
    fn test_lock_writes_cells() {
        let mut board = Board::new();
        let mut piece = Piece::spawn(PieceKind::T, PieceConfig::default());
        piece.hard_drop(&board);
        assert!(piece.lock(&mut board));
        assert_eq!(board.filled_count(), 4);
        assert!(!piece.fits(&board));
    }

    #[test]
    fn test_rotation_near_wall_kicks() {
        let board = Board::new();
        let mut piece = Piece::spawn(PieceKind::I, PieceConfig::default());
        piece.try_rotate(true, &board);
        while piece.try_move(1, 0, &board) {}
        assert!(piece.try_rotate(true, &board));
        assert!(piece.fits(&board));
    }

    #[test]
    fn test_far_off_board_piece_never_fits() {
        let mut board = Board::new();
        let mut piece = Piece::spawn(PieceKind::I, PieceConfig::default());
        piece.x = i8::MAX - 1;
        piece.y = i8::MAX;
        let piece = Piece::deserialize(&mut Reader::new(&piece.serialize_bytes().unwrap())).unwrap();
        let mut moved = piece;

        assert!(!moved.fits(&board));
        assert!(moved.is_grounded(&board));
        assert!(!moved.try_move(1, 1, &board));
        assert!(!moved.try_rotate(true, &board));
        assert_eq!(moved.hard_drop(&board), 0);
        assert!(!moved.lock(&mut board));
        assert_eq!(moved, piece);
        assert_eq!(board.filled_count(), 0);
    }

    #[test]
    fn test_serialized_piece_embeds_config() {
        let mut piece = Piece::spawn(
            PieceKind::S,
            PieceConfig {
                spawn_x: 2,
                spawn_y: 0,
                lock_delay_tics: 7,
            },
        );
        piece.rotation = Rotation::West;
        piece.y = 12;
        piece.grounded_tics = 1;

        let bytes = piece.serialize_bytes().unwrap();
        let restored = Piece::deserialize(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(restored, piece);
    }

    #[test]
    fn test_unknown_config_keys_skipped() {
        let mut out = Writer::new();
        out.map(2).unwrap();
        out.str(b"lock_delay").unwrap();
        out.int(9).unwrap();
        out.str(b"future_setting").unwrap();
        out.bool(true).unwrap();
        let bytes = out.into_bytes();
        let config = PieceConfig::read(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(config.lock_delay_tics, 9);
        assert_eq!(config.spawn_x, SPAWN_POSITION.0);
    }
}
