//! Shared types and constants for the rewind core.
//!
//! Everything here is plain data with no dependencies, usable from the entity
//! registry, the snapshot pipeline and the simulation driver alike.
//!
//! # Identity
//!
//! - [`EntityId`]: monotonically issued by the registry, `0` means "no entity"
//! - [`TypeTag`]: open set of native entity kinds (`NONE`, `RANDOM`, `PIECE`, `BOARD`, ...)
//! - [`Tic`]: simulation frame counter
//!
//! # Snapshot Constants
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `ROOT_INDEX` | 1 | Flat-graph index of the root composite |
//! | `DEFAULT_SNAPSHOT_SLOTS` | 4 | Ring capacity when not configured |
//! | `TICK_MS` | 16 | Fixed timestep interval (~60 FPS) |
//!
//! # Examples
//!
//! ```
//! use tetris_rewind_types::{EntityId, PieceKind, Rotation, TypeTag};
//!
//! assert!(EntityId::NONE.is_none());
//! assert_eq!(TypeTag::RANDOM.name(), "random");
//!
//! let piece = PieceKind::from_str("t").unwrap();
//! assert_eq!(PieceKind::from_index(piece.index()), Some(piece));
//! assert_eq!(Rotation::North.rotate_cw(), Rotation::East);
//! ```

use std::fmt;

/// Board width in cells (10 columns)
pub const BOARD_WIDTH: u8 = 10;

/// Board height in cells (20 rows)
pub const BOARD_HEIGHT: u8 = 20;

/// Fixed timestep interval in milliseconds (16ms ≈ 60 FPS)
pub const TICK_MS: u32 = 16;

/// Number of snapshot slots kept when nothing else is configured.
pub const DEFAULT_SNAPSHOT_SLOTS: usize = 4;

/// Flat-graph index assigned to the root composite.
pub const ROOT_INDEX: u32 = 1;

/// Simulation frame counter.
pub type Tic = u64;

/// Stable identity of a native entity.
///
/// Ids start at 1; `0` is reserved as the "no entity" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(pub u32);

impl EntityId {
    /// The reserved "no entity" sentinel.
    pub const NONE: EntityId = EntityId(0);

    /// First id handed out by a fresh registry.
    pub const FIRST: EntityId = EntityId(1);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// The id following this one.
    pub fn next(&self) -> EntityId {
        EntityId(self.0.wrapping_add(1))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Native entity kind.
///
/// This is a newtype rather than an enum so that collaborators can add their
/// own kinds without touching this crate. The wire representation is the raw
/// byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeTag(pub u8);

impl TypeTag {
    pub const NONE: TypeTag = TypeTag(0);
    pub const RANDOM: TypeTag = TypeTag(1);
    pub const PIECE: TypeTag = TypeTag(2);
    pub const BOARD: TypeTag = TypeTag(3);

    /// Human readable name for the built-in kinds, `"custom"` otherwise.
    pub fn name(&self) -> &'static str {
        match *self {
            TypeTag::NONE => "none",
            TypeTag::RANDOM => "random",
            TypeTag::PIECE => "piece",
            TypeTag::BOARD => "board",
            _ => "custom",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// The seven tetromino piece kinds
///
/// Each piece has a distinct shape:
/// - **I**: horizontal bar
/// - **O**: 2x2 square
/// - **T**: T-shaped
/// - **S**: S-shaped
/// - **Z**: Z-shaped (mirror of S)
/// - **J**: J-shaped
/// - **L**: L-shaped (mirror of J)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    /// All kinds in canonical order (the order of a fresh 7-bag).
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    /// Parse piece kind from string (case-insensitive)
    ///
    /// # Examples
    ///
    /// ```
    /// use tetris_rewind_types::PieceKind;
    ///
    /// assert_eq!(PieceKind::from_str("i"), Some(PieceKind::I));
    /// assert_eq!(PieceKind::from_str("O"), Some(PieceKind::O));
    /// assert_eq!(PieceKind::from_str("unknown"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "i" => Some(PieceKind::I),
            "o" => Some(PieceKind::O),
            "t" => Some(PieceKind::T),
            "s" => Some(PieceKind::S),
            "z" => Some(PieceKind::Z),
            "j" => Some(PieceKind::J),
            "l" => Some(PieceKind::L),
            _ => None,
        }
    }

    /// Convert to lowercase string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PieceKind::I => "i",
            PieceKind::O => "o",
            PieceKind::T => "t",
            PieceKind::S => "s",
            PieceKind::Z => "z",
            PieceKind::J => "j",
            PieceKind::L => "l",
        }
    }

    /// Stable numeric code used when a piece or board cell is serialized.
    pub fn index(&self) -> u8 {
        match self {
            PieceKind::I => 0,
            PieceKind::O => 1,
            PieceKind::T => 2,
            PieceKind::S => 3,
            PieceKind::Z => 4,
            PieceKind::J => 5,
            PieceKind::L => 6,
        }
    }

    /// Inverse of [`PieceKind::index`].
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Rotation states following the Super Rotation System (SRS)
///
/// The rotation cycle goes: North → East → South → West → North
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    North,
    East,
    South,
    West,
}

impl Rotation {
    /// Rotate clockwise (90°)
    ///
    /// # Examples
    ///
    /// ```
    /// use tetris_rewind_types::Rotation;
    ///
    /// assert_eq!(Rotation::North.rotate_cw(), Rotation::East);
    /// assert_eq!(Rotation::West.rotate_cw(), Rotation::North);
    /// ```
    pub fn rotate_cw(&self) -> Self {
        match self {
            Rotation::North => Rotation::East,
            Rotation::East => Rotation::South,
            Rotation::South => Rotation::West,
            Rotation::West => Rotation::North,
        }
    }

    /// Rotate counter-clockwise (-90° or 270°)
    pub fn rotate_ccw(&self) -> Self {
        match self {
            Rotation::North => Rotation::West,
            Rotation::West => Rotation::South,
            Rotation::South => Rotation::East,
            Rotation::East => Rotation::North,
        }
    }

    /// Quarter turns clockwise from North.
    pub fn index(&self) -> u8 {
        match self {
            Rotation::North => 0,
            Rotation::East => 1,
            Rotation::South => 2,
            Rotation::West => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Rotation::North),
            1 => Some(Rotation::East),
            2 => Some(Rotation::South),
            3 => Some(Rotation::West),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_sentinel() {
        assert!(EntityId::NONE.is_none());
        assert!(!EntityId::FIRST.is_none());
        assert_eq!(EntityId::NONE.next(), EntityId::FIRST);
    }

    #[test]
    fn test_type_tag_names() {
        assert_eq!(TypeTag::NONE.name(), "none");
        assert_eq!(TypeTag::PIECE.name(), "piece");
        assert_eq!(TypeTag(42).name(), "custom");
        assert_eq!(TypeTag::BOARD.to_string(), "board(3)");
    }

    #[test]
    fn test_piece_kind_index_roundtrip() {
        for kind in PieceKind::ALL {
            assert_eq!(PieceKind::from_index(kind.index()), Some(kind));
        }
        assert_eq!(PieceKind::from_index(7), None);
    }

    #[test]
    fn test_rotation_index_roundtrip() {
        let mut r = Rotation::North;
        for i in 0..4 {
            assert_eq!(r.index(), i);
            assert_eq!(Rotation::from_index(i), Some(r));
            r = r.rotate_cw();
        }
        assert_eq!(Rotation::from_index(4), None);
    }

    #[test]
    fn test_snapshot_defaults() {
        assert_eq!(DEFAULT_SNAPSHOT_SLOTS, 4);
        assert_eq!(ROOT_INDEX, 1);
    }
}
