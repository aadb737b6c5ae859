//! Pieces module - Tetromino shapes and SRS rotation system
//!
//! Implements Standard Rotation System (SRS) with wall kick tables.
//! Reference: https://tetris.wiki/SRS

use crate::types::{PieceKind, Rotation};

/// Offset of a single mino relative to piece origin
pub type MinoOffset = (i8, i8);

/// Shape of a piece - 4 mino offsets from piece origin
pub type PieceShape = [MinoOffset; 4];

/// Spawn position for new pieces (x, y)
pub const SPAWN_POSITION: (i8, i8) = (3, 0);

/// Shapes indexed by `[kind.index()][rotation.index()]` (N, E, S, W).
const SHAPES: [[PieceShape; 4]; 7] = [
    // I
    [
        [(0, 1), (1, 1), (2, 1), (3, 1)],
        [(2, 0), (2, 1), (2, 2), (2, 3)],
        [(0, 2), (1, 2), (2, 2), (3, 2)],
        [(1, 0), (1, 1), (1, 2), (1, 3)],
    ],
    // O
    [[(1, 0), (2, 0), (1, 1), (2, 1)]; 4],
    // T
    [
        [(1, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (1, 1), (2, 1), (1, 2)],
        [(0, 1), (1, 1), (2, 1), (1, 2)],
        [(1, 0), (0, 1), (1, 1), (1, 2)],
    ],
    // S
    [
        [(1, 0), (2, 0), (0, 1), (1, 1)],
        [(1, 0), (1, 1), (2, 1), (2, 2)],
        [(1, 1), (2, 1), (0, 2), (1, 2)],
        [(0, 0), (0, 1), (1, 1), (1, 2)],
    ],
    // Z
    [
        [(0, 0), (1, 0), (1, 1), (2, 1)],
        [(2, 0), (1, 1), (2, 1), (1, 2)],
        [(0, 1), (1, 1), (1, 2), (2, 2)],
        [(1, 0), (0, 1), (1, 1), (0, 2)],
    ],
    // J
    [
        [(0, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (2, 0), (1, 1), (1, 2)],
        [(0, 1), (1, 1), (2, 1), (2, 2)],
        [(1, 0), (1, 1), (0, 2), (1, 2)],
    ],
    // L
    [
        [(2, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (1, 1), (1, 2), (2, 2)],
        [(0, 1), (1, 1), (2, 1), (0, 2)],
        [(0, 0), (1, 0), (1, 1), (1, 2)],
    ],
];

/// Get the shape (mino offsets) for a piece kind and rotation
pub fn get_shape(kind: PieceKind, rotation: Rotation) -> PieceShape {
    SHAPES[kind.index() as usize][rotation.index() as usize]
}

/// SRS wall kick data, five candidate offsets per transition.
///
/// Rows are ordered N->E, N->W, E->N, E->S, S->E, S->W, W->S, W->N.
pub type KickTable = [[(i8, i8); 5]; 8];

pub fn get_kick_table(kind: PieceKind) -> &'static KickTable {
    match kind {
        PieceKind::O => &O_KICKS,
        PieceKind::I => &I_KICKS,
        _ => &JLSTZ_KICKS,
    }
}

const O_KICKS: KickTable = [[(0, 0); 5]; 8];

const JLSTZ_KICKS: KickTable = [
    [(0, 0), (-1, 0), (-1, 1), (0, -2), (-1, -2)],
    [(0, 0), (1, 0), (1, 1), (0, -2), (1, -2)],
    [(0, 0), (1, 0), (1, -1), (0, 2), (1, 2)],
    [(0, 0), (1, 0), (1, -1), (0, 2), (1, 2)],
    [(0, 0), (-1, 0), (-1, 1), (0, -2), (-1, -2)],
    [(0, 0), (1, 0), (1, 1), (0, -2), (1, -2)],
    [(0, 0), (-1, 0), (-1, -1), (0, 2), (-1, 2)],
    [(0, 0), (-1, 0), (-1, -1), (0, 2), (-1, 2)],
];

const I_KICKS: KickTable = [
    [(0, 0), (-2, 0), (1, 0), (-2, -1), (1, 2)],
    [(0, 0), (-1, 0), (2, 0), (-1, 2), (2, -1)],
    [(0, 0), (2, 0), (-1, 0), (2, 1), (-1, -2)],
    [(0, 0), (-1, 0), (2, 0), (-1, 2), (2, -1)],
    [(0, 0), (1, 0), (-2, 0), (1, -2), (-2, 1)],
    [(0, 0), (2, 0), (-1, 0), (2, 1), (-1, -2)],
    [(0, 0), (-2, 0), (1, 0), (-2, -1), (1, 2)],
    [(0, 0), (1, 0), (-2, 0), (1, -2), (-2, 1)],
];

fn kick_row(from: Rotation, clockwise: bool) -> usize {
    match (from, clockwise) {
        (Rotation::North, true) => 0,
        (Rotation::North, false) => 1,
        (Rotation::East, false) => 2,
        (Rotation::East, true) => 3,
        (Rotation::South, false) => 4,
        (Rotation::South, true) => 5,
        (Rotation::West, false) => 6,
        (Rotation::West, true) => 7,
    }
}

/// Try to rotate a piece with wall kicks.
///
/// Returns the new shape, rotation and the kick that was applied, or `None`
/// if every kick candidate collides.
pub fn try_rotate(
    kind: PieceKind,
    rotation: Rotation,
    x: i8,
    y: i8,
    clockwise: bool,
    is_valid: impl Fn(i8, i8) -> bool,
) -> Option<(PieceShape, Rotation, (i8, i8))> {
    let to = if clockwise {
        rotation.rotate_cw()
    } else {
        rotation.rotate_ccw()
    };
    let shape = get_shape(kind, to);

    get_kick_table(kind)[kick_row(rotation, clockwise)]
        .iter()
        .copied()
        .find(|&(dx, dy)| {
            shape.iter().all(|&(mx, my)| {
                is_valid(
                    x.saturating_add(dx).saturating_add(mx),
                    y.saturating_add(dy).saturating_add(my),
                )
            })
        })
        .map(|kick| (shape, to, kick))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_canonical_t_shapes() {
        assert_eq!(
            get_shape(PieceKind::T, Rotation::North),
            [(1, 0), (0, 1), (1, 1), (2, 1)]
        );
        assert_eq!(
            get_shape(PieceKind::T, Rotation::West),
            [(1, 0), (0, 1), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn test_o_is_rotation_invariant() {
        let north = get_shape(PieceKind::O, Rotation::North);
        for r in [Rotation::East, Rotation::South, Rotation::West] {
            assert_eq!(get_shape(PieceKind::O, r), north);
        }
    }

    #[test]
    fn test_rotation_on_open_field_needs_no_kick() {
        let (_, to, kick) =
            try_rotate(PieceKind::J, Rotation::North, 3, 5, true, |_, _| true).unwrap();
        assert_eq!(to, Rotation::East);
        assert_eq!(kick, (0, 0));
    }
}
