//! Headless, deterministic tetris game driven entirely by registry entities
//!
//! All game state hangs off one script table:
//!
//! ```text
//! state = {
//!     rng    = <RANDOM>,      board = <BOARD>,     piece = <PIECE> | nil,
//!     bag    = { "t", "o", .. },                   config = { lock_delay = 2 },
//!     score  = 0,  lines = 0,  pieces = 0,  resets = 0,
//!     self   = state,
//! }
//! ```
//!
//! Every decision draws from the random entity, so two sessions with the
//! same seed (or a session replayed from a snapshot) evolve identically.

use crate::core::{Board, EntityRef, Piece, PieceConfig, Random, Registry, Table, TableRef, Value};
use crate::error::GameError;
use crate::types::PieceKind;

/// Points per clear, indexed by rows cleared.
pub const LINE_SCORES: [i64; 5] = [0, 40, 100, 300, 1200];

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub spawned: Option<PieceKind>,
    pub locked: bool,
    pub lines_cleared: u32,
    /// The board was full at spawn and got wiped.
    pub topped_out: bool,
}

/// Score counters read back from a state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameSummary {
    pub score: i64,
    pub lines: i64,
    pub pieces: i64,
    pub resets: i64,
    pub filled_cells: usize,
}

/// Create the game's entities and return its state table.
pub fn install(registry: &mut Registry, seed: u64) -> Value {
    let rng = registry.create(Random::new(seed));
    let board = registry.create(Board::new());

    let mut config = Table::new();
    config.set_str("lock_delay", Value::Int(PieceConfig::default().lock_delay_tics as i64));

    let mut state = Table::new();
    state.set_str("rng", rng.into());
    state.set_str("board", board.into());
    state.set_str("bag", Value::new_table());
    state.set_str("config", Value::table(config));
    for counter in ["score", "lines", "pieces", "resets"] {
        state.set_str(counter, Value::Int(0));
    }

    let root = Value::table(state);
    if let Some(table) = root.as_table() {
        table.borrow_mut().set_str("self", root.clone());
    }
    root
}

fn state_table(root: &Value) -> Result<&TableRef, GameError> {
    root.as_table().ok_or(GameError::Missing("state table"))
}

fn entity(state: &TableRef, key: &'static str) -> Result<EntityRef, GameError> {
    state
        .borrow()
        .get_str(key)
        .as_entity()
        .ok_or(GameError::Missing(key))
}

fn counter(state: &TableRef, key: &'static str) -> i64 {
    state.borrow().get_str(key).as_int().unwrap_or(0)
}

fn bump(state: &TableRef, key: &'static str, by: i64) {
    let next = counter(state, key).saturating_add(by);
    state.borrow_mut().set_str(key, Value::Int(next));
}

/// Pop the next kind from the bag, refilling it from the generator when empty.
fn next_kind(registry: &mut Registry, state: &TableRef, rng: EntityRef) -> Result<PieceKind, GameError> {
    let bag = state.borrow().get_str("bag");
    let bag = bag.as_table().ok_or(GameError::Missing("bag"))?;

    if bag.borrow().is_empty() {
        let kinds = registry
            .get_as_mut::<Random>(rng.id)
            .ok_or(GameError::WrongEntity("rng"))?
            .next_bag();
        let mut bag = bag.borrow_mut();
        for kind in kinds {
            bag.push(Value::str(kind.as_str()));
        }
    }

    let mut bag = bag.borrow_mut();
    let last = Value::Int(bag.len() as i64);
    let name = bag.get(&last);
    bag.set(last, Value::Nil);
    name.as_bytes()
        .and_then(|b| std::str::from_utf8(b).ok())
        .and_then(PieceKind::from_str)
        .ok_or(GameError::Missing("piece name in bag"))
}

fn piece_config(state: &TableRef) -> PieceConfig {
    let mut config = PieceConfig::default();
    let table = state.borrow().get_str("config");
    if let Some(delay) = table
        .as_table()
        .and_then(|t| t.borrow().get_str("lock_delay").as_int())
        .and_then(|d| u32::try_from(d).ok())
    {
        config.lock_delay_tics = delay;
    }
    config
}

/// Advance the game by one tic.
pub fn tick(registry: &mut Registry, root: &Value) -> Result<TickReport, GameError> {
    let state = state_table(root)?;
    let rng = entity(state, "rng")?;
    let board_ref = entity(state, "board")?;
    let mut report = TickReport::default();

    let current = state.borrow().get_str("piece").as_entity();
    let Some(piece_ref) = current else {
        let kind = next_kind(registry, state, rng)?;
        let piece = Piece::spawn(kind, piece_config(state));
        let board = registry
            .get_as_mut::<Board>(board_ref.id)
            .ok_or(GameError::WrongEntity("board"))?;
        if !piece.fits(board) {
            board.clear();
            bump(state, "resets", 1);
            report.topped_out = true;
            tracing::debug!(kind = kind.as_str(), "spawn blocked; board reset");
        }
        let handle = registry.create(piece);
        state.borrow_mut().set_str("piece", handle.into());
        bump(state, "pieces", 1);
        report.spawned = Some(kind);
        return Ok(report);
    };

    let board = registry
        .get_as::<Board>(board_ref.id)
        .cloned()
        .ok_or(GameError::WrongEntity("board"))?;
    let mut piece = registry
        .get_as::<Piece>(piece_ref.id)
        .copied()
        .ok_or(GameError::WrongEntity("piece"))?;

    let action = registry
        .get_as_mut::<Random>(rng.id)
        .ok_or(GameError::WrongEntity("rng"))?
        .next_range(4);
    match action {
        0 => {
            piece.try_move(-1, 0, &board);
        }
        1 => {
            piece.try_move(1, 0, &board);
        }
        2 => {
            piece.try_rotate(true, &board);
        }
        _ => {}
    }

    if !piece.try_move(0, 1, &board) {
        piece.grounded_tics = piece.grounded_tics.saturating_add(1);
    }

    if piece.grounded_tics <= piece.config.lock_delay_tics {
        if let Some(slot) = registry.get_as_mut::<Piece>(piece_ref.id) {
            *slot = piece;
        }
        return Ok(report);
    }

    let board = registry
        .get_as_mut::<Board>(board_ref.id)
        .ok_or(GameError::WrongEntity("board"))?;
    report.locked = piece.lock(board);
    let cleared = board.clear_full_rows().len();
    report.lines_cleared = cleared as u32;

    registry.destroy(piece_ref.id);
    state.borrow_mut().set_str("piece", Value::Nil);
    if cleared > 0 {
        bump(state, "lines", cleared as i64);
        bump(state, "score", LINE_SCORES[cleared]);
    }
    Ok(report)
}

/// Read the counters off a state table.
pub fn summary(registry: &Registry, root: &Value) -> Result<GameSummary, GameError> {
    let state = state_table(root)?;
    let board = entity(state, "board")?;
    let filled_cells = registry
        .get_as::<Board>(board.id)
        .map(Board::filled_count)
        .ok_or(GameError::WrongEntity("board"))?;
    Ok(GameSummary {
        score: counter(state, "score"),
        lines: counter(state, "lines"),
        pieces: counter(state, "pieces"),
        resets: counter(state, "resets"),
        filled_cells,
    })
}
