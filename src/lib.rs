//! Tetris rewind (workspace facade crate).
//!
//! Re-exports the workspace crates as `tetris_rewind::{types, core, snapshot, engine}`;
//! the implementation lives in dedicated crates under `crates/`.

pub use tetris_rewind_core as core;
pub use tetris_rewind_engine as engine;
pub use tetris_rewind_snapshot as snapshot;
pub use tetris_rewind_types as types;
