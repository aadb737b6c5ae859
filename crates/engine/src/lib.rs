//! Rewindable simulation driver
//!
//! [`Session`] steps a state root one tic at a time and keeps the last few
//! frames in a snapshot ring; [`game`] is a headless tetris that runs on top
//! of it and is used by the demo binary, the benches and the replay tests.

pub mod config;
pub mod error;
pub mod game;
pub mod session;

pub use tetris_rewind_core as core;
pub use tetris_rewind_snapshot as snapshot;
pub use tetris_rewind_types as types;

pub use config::{RewindConfig, RewindPolicy};
pub use error::{GameError, RewindError, RewindResult};
pub use game::{GameSummary, TickReport};
pub use session::Session;
