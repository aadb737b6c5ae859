//! Core of the rewind system - values, entities and the wire primitives
//!
//! Everything the snapshot pipeline walks lives here:
//!
//! - [`value`]: the dynamic value domain scripts hand over (scalars, tables, entity handles)
//! - [`entity`]: the entity registry that owns every native object and issues stable ids
//! - [`wire`]: tagged binary items, shared by the graph codec and entity serializers
//! - [`rng`], [`piece`], [`board`]: the built-in entity kinds
//! - [`pieces`]: tetromino shapes and SRS rotation used by the piece entity
//!
//! The registry is passed explicitly wherever it is needed; there is no global
//! state. All of it is single-threaded and meant to be driven between tics.
//!
//! # Example
//!
//! ```
//! use tetris_rewind_core::{Random, Registry, Table, Value};
//!
//! let mut registry = Registry::with_builtin_types();
//! let rng = registry.create(Random::new(7));
//!
//! let mut state = Table::new();
//! state.set_str("rng", rng.into());
//! state.set_str("score", Value::Int(0));
//!
//! let draw = registry.get_as_mut::<Random>(rng.id).unwrap().next_range(7);
//! assert!(draw < 7);
//! ```

pub mod board;
pub mod entity;
pub mod error;
pub mod piece;
pub mod pieces;
pub mod rng;
pub mod value;
pub mod wire;

pub use tetris_rewind_types as types;

pub use board::{Board, Cell};
pub use entity::{EntityRecord, EntityType, Envelope, Payload, Registry, TypeTable};
pub use error::{SnapshotError, SnapshotResult};
pub use piece::{Piece, PieceConfig};
pub use pieces::{get_shape, try_rotate};
pub use rng::Random;
pub use value::{release_graph, structurally_equal, EntityRef, Table, TableRef, Value};
pub use wire::{Reader, Writer};
