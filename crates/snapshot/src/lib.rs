//! Snapshot pipeline: flatten, encode, decode, rebuild, and the frame ring
//!
//! ```text
//! Value graph --flatten--> FlatGraph --encode--> bytes
//! bytes --decode--> FlatGraph --unflatten--> Value graph (+ registry entities)
//! ```
//!
//! [`SnapshotRing`] ties the two directions together per tic.

pub mod codec;
pub mod flatten;
pub mod graph;
pub mod rebuild;
pub mod ring;

pub use tetris_rewind_core as core;
pub use tetris_rewind_types as types;

pub use codec::{decode, encode, entity_summary};
pub use flatten::flatten;
pub use graph::{EntityBlob, FlatGraph, FlatNode, FlatTable, FlatValue};
pub use rebuild::{unflatten, unflatten_entities};
pub use ring::{Snapshot, SnapshotRing};
