use thiserror::Error;

use crate::core::SnapshotError;
use crate::types::Tic;

/// Why a rewind could not be carried out.
#[derive(Debug, Error)]
pub enum RewindError {
    /// No retained frame satisfies the request under the active policy.
    #[error("cannot rewind to tic {tic}: frame is no longer retained")]
    NotRetained { tic: Tic },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub type RewindResult<T> = Result<T, RewindError>;

/// The game state table is missing something the tick needs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("game state has no `{0}`")]
    Missing(&'static str),

    #[error("`{0}` does not name a live entity of the expected type")]
    WrongEntity(&'static str),
}

