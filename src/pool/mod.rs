//! The squares pool core: board finalization, winner resolution, settlement.

pub mod finalize;
pub mod resolve;
pub mod settlement;

use crate::scoreboard::FeedError;
use thiserror::Error;

pub use finalize::{draw_permutations, finalize_board};
pub use resolve::{resolve_winners, WinnerCandidate};
pub use settlement::{apply_settlement, trigger_resolution, ResolutionReport};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("board {0} not found")]
    BoardNotFound(String),
    #[error("board {0} is already finalized")]
    AlreadyFinalized(String),
    #[error("board {0} is not finalized")]
    NotFinalized(String),
    #[error("board {0} is not accepting new squares")]
    BoardClosed(String),
    #[error("requested squares already taken: {0:?}")]
    SquaresTaken(Vec<(u8, u8)>),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
