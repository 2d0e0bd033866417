//! Score feed adapter.
//!
//! Normalizes an external scoreboard feed into [`GameSnapshot`], the only
//! shape the settlement engine consumes. The engine never sees raw feed
//! payloads; missing or malformed fields are rejected or defaulted here.

pub mod espn;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use espn::EspnClient;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("game {0} not found in score feed")]
    NotFound(String),
    #[error("score feed unavailable: {0}")]
    Unavailable(String),
    #[error("malformed score feed payload: {0}")]
    Malformed(String),
}

/// Where the game is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Pre,
    In,
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStatus {
    /// Current period, 1-4 (5+ for overtime). 0 before kickoff.
    pub period: u8,
    /// Display clock, e.g. "12:34". "0:00" at the end of a period.
    pub clock: String,
    pub phase: GamePhase,
    pub completed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSide {
    pub name: String,
    pub abbreviation: String,
    pub display_name: String,
    /// Current running total.
    pub score: u32,
    /// Points scored in each elapsed period, when the feed provides the
    /// breakdown. Absent on some summary payloads.
    pub linescores: Option<Vec<u32>>,
}

impl TeamSide {
    /// Score as of the end of the given quarter.
    ///
    /// Sums the per-period breakdown when one is available; otherwise falls
    /// back to the current running total, which can be larger than the true
    /// quarter-boundary score if scoring has already happened in a later
    /// period.
    pub fn score_through_quarter(&self, quarter: u8) -> u32 {
        match &self.linescores {
            Some(ls) if ls.len() >= quarter as usize => {
                ls.iter().take(quarter as usize).sum()
            }
            _ => self.score,
        }
    }
}

/// Normalized view of one game at one poll instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub id: String,
    pub date: String,
    pub home: TeamSide,
    pub away: TeamSide,
    pub status: GameStatus,
}

impl GameSnapshot {
    /// Whether the given quarter (1-4) has fully elapsed.
    ///
    /// A quarter is complete once the game has moved past it, once its clock
    /// has run out, or once the game itself is final. The feed exposes no
    /// historical end-of-period marker, so this is a boundary condition on
    /// the live status rather than a snapshot lookup.
    pub fn quarter_complete(&self, quarter: u8) -> bool {
        if !(1..=4).contains(&quarter) {
            return false;
        }
        if self.status.completed || self.status.phase == GamePhase::Post {
            return true;
        }
        let period = self.status.period;
        period > quarter || (period == quarter && clock_is_zero(&self.status.clock))
    }

    pub fn completed_quarters(&self) -> Vec<u8> {
        (1..=4).filter(|&q| self.quarter_complete(q)).collect()
    }
}

fn clock_is_zero(clock: &str) -> bool {
    !clock.is_empty() && clock.chars().all(|c| matches!(c, '0' | ':' | '.'))
}

/// Candidate game for attaching a new board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameListing {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_abbr: String,
    pub away_abbr: String,
}

/// Seam between the settlement engine and the external score provider.
#[async_trait]
pub trait ScoreFeed: Send + Sync {
    /// Current snapshot for one game.
    async fn game_snapshot(&self, game_id: &str) -> Result<GameSnapshot, FeedError>;

    /// Games available to attach a board to over the coming weeks.
    async fn upcoming_games(&self) -> Result<Vec<GameListing>, FeedError>;
}
