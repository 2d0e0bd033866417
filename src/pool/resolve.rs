//! Winner resolution.
//!
//! Pure function from (board, squares, existing winners, game snapshot) to
//! the set of newly determinable winners. No I/O and no side effects; every
//! skip rule lives here so callers can re-run it on any cadence without
//! tracking state between polls.

use super::PoolError;
use crate::models::{Board, PayoutType, Square, Winner};
use crate::scoreboard::GameSnapshot;
use tracing::{debug, warn};

/// A quarter's winner as computed by resolution, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WinnerCandidate {
    pub quarter: u8,
    pub player_name: String,
    pub score_home: u32,
    pub score_away: u32,
    pub payout: f64,
}

/// Determine which quarters now have a determinable, not-yet-recorded winner.
///
/// For each quarter 1-4, in order:
/// - already-settled quarters are skipped (idempotence guard);
/// - quarters that have not fully elapsed are skipped;
/// - the winning cell is the row carrying the last digit of the away score
///   and the column carrying the last digit of the home score;
/// - an unclaimed winning cell produces no winner, ever — the quarter's
///   boundary has passed and nobody bought the square.
pub fn resolve_winners(
    board: &Board,
    squares: &[Square],
    existing_winners: &[Winner],
    game: &GameSnapshot,
) -> Result<Vec<WinnerCandidate>, PoolError> {
    let (rows, cols) = match (&board.row_numbers, &board.col_numbers) {
        (Some(r), Some(c)) if board.is_finalized => (r, c),
        _ => return Err(PoolError::NotFinalized(board.id.clone())),
    };

    let claimed_count = squares.iter().filter(|s| s.is_claimed()).count();
    let mut candidates = Vec::new();

    for quarter in 1..=4u8 {
        if existing_winners.iter().any(|w| w.quarter == quarter) {
            continue;
        }
        if !game.quarter_complete(quarter) {
            continue;
        }

        let score_home = game.home.score_through_quarter(quarter);
        let score_away = game.away.score_through_quarter(quarter);
        let home_digit = (score_home % 10) as u8;
        let away_digit = (score_away % 10) as u8;

        // Guarded even though a validated permutation always contains every
        // digit: a miss here is an invariant violation worth seeing in logs,
        // not worth poisoning the whole pass.
        let (row_index, col_index) =
            match (rows.index_of(away_digit), cols.index_of(home_digit)) {
                (Some(r), Some(c)) => (r, c),
                _ => {
                    warn!(
                        board_id = %board.id,
                        quarter,
                        away_digit,
                        home_digit,
                        "digit missing from permutation, skipping quarter"
                    );
                    continue;
                }
            };

        let winning_square = squares
            .iter()
            .find(|s| s.row as usize == row_index && s.col as usize == col_index);

        let player_name = match winning_square.and_then(|s| s.player_name.as_deref()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                debug!(
                    board_id = %board.id,
                    quarter,
                    row_index,
                    col_index,
                    "winning square unclaimed, no payout"
                );
                continue;
            }
        };

        let payout = quarter_payout(board, claimed_count, quarter);

        candidates.push(WinnerCandidate {
            quarter,
            player_name,
            score_home,
            score_away,
            payout,
        });
    }

    Ok(candidates)
}

/// Payout for one quarter. Percentage boards pay a share of the pot valued
/// over currently claimed squares; dollar boards pay the configured amount
/// regardless of how many squares sold.
fn quarter_payout(board: &Board, claimed_count: usize, quarter: u8) -> f64 {
    let configured = board.payouts.for_quarter(quarter);
    match board.payout_type {
        PayoutType::Dollar => configured,
        PayoutType::Percentage => board.pot(claimed_count) * configured / 100.0,
    }
}
