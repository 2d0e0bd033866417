//! Board finalization: the one-shot digit draw.

use super::PoolError;
use crate::models::DigitPermutation;
use crate::store::BoardStore;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

/// Draw two independent uniform permutations of the digits 0-9, one for the
/// rows and one for the columns.
pub fn draw_permutations<R: Rng + ?Sized>(rng: &mut R) -> (DigitPermutation, DigitPermutation) {
    (draw_one(rng), draw_one(rng))
}

fn draw_one<R: Rng + ?Sized>(rng: &mut R) -> DigitPermutation {
    let mut digits: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
    digits.shuffle(rng);
    DigitPermutation::new(digits).expect("shuffled digits form a permutation")
}

/// Reveal a board's numbers: draw both permutations, persist them, and close
/// the board to further purchases, all as one transition.
///
/// Rejected with `AlreadyFinalized` if the board has already been revealed;
/// the first draw always stands. Re-randomizing digits players have already
/// seen would break the pool, so the store-level conditional write backs this
/// up even under concurrent calls.
pub fn finalize_board(
    store: &BoardStore,
    board_id: &str,
) -> Result<(DigitPermutation, DigitPermutation), PoolError> {
    let board = store
        .load_board(board_id)?
        .ok_or_else(|| PoolError::BoardNotFound(board_id.to_string()))?;

    if board.is_finalized {
        return Err(PoolError::AlreadyFinalized(board_id.to_string()));
    }

    let (rows, cols) = draw_permutations(&mut rand::thread_rng());

    if !store.finalize_board(board_id, &rows, &cols)? {
        // Lost a race with another finalize call; their draw stands.
        return Err(PoolError::AlreadyFinalized(board_id.to_string()));
    }

    info!(
        board_id,
        rows = ?rows.digits(),
        cols = ?cols.digits(),
        "board finalized and closed"
    );
    Ok((rows, cols))
}
