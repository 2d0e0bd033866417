//! Board backup and restore.
//!
//! A backup is a versioned JSON document carrying everything needed to
//! reconstruct a board on another instance: board fields with both digit
//! permutations, every square with its claimant and paid flag, every settled
//! winner, and the payment config. Restore creates a fresh board id so a
//! backup can be imported next to its original.

use crate::models::{
    Board, BoardStatus, DigitPermutation, PaymentConfig, PayoutType, QuarterPayouts, Square,
    Winner,
};
use crate::pool::PoolError;
use crate::store::BoardStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub const BACKUP_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardBackup {
    pub version: String,
    pub export_date: String,
    pub board: BackupBoard,
    pub squares: Vec<BackupSquare>,
    pub winners: Vec<BackupWinner>,
    pub payment_config: Option<BackupPaymentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupBoard {
    pub name: String,
    pub game_id: String,
    pub team_home: String,
    pub team_away: String,
    pub cost_per_square: f64,
    pub status: BoardStatus,
    pub is_finalized: bool,
    pub row_numbers: Option<DigitPermutation>,
    pub col_numbers: Option<DigitPermutation>,
    pub payout_type: PayoutType,
    pub payouts: QuarterPayouts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSquare {
    pub row: u8,
    pub col: u8,
    pub player_name: Option<String>,
    pub payment_method: Option<String>,
    pub is_paid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupWinner {
    pub quarter: u8,
    pub player_name: String,
    pub score_home: u32,
    pub score_away: u32,
    pub payout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupPaymentConfig {
    pub allow_cash: bool,
    pub allow_paypal: bool,
    pub allow_venmo: bool,
    pub paypal_username: Option<String>,
    pub venmo_username: Option<String>,
}

/// Snapshot a board's full state.
pub fn export_board(store: &BoardStore, board_id: &str) -> Result<BoardBackup, PoolError> {
    let board = store
        .load_board(board_id)?
        .ok_or_else(|| PoolError::BoardNotFound(board_id.to_string()))?;
    let squares = store.load_squares(board_id)?;
    let winners = store.load_winners(board_id)?;
    let payment_config = store.load_payment_config(board_id)?;

    Ok(BoardBackup {
        version: BACKUP_VERSION.to_string(),
        export_date: Utc::now().to_rfc3339(),
        board: BackupBoard {
            name: board.name,
            game_id: board.game_id,
            team_home: board.team_home,
            team_away: board.team_away,
            cost_per_square: board.cost_per_square,
            status: board.status,
            is_finalized: board.is_finalized,
            row_numbers: board.row_numbers,
            col_numbers: board.col_numbers,
            payout_type: board.payout_type,
            payouts: board.payouts,
        },
        squares: squares
            .into_iter()
            .map(|s| BackupSquare {
                row: s.row,
                col: s.col,
                player_name: s.player_name,
                payment_method: s.payment_method,
                is_paid: s.is_paid,
            })
            .collect(),
        winners: winners
            .into_iter()
            .map(|w| BackupWinner {
                quarter: w.quarter,
                player_name: w.player_name,
                score_home: w.score_home,
                score_away: w.score_away,
                payout: w.payout,
            })
            .collect(),
        payment_config: payment_config.map(|c| BackupPaymentConfig {
            allow_cash: c.allow_cash,
            allow_paypal: c.allow_paypal,
            allow_venmo: c.allow_venmo,
            paypal_username: c.paypal_username,
            venmo_username: c.venmo_username,
        }),
    })
}

/// Reconstruct a board from a backup under a fresh id.
pub fn import_board(store: &BoardStore, backup: BoardBackup) -> Result<Board, PoolError> {
    if backup.version != BACKUP_VERSION {
        return Err(PoolError::InvalidInput(format!(
            "unsupported backup version {:?}",
            backup.version
        )));
    }
    if backup.board.is_finalized
        && (backup.board.row_numbers.is_none() || backup.board.col_numbers.is_none())
    {
        return Err(PoolError::InvalidInput(
            "finalized backup is missing its permutations".to_string(),
        ));
    }

    let board = Board {
        id: Uuid::new_v4().to_string(),
        name: format!("{} (Restored)", backup.board.name),
        game_id: backup.board.game_id,
        team_home: backup.board.team_home,
        team_away: backup.board.team_away,
        cost_per_square: backup.board.cost_per_square,
        status: backup.board.status,
        is_finalized: backup.board.is_finalized,
        row_numbers: backup.board.row_numbers,
        col_numbers: backup.board.col_numbers,
        payout_type: backup.board.payout_type,
        payouts: backup.board.payouts,
        created_at: Utc::now(),
    };

    store.insert_board(&board)?;

    if let Some(config) = backup.payment_config {
        store.upsert_payment_config(&PaymentConfig {
            board_id: board.id.clone(),
            allow_cash: config.allow_cash,
            allow_paypal: config.allow_paypal,
            allow_venmo: config.allow_venmo,
            paypal_username: config.paypal_username,
            venmo_username: config.venmo_username,
        })?;
    }

    for s in backup.squares {
        store.insert_square(&Square {
            id: Uuid::new_v4().to_string(),
            board_id: board.id.clone(),
            row: s.row,
            col: s.col,
            player_name: s.player_name,
            payment_method: s.payment_method,
            is_paid: s.is_paid,
        })?;
    }

    for w in backup.winners {
        store.insert_winner(&Winner {
            id: Uuid::new_v4().to_string(),
            board_id: board.id.clone(),
            quarter: w.quarter,
            player_name: w.player_name,
            score_home: w.score_home,
            score_away: w.score_away,
            payout: w.payout,
            created_at: Utc::now(),
        })?;
    }

    info!(board_id = %board.id, name = %board.name, "board restored from backup");
    Ok(board)
}
