//! Board storage over SQLite.
//!
//! One connection behind a mutex, WAL mode for concurrent readers, cached
//! prepared statements on the hot lookups. The two uniqueness constraints do
//! real work here: `UNIQUE(board_id, quarter)` on winners is the source of
//! truth for at-most-one-winner-per-quarter under concurrent settlement
//! passes, and `UNIQUE(board_id, grid_row, grid_col)` keeps a board at one
//! square per cell.

use crate::models::{
    Board, BoardStatus, DigitPermutation, PaymentConfig, PayoutType, QuarterPayouts, Square,
    Winner,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS boards (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    game_id TEXT NOT NULL,
    team_home TEXT NOT NULL,
    team_away TEXT NOT NULL,
    cost_per_square REAL NOT NULL,
    status TEXT NOT NULL,
    is_finalized INTEGER NOT NULL DEFAULT 0,
    row_numbers TEXT,
    col_numbers TEXT,
    payout_type TEXT NOT NULL,
    payout_q1 REAL NOT NULL,
    payout_q2 REAL NOT NULL,
    payout_q3 REAL NOT NULL,
    payout_q4 REAL NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_boards_status
    ON boards(status, created_at DESC);

CREATE TABLE IF NOT EXISTS squares (
    id TEXT PRIMARY KEY,
    board_id TEXT NOT NULL REFERENCES boards(id),
    grid_row INTEGER NOT NULL,
    grid_col INTEGER NOT NULL,
    player_name TEXT,
    payment_method TEXT,
    is_paid INTEGER NOT NULL DEFAULT 0,
    UNIQUE(board_id, grid_row, grid_col)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_squares_board
    ON squares(board_id, grid_row, grid_col);

CREATE TABLE IF NOT EXISTS winners (
    id TEXT PRIMARY KEY,
    board_id TEXT NOT NULL REFERENCES boards(id),
    quarter INTEGER NOT NULL,
    player_name TEXT NOT NULL,
    score_home INTEGER NOT NULL,
    score_away INTEGER NOT NULL,
    payout REAL NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(board_id, quarter)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS payment_configs (
    board_id TEXT PRIMARY KEY REFERENCES boards(id),
    allow_cash INTEGER NOT NULL DEFAULT 0,
    allow_paypal INTEGER NOT NULL DEFAULT 0,
    allow_venmo INTEGER NOT NULL DEFAULT 0,
    paypal_username TEXT,
    venmo_username TEXT
) WITHOUT ROWID;
"#;

/// Parameters for creating a board.
#[derive(Debug, Clone)]
pub struct NewBoard {
    pub name: String,
    pub game_id: String,
    pub team_home: String,
    pub team_away: String,
    pub cost_per_square: f64,
    pub payout_type: PayoutType,
    pub payouts: QuarterPayouts,
    pub payment: NewPaymentConfig,
}

#[derive(Debug, Clone)]
pub struct NewPaymentConfig {
    pub allow_cash: bool,
    pub allow_paypal: bool,
    pub allow_venmo: bool,
    pub paypal_username: Option<String>,
    pub venmo_username: Option<String>,
}

/// Result of a bulk square claim.
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(Vec<Square>),
    /// Cells already owned by someone else.
    Taken(Vec<(u8, u8)>),
}

#[derive(Clone)]
pub struct BoardStore {
    conn: Arc<Mutex<Connection>>,
}

impl BoardStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let board_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM boards", [], |row| row.get(0))
            .unwrap_or(0);
        info!("board store ready at {} ({} boards)", db_path, board_count);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Throwaway store for tests.
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    // ===== Boards =====

    pub fn create_board(&self, new: NewBoard) -> Result<Board> {
        let board = Board {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            game_id: new.game_id,
            team_home: new.team_home,
            team_away: new.team_away,
            cost_per_square: new.cost_per_square,
            status: BoardStatus::Open,
            is_finalized: false,
            row_numbers: None,
            col_numbers: None,
            payout_type: new.payout_type,
            payouts: new.payouts,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let inserted = (|| -> Result<()> {
            conn.execute(
                "INSERT INTO boards
                 (id, name, game_id, team_home, team_away, cost_per_square, status,
                  is_finalized, row_numbers, col_numbers, payout_type,
                  payout_q1, payout_q2, payout_q3, payout_q4, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL, NULL, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    board.id,
                    board.name,
                    board.game_id,
                    board.team_home,
                    board.team_away,
                    board.cost_per_square,
                    board.status.as_str(),
                    board.payout_type.as_str(),
                    board.payouts.q1,
                    board.payouts.q2,
                    board.payouts.q3,
                    board.payouts.q4,
                    board.created_at.to_rfc3339(),
                ],
            )?;
            conn.execute(
                "INSERT INTO payment_configs
                 (board_id, allow_cash, allow_paypal, allow_venmo, paypal_username, venmo_username)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    board.id,
                    new.payment.allow_cash,
                    new.payment.allow_paypal,
                    new.payment.allow_venmo,
                    new.payment.paypal_username,
                    new.payment.venmo_username,
                ],
            )?;
            Ok(())
        })();

        match inserted {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                debug!("created board {} ({})", board.id, board.name);
                Ok(board)
            }
            Err(e) => {
                conn.execute("ROLLBACK", []).ok();
                Err(e)
            }
        }
    }

    /// Insert a fully-formed board row, permutations and status included.
    /// Used by backup restore; normal creation goes through [`create_board`].
    ///
    /// [`create_board`]: BoardStore::create_board
    pub fn insert_board(&self, board: &Board) -> Result<()> {
        let row_json = board
            .row_numbers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let col_json = board
            .col_numbers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO boards
             (id, name, game_id, team_home, team_away, cost_per_square, status,
              is_finalized, row_numbers, col_numbers, payout_type,
              payout_q1, payout_q2, payout_q3, payout_q4, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                board.id,
                board.name,
                board.game_id,
                board.team_home,
                board.team_away,
                board.cost_per_square,
                board.status.as_str(),
                board.is_finalized,
                row_json,
                col_json,
                board.payout_type.as_str(),
                board.payouts.q1,
                board.payouts.q2,
                board.payouts.q3,
                board.payouts.q4,
                board.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_board(&self, id: &str) -> Result<Option<Board>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, game_id, team_home, team_away, cost_per_square, status,
                    is_finalized, row_numbers, col_numbers, payout_type,
                    payout_q1, payout_q2, payout_q3, payout_q4, created_at
             FROM boards WHERE id = ?1",
        )?;

        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_board(row)?)),
            None => Ok(None),
        }
    }

    /// Boards in newest-first order. Archived boards are listed separately.
    pub fn list_boards(&self, archived: bool) -> Result<Vec<Board>> {
        let conn = self.conn.lock();
        let sql = if archived {
            "SELECT id, name, game_id, team_home, team_away, cost_per_square, status,
                    is_finalized, row_numbers, col_numbers, payout_type,
                    payout_q1, payout_q2, payout_q3, payout_q4, created_at
             FROM boards WHERE status = 'archived' ORDER BY created_at DESC"
        } else {
            "SELECT id, name, game_id, team_home, team_away, cost_per_square, status,
                    is_finalized, row_numbers, col_numbers, payout_type,
                    payout_q1, payout_q2, payout_q3, payout_q4, created_at
             FROM boards WHERE status != 'archived' ORDER BY created_at DESC"
        };

        let mut stmt = conn.prepare_cached(sql)?;
        let boards = stmt
            .query_map([], row_to_board_raw)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Converted outside the query so a corrupt row fails loudly instead
        // of being silently filtered out of the listing.
        boards.into_iter().map(raw_into_board).collect()
    }

    /// Update admin-editable fields. Returns the fresh board, or None if it
    /// does not exist.
    pub fn update_board_meta(
        &self,
        id: &str,
        name: Option<&str>,
        status: Option<BoardStatus>,
    ) -> Result<Option<Board>> {
        {
            let conn = self.conn.lock();
            if let Some(name) = name {
                conn.execute(
                    "UPDATE boards SET name = ?2 WHERE id = ?1",
                    params![id, name],
                )?;
            }
            if let Some(status) = status {
                conn.execute(
                    "UPDATE boards SET status = ?2 WHERE id = ?1",
                    params![id, status.as_str()],
                )?;
            }
        }
        self.load_board(id)
    }

    /// One-shot finalize transition: writes both permutations, flips the
    /// finalized flag, and closes the board for new purchases in a single
    /// conditional UPDATE. Returns false when the board was already
    /// finalized (or missing) — the check and the write are the same atomic
    /// statement, so two racing calls cannot both succeed.
    pub fn finalize_board(
        &self,
        id: &str,
        rows: &DigitPermutation,
        cols: &DigitPermutation,
    ) -> Result<bool> {
        let row_json = serde_json::to_string(rows)?;
        let col_json = serde_json::to_string(cols)?;

        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE boards
             SET is_finalized = 1, row_numbers = ?2, col_numbers = ?3, status = 'closed'
             WHERE id = ?1 AND is_finalized = 0",
            params![id, row_json, col_json],
        )?;

        Ok(changed > 0)
    }

    /// Delete a board and everything hanging off it.
    pub fn delete_board(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = (|| -> Result<bool> {
            conn.execute("DELETE FROM winners WHERE board_id = ?1", [id])?;
            conn.execute("DELETE FROM squares WHERE board_id = ?1", [id])?;
            conn.execute("DELETE FROM payment_configs WHERE board_id = ?1", [id])?;
            let deleted = conn.execute("DELETE FROM boards WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })();

        match result {
            Ok(deleted) => {
                conn.execute("COMMIT", [])?;
                Ok(deleted)
            }
            Err(e) => {
                conn.execute("ROLLBACK", []).ok();
                Err(e)
            }
        }
    }

    // ===== Squares =====

    pub fn load_squares(&self, board_id: &str) -> Result<Vec<Square>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, board_id, grid_row, grid_col, player_name, payment_method, is_paid
             FROM squares WHERE board_id = ?1 ORDER BY grid_row, grid_col",
        )?;

        let squares = stmt
            .query_map([board_id], row_to_square)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(squares)
    }

    pub fn claimed_square_count(&self, board_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM squares
             WHERE board_id = ?1 AND player_name IS NOT NULL AND player_name != ''",
            [board_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Claim a batch of cells for one player. A cell is free if no row exists
    /// for it or the existing row has no claimant (a cleared square). The
    /// whole batch succeeds or none of it does.
    pub fn claim_squares(
        &self,
        board_id: &str,
        cells: &[(u8, u8)],
        player_name: &str,
        payment_method: Option<&str>,
    ) -> Result<ClaimOutcome> {
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = (|| -> Result<ClaimOutcome> {
            let mut taken = Vec::new();
            for &(row, col) in cells {
                let owner: Option<String> = conn
                    .query_row(
                        "SELECT player_name FROM squares
                         WHERE board_id = ?1 AND grid_row = ?2 AND grid_col = ?3",
                        params![board_id, row, col],
                        |r| r.get(0),
                    )
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;
                if owner.map_or(false, |o| !o.is_empty()) {
                    taken.push((row, col));
                }
            }
            if !taken.is_empty() {
                return Ok(ClaimOutcome::Taken(taken));
            }

            let mut claimed = Vec::with_capacity(cells.len());
            for &(row, col) in cells {
                // Cleared cells keep their row (and id); claiming one updates
                // it in place rather than inserting a duplicate coordinate.
                conn.execute(
                    "INSERT INTO squares
                     (id, board_id, grid_row, grid_col, player_name, payment_method, is_paid)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                     ON CONFLICT(board_id, grid_row, grid_col) DO UPDATE SET
                        player_name = excluded.player_name,
                        payment_method = excluded.payment_method,
                        is_paid = 0",
                    params![
                        Uuid::new_v4().to_string(),
                        board_id,
                        row,
                        col,
                        player_name,
                        payment_method,
                    ],
                )?;

                let mut stmt = conn.prepare_cached(
                    "SELECT id, board_id, grid_row, grid_col, player_name, payment_method, is_paid
                     FROM squares WHERE board_id = ?1 AND grid_row = ?2 AND grid_col = ?3",
                )?;
                claimed.push(stmt.query_row(params![board_id, row, col], row_to_square)?);
            }
            Ok(ClaimOutcome::Claimed(claimed))
        })();

        match result {
            Ok(outcome) => {
                conn.execute("COMMIT", [])?;
                Ok(outcome)
            }
            Err(e) => {
                conn.execute("ROLLBACK", []).ok();
                Err(e)
            }
        }
    }

    /// Admin assignment/correction of one cell. Upserts by coordinate.
    pub fn upsert_square(
        &self,
        board_id: &str,
        row: u8,
        col: u8,
        player_name: &str,
        payment_method: Option<&str>,
        is_paid: bool,
    ) -> Result<Square> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO squares
             (id, board_id, grid_row, grid_col, player_name, payment_method, is_paid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(board_id, grid_row, grid_col) DO UPDATE SET
                player_name = excluded.player_name,
                payment_method = excluded.payment_method,
                is_paid = excluded.is_paid",
            params![
                Uuid::new_v4().to_string(),
                board_id,
                row,
                col,
                player_name,
                payment_method,
                is_paid,
            ],
        )?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, board_id, grid_row, grid_col, player_name, payment_method, is_paid
             FROM squares WHERE board_id = ?1 AND grid_row = ?2 AND grid_col = ?3",
        )?;
        let square = stmt.query_row(params![board_id, row, col], row_to_square)?;
        Ok(square)
    }

    /// Clear a cell: null the claimant, reset the paid flag, keep the row.
    pub fn clear_square(&self, board_id: &str, square_id: &str) -> Result<Option<Square>> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE squares SET player_name = NULL, is_paid = 0
             WHERE id = ?1 AND board_id = ?2",
            params![square_id, board_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        let mut stmt = conn.prepare_cached(
            "SELECT id, board_id, grid_row, grid_col, player_name, payment_method, is_paid
             FROM squares WHERE id = ?1",
        )?;
        let square = stmt.query_row([square_id], row_to_square)?;
        Ok(Some(square))
    }

    /// Raw square insert used by backup import.
    pub fn insert_square(&self, square: &Square) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO squares
             (id, board_id, grid_row, grid_col, player_name, payment_method, is_paid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                square.id,
                square.board_id,
                square.row,
                square.col,
                square.player_name,
                square.payment_method,
                square.is_paid,
            ],
        )?;
        Ok(())
    }

    // ===== Winners =====

    pub fn load_winners(&self, board_id: &str) -> Result<Vec<Winner>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, board_id, quarter, player_name, score_home, score_away, payout, created_at
             FROM winners WHERE board_id = ?1 ORDER BY quarter",
        )?;

        let winners = stmt
            .query_map([board_id], row_to_winner)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(winners)
    }

    /// Record a settled quarter. Returns true if the row was written, false
    /// if a winner for this (board, quarter) already existed — the losing
    /// side of a concurrent settlement race, not an error.
    pub fn insert_winner(&self, winner: &Winner) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO winners
             (id, board_id, quarter, player_name, score_home, score_away, payout, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                winner.id,
                winner.board_id,
                winner.quarter,
                winner.player_name,
                winner.score_home,
                winner.score_away,
                winner.payout,
                winner.created_at.to_rfc3339(),
            ],
        )?;

        if changed == 0 {
            debug!(
                "quarter {} on board {} already settled, skipping",
                winner.quarter, winner.board_id
            );
        }
        Ok(changed > 0)
    }

    /// Admin-only: wipe all winners ahead of a forced full recompute.
    pub fn delete_winners(&self, board_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM winners WHERE board_id = ?1", [board_id])?;
        if deleted > 0 {
            warn!("deleted {} winner(s) on board {}", deleted, board_id);
        }
        Ok(deleted)
    }

    // ===== Payment config =====

    pub fn load_payment_config(&self, board_id: &str) -> Result<Option<PaymentConfig>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT board_id, allow_cash, allow_paypal, allow_venmo, paypal_username, venmo_username
             FROM payment_configs WHERE board_id = ?1",
        )?;

        let mut rows = stmt.query([board_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(PaymentConfig {
                board_id: row.get(0)?,
                allow_cash: row.get(1)?,
                allow_paypal: row.get(2)?,
                allow_venmo: row.get(3)?,
                paypal_username: row.get(4)?,
                venmo_username: row.get(5)?,
            })),
            None => Ok(None),
        }
    }

    pub fn upsert_payment_config(&self, config: &PaymentConfig) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO payment_configs
             (board_id, allow_cash, allow_paypal, allow_venmo, paypal_username, venmo_username)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(board_id) DO UPDATE SET
                allow_cash = excluded.allow_cash,
                allow_paypal = excluded.allow_paypal,
                allow_venmo = excluded.allow_venmo,
                paypal_username = excluded.paypal_username,
                venmo_username = excluded.venmo_username",
            params![
                config.board_id,
                config.allow_cash,
                config.allow_paypal,
                config.allow_venmo,
                config.paypal_username,
                config.venmo_username,
            ],
        )?;
        Ok(())
    }
}

// ===== Row mapping =====

struct RawBoardRow {
    id: String,
    name: String,
    game_id: String,
    team_home: String,
    team_away: String,
    cost_per_square: f64,
    status: String,
    is_finalized: bool,
    row_numbers: Option<String>,
    col_numbers: Option<String>,
    payout_type: String,
    payouts: QuarterPayouts,
    created_at: String,
}

fn row_to_board_raw(row: &rusqlite::Row) -> rusqlite::Result<RawBoardRow> {
    Ok(RawBoardRow {
        id: row.get(0)?,
        name: row.get(1)?,
        game_id: row.get(2)?,
        team_home: row.get(3)?,
        team_away: row.get(4)?,
        cost_per_square: row.get(5)?,
        status: row.get(6)?,
        is_finalized: row.get(7)?,
        row_numbers: row.get(8)?,
        col_numbers: row.get(9)?,
        payout_type: row.get(10)?,
        payouts: QuarterPayouts {
            q1: row.get(11)?,
            q2: row.get(12)?,
            q3: row.get(13)?,
            q4: row.get(14)?,
        },
        created_at: row.get(15)?,
    })
}

fn raw_into_board(raw: RawBoardRow) -> Result<Board> {
    let parse_perm = |text: Option<String>| -> Result<Option<DigitPermutation>> {
        match text {
            Some(t) => Ok(Some(
                serde_json::from_str(&t).context("stored permutation is invalid")?,
            )),
            None => Ok(None),
        }
    };

    let status = BoardStatus::parse(&raw.status)
        .ok_or_else(|| anyhow!("unknown board status {:?}", raw.status))?;
    let payout_type = PayoutType::parse(&raw.payout_type)
        .ok_or_else(|| anyhow!("unknown payout type {:?}", raw.payout_type))?;
    let created_at = DateTime::parse_from_rfc3339(&raw.created_at)
        .context("stored created_at is invalid")?
        .with_timezone(&Utc);

    Ok(Board {
        id: raw.id,
        name: raw.name,
        game_id: raw.game_id,
        team_home: raw.team_home,
        team_away: raw.team_away,
        cost_per_square: raw.cost_per_square,
        status,
        is_finalized: raw.is_finalized,
        row_numbers: parse_perm(raw.row_numbers)?,
        col_numbers: parse_perm(raw.col_numbers)?,
        payout_type,
        payouts: raw.payouts,
        created_at,
    })
}

fn row_to_board(row: &rusqlite::Row) -> Result<Board> {
    raw_into_board(row_to_board_raw(row)?)
}

fn row_to_square(row: &rusqlite::Row) -> rusqlite::Result<Square> {
    Ok(Square {
        id: row.get(0)?,
        board_id: row.get(1)?,
        row: row.get::<_, i64>(2)? as u8,
        col: row.get::<_, i64>(3)? as u8,
        player_name: row.get(4)?,
        payment_method: row.get(5)?,
        is_paid: row.get(6)?,
    })
}

fn row_to_winner(row: &rusqlite::Row) -> rusqlite::Result<Winner> {
    let created_at: String = row.get(7)?;
    Ok(Winner {
        id: row.get(0)?,
        board_id: row.get(1)?,
        quarter: row.get::<_, i64>(2)? as u8,
        player_name: row.get(3)?,
        score_home: row.get::<_, i64>(4)? as u32,
        score_away: row.get::<_, i64>(5)? as u32,
        payout: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_board() -> NewBoard {
        NewBoard {
            name: "Week 18 Pool".to_string(),
            game_id: "401547999".to_string(),
            team_home: "Kansas City Chiefs".to_string(),
            team_away: "Buffalo Bills".to_string(),
            cost_per_square: 10.0,
            payout_type: PayoutType::Percentage,
            payouts: QuarterPayouts {
                q1: 15.0,
                q2: 20.0,
                q3: 15.0,
                q4: 50.0,
            },
            payment: NewPaymentConfig {
                allow_cash: true,
                allow_paypal: true,
                allow_venmo: false,
                paypal_username: Some("pool-admin".to_string()),
                venmo_username: None,
            },
        }
    }

    fn winner(board_id: &str, quarter: u8, name: &str) -> Winner {
        Winner {
            id: Uuid::new_v4().to_string(),
            board_id: board_id.to_string(),
            quarter,
            player_name: name.to_string(),
            score_home: 14,
            score_away: 7,
            payout: 150.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_load_board() {
        let store = BoardStore::in_memory().unwrap();
        let board = store.create_board(new_board()).unwrap();

        let loaded = store.load_board(&board.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Week 18 Pool");
        assert_eq!(loaded.status, BoardStatus::Open);
        assert!(!loaded.is_finalized);
        assert!(loaded.row_numbers.is_none());

        let config = store.load_payment_config(&board.id).unwrap().unwrap();
        assert!(config.allow_cash);
        assert_eq!(config.paypal_username.as_deref(), Some("pool-admin"));
    }

    #[test]
    fn finalize_is_one_shot() {
        let store = BoardStore::in_memory().unwrap();
        let board = store.create_board(new_board()).unwrap();

        let rows = DigitPermutation::new([7, 2, 9, 0, 1, 3, 4, 5, 6, 8]).unwrap();
        let cols = DigitPermutation::new([3, 8, 0, 9, 1, 2, 4, 5, 6, 7]).unwrap();

        assert!(store.finalize_board(&board.id, &rows, &cols).unwrap());

        let finalized = store.load_board(&board.id).unwrap().unwrap();
        assert!(finalized.is_finalized);
        assert_eq!(finalized.status, BoardStatus::Closed);
        assert_eq!(finalized.row_numbers, Some(rows));

        // Second attempt changes nothing.
        let other_rows = DigitPermutation::new([0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        assert!(!store.finalize_board(&board.id, &other_rows, &cols).unwrap());
        let unchanged = store.load_board(&board.id).unwrap().unwrap();
        assert_eq!(unchanged.row_numbers, Some(rows));
    }

    #[test]
    fn winner_insert_is_idempotent_per_quarter() {
        let store = BoardStore::in_memory().unwrap();
        let board = store.create_board(new_board()).unwrap();

        assert!(store.insert_winner(&winner(&board.id, 1, "Alice")).unwrap());
        // Different id, same quarter: ignored.
        assert!(!store.insert_winner(&winner(&board.id, 1, "Mallory")).unwrap());

        let winners = store.load_winners(&board.id).unwrap();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].player_name, "Alice");
    }

    #[test]
    fn claim_rejects_taken_cells() {
        let store = BoardStore::in_memory().unwrap();
        let board = store.create_board(new_board()).unwrap();

        match store
            .claim_squares(&board.id, &[(0, 0), (0, 1)], "Alice", Some("venmo"))
            .unwrap()
        {
            ClaimOutcome::Claimed(squares) => assert_eq!(squares.len(), 2),
            ClaimOutcome::Taken(_) => panic!("fresh cells should be claimable"),
        }

        match store
            .claim_squares(&board.id, &[(0, 1), (5, 5)], "Bob", None)
            .unwrap()
        {
            ClaimOutcome::Taken(cells) => assert_eq!(cells, vec![(0, 1)]),
            ClaimOutcome::Claimed(_) => panic!("(0,1) is already Alice's"),
        }

        // A partially-conflicting batch claims nothing.
        assert_eq!(store.claimed_square_count(&board.id).unwrap(), 2);
    }

    #[test]
    fn cleared_square_is_claimable_again() {
        let store = BoardStore::in_memory().unwrap();
        let board = store.create_board(new_board()).unwrap();

        let squares = match store
            .claim_squares(&board.id, &[(3, 4)], "Alice", None)
            .unwrap()
        {
            ClaimOutcome::Claimed(s) => s,
            _ => panic!("claim failed"),
        };

        let cleared = store
            .clear_square(&board.id, &squares[0].id)
            .unwrap()
            .unwrap();
        assert!(cleared.player_name.is_none());
        assert!(!cleared.is_paid);
        assert_eq!(store.claimed_square_count(&board.id).unwrap(), 0);

        match store.claim_squares(&board.id, &[(3, 4)], "Bob", None).unwrap() {
            ClaimOutcome::Claimed(s) => {
                assert_eq!(s[0].player_name.as_deref(), Some("Bob"))
            }
            ClaimOutcome::Taken(_) => panic!("cleared cell should be free"),
        }
    }

    #[test]
    fn upsert_square_overwrites_by_coordinate() {
        let store = BoardStore::in_memory().unwrap();
        let board = store.create_board(new_board()).unwrap();

        store
            .upsert_square(&board.id, 2, 2, "Alice", Some("cash"), false)
            .unwrap();
        let updated = store
            .upsert_square(&board.id, 2, 2, "Alice", Some("cash"), true)
            .unwrap();
        assert!(updated.is_paid);

        assert_eq!(store.load_squares(&board.id).unwrap().len(), 1);
    }

    #[test]
    fn delete_board_cascades() {
        let store = BoardStore::in_memory().unwrap();
        let board = store.create_board(new_board()).unwrap();
        store
            .claim_squares(&board.id, &[(1, 1)], "Alice", None)
            .unwrap();
        store.insert_winner(&winner(&board.id, 1, "Alice")).unwrap();

        assert!(store.delete_board(&board.id).unwrap());
        assert!(store.load_board(&board.id).unwrap().is_none());
        assert!(store.load_squares(&board.id).unwrap().is_empty());
        assert!(store.load_winners(&board.id).unwrap().is_empty());
        assert!(store.load_payment_config(&board.id).unwrap().is_none());
    }

    #[test]
    fn delete_winners_clears_all_quarters() {
        let store = BoardStore::in_memory().unwrap();
        let board = store.create_board(new_board()).unwrap();
        store.insert_winner(&winner(&board.id, 1, "Alice")).unwrap();
        store.insert_winner(&winner(&board.id, 2, "Bob")).unwrap();

        assert_eq!(store.delete_winners(&board.id).unwrap(), 2);
        assert!(store.load_winners(&board.id).unwrap().is_empty());
    }

    #[test]
    fn archived_boards_listed_separately() {
        let store = BoardStore::in_memory().unwrap();
        let a = store.create_board(new_board()).unwrap();
        let b = store.create_board(new_board()).unwrap();
        store
            .update_board_meta(&b.id, None, Some(BoardStatus::Archived))
            .unwrap();

        let active: Vec<_> = store.list_boards(false).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);

        let archived: Vec<_> = store.list_boards(true).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, b.id);
    }
}
