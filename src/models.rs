use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardStatus {
    Open,
    Closed,
    Archived,
}

impl BoardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardStatus::Open => "open",
            BoardStatus::Closed => "closed",
            BoardStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(BoardStatus::Open),
            "closed" => Some(BoardStatus::Closed),
            "archived" => Some(BoardStatus::Archived),
            _ => None,
        }
    }
}

/// How quarter payouts are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutType {
    /// Each quarter pays a percentage of the pot.
    Percentage,
    /// Each quarter pays a fixed dollar amount.
    Dollar,
}

impl PayoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutType::Percentage => "percentage",
            PayoutType::Dollar => "dollar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(PayoutType::Percentage),
            "dollar" => Some(PayoutType::Dollar),
            _ => None,
        }
    }
}

/// Per-quarter payout values. Percentages or dollar amounts depending on
/// the board's [`PayoutType`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuarterPayouts {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub q4: f64,
}

impl QuarterPayouts {
    /// Configured value for quarter 1-4. Out-of-range quarters pay nothing.
    pub fn for_quarter(&self, quarter: u8) -> f64 {
        match quarter {
            1 => self.q1,
            2 => self.q2,
            3 => self.q3,
            4 => self.q4,
            _ => 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.q1 + self.q2 + self.q3 + self.q4
    }
}

#[derive(Debug, Error)]
#[error("permutation must contain each digit 0-9 exactly once")]
pub struct InvalidPermutation;

/// An assignment of the digits 0-9 to the ten rows (or columns) of a board.
///
/// Validated to be a bijection on construction and immutable afterwards: once
/// a board is finalized there is no API that can rewrite its digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct DigitPermutation([u8; 10]);

impl DigitPermutation {
    pub fn new(digits: [u8; 10]) -> Result<Self, InvalidPermutation> {
        let mut seen = [false; 10];
        for &d in &digits {
            if d > 9 || seen[d as usize] {
                return Err(InvalidPermutation);
            }
            seen[d as usize] = true;
        }
        Ok(Self(digits))
    }

    /// Grid index (0-9) carrying the given digit.
    pub fn index_of(&self, digit: u8) -> Option<usize> {
        self.0.iter().position(|&d| d == digit)
    }

    pub fn digits(&self) -> &[u8; 10] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for DigitPermutation {
    type Error = InvalidPermutation;

    fn try_from(v: Vec<u8>) -> Result<Self, Self::Error> {
        let arr: [u8; 10] = v.try_into().map_err(|_| InvalidPermutation)?;
        Self::new(arr)
    }
}

impl From<DigitPermutation> for Vec<u8> {
    fn from(p: DigitPermutation) -> Self {
        p.0.to_vec()
    }
}

/// One squares pool tied to one external game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    /// External game id the board tracks.
    pub game_id: String,
    pub team_home: String,
    pub team_away: String,
    pub cost_per_square: f64,
    pub status: BoardStatus,
    pub is_finalized: bool,
    /// Row digit assignment, present once finalized. Rows track the away score.
    pub row_numbers: Option<DigitPermutation>,
    /// Column digit assignment, present once finalized. Columns track the home score.
    pub col_numbers: Option<DigitPermutation>,
    pub payout_type: PayoutType,
    pub payouts: QuarterPayouts,
    pub created_at: DateTime<Utc>,
}

impl Board {
    /// Pot value over currently claimed squares.
    pub fn pot(&self, claimed_squares: usize) -> f64 {
        self.cost_per_square * claimed_squares as f64
    }
}

/// One of the 100 grid cells of a board.
///
/// A square with no `player_name` is unclaimed; admin clears null the name out
/// rather than deleting the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Square {
    pub id: String,
    pub board_id: String,
    pub row: u8,
    pub col: u8,
    pub player_name: Option<String>,
    pub payment_method: Option<String>,
    pub is_paid: bool,
}

impl Square {
    pub fn is_claimed(&self) -> bool {
        self.player_name.as_deref().map_or(false, |n| !n.is_empty())
    }
}

/// Settled record of one quarter's payout. Written exactly once per
/// (board, quarter); never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Winner {
    pub id: String,
    pub board_id: String,
    pub quarter: u8,
    pub player_name: String,
    pub score_home: u32,
    pub score_away: u32,
    pub payout: f64,
    pub created_at: DateTime<Utc>,
}

/// Accepted payment methods and account handles for a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub board_id: String,
    pub allow_cash: bool,
    pub allow_paypal: bool,
    pub allow_venmo: bool,
    pub paypal_username: Option<String>,
    pub venmo_username: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    /// Seconds between background settlement sweeps; 0 disables the loop.
    pub poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./gridpool.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let poll_interval_secs = std::env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        Ok(Self {
            database_path,
            port,
            poll_interval_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutation_rejects_repeats_and_out_of_range() {
        assert!(DigitPermutation::new([0, 1, 2, 3, 4, 5, 6, 7, 8, 8]).is_err());
        assert!(DigitPermutation::new([0, 1, 2, 3, 4, 5, 6, 7, 8, 10]).is_err());
        assert!(DigitPermutation::new([7, 2, 9, 0, 1, 3, 4, 5, 6, 8]).is_ok());
    }

    #[test]
    fn permutation_index_lookup() {
        let p = DigitPermutation::new([7, 2, 9, 0, 1, 3, 4, 5, 6, 8]).unwrap();
        assert_eq!(p.index_of(7), Some(0));
        assert_eq!(p.index_of(8), Some(9));
        assert_eq!(p.index_of(42), None);
    }

    #[test]
    fn permutation_serde_round_trip() {
        let p = DigitPermutation::new([3, 8, 0, 9, 1, 2, 4, 5, 6, 7]).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "[3,8,0,9,1,2,4,5,6,7]");
        let back: DigitPermutation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn permutation_serde_rejects_invalid() {
        assert!(serde_json::from_str::<DigitPermutation>("[0,1,2,3,4,5,6,7,8]").is_err());
        assert!(serde_json::from_str::<DigitPermutation>("[0,0,2,3,4,5,6,7,8,9]").is_err());
    }

    #[test]
    fn quarter_payout_lookup() {
        let p = QuarterPayouts {
            q1: 15.0,
            q2: 20.0,
            q3: 15.0,
            q4: 50.0,
        };
        assert_eq!(p.for_quarter(1), 15.0);
        assert_eq!(p.for_quarter(4), 50.0);
        assert_eq!(p.for_quarter(5), 0.0);
        assert_eq!(p.total(), 100.0);
    }
}
