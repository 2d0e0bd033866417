//! SQLite persistence.

pub mod board_store;

pub use board_store::{BoardStore, ClaimOutcome, NewBoard, NewPaymentConfig};
