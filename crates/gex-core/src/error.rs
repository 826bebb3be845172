//! Error types for GEX Core

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::PatternType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GexError {
    #[error("No snapshot data available for {symbol}")]
    DataUnavailable { symbol: String },

    #[error(transparent)]
    RowCalculation(#[from] RowCalculationError),

    #[error("Insufficient history for {pattern_type}: {samples} of {required} resolved samples")]
    InsufficientHistory {
        pattern_type: PatternType,
        samples: usize,
        required: usize,
    },

    #[error("Out-of-order snapshot for {symbol}: received {received}, last processed {last_processed}")]
    OrderingViolation {
        symbol: String,
        last_processed: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type GexResult<T> = Result<T, GexError>;

/// Why a single strike/expiration row was left out of a gamma profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSkipReason {
    MissingVolatility,
    NonPositiveVolatility,
    InvalidStrike,
    /// Open interest beyond `MAX_ROW_OPEN_INTEREST`
    InvalidOpenInterest,
    Expired,
}

impl fmt::Display for RowSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSkipReason::MissingVolatility => write!(f, "missing implied volatility"),
            RowSkipReason::NonPositiveVolatility => write!(f, "non-positive implied volatility"),
            RowSkipReason::InvalidStrike => write!(f, "invalid strike"),
            RowSkipReason::InvalidOpenInterest => write!(f, "open interest out of range"),
            RowSkipReason::Expired => write!(f, "expired before snapshot"),
        }
    }
}

/// A per-row gamma failure. Never fatal for the snapshot.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("Row skipped at strike {strike} expiring {expiration_date}: {reason}")]
pub struct RowCalculationError {
    pub strike: f64,
    pub expiration_date: NaiveDate,
    pub reason: RowSkipReason,
}
