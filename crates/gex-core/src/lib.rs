//! # GEX Core
//!
//! Dealer gamma analytics for options chains.
//!
//! This crate turns one options-chain snapshot into a gamma profile, key
//! price levels, a market regime, an expiration decay timeline and
//! psychology-trap patterns, and scores how reliable each pattern type has
//! been over time. Everything here is synchronous and free of I/O; every
//! timestamp comes from the inputs.

pub mod decay;
pub mod error;
pub mod gamma;
pub mod levels;
pub mod models;
pub mod momentum;
pub mod outcomes;
pub mod patterns;
pub mod regime;

pub use decay::{DecayConfig, ExpirationDecayAnalyzer, ExpirationDecayReport, StrikeDecayShare};
pub use error::*;
pub use gamma::{GammaCalculator, GammaConfig};
pub use levels::{LevelConfig, LevelDetector};
pub use models::*;
pub use momentum::{MomentumConfig, MomentumSnapshot};
pub use outcomes::{OutcomeConfig, OutcomeTracker, PatternStatistics, TrackerEvent};
pub use patterns::{DetectionContext, PatternConfig, PatternDetector};
pub use regime::{RegimeClassifier, RegimeConfig, RegimeInputs};
