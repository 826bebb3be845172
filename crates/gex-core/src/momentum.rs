//! Multi-timeframe momentum over recent price history

use serde::{Deserialize, Serialize};

use crate::error::{GexError, GexResult};
use crate::models::{ImpliedMove, PricePoint};

/// Agreement reported when no timeframe has enough history.
pub const NEUTRAL_AGREEMENT: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MomentumTimeframe {
    pub name: String,
    pub lookback_bars: usize,
}

impl MomentumTimeframe {
    pub fn new(name: impl Into<String>, lookback_bars: usize) -> Self {
        Self {
            name: name.into(),
            lookback_bars,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub timeframes: Vec<MomentumTimeframe>,
    /// Moves smaller than this (in %) count as flat
    pub flat_threshold_pct: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![
                MomentumTimeframe::new("short", 3),
                MomentumTimeframe::new("medium", 6),
                MomentumTimeframe::new("long", 12),
            ],
            flat_threshold_pct: 0.05,
        }
    }
}

impl MomentumConfig {
    pub fn validate(&self) -> GexResult<()> {
        if let Some(tf) = self.timeframes.iter().find(|tf| tf.lookback_bars == 0) {
            return Err(GexError::InvalidConfig(format!(
                "momentum timeframe '{}' has a zero lookback",
                tf.name
            )));
        }
        Ok(())
    }

    pub fn max_lookback(&self) -> usize {
        self.timeframes
            .iter()
            .map(|tf| tf.lookback_bars)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MomentumReading {
    pub timeframe: String,
    pub lookback_bars: usize,
    pub change_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MomentumSnapshot {
    pub readings: Vec<MomentumReading>,
    pub flat_threshold_pct: f64,
}

impl MomentumSnapshot {
    /// Readings for every timeframe with enough history. `history` is
    /// ascending by time.
    pub fn from_history(history: &[PricePoint], config: &MomentumConfig) -> Self {
        let readings = history
            .last()
            .map(|last| {
                config
                    .timeframes
                    .iter()
                    .filter_map(|tf| {
                        let idx = history.len().checked_sub(tf.lookback_bars + 1)?;
                        let base = history[idx].price;
                        if base <= 0.0 {
                            return None;
                        }
                        Some(MomentumReading {
                            timeframe: tf.name.clone(),
                            lookback_bars: tf.lookback_bars,
                            change_pct: (last.price - base) / base * 100.0,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            readings,
            flat_threshold_pct: config.flat_threshold_pct,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Fraction of timeframes whose move agrees with `bet` (0.0 - 1.0).
    pub fn agreement(&self, bet: &ImpliedMove) -> f64 {
        if self.readings.is_empty() {
            return NEUTRAL_AGREEMENT;
        }
        let flat = self.flat_threshold_pct;
        let agreeing = self
            .readings
            .iter()
            .filter(|r| match bet {
                ImpliedMove::Up => r.change_pct > flat,
                ImpliedMove::Down => r.change_pct < -flat,
                ImpliedMove::Pin { .. } => r.change_pct.abs() <= flat,
                ImpliedMove::Breakout => r.change_pct.abs() > flat,
            })
            .count();
        agreeing as f64 / self.readings.len() as f64
    }
}
