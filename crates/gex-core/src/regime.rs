//! Regime classification
//!
//! A pure function of `(total_net_gamma, vix, spot_price, flip_point)`.
//! Direction, confidence and risk come from a small scoring table; every
//! row of that table is exposed as a [`RegimeFactor`] so it can be checked
//! on its own.

use serde::{Deserialize, Serialize};

use crate::error::{GexError, GexResult};
use crate::models::*;

/// Sum of the largest direction points each factor can award.
pub const MAX_DIRECTION_POINTS: i32 = 70;

/// Direction sum needed for a bullish/bearish call.
pub const DIRECTION_THRESHOLD: i32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// |total_net_gamma| at or below this is NEUTRAL
    pub neutral_gamma_band: f64,
    /// Upper edges of LOW, NORMAL, ELEVATED, HIGH; EXTREME above the last
    pub vix_edges: [f64; 4],
    /// Spot within this % of the flip point adds transition risk
    pub flip_proximity_pct: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            neutral_gamma_band: 1.0e6,
            vix_edges: [15.0, 22.0, 28.0, 35.0],
            flip_proximity_pct: 0.5,
        }
    }
}

impl RegimeConfig {
    pub fn validate(&self) -> GexResult<()> {
        if self.neutral_gamma_band < 0.0 {
            return Err(GexError::InvalidConfig(
                "regime.neutral_gamma_band must be non-negative".into(),
            ));
        }
        if self.vix_edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GexError::InvalidConfig(format!(
                "regime.vix_edges must be strictly ascending: {:?}",
                self.vix_edges
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeInputs {
    pub total_net_gamma: f64,
    pub vix: f64,
    pub spot_price: f64,
    pub flip_point: Option<f64>,
}

pub fn classify_gamma(total_net_gamma: f64, neutral_band: f64) -> RegimeType {
    if total_net_gamma.abs() <= neutral_band {
        RegimeType::Neutral
    } else if total_net_gamma > 0.0 {
        RegimeType::Positive
    } else {
        RegimeType::Negative
    }
}

pub fn classify_vix(vix: f64, edges: &[f64; 4]) -> VixRegime {
    if vix < edges[0] {
        VixRegime::Low
    } else if vix < edges[1] {
        VixRegime::Normal
    } else if vix < edges[2] {
        VixRegime::Elevated
    } else if vix < edges[3] {
        VixRegime::High
    } else {
        VixRegime::Extreme
    }
}

/// SQUEEZE needs negative gamma with spot through the flip point upward,
/// away from the put wall below.
pub fn classify_mm_state(regime_type: RegimeType, spot: f64, flip_point: Option<f64>) -> MmState {
    match regime_type {
        RegimeType::Positive => MmState::MeanReversion,
        RegimeType::Negative if flip_point.is_some_and(|flip| spot > flip) => MmState::Squeeze,
        _ => MmState::Transitional,
    }
}

pub fn flip_position_factor(spot: f64, flip_point: Option<f64>, proximity_pct: f64) -> RegimeFactor {
    let (direction_points, risk_points) = match flip_point {
        None => (0, 0),
        Some(flip) => {
            let direction = if spot > flip {
                40
            } else if spot < flip {
                -40
            } else {
                0
            };
            let near = (spot - flip).abs() / spot * 100.0 <= proximity_pct;
            (direction, if near { 10 } else { 0 })
        }
    };
    RegimeFactor {
        name: "flip_position".to_string(),
        direction_points,
        risk_points,
    }
}

pub fn gamma_regime_factor(regime_type: RegimeType, mm_state: MmState) -> RegimeFactor {
    let (direction_points, risk_points) = match (regime_type, mm_state) {
        (RegimeType::Positive, _) => (0, 0),
        (RegimeType::Neutral, _) => (0, 15),
        (RegimeType::Negative, MmState::Squeeze) => (20, 35),
        (RegimeType::Negative, _) => (-20, 35),
    };
    RegimeFactor {
        name: "gamma_regime".to_string(),
        direction_points,
        risk_points,
    }
}

pub fn volatility_factor(vix_regime: VixRegime) -> RegimeFactor {
    let (direction_points, risk_points) = match vix_regime {
        VixRegime::Low => (10, 0),
        VixRegime::Normal => (5, 10),
        VixRegime::Elevated => (0, 25),
        VixRegime::High => (-10, 40),
        VixRegime::Extreme => (-20, 55),
    };
    RegimeFactor {
        name: "volatility".to_string(),
        direction_points,
        risk_points,
    }
}

pub fn risk_level(risk_points: i32) -> RiskLevel {
    match risk_points {
        p if p < 25 => RiskLevel::Low,
        p if p < 50 => RiskLevel::Moderate,
        p if p < 75 => RiskLevel::High,
        _ => RiskLevel::Extreme,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, inputs: &RegimeInputs) -> RegimeState {
        let regime_type = classify_gamma(inputs.total_net_gamma, self.config.neutral_gamma_band);
        let vix_regime = classify_vix(inputs.vix, &self.config.vix_edges);
        let mm_state = classify_mm_state(regime_type, inputs.spot_price, inputs.flip_point);

        let factors = vec![
            flip_position_factor(
                inputs.spot_price,
                inputs.flip_point,
                self.config.flip_proximity_pct,
            ),
            gamma_regime_factor(regime_type, mm_state),
            volatility_factor(vix_regime),
        ];

        let direction_sum: i32 = factors.iter().map(|f| f.direction_points).sum();
        let risk_sum: i32 = factors.iter().map(|f| f.risk_points).sum();

        let direction = if direction_sum >= DIRECTION_THRESHOLD {
            Direction::Bullish
        } else if direction_sum <= -DIRECTION_THRESHOLD {
            Direction::Bearish
        } else {
            Direction::Neutral
        };
        let confidence = ((direction_sum.abs() as f64 / MAX_DIRECTION_POINTS as f64) * 100.0)
            .round()
            .clamp(0.0, 100.0) as u8;

        RegimeState {
            regime_type,
            mm_state,
            vix_regime,
            direction,
            confidence,
            risk_level: risk_level(risk_sum),
            factors,
        }
    }
}
