//! Level detection
//!
//! Derives the flip point, call/put walls, ranked magnets and danger zones
//! from a gamma profile. Ties are always broken by proximity to spot.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{GexError, GexResult};
use crate::models::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Number of magnet strikes to rank
    pub magnet_count: usize,
    /// Relative per-snapshot change that marks a danger zone
    pub danger_zone_roc_threshold: f64,
    /// Strikes below this dollar gamma on both snapshots are ignored
    pub danger_zone_min_gamma: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            magnet_count: 5,
            danger_zone_roc_threshold: 0.5,
            danger_zone_min_gamma: 1.0e6,
        }
    }
}

impl LevelConfig {
    pub fn validate(&self) -> GexResult<()> {
        if self.magnet_count == 0 {
            return Err(GexError::InvalidConfig("levels.magnet_count must be at least 1".into()));
        }
        if self.danger_zone_roc_threshold <= 0.0 || self.danger_zone_min_gamma <= 0.0 {
            return Err(GexError::InvalidConfig(
                "levels danger-zone threshold and floor must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LevelDetector {
    config: LevelConfig,
}

impl LevelDetector {
    pub fn new(config: LevelConfig) -> Self {
        Self { config }
    }

    /// Detect levels for `profile`. `previous` is the last profile processed
    /// for the same symbol and drives danger-zone detection.
    pub fn detect(&self, profile: &GammaProfile, previous: Option<&GammaProfile>) -> GammaLevels {
        let spot = profile.spot_price;
        let exposures = profile.strike_exposures();

        let danger_zones = match previous {
            Some(prev) => detect_danger_zones(&exposures, &prev.strike_exposures(), &self.config),
            None => Vec::new(),
        };

        let levels = GammaLevels {
            flip_point: find_flip_point(&exposures, spot),
            call_wall: find_call_wall(&exposures, spot),
            put_wall: find_put_wall(&exposures, spot),
            magnets: rank_magnets(&exposures, spot, self.config.magnet_count),
            danger_zones,
        };

        tracing::debug!(
            symbol = %profile.symbol,
            flip_point = ?levels.flip_point,
            call_wall = ?levels.call_wall,
            put_wall = ?levels.put_wall,
            danger_zones = levels.danger_zones.len(),
            "Levels detected"
        );

        levels
    }
}

fn distance(strike: f64, spot: f64) -> f64 {
    (strike - spot).abs()
}

/// Closer to spot compares greater.
fn nearer(a: f64, b: f64, spot: f64) -> Ordering {
    distance(b, spot).total_cmp(&distance(a, spot))
}

/// Price where the cumulative net gamma (walking strikes upward) crosses
/// zero, linearly interpolated between the bracketing strikes. With several
/// crossings the one nearest spot wins.
pub fn find_flip_point(exposures: &[StrikeExposure], spot: f64) -> Option<f64> {
    let mut candidates = Vec::new();
    let mut cumulative = 0.0;
    let mut prev: Option<(f64, f64)> = None;

    for exposure in exposures {
        cumulative += exposure.net_gamma;
        if cumulative == 0.0 {
            candidates.push(exposure.strike);
        } else if let Some((prev_strike, prev_cum)) = prev {
            if prev_cum != 0.0 && prev_cum.signum() != cumulative.signum() {
                let fraction = -prev_cum / (cumulative - prev_cum);
                candidates.push(prev_strike + fraction * (exposure.strike - prev_strike));
            }
        }
        prev = Some((exposure.strike, cumulative));
    }

    candidates
        .into_iter()
        .max_by(|a, b| nearer(*a, *b, spot).then(b.total_cmp(a)))
}

/// Largest positive net gamma at or above spot.
pub fn find_call_wall(exposures: &[StrikeExposure], spot: f64) -> Option<f64> {
    exposures
        .iter()
        .filter(|e| e.strike >= spot && e.net_gamma > 0.0)
        .max_by(|a, b| {
            a.net_gamma
                .total_cmp(&b.net_gamma)
                .then(nearer(a.strike, b.strike, spot))
        })
        .map(|e| e.strike)
}

/// Most negative net gamma at or below spot.
pub fn find_put_wall(exposures: &[StrikeExposure], spot: f64) -> Option<f64> {
    exposures
        .iter()
        .filter(|e| e.strike <= spot && e.net_gamma < 0.0)
        .max_by(|a, b| {
            b.net_gamma
                .total_cmp(&a.net_gamma)
                .then(nearer(a.strike, b.strike, spot))
        })
        .map(|e| e.strike)
}

/// Top-N strikes by absolute net gamma, either side of spot.
pub fn rank_magnets(exposures: &[StrikeExposure], spot: f64, count: usize) -> Vec<Magnet> {
    let mut ranked: Vec<&StrikeExposure> =
        exposures.iter().filter(|e| e.net_gamma != 0.0).collect();
    ranked.sort_by(|a, b| {
        b.net_gamma
            .abs()
            .total_cmp(&a.net_gamma.abs())
            .then(nearer(b.strike, a.strike, spot))
            .then(a.strike.total_cmp(&b.strike))
    });
    ranked.truncate(count);

    let total: f64 = ranked.iter().map(|e| e.net_gamma.abs()).sum();
    ranked
        .into_iter()
        .enumerate()
        .map(|(i, e)| Magnet {
            strike: e.strike,
            rank: i + 1,
            strength: if total > 0.0 { e.net_gamma.abs() / total } else { 0.0 },
            net_gamma: e.net_gamma,
        })
        .collect()
}

/// Strikes whose net gamma flipped sign or moved faster than the threshold
/// since the previous snapshot. Strikes that disappeared count as zero.
pub fn detect_danger_zones(
    current: &[StrikeExposure],
    previous: &[StrikeExposure],
    config: &LevelConfig,
) -> Vec<DangerZone> {
    let mut pairs: BTreeMap<i64, (f64, f64, f64)> = BTreeMap::new();
    for e in previous {
        pairs.insert(strike_key(e.strike), (e.strike, 0.0, e.net_gamma));
    }
    for e in current {
        pairs
            .entry(strike_key(e.strike))
            .and_modify(|p| p.1 = e.net_gamma)
            .or_insert((e.strike, e.net_gamma, 0.0));
    }

    pairs
        .into_values()
        .filter_map(|(strike, now, prev)| {
            if now.abs().max(prev.abs()) < config.danger_zone_min_gamma {
                return None;
            }
            let rate_of_change = (now - prev) / prev.abs().max(config.danger_zone_min_gamma);

            let reason = if now != 0.0 && prev != 0.0 && now.signum() != prev.signum() {
                DangerReason::Flipping
            } else if rate_of_change.abs() < config.danger_zone_roc_threshold {
                return None;
            } else if now.abs() > prev.abs() {
                DangerReason::Building
            } else {
                DangerReason::Collapsing
            };

            Some(DangerZone {
                strike,
                reason,
                net_gamma: now,
                previous_net_gamma: prev,
                rate_of_change,
            })
        })
        .collect()
}
