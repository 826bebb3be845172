//! Psychology pattern detection
//!
//! Rule-based detection of gamma "traps". Each [`PatternType`] has its own
//! detection function over a [`DetectionContext`]; the per-symbol
//! [`PatternDetector`] runs them and keeps a small state machine per
//! `(pattern_type, strike)` so a setup that stays live is emitted once.
//!
//! Confidence is a weighted blend of four components, each in 0.0 - 1.0:
//!
//! | component | source |
//! |-----------|--------|
//! | distance | closeness of spot to the pattern's level |
//! | decay | how much of the level expires, and how soon |
//! | momentum | agreement of multi-timeframe momentum with the bet |
//! | reliability | `1 - failure_rate` of the pattern type |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::decay::{strike_decay_share, ExpirationDecayReport};
use crate::error::{GexError, GexResult};
use crate::models::*;
use crate::momentum::MomentumSnapshot;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub distance: f64,
    pub decay: f64,
    pub momentum: f64,
    pub reliability: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            distance: 0.30,
            decay: 0.25,
            momentum: 0.25,
            reliability: 0.20,
        }
    }
}

impl ConfidenceWeights {
    pub fn total(&self) -> f64 {
        self.distance + self.decay + self.momentum + self.reliability
    }

    /// Weighted confidence on a 0 - 100 scale.
    pub fn combine(&self, b: &ConfidenceBreakdown) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        let score = self.distance * b.distance
            + self.decay * b.decay
            + self.momentum * b.momentum
            + self.reliability * b.reliability;
        (score / total * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Spot within this % below the call wall counts as pinned under it
    pub near_level_pct: f64,
    /// Distance (%) at which the distance component reaches zero
    pub max_distance_pct: f64,
    /// Spot within this % of the top magnet is a pin candidate
    pub pin_band_pct: f64,
    /// Largest days-to-expiry still considered "into expiration" for pins
    pub pin_max_dte: i64,
    /// Window (days) for near-term decay
    pub near_term_days: i64,
    /// Share (%) of put-wall OI that must sit in the imminent bucket
    pub floor_concentration_pct: f64,
    /// Recent bars that must stay at or below the call wall
    pub pinned_lookback_bars: usize,
    /// Consecutive accelerating danger-zone snapshots required
    pub danger_min_consecutive: usize,
    /// |rate of change| that saturates the danger-zone decay component
    pub danger_roc_reference: f64,
    /// Consecutive snapshots a setup must hold before it is emitted
    pub confirmation_snapshots: u32,
    /// Reliability assumed while a pattern type lacks history
    pub reliability_prior: f64,
    pub weights: ConfidenceWeights,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            near_level_pct: 0.5,
            max_distance_pct: 2.0,
            pin_band_pct: 0.3,
            pin_max_dte: 1,
            near_term_days: 5,
            floor_concentration_pct: 50.0,
            pinned_lookback_bars: 6,
            danger_min_consecutive: 3,
            danger_roc_reference: 1.0,
            confirmation_snapshots: 1,
            reliability_prior: 0.5,
            weights: ConfidenceWeights::default(),
        }
    }
}

impl PatternConfig {
    pub fn validate(&self) -> GexResult<()> {
        if self.weights.total() <= 0.0 {
            return Err(GexError::InvalidConfig(
                "patterns.weights must sum to a positive value".into(),
            ));
        }
        if self.confirmation_snapshots == 0 || self.danger_min_consecutive == 0 {
            return Err(GexError::InvalidConfig(
                "patterns confirmation and danger streak must be at least 1".into(),
            ));
        }
        if self.max_distance_pct <= 0.0 || self.danger_roc_reference <= 0.0 {
            return Err(GexError::InvalidConfig(
                "patterns.max_distance_pct and danger_roc_reference must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.reliability_prior) {
            return Err(GexError::InvalidConfig(format!(
                "patterns.reliability_prior out of range: {}",
                self.reliability_prior
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Detection Inputs
// =============================================================================

/// Everything one detection pass looks at, all derived from the same snapshot.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    pub profile: &'a GammaProfile,
    pub levels: &'a GammaLevels,
    pub regime: &'a RegimeState,
    pub decay: &'a ExpirationDecayReport,
    /// Ascending by time, ending at or before the snapshot
    pub price_history: &'a [PricePoint],
    pub momentum: &'a MomentumSnapshot,
    pub prior_oi: Option<&'a PriorOpenInterest>,
    /// Failure rates backed by enough history; missing types use the prior
    pub failure_rates: &'a HashMap<PatternType, f64>,
}

impl DetectionContext<'_> {
    fn spot(&self) -> f64 {
        self.profile.spot_price
    }

    fn days_until(&self, date: NaiveDate) -> i64 {
        (date - self.profile.as_of()).num_days()
    }
}

/// A setup that matched its trigger conditions this snapshot.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    strike: f64,
    distance_pct: f64,
    decay: f64,
    implied_move: ImpliedMove,
    reference_expiration: Option<NaiveDate>,
    signals: Vec<SupportingSignal>,
}

fn pct_distance(level: f64, spot: f64) -> f64 {
    (level - spot).abs() / spot * 100.0
}

/// Closer dates score higher; the window edge scores near zero.
fn timing_score(days: i64, window: i64) -> f64 {
    (1.0 - days.max(0) as f64 / (window.max(0) + 1) as f64).clamp(0.0, 1.0)
}

fn oi_change_pct(now: u64, prior: u64) -> Option<f64> {
    (prior > 0).then(|| (now as f64 - prior as f64) / prior as f64 * 100.0)
}

// =============================================================================
// Detection Functions
// =============================================================================

/// Spot pinned under a call wall in positive gamma, with most of the wall
/// expiring in a near-term high-impact bucket after which net gamma turns
/// non-positive.
fn detect_liberation_setup(ctx: &DetectionContext, config: &PatternConfig) -> Option<Candidate> {
    if ctx.regime.regime_type != RegimeType::Positive {
        return None;
    }
    let wall = ctx.levels.call_wall?;
    let spot = ctx.spot();
    let distance_pct = pct_distance(wall, spot);
    if spot > wall || distance_pct > config.near_level_pct {
        return None;
    }

    let recent = ctx
        .price_history
        .len()
        .saturating_sub(config.pinned_lookback_bars);
    if ctx.price_history[recent..].iter().any(|p| p.price > wall) {
        return None;
    }

    let share = strike_decay_share(ctx.profile, ctx.decay, wall, config.near_term_days, true)?;
    if share.gamma_share_pct < ctx.decay.high_impact_threshold_pct {
        return None;
    }

    let flip_bucket = ctx.decay.buckets.iter().find(|b| {
        b.days_to_expiry >= 0
            && b.days_to_expiry <= config.near_term_days
            && b.projected_net_gamma_after <= 0.0
    })?;

    let days = share.earliest_days_to_expiry.unwrap_or(flip_bucket.days_to_expiry);
    let mut decay = 0.5 * (share.gamma_share_pct / 100.0)
        + 0.5 * timing_score(days, config.near_term_days);

    let mut signals = vec![
        SupportingSignal::new("call_wall", wall),
        SupportingSignal::new("distance_pct", distance_pct),
        SupportingSignal::new("wall_decay_share_pct", share.gamma_share_pct),
        SupportingSignal::new("days_to_decay", days as f64),
        SupportingSignal::new("projected_net_gamma_after", flip_bucket.projected_net_gamma_after),
    ];

    if let Some(prior) = ctx.prior_oi.and_then(|p| p.at(wall)) {
        let now = ctx
            .profile
            .rows_at(wall)
            .fold(0u64, |sum, r| sum.saturating_add(r.call_open_interest));
        if let Some(change) = oi_change_pct(now, prior.call_open_interest) {
            // Nobody rolling the wall forward
            if change <= 0.0 {
                decay += 0.1;
            }
            signals.push(SupportingSignal::new("call_oi_change_pct", change));
        }
    }

    Some(Candidate {
        strike: wall,
        distance_pct,
        decay: decay.min(1.0),
        implied_move: ImpliedMove::Up,
        reference_expiration: Some(flip_bucket.expiration_date),
        signals,
    })
}

/// Spot above a put wall whose open interest mostly expires in the next
/// high-impact bucket.
fn detect_false_floor(ctx: &DetectionContext, config: &PatternConfig) -> Option<Candidate> {
    let wall = ctx.levels.put_wall?;
    let spot = ctx.spot();
    let distance_pct = pct_distance(wall, spot);
    if spot <= wall || distance_pct > config.max_distance_pct {
        return None;
    }

    let bucket = ctx.decay.next_high_impact_within(config.near_term_days)?;
    let (mut put_total, mut put_expiring) = (0u64, 0u64);
    for row in ctx.profile.rows_at(wall) {
        put_total = put_total.saturating_add(row.put_open_interest);
        if row.expiration_date == bucket.expiration_date {
            put_expiring = put_expiring.saturating_add(row.put_open_interest);
        }
    }
    if put_total == 0 {
        return None;
    }
    let concentration_pct = put_expiring as f64 / put_total as f64 * 100.0;
    if concentration_pct < config.floor_concentration_pct {
        return None;
    }

    let mut decay = 0.5 * (concentration_pct / 100.0)
        + 0.5 * timing_score(bucket.days_to_expiry, config.near_term_days);

    let mut signals = vec![
        SupportingSignal::new("put_wall", wall),
        SupportingSignal::new("distance_pct", distance_pct),
        SupportingSignal::new("put_oi_concentration_pct", concentration_pct),
        SupportingSignal::new("bucket_pct_of_total", bucket.pct_of_total),
        SupportingSignal::new("days_to_decay", bucket.days_to_expiry as f64),
    ];

    if let Some(prior) = ctx.prior_oi.and_then(|p| p.at(wall)) {
        if let Some(change) = oi_change_pct(put_total, prior.put_open_interest) {
            // Puts already being closed out
            if change < 0.0 {
                decay += 0.1;
            }
            signals.push(SupportingSignal::new("put_oi_change_pct", change));
        }
    }

    Some(Candidate {
        strike: wall,
        distance_pct,
        decay: decay.min(1.0),
        implied_move: ImpliedMove::Down,
        reference_expiration: Some(bucket.expiration_date),
        signals,
    })
}

/// Danger zones whose rate of change kept accelerating for long enough.
fn detect_danger_zone_building(
    ctx: &DetectionContext,
    config: &PatternConfig,
    runs: &DangerZoneTracker,
) -> Vec<Candidate> {
    let spot = ctx.spot();
    runs.runs()
        .filter(|run| run.streak >= config.danger_min_consecutive)
        .map(|run| Candidate {
            strike: run.strike,
            distance_pct: pct_distance(run.strike, spot),
            decay: (run.last_roc / config.danger_roc_reference).min(1.0),
            implied_move: ImpliedMove::Breakout,
            reference_expiration: None,
            signals: vec![
                SupportingSignal::new("streak", run.streak as f64),
                SupportingSignal::new("rate_of_change", run.last_roc),
                SupportingSignal::new("first_rate_of_change", run.first_roc),
                SupportingSignal::new("net_gamma", run.net_gamma),
            ],
        })
        .collect()
}

/// Spot sitting on the top magnet while its nearest expiration runs out.
fn detect_pin_risk(ctx: &DetectionContext, config: &PatternConfig) -> Option<Candidate> {
    let magnet = ctx.levels.top_magnet()?;
    let spot = ctx.spot();
    let distance_pct = pct_distance(magnet.strike, spot);
    if distance_pct > config.pin_band_pct {
        return None;
    }

    let expiration = ctx
        .profile
        .rows_at(magnet.strike)
        .map(|r| r.expiration_date)
        .filter(|d| ctx.days_until(*d) >= 0)
        .min()?;
    let dte = ctx.days_until(expiration);
    if dte > config.pin_max_dte {
        return None;
    }

    let share = strike_decay_share(ctx.profile, ctx.decay, magnet.strike, dte, false)?;
    let decay = 0.5 * (share.gamma_share_pct / 100.0) + 0.5 * timing_score(dte, config.pin_max_dte);

    Some(Candidate {
        strike: magnet.strike,
        distance_pct,
        decay,
        implied_move: ImpliedMove::Pin {
            strike: magnet.strike,
        },
        reference_expiration: Some(expiration),
        signals: vec![
            SupportingSignal::new("magnet_strength", magnet.strength),
            SupportingSignal::new("distance_pct", distance_pct),
            SupportingSignal::new("days_to_expiry", dte as f64),
            SupportingSignal::new("expiring_share_pct", share.gamma_share_pct),
        ],
    })
}

/// Negative gamma with spot through the flip point and momentum pushing up.
fn detect_gamma_squeeze(ctx: &DetectionContext, _config: &PatternConfig) -> Option<Candidate> {
    if ctx.regime.regime_type != RegimeType::Negative || ctx.regime.mm_state != MmState::Squeeze {
        return None;
    }
    let flip = ctx.levels.flip_point?;
    let spot = ctx.spot();
    if spot <= flip || ctx.momentum.is_empty() {
        return None;
    }
    let agreement = ctx.momentum.agreement(&ImpliedMove::Up);
    if agreement < 0.5 {
        return None;
    }

    let strike = ctx
        .profile
        .strike_exposures()
        .into_iter()
        .map(|e| e.strike)
        .find(|s| *s >= flip - STRIKE_EPSILON)?;

    let gross = ctx.profile.gross_gamma();
    let intensity = if gross > 0.0 {
        (ctx.profile.total_net_gamma.abs() / gross).min(1.0)
    } else {
        0.0
    };

    Some(Candidate {
        strike,
        distance_pct: pct_distance(flip, spot),
        decay: intensity,
        implied_move: ImpliedMove::Up,
        reference_expiration: None,
        signals: vec![
            SupportingSignal::new("flip_point", flip),
            SupportingSignal::new("total_net_gamma", ctx.profile.total_net_gamma),
            SupportingSignal::new("momentum_agreement", agreement),
        ],
    })
}

// =============================================================================
// Danger Zone Persistence
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DangerRun {
    pub strike: f64,
    /// Consecutive snapshots with strictly increasing |rate of change|
    pub streak: usize,
    pub first_roc: f64,
    pub last_roc: f64,
    pub net_gamma: f64,
}

/// Per-strike danger-zone streaks across snapshots.
#[derive(Debug, Clone, Default)]
pub struct DangerZoneTracker {
    runs: HashMap<i64, DangerRun>,
}

impl DangerZoneTracker {
    pub fn update(&mut self, zones: &[DangerZone]) {
        let mut next = HashMap::with_capacity(zones.len());
        for zone in zones {
            let key = strike_key(zone.strike);
            let roc = zone.rate_of_change.abs();
            let run = match self.runs.remove(&key) {
                Some(mut run) if roc > run.last_roc => {
                    run.streak += 1;
                    run.last_roc = roc;
                    run.net_gamma = zone.net_gamma;
                    run
                }
                _ => DangerRun {
                    strike: zone.strike,
                    streak: 1,
                    first_roc: roc,
                    last_roc: roc,
                    net_gamma: zone.net_gamma,
                },
            };
            next.insert(key, run);
        }
        self.runs = next;
    }

    /// Live runs, ascending by strike.
    pub fn runs(&self) -> impl Iterator<Item = &DangerRun> {
        let mut runs: Vec<&DangerRun> = self.runs.values().collect();
        runs.sort_by(|a, b| a.strike.total_cmp(&b.strike));
        runs.into_iter()
    }

    pub fn get(&self, strike: f64) -> Option<&DangerRun> {
        self.runs.get(&strike_key(strike))
    }
}

// =============================================================================
// Detector
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MachineState {
    Armed(u32),
    Active(Uuid),
}

/// Per-symbol pattern detector. Feed it snapshots in timestamp order.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    symbol: String,
    config: PatternConfig,
    machines: HashMap<(PatternType, i64), MachineState>,
    danger: DangerZoneTracker,
}

impl PatternDetector {
    pub fn new(symbol: impl Into<String>, config: PatternConfig) -> Self {
        Self {
            symbol: symbol.into(),
            config,
            machines: HashMap::new(),
            danger: DangerZoneTracker::default(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    pub fn danger_runs(&self) -> &DangerZoneTracker {
        &self.danger
    }

    /// Setups currently emitted and still holding.
    pub fn active(&self) -> Vec<(PatternType, Uuid)> {
        let mut out: Vec<(PatternType, Uuid)> = self
            .machines
            .iter()
            .filter_map(|((pt, _), state)| match state {
                MachineState::Active(id) => Some((*pt, *id)),
                MachineState::Armed(_) => None,
            })
            .collect();
        out.sort();
        out
    }

    fn candidates(&self, pattern_type: PatternType, ctx: &DetectionContext) -> Vec<Candidate> {
        match pattern_type {
            PatternType::LiberationSetup => detect_liberation_setup(ctx, &self.config).into_iter().collect(),
            PatternType::FalseFloor => detect_false_floor(ctx, &self.config).into_iter().collect(),
            PatternType::DangerZoneBuilding => {
                detect_danger_zone_building(ctx, &self.config, &self.danger)
            }
            PatternType::PinRisk => detect_pin_risk(ctx, &self.config).into_iter().collect(),
            PatternType::GammaSqueeze => detect_gamma_squeeze(ctx, &self.config).into_iter().collect(),
        }
    }

    /// Run every detection function and return patterns emitted this
    /// snapshot, in `PatternType::ALL` order.
    pub fn detect(&mut self, ctx: &DetectionContext) -> Vec<PsychologyPattern> {
        self.danger.update(&ctx.levels.danger_zones);

        let mut emitted = Vec::new();
        let mut live: HashSet<(PatternType, i64)> = HashSet::new();

        for pattern_type in PatternType::ALL {
            for candidate in self.candidates(pattern_type, ctx) {
                let key = (pattern_type, strike_key(candidate.strike));
                if !live.insert(key) {
                    continue;
                }

                let seen = match self.machines.get(&key) {
                    Some(MachineState::Active(_)) => continue,
                    Some(MachineState::Armed(n)) => n + 1,
                    None => 1,
                };
                if seen < self.config.confirmation_snapshots {
                    self.machines.insert(key, MachineState::Armed(seen));
                    continue;
                }

                let pattern = self.build(pattern_type, candidate, ctx);
                info!(
                    symbol = %pattern.symbol,
                    pattern_type = %pattern.pattern_type,
                    strike = pattern.strike,
                    confidence = pattern.confidence,
                    id = %pattern.id,
                    "Pattern detected"
                );
                self.machines.insert(key, MachineState::Active(pattern.id));
                emitted.push(pattern);
            }
        }

        let before = self.machines.len();
        self.machines.retain(|key, _| live.contains(key));
        if self.machines.len() != before {
            debug!(
                symbol = %self.symbol,
                cleared = before - self.machines.len(),
                "Pattern setups cleared"
            );
        }

        emitted
    }

    fn build(
        &self,
        pattern_type: PatternType,
        candidate: Candidate,
        ctx: &DetectionContext,
    ) -> PsychologyPattern {
        let breakdown = ConfidenceBreakdown {
            distance: (1.0 - candidate.distance_pct / self.config.max_distance_pct).clamp(0.0, 1.0),
            decay: candidate.decay.clamp(0.0, 1.0),
            momentum: ctx.momentum.agreement(&candidate.implied_move),
            reliability: ctx
                .failure_rates
                .get(&pattern_type)
                .map(|rate| (1.0 - rate).clamp(0.0, 1.0))
                .unwrap_or(self.config.reliability_prior),
        };
        let detected_at = ctx.profile.timestamp;

        PsychologyPattern {
            id: PsychologyPattern::derive_id(&self.symbol, pattern_type, candidate.strike, detected_at),
            symbol: self.symbol.clone(),
            pattern_type,
            detected_at,
            strike: candidate.strike,
            spot_at_detection: ctx.spot(),
            confidence: self.config.weights.combine(&breakdown),
            confidence_breakdown: breakdown,
            supporting_signals: candidate.signals,
            implied_move: candidate.implied_move,
            reference_expiration: candidate.reference_expiration,
            outcome: None,
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decay::ExpirationDecayAnalyzer;
    use crate::levels::LevelDetector;
    use crate::momentum::MomentumConfig;
    use crate::regime::{RegimeClassifier, RegimeInputs};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 15, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn call(strike: f64, day: u32, gamma: f64) -> StrikeGammaRow {
        StrikeGammaRow::new(strike, date(day), gamma, 0.0, 1_000, 0)
    }

    fn put(strike: f64, day: u32, gamma: f64, oi: u64) -> StrikeGammaRow {
        StrikeGammaRow::new(strike, date(day), 0.0, gamma, 0, oi)
    }

    struct Fixture {
        profile: GammaProfile,
        levels: GammaLevels,
        regime: RegimeState,
        decay: ExpirationDecayReport,
        history: Vec<PricePoint>,
        momentum: MomentumSnapshot,
    }

    impl Fixture {
        fn new(
            minute: i64,
            spot: f64,
            rows: Vec<StrikeGammaRow>,
            prices: &[f64],
            previous: Option<&GammaProfile>,
        ) -> Self {
            let ts = at(minute);
            let profile = GammaProfile::from_rows("SPY", ts, spot, rows);
            let levels = LevelDetector::default().detect(&profile, previous);
            let regime = RegimeClassifier::default().classify(&RegimeInputs {
                total_net_gamma: profile.total_net_gamma,
                vix: 16.0,
                spot_price: spot,
                flip_point: levels.flip_point,
            });
            let decay = ExpirationDecayAnalyzer::default().analyze(&profile);
            let n = prices.len() as i64;
            let history: Vec<PricePoint> = prices
                .iter()
                .enumerate()
                .map(|(i, p)| PricePoint {
                    at: ts - Duration::minutes(5 * (n - 1 - i as i64)),
                    price: *p,
                })
                .collect();
            let momentum = MomentumSnapshot::from_history(&history, &MomentumConfig::default());
            Self {
                profile,
                levels,
                regime,
                decay,
                history,
                momentum,
            }
        }

        fn context<'a>(
            &'a self,
            rates: &'a HashMap<PatternType, f64>,
            prior_oi: Option<&'a PriorOpenInterest>,
        ) -> DetectionContext<'a> {
            DetectionContext {
                profile: &self.profile,
                levels: &self.levels,
                regime: &self.regime,
                decay: &self.decay,
                price_history: &self.history,
                momentum: &self.momentum,
                prior_oi,
                failure_rates: rates,
            }
        }
    }

    fn of_type(patterns: &[PsychologyPattern], pt: PatternType) -> Vec<&PsychologyPattern> {
        patterns.iter().filter(|p| p.pattern_type == pt).collect()
    }

    fn liberation_fixture() -> Fixture {
        Fixture::new(
            0,
            583.0,
            vec![
                call(585.0, 11, 5.0e8),
                call(585.0, 28, 0.5e8),
                put(575.0, 28, 1.5e8, 3_000),
            ],
            &[582.8, 583.0, 582.9, 583.0],
            None,
        )
    }

    #[test]
    fn test_liberation_setup() {
        let f = liberation_fixture();
        assert_eq!(f.regime.regime_type, RegimeType::Positive);
        assert_eq!(f.levels.call_wall, Some(585.0));

        let rates = HashMap::new();
        let prior = PriorOpenInterest {
            date: date(7),
            strikes: vec![StrikeOpenInterest {
                strike: 585.0,
                call_open_interest: 2_500,
                put_open_interest: 0,
            }],
        };
        let mut detector = PatternDetector::new("SPY", PatternConfig::default());
        let patterns = detector.detect(&f.context(&rates, Some(&prior)));

        let found = of_type(&patterns, PatternType::LiberationSetup);
        assert_eq!(found.len(), 1);
        let p = found[0];
        assert_eq!(p.strike, 585.0);
        assert_eq!(p.implied_move, ImpliedMove::Up);
        assert_eq!(p.reference_expiration, Some(date(11)));
        assert!(p.signal("wall_decay_share_pct").unwrap() > 90.0);
        // 2000 now against 2500 prior
        assert!((p.signal("call_oi_change_pct").unwrap() + 20.0).abs() < 1e-9);
        assert!(p.confidence > 0.0 && p.confidence <= 100.0);
    }

    #[test]
    fn test_liberation_needs_price_pinned_under_wall() {
        let mut f = liberation_fixture();
        f.history[1].price = 585.4;
        let rates = HashMap::new();
        let mut detector = PatternDetector::new("SPY", PatternConfig::default());
        let patterns = detector.detect(&f.context(&rates, None));
        assert!(of_type(&patterns, PatternType::LiberationSetup).is_empty());
    }

    #[test]
    fn test_false_floor() {
        let f = Fixture::new(
            0,
            590.0,
            vec![
                put(585.0, 11, 4.0e8, 8_000),
                put(585.0, 28, 1.0e8, 2_000),
                call(600.0, 28, 6.0e8),
            ],
            &[],
            None,
        );
        assert_eq!(f.levels.put_wall, Some(585.0));

        let prior = PriorOpenInterest {
            date: date(7),
            strikes: vec![StrikeOpenInterest {
                strike: 585.0,
                call_open_interest: 0,
                put_open_interest: 12_000,
            }],
        };
        let rates = HashMap::new();
        let mut detector = PatternDetector::new("SPY", PatternConfig::default());
        let patterns = detector.detect(&f.context(&rates, Some(&prior)));

        let found = of_type(&patterns, PatternType::FalseFloor);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].implied_move, ImpliedMove::Down);
        assert!((found[0].signal("put_oi_concentration_pct").unwrap() - 80.0).abs() < 1e-9);
        assert!(found[0].signal("put_oi_change_pct").unwrap() < 0.0);
        assert!(of_type(&patterns, PatternType::LiberationSetup).is_empty());
    }

    #[test]
    fn test_pin_risk_into_expiration() {
        let f = Fixture::new(
            0,
            585.5,
            vec![call(585.0, 10, 6.0e8), call(600.0, 21, 1.0e8), put(570.0, 21, 2.0e8, 4_000)],
            &[585.4, 585.6, 585.5, 585.5],
            None,
        );
        let rates = HashMap::new();
        let mut detector = PatternDetector::new("SPY", PatternConfig::default());
        let patterns = detector.detect(&f.context(&rates, None));

        let found = of_type(&patterns, PatternType::PinRisk);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].implied_move, ImpliedMove::Pin { strike: 585.0 });
        assert_eq!(found[0].reference_expiration, Some(date(10)));
    }

    #[test]
    fn test_gamma_squeeze_example_scenario() {
        let prices: Vec<f64> = (0..13).map(|i| 583.0 + i as f64 * 2.5 / 12.0).collect();
        let f = Fixture::new(
            0,
            585.5,
            vec![call(580.0, 21, 2.0e8), put(585.0, 21, 6.0e8, 9_000), call(590.0, 21, 3.0e8)],
            &prices,
            None,
        );
        assert_eq!(f.regime.regime_type, RegimeType::Negative);
        assert_eq!(f.regime.mm_state, MmState::Squeeze);

        let rates = HashMap::new();
        let mut detector = PatternDetector::new("SPY", PatternConfig::default());
        let patterns = detector.detect(&f.context(&rates, None));

        let found = of_type(&patterns, PatternType::GammaSqueeze);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].strike, 585.0);
        assert!(of_type(&patterns, PatternType::FalseFloor).is_empty());
        assert!(of_type(&patterns, PatternType::PinRisk).is_empty());
    }

    fn danger_sequence(gammas: &[f64]) -> Vec<Fixture> {
        let mut out: Vec<Fixture> = Vec::new();
        for (i, g) in gammas.iter().enumerate() {
            let previous = out.last().map(|f| &f.profile);
            let fixture = Fixture::new(
                i as i64 * 5,
                580.0,
                vec![call(590.0, 21, *g), put(570.0, 21, 3.0e8, 5_000)],
                &[],
                previous,
            );
            out.push(fixture);
        }
        out
    }

    fn run(detector: &mut PatternDetector, fixtures: &[Fixture]) -> Vec<Vec<PsychologyPattern>> {
        let rates = HashMap::new();
        fixtures
            .iter()
            .map(|f| detector.detect(&f.context(&rates, None)))
            .collect()
    }

    #[test]
    fn test_danger_zone_building_needs_accelerating_streak() {
        // roc 1.0, 1.25, 1.44, 1.6
        let fixtures = danger_sequence(&[1.0e8, 2.0e8, 4.5e8, 11.0e8, 28.6e8]);
        let mut detector = PatternDetector::new("SPY", PatternConfig::default());
        let emitted = run(&mut detector, &fixtures);

        let dzb: Vec<usize> = emitted
            .iter()
            .map(|ps| of_type(ps, PatternType::DangerZoneBuilding).len())
            .collect();
        // fires on the third accelerating snapshot, then stays active
        assert_eq!(dzb, vec![0, 0, 0, 1, 0]);
        assert_eq!(detector.danger_runs().get(590.0).unwrap().streak, 4);

        let p = of_type(&emitted[3], PatternType::DangerZoneBuilding)[0];
        assert_eq!(p.implied_move, ImpliedMove::Breakout);
        assert_eq!(p.signal("streak"), Some(3.0));
    }

    #[test]
    fn test_danger_zone_streak_resets_when_roc_slows() {
        // roc 1.0, 0.5, 1.0: never three increasing in a row
        let fixtures = danger_sequence(&[1.0e8, 2.0e8, 3.0e8, 6.0e8]);
        let mut detector = PatternDetector::new("SPY", PatternConfig::default());
        let emitted = run(&mut detector, &fixtures);

        assert!(emitted
            .iter()
            .all(|ps| of_type(ps, PatternType::DangerZoneBuilding).is_empty()));
        assert_eq!(detector.danger_runs().get(590.0).unwrap().streak, 2);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let fixtures = danger_sequence(&[1.0e8, 2.0e8, 4.5e8, 11.0e8]);
        let a = run(&mut PatternDetector::new("SPY", PatternConfig::default()), &fixtures);
        let b = run(&mut PatternDetector::new("SPY", PatternConfig::default()), &fixtures);
        assert_eq!(a, b);
    }

    #[test]
    fn test_confirmation_delays_emission() {
        let f = liberation_fixture();
        let rates = HashMap::new();
        let config = PatternConfig {
            confirmation_snapshots: 2,
            ..Default::default()
        };
        let mut detector = PatternDetector::new("SPY", config);

        let first = detector.detect(&f.context(&rates, None));
        assert!(of_type(&first, PatternType::LiberationSetup).is_empty());
        let second = detector.detect(&f.context(&rates, None));
        assert_eq!(of_type(&second, PatternType::LiberationSetup).len(), 1);
        let third = detector.detect(&f.context(&rates, None));
        assert!(third.is_empty());
        assert_eq!(detector.active().len(), 1);
    }

    #[test]
    fn test_failure_rate_lowers_confidence() {
        let f = liberation_fixture();
        let none = HashMap::new();
        let mut bad = HashMap::new();
        bad.insert(PatternType::LiberationSetup, 0.9);

        let base = PatternDetector::new("SPY", PatternConfig::default()).detect(&f.context(&none, None));
        let worse = PatternDetector::new("SPY", PatternConfig::default()).detect(&f.context(&bad, None));

        let a = of_type(&base, PatternType::LiberationSetup)[0];
        let b = of_type(&worse, PatternType::LiberationSetup)[0];
        assert_eq!(a.confidence_breakdown.reliability, 0.5);
        assert!((b.confidence_breakdown.reliability - 0.1).abs() < 1e-9);
        assert!(b.confidence < a.confidence);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_weights_combine() {
        let w = ConfidenceWeights::default();
        let all = ConfidenceBreakdown {
            distance: 1.0,
            decay: 1.0,
            momentum: 1.0,
            reliability: 1.0,
        };
        assert!((w.combine(&all) - 100.0).abs() < 1e-9);
        assert_eq!(w.combine(&ConfidenceBreakdown::default()), 0.0);
    }
}
