//! Data models for dealer gamma analytics
//!
//! These are the canonical structures that flow through the pipeline:
//! an immutable options-chain snapshot goes in, and a gamma profile, key
//! levels, a regime, an expiration decay timeline and psychology-trap
//! patterns come out.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::RowCalculationError;

/// Strikes closer than this are treated as the same level.
pub const STRIKE_EPSILON: f64 = 1e-6;

pub fn same_strike(a: f64, b: f64) -> bool {
    (a - b).abs() < STRIKE_EPSILON
}

/// Integer key for a strike, stable across snapshots (1/10000 of a point).
pub fn strike_key(strike: f64) -> i64 {
    (strike * 10_000.0).round() as i64
}

// =============================================================================
// Snapshot Input
// =============================================================================

/// Which side(s) of a chain row carry open interest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
    /// Row carries both call and put open interest
    Combined,
}

/// One row of an options chain, already normalized by the snapshot provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionRow {
    pub strike: f64,
    pub expiration_date: NaiveDate,
    #[serde(default)]
    pub call_open_interest: u64,
    #[serde(default)]
    pub put_open_interest: u64,
    /// Annualized implied volatility (0.20 = 20%)
    pub implied_volatility: Option<f64>,
    pub option_type: OptionType,
}

impl OptionRow {
    /// Call OI that this row contributes, honoring `option_type`.
    pub fn effective_call_oi(&self) -> u64 {
        match self.option_type {
            OptionType::Call | OptionType::Combined => self.call_open_interest,
            OptionType::Put => 0,
        }
    }

    /// Put OI that this row contributes, honoring `option_type`.
    pub fn effective_put_oi(&self) -> u64 {
        match self.option_type {
            OptionType::Put | OptionType::Combined => self.put_open_interest,
            OptionType::Call => 0,
        }
    }
}

/// Options-chain snapshot for one underlying, identified by `(symbol, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsChainSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub spot_price: f64,
    pub rows: Vec<OptionRow>,
}

impl OptionsChainSnapshot {
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (&self.symbol, self.timestamp)
    }
}

/// A price observation used for momentum and outcome grading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub at: DateTime<Utc>,
    pub price: f64,
}

/// Prior-day open interest from the historical store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorOpenInterest {
    pub date: NaiveDate,
    pub strikes: Vec<StrikeOpenInterest>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrikeOpenInterest {
    pub strike: f64,
    pub call_open_interest: u64,
    pub put_open_interest: u64,
}

impl PriorOpenInterest {
    pub fn at(&self, strike: f64) -> Option<&StrikeOpenInterest> {
        self.strikes.iter().find(|s| same_strike(s.strike, strike))
    }
}

// =============================================================================
// Gamma Profile
// =============================================================================

/// Dollar gamma for one `(strike, expiration_date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrikeGammaRow {
    pub strike: f64,
    pub expiration_date: NaiveDate,
    /// Call dollar gamma (magnitude)
    pub call_gamma: f64,
    /// Put dollar gamma (magnitude)
    pub put_gamma: f64,
    /// Call contribution minus put contribution
    pub net_gamma: f64,
    pub call_open_interest: u64,
    pub put_open_interest: u64,
    pub open_interest_total: u64,
    pub put_call_ratio: f64,
}

impl StrikeGammaRow {
    pub fn new(
        strike: f64,
        expiration_date: NaiveDate,
        call_gamma: f64,
        put_gamma: f64,
        call_open_interest: u64,
        put_open_interest: u64,
    ) -> Self {
        Self {
            strike,
            expiration_date,
            call_gamma,
            put_gamma,
            net_gamma: call_gamma - put_gamma,
            call_open_interest,
            put_open_interest,
            open_interest_total: call_open_interest.saturating_add(put_open_interest),
            put_call_ratio: put_call_ratio(call_open_interest, put_open_interest),
        }
    }
}

/// `put_oi / call_oi`, or 0 when there is no call open interest.
pub fn put_call_ratio(call_oi: u64, put_oi: u64) -> f64 {
    if call_oi > 0 {
        put_oi as f64 / call_oi as f64
    } else {
        0.0
    }
}

/// Net exposure at one strike, summed across expirations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StrikeExposure {
    pub strike: f64,
    pub call_gamma: f64,
    pub put_gamma: f64,
    pub net_gamma: f64,
    pub open_interest: u64,
}

/// Gamma aggregation over every strike of one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaProfile {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub spot_price: f64,
    pub total_net_gamma: f64,
    /// Sorted by strike ascending, then expiration
    pub rows: Vec<StrikeGammaRow>,
    /// Rows that could not be computed
    pub skipped_rows: Vec<RowCalculationError>,
}

impl GammaProfile {
    /// Build a profile from already computed rows. Rows are sorted and the
    /// total is recomputed so the sum invariant always holds.
    pub fn from_rows(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        spot_price: f64,
        mut rows: Vec<StrikeGammaRow>,
    ) -> Self {
        rows.sort_by(|a, b| {
            a.strike
                .total_cmp(&b.strike)
                .then(a.expiration_date.cmp(&b.expiration_date))
        });
        let total_net_gamma = rows.iter().map(|r| r.net_gamma).sum();

        Self {
            symbol: symbol.into(),
            timestamp,
            spot_price,
            total_net_gamma,
            rows,
            skipped_rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn as_of(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Sum of absolute net gamma over all rows.
    pub fn gross_gamma(&self) -> f64 {
        self.rows.iter().map(|r| r.net_gamma.abs()).sum()
    }

    /// Rows collapsed per strike (ascending), across all expirations.
    pub fn strike_exposures(&self) -> Vec<StrikeExposure> {
        let mut out: Vec<StrikeExposure> = Vec::new();
        for row in &self.rows {
            match out.last_mut() {
                Some(last) if same_strike(last.strike, row.strike) => {
                    last.call_gamma += row.call_gamma;
                    last.put_gamma += row.put_gamma;
                    last.net_gamma += row.net_gamma;
                    last.open_interest = last.open_interest.saturating_add(row.open_interest_total);
                }
                _ => out.push(StrikeExposure {
                    strike: row.strike,
                    call_gamma: row.call_gamma,
                    put_gamma: row.put_gamma,
                    net_gamma: row.net_gamma,
                    open_interest: row.open_interest_total,
                }),
            }
        }
        out
    }

    pub fn rows_at(&self, strike: f64) -> impl Iterator<Item = &StrikeGammaRow> {
        self.rows.iter().filter(move |r| same_strike(r.strike, strike))
    }
}

// =============================================================================
// Levels
// =============================================================================

/// Key price levels derived from one gamma profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GammaLevels {
    /// Price where cumulative net gamma crosses zero
    pub flip_point: Option<f64>,
    pub call_wall: Option<f64>,
    pub put_wall: Option<f64>,
    pub magnets: Vec<Magnet>,
    pub danger_zones: Vec<DangerZone>,
}

impl GammaLevels {
    pub fn top_magnet(&self) -> Option<&Magnet> {
        self.magnets.iter().find(|m| m.rank == 1)
    }

    pub fn danger_zone_at(&self, strike: f64) -> Option<&DangerZone> {
        self.danger_zones.iter().find(|z| same_strike(z.strike, strike))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Magnet {
    pub strike: f64,
    /// 1 = strongest
    pub rank: usize,
    /// Share of the summed top-N magnitudes (0.0 - 1.0)
    pub strength: f64,
    pub net_gamma: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DangerReason {
    Building,
    Flipping,
    Collapsing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DangerZone {
    pub strike: f64,
    pub reason: DangerReason,
    pub net_gamma: f64,
    pub previous_net_gamma: f64,
    /// Relative change since the previous snapshot
    pub rate_of_change: f64,
}

// =============================================================================
// Regime
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeType {
    Positive,
    Negative,
    Neutral,
}

/// Market-maker hedging state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MmState {
    Squeeze,
    MeanReversion,
    Transitional,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VixRegime {
    Low,
    Normal,
    Elevated,
    High,
    Extreme,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Extreme,
}

/// One row of the regime scoring table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegimeFactor {
    pub name: String,
    pub direction_points: i32,
    pub risk_points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegimeState {
    pub regime_type: RegimeType,
    pub mm_state: MmState,
    pub vix_regime: VixRegime,
    pub direction: Direction,
    /// 0 - 100
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub factors: Vec<RegimeFactor>,
}

// =============================================================================
// Expiration Decay
// =============================================================================

/// Gamma that rolls off on one expiration date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpirationBucket {
    pub expiration_date: NaiveDate,
    pub days_to_expiry: i64,
    /// Absolute dollar gamma removed on this date
    pub gamma_expiring: f64,
    /// Signed net gamma removed on this date
    pub net_gamma_expiring: f64,
    pub pct_of_total: f64,
    pub cumulative_pct: f64,
    /// Total net gamma left once this and every earlier date has expired
    pub projected_net_gamma_after: f64,
    pub high_impact: bool,
    pub within_horizon: bool,
}

// =============================================================================
// Psychology Patterns
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    /// Price pinned under a call wall that is about to expire away
    LiberationSetup,
    /// Put wall support concentrated in an imminent expiration
    FalseFloor,
    /// A danger zone that keeps accelerating across snapshots
    DangerZoneBuilding,
    /// Spot sitting on the top magnet into its expiration
    PinRisk,
    /// Negative gamma with price through the flip point, dealers chasing
    GammaSqueeze,
}

impl PatternType {
    pub const ALL: [PatternType; 5] = [
        PatternType::LiberationSetup,
        PatternType::FalseFloor,
        PatternType::DangerZoneBuilding,
        PatternType::PinRisk,
        PatternType::GammaSqueeze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::LiberationSetup => "LIBERATION_SETUP",
            PatternType::FalseFloor => "FALSE_FLOOR",
            PatternType::DangerZoneBuilding => "DANGER_ZONE_BUILDING",
            PatternType::PinRisk => "PIN_RISK",
            PatternType::GammaSqueeze => "GAMMA_SQUEEZE",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bet a pattern implies, used to grade its outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImpliedMove {
    Up,
    Down,
    Pin { strike: f64 },
    /// Expansion in either direction
    Breakout,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternOutcome {
    Succeeded,
    Failed,
    Inconclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportingSignal {
    pub name: String,
    pub value: f64,
}

impl SupportingSignal {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Components feeding a detection's confidence, each in 0.0 - 1.0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceBreakdown {
    pub distance: f64,
    pub decay: f64,
    pub momentum: f64,
    pub reliability: f64,
}

/// A detected psychology-trap pattern.
///
/// Immutable after detection except for `outcome`/`resolved_at`, which the
/// outcome tracker sets exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PsychologyPattern {
    pub id: Uuid,
    pub symbol: String,
    pub pattern_type: PatternType,
    pub detected_at: DateTime<Utc>,
    pub strike: f64,
    pub spot_at_detection: f64,
    /// 0 - 100
    pub confidence: f64,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub supporting_signals: Vec<SupportingSignal>,
    pub implied_move: ImpliedMove,
    /// Expiration whose passing ends the evaluation horizon
    pub reference_expiration: Option<NaiveDate>,
    pub outcome: Option<PatternOutcome>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PsychologyPattern {
    /// Deterministic id so a replayed snapshot regenerates the same pattern.
    pub fn derive_id(
        symbol: &str,
        pattern_type: PatternType,
        strike: f64,
        detected_at: DateTime<Utc>,
    ) -> Uuid {
        let name = format!(
            "{}|{}|{}|{}",
            symbol,
            pattern_type.as_str(),
            strike_key(strike),
            detected_at.timestamp_millis()
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn signal(&self, name: &str) -> Option<f64> {
        self.supporting_signals
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.value)
    }
}
