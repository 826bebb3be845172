use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gex_core::{
    ConfidenceBreakdown, DangerZone, Direction, ExpirationBucket, ExpirationDecayReport,
    ImpliedMove, Magnet, MmState, PatternOutcome, PatternStatistics, PatternType,
    PsychologyPattern, RegimeFactor, RegimeType, RiskLevel, StrikeExposure, SupportingSignal,
    VixRegime,
};

use crate::error::EngineResult;
use crate::pipeline::PipelineOutput;

// ============================================================================
// Per-snapshot gamma, levels and regime
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrikeGammaDto {
    pub strike: f64,
    pub call_gamma: f64,
    pub put_gamma: f64,
    pub net_gamma: f64,
    pub open_interest: u64,
}

impl From<&StrikeExposure> for StrikeGammaDto {
    fn from(e: &StrikeExposure) -> Self {
        Self {
            strike: e.strike,
            call_gamma: e.call_gamma,
            put_gamma: e.put_gamma,
            net_gamma: e.net_gamma,
            open_interest: e.open_interest,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GammaSnapshotResponse {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub spot_price: f64,
    pub total_net_gamma: f64,
    pub strikes: Vec<StrikeGammaDto>,
    pub flip_point: Option<f64>,
    pub call_wall: Option<f64>,
    pub put_wall: Option<f64>,
    pub magnets: Vec<Magnet>,
    pub danger_zones: Vec<DangerZone>,
    pub regime_type: RegimeType,
    pub mm_state: MmState,
    pub vix_regime: VixRegime,
    pub vix: f64,
    pub direction: Direction,
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub regime_factors: Vec<RegimeFactor>,
    pub skipped_rows: usize,
    /// Last snapshot is older than the staleness window
    pub stale: bool,
}

impl GammaSnapshotResponse {
    pub fn from_output(output: &PipelineOutput, stale: bool) -> Self {
        let profile = &output.profile;
        Self {
            symbol: profile.symbol.clone(),
            timestamp: profile.timestamp,
            spot_price: profile.spot_price,
            total_net_gamma: profile.total_net_gamma,
            strikes: profile.strike_exposures().iter().map(StrikeGammaDto::from).collect(),
            flip_point: output.levels.flip_point,
            call_wall: output.levels.call_wall,
            put_wall: output.levels.put_wall,
            magnets: output.levels.magnets.clone(),
            danger_zones: output.levels.danger_zones.clone(),
            regime_type: output.regime.regime_type,
            mm_state: output.regime.mm_state,
            vix_regime: output.regime.vix_regime,
            vix: output.vix,
            direction: output.regime.direction,
            confidence: output.regime.confidence,
            risk_level: output.regime.risk_level,
            regime_factors: output.regime.factors.clone(),
            skipped_rows: profile.skipped_rows.len(),
            stale,
        }
    }
}

// ============================================================================
// Expiration decay timeline
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecayTimelineResponse {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub horizon_days: i64,
    pub high_impact_threshold_pct: f64,
    pub timeline: Vec<ExpirationBucket>,
    pub high_impact_dates: Vec<NaiveDate>,
}

impl DecayTimelineResponse {
    pub fn from_report(symbol: &str, report: &ExpirationDecayReport) -> Self {
        Self {
            symbol: symbol.to_string(),
            as_of: report.as_of,
            horizon_days: report.horizon_days,
            high_impact_threshold_pct: report.high_impact_threshold_pct,
            timeline: report.timeline().cloned().collect(),
            high_impact_dates: report.high_impact_dates.clone(),
        }
    }
}

// ============================================================================
// Pattern events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternEventDto {
    pub id: Uuid,
    pub symbol: String,
    pub pattern_type: PatternType,
    pub detected_at: DateTime<Utc>,
    pub strike: f64,
    pub spot_at_detection: f64,
    pub confidence: f64,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub supporting_signals: Vec<SupportingSignal>,
    pub implied_move: ImpliedMove,
    pub reference_expiration: Option<NaiveDate>,
    pub outcome: Option<PatternOutcome>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&PsychologyPattern> for PatternEventDto {
    fn from(p: &PsychologyPattern) -> Self {
        Self {
            id: p.id,
            symbol: p.symbol.clone(),
            pattern_type: p.pattern_type,
            detected_at: p.detected_at,
            strike: p.strike,
            spot_at_detection: p.spot_at_detection,
            // Published rounded; the tracker keeps full precision
            confidence: (p.confidence * 100.0).round() / 100.0,
            confidence_breakdown: p.confidence_breakdown,
            supporting_signals: p.supporting_signals.clone(),
            implied_move: p.implied_move,
            reference_expiration: p.reference_expiration,
            outcome: p.outcome,
            resolved_at: p.resolved_at,
        }
    }
}

// ============================================================================
// Statistics summary
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternStatisticsDto {
    pub pattern_type: PatternType,
    pub occurrences: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub inconclusive: u64,
    pub failure_rate: f64,
    pub sample_window: usize,
    pub samples_in_window: usize,
    pub low_confidence: bool,
}

impl From<&PatternStatistics> for PatternStatisticsDto {
    fn from(s: &PatternStatistics) -> Self {
        Self {
            pattern_type: s.pattern_type,
            occurrences: s.occurrences,
            succeeded: s.succeeded,
            failed: s.failed,
            inconclusive: s.inconclusive,
            failure_rate: s.failure_rate,
            sample_window: s.sample_window,
            samples_in_window: s.samples_in_window,
            low_confidence: s.low_confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsSummaryResponse {
    pub symbols: usize,
    pub patterns: Vec<PatternStatisticsDto>,
}

// ============================================================================
// Outbound events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    SnapshotPublished(GammaSnapshotResponse),
    DecayTimeline(DecayTimelineResponse),
    PatternDetected(PatternEventDto),
    PatternResolved(PatternEventDto),
    Degraded { symbol: String, stale_for_secs: u64 },
}

impl EngineEvent {
    pub fn symbol(&self) -> &str {
        match self {
            EngineEvent::SnapshotPublished(s) => &s.symbol,
            EngineEvent::DecayTimeline(d) => &d.symbol,
            EngineEvent::PatternDetected(p) | EngineEvent::PatternResolved(p) => &p.symbol,
            EngineEvent::Degraded { symbol, .. } => symbol,
        }
    }

    /// JSON line for the audit log.
    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strike_fields_use_published_names() {
        let dto = StrikeGammaDto {
            strike: 585.0,
            call_gamma: 2.0e8,
            put_gamma: 1.0e8,
            net_gamma: 1.0e8,
            open_interest: 1200,
        };
        let value = serde_json::to_value(&dto).unwrap();
        for key in ["strike", "call_gamma", "put_gamma", "net_gamma", "open_interest"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = EngineEvent::Degraded {
            symbol: "SPY".into(),
            stale_for_secs: 1900,
        };
        let json = event.to_json().unwrap();
        assert!(json.contains(r#""type":"degraded""#));
        assert_eq!(event.symbol(), "SPY");
    }
}
