//! Pattern outcome tracking
//!
//! Every detection is appended to an event log as `Recorded`; when its
//! evaluation horizon closes a `Resolved` event labels it. State (the
//! pattern index, the pending set and per-type statistics) is a fold over
//! that log, so replaying the same events never double counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{GexError, GexResult};
use crate::gamma::expiry_instant;
use crate::models::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    /// Price observations after detection before a pattern is closed
    pub horizon_bars: usize,
    /// Move (%) in the bet's direction that counts as success
    pub success_move_pct: f64,
    /// Move (%) against the bet that counts as failure
    pub failure_move_pct: f64,
    /// Pin bets succeed when the closing price is within this % of the strike
    pub pin_band_pct: f64,
    /// Decisive outcomes kept for the rolling failure rate
    pub sample_window: usize,
    /// Decisive samples needed before a failure rate is trusted
    pub min_samples: usize,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            horizon_bars: 12,
            success_move_pct: 0.5,
            failure_move_pct: 0.5,
            pin_band_pct: 0.3,
            sample_window: 50,
            min_samples: 10,
        }
    }
}

impl OutcomeConfig {
    pub fn validate(&self) -> GexResult<()> {
        if self.horizon_bars == 0 || self.sample_window == 0 {
            return Err(GexError::InvalidConfig(
                "outcomes.horizon_bars and sample_window must be at least 1".into(),
            ));
        }
        if self.min_samples > self.sample_window {
            return Err(GexError::InvalidConfig(format!(
                "outcomes.min_samples ({}) exceeds sample_window ({})",
                self.min_samples, self.sample_window
            )));
        }
        if self.success_move_pct <= 0.0 || self.failure_move_pct <= 0.0 || self.pin_band_pct <= 0.0 {
            return Err(GexError::InvalidConfig(
                "outcomes move thresholds must be positive".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Event Log
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    Recorded {
        pattern: PsychologyPattern,
    },
    Resolved {
        id: Uuid,
        outcome: PatternOutcome,
        resolved_at: DateTime<Utc>,
        /// Price the outcome was graded on, if any
        price: Option<f64>,
    },
}

impl TrackerEvent {
    pub fn pattern_id(&self) -> Uuid {
        match self {
            TrackerEvent::Recorded { pattern } => pattern.id,
            TrackerEvent::Resolved { id, .. } => *id,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Rolling reliability of one pattern type ("sucker statistics").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternStatistics {
    pub pattern_type: PatternType,
    /// Distinct patterns recorded, resolved or not
    pub occurrences: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub inconclusive: u64,
    /// Failed share of the decisive outcomes in the window
    pub failure_rate: f64,
    pub sample_window: usize,
    pub samples_in_window: usize,
    pub min_samples: usize,
    pub low_confidence: bool,
    /// Most recent decisive outcomes, `true` = failed
    #[serde(skip)]
    window: VecDeque<bool>,
}

impl PatternStatistics {
    pub fn new(pattern_type: PatternType, sample_window: usize, min_samples: usize) -> Self {
        Self {
            pattern_type,
            occurrences: 0,
            succeeded: 0,
            failed: 0,
            inconclusive: 0,
            failure_rate: 0.0,
            sample_window,
            samples_in_window: 0,
            min_samples,
            low_confidence: true,
            window: VecDeque::with_capacity(sample_window),
        }
    }

    fn record_outcome(&mut self, outcome: PatternOutcome) {
        match outcome {
            PatternOutcome::Succeeded => {
                self.succeeded += 1;
                self.push_sample(false);
            }
            PatternOutcome::Failed => {
                self.failed += 1;
                self.push_sample(true);
            }
            // Inconclusive never touches the failure rate
            PatternOutcome::Inconclusive => self.inconclusive += 1,
        }
    }

    fn push_sample(&mut self, failed: bool) {
        self.window.push_back(failed);
        while self.window.len() > self.sample_window {
            self.window.pop_front();
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        self.samples_in_window = self.window.len();
        let failures = self.window.iter().filter(|f| **f).count();
        self.failure_rate = if self.samples_in_window > 0 {
            failures as f64 / self.samples_in_window as f64
        } else {
            0.0
        };
        self.low_confidence = self.samples_in_window < self.min_samples;
    }

    pub fn resolved(&self) -> u64 {
        self.succeeded + self.failed + self.inconclusive
    }

    /// The failure rate, or `InsufficientHistory` while the window is too
    /// thin to trust.
    pub fn reliable_failure_rate(&self) -> GexResult<f64> {
        if self.low_confidence {
            return Err(GexError::InsufficientHistory {
                pattern_type: self.pattern_type,
                samples: self.samples_in_window,
                required: self.min_samples,
            });
        }
        Ok(self.failure_rate)
    }

    /// Fold another symbol's statistics for the same pattern type into this one.
    pub fn merge(&mut self, other: &PatternStatistics) {
        self.occurrences += other.occurrences;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.inconclusive += other.inconclusive;
        self.window.extend(other.window.iter().copied());
        while self.window.len() > self.sample_window {
            self.window.pop_front();
        }
        self.refresh();
    }
}

// =============================================================================
// Tracker
// =============================================================================

#[derive(Debug, Clone)]
struct Pending {
    id: Uuid,
    observations: usize,
    last_price: Option<f64>,
}

/// Records detections, grades them against later prices and keeps
/// per-type statistics. Single writer per symbol.
#[derive(Debug, Clone)]
pub struct OutcomeTracker {
    config: OutcomeConfig,
    expiry_hour_utc: u32,
    events: Vec<TrackerEvent>,
    patterns: HashMap<Uuid, PsychologyPattern>,
    pending: Vec<Pending>,
    stats: BTreeMap<PatternType, PatternStatistics>,
    /// Resolved ids whose events were drained; kept for dedupe only
    settled: HashSet<Uuid>,
}

impl OutcomeTracker {
    pub fn new(config: OutcomeConfig, expiry_hour_utc: u32) -> Self {
        let stats = PatternType::ALL
            .into_iter()
            .map(|pt| {
                (
                    pt,
                    PatternStatistics::new(pt, config.sample_window, config.min_samples),
                )
            })
            .collect();
        Self {
            config,
            expiry_hour_utc,
            events: Vec::new(),
            patterns: HashMap::new(),
            pending: Vec::new(),
            stats,
            settled: HashSet::new(),
        }
    }

    /// Rebuild a tracker from a persisted event log. Duplicate events are
    /// dropped exactly as they would be live.
    pub fn from_events(
        config: OutcomeConfig,
        expiry_hour_utc: u32,
        events: impl IntoIterator<Item = TrackerEvent>,
    ) -> Self {
        let mut tracker = Self::new(config, expiry_hour_utc);
        for event in events {
            if tracker.apply(&event) {
                tracker.events.push(event);
            }
        }
        debug!(
            events = tracker.events.len(),
            pending = tracker.pending.len(),
            "Outcome tracker rebuilt from events"
        );
        tracker
    }

    fn apply(&mut self, event: &TrackerEvent) -> bool {
        match event {
            TrackerEvent::Recorded { pattern } => {
                if self.patterns.contains_key(&pattern.id) || self.settled.contains(&pattern.id) {
                    return false;
                }
                let mut pattern = pattern.clone();
                pattern.outcome = None;
                pattern.resolved_at = None;
                self.pending.push(Pending {
                    id: pattern.id,
                    observations: 0,
                    last_price: None,
                });
                self.stats_mut(pattern.pattern_type).occurrences += 1;
                self.patterns.insert(pattern.id, pattern);
                true
            }
            TrackerEvent::Resolved {
                id,
                outcome,
                resolved_at,
                ..
            } => {
                let Some(pattern) = self.patterns.get_mut(id) else {
                    return false;
                };
                if pattern.outcome.is_some() {
                    return false;
                }
                pattern.outcome = Some(*outcome);
                pattern.resolved_at = Some(*resolved_at);
                let pattern_type = pattern.pattern_type;
                self.pending.retain(|p| p.id != *id);
                self.stats_mut(pattern_type).record_outcome(*outcome);
                true
            }
        }
    }

    fn stats_mut(&mut self, pattern_type: PatternType) -> &mut PatternStatistics {
        let (window, min) = (self.config.sample_window, self.config.min_samples);
        self.stats
            .entry(pattern_type)
            .or_insert_with(|| PatternStatistics::new(pattern_type, window, min))
    }

    /// Record a new detection. Returns `false` when the id is already known.
    pub fn record(&mut self, pattern: PsychologyPattern) -> bool {
        let event = TrackerEvent::Recorded { pattern };
        if !self.apply(&event) {
            if let TrackerEvent::Recorded { pattern } = &event {
                debug!(id = %pattern.id, pattern_type = %pattern.pattern_type, "Pattern already recorded");
            }
            return false;
        }
        self.events.push(event);
        true
    }

    /// Feed one price observation; returns the patterns it resolved.
    pub fn observe(&mut self, at: DateTime<Utc>, price: f64) -> Vec<PsychologyPattern> {
        if !price.is_finite() || price <= 0.0 {
            return Vec::new();
        }

        let mut decided: Vec<(Uuid, PatternOutcome, Option<f64>)> = Vec::new();
        for pending in &mut self.pending {
            let Some(pattern) = self.patterns.get(&pending.id) else {
                continue;
            };
            if at <= pattern.detected_at {
                continue;
            }

            let expiry = pattern
                .reference_expiration
                .map(|d| expiry_instant(d, self.expiry_hour_utc));
            if expiry.is_some_and(|e| at > e) {
                // Horizon already closed before this price
                let outcome = close_outcome(pattern, pending.last_price, &self.config);
                decided.push((pending.id, outcome, pending.last_price));
                continue;
            }

            pending.observations += 1;
            pending.last_price = Some(price);

            if let Some(outcome) = grade_move(pattern, price, &self.config) {
                decided.push((pending.id, outcome, Some(price)));
            } else if pending.observations >= self.config.horizon_bars
                || expiry.is_some_and(|e| at >= e)
            {
                decided.push((pending.id, close_outcome(pattern, Some(price), &self.config), Some(price)));
            }
        }

        let mut resolved = Vec::with_capacity(decided.len());
        for (id, outcome, graded_price) in decided {
            let event = TrackerEvent::Resolved {
                id,
                outcome,
                resolved_at: at,
                price: graded_price,
            };
            if !self.apply(&event) {
                continue;
            }
            self.events.push(event);
            if let Some(pattern) = self.patterns.get(&id) {
                info!(
                    symbol = %pattern.symbol,
                    pattern_type = %pattern.pattern_type,
                    strike = pattern.strike,
                    outcome = ?outcome,
                    id = %id,
                    "Pattern resolved"
                );
                resolved.push(pattern.clone());
            }
        }
        resolved
    }

    pub fn config(&self) -> &OutcomeConfig {
        &self.config
    }

    pub fn expiry_hour_utc(&self) -> u32 {
        self.expiry_hour_utc
    }

    pub fn statistics(&self) -> Vec<PatternStatistics> {
        self.stats.values().cloned().collect()
    }

    pub fn stats(&self, pattern_type: PatternType) -> Option<&PatternStatistics> {
        self.stats.get(&pattern_type)
    }

    /// Failure rates for pattern types with enough decisive samples.
    pub fn reliable_failure_rates(&self) -> HashMap<PatternType, f64> {
        self.stats
            .values()
            .filter_map(|s| s.reliable_failure_rate().ok().map(|r| (s.pattern_type, r)))
            .collect()
    }

    pub fn events(&self) -> &[TrackerEvent] {
        &self.events
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self) -> HashSet<Uuid> {
        self.pending.iter().map(|p| p.id).collect()
    }

    pub fn pattern(&self, id: &Uuid) -> Option<&PsychologyPattern> {
        self.patterns.get(id)
    }

    /// Remove the events and patterns of every resolved detection, returning
    /// those events in log order. Call once the host has persisted the log.
    /// Statistics are unchanged and drained ids still dedupe replays; only
    /// pending detections stay in `events()`.
    pub fn drain_resolved_events(&mut self) -> Vec<TrackerEvent> {
        let resolved: HashSet<Uuid> = self
            .patterns
            .values()
            .filter(|p| p.outcome.is_some())
            .map(|p| p.id)
            .collect();
        if resolved.is_empty() {
            return Vec::new();
        }

        let (drained, kept): (Vec<TrackerEvent>, Vec<TrackerEvent>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| resolved.contains(&e.pattern_id()));
        self.events = kept;
        self.patterns.retain(|id, _| !resolved.contains(id));
        self.settled.extend(resolved);

        debug!(
            drained = drained.len(),
            remaining = self.events.len(),
            "Resolved pattern events drained"
        );
        drained
    }
}

fn move_pct(pattern: &PsychologyPattern, price: f64) -> f64 {
    (price - pattern.spot_at_detection) / pattern.spot_at_detection * 100.0
}

/// Decide on a single price, before the horizon closes. Pins wait for it.
fn grade_move(pattern: &PsychologyPattern, price: f64, config: &OutcomeConfig) -> Option<PatternOutcome> {
    let change = move_pct(pattern, price);
    match pattern.implied_move {
        ImpliedMove::Up if change >= config.success_move_pct => Some(PatternOutcome::Succeeded),
        ImpliedMove::Up if change <= -config.failure_move_pct => Some(PatternOutcome::Failed),
        ImpliedMove::Down if change <= -config.success_move_pct => Some(PatternOutcome::Succeeded),
        ImpliedMove::Down if change >= config.failure_move_pct => Some(PatternOutcome::Failed),
        ImpliedMove::Breakout if change.abs() >= config.success_move_pct => Some(PatternOutcome::Succeeded),
        _ => None,
    }
}

/// Outcome once the horizon has closed without a decisive move.
fn close_outcome(pattern: &PsychologyPattern, last_price: Option<f64>, config: &OutcomeConfig) -> PatternOutcome {
    match (pattern.implied_move, last_price) {
        (ImpliedMove::Pin { strike }, Some(price)) => {
            if (price - strike).abs() / strike * 100.0 <= config.pin_band_pct {
                PatternOutcome::Succeeded
            } else {
                PatternOutcome::Failed
            }
        }
        _ => PatternOutcome::Inconclusive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 15, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn pattern(pt: PatternType, minute: i64, strike: f64, spot: f64, bet: ImpliedMove) -> PsychologyPattern {
        let detected_at = at(minute);
        PsychologyPattern {
            id: PsychologyPattern::derive_id("SPY", pt, strike, detected_at),
            symbol: "SPY".to_string(),
            pattern_type: pt,
            detected_at,
            strike,
            spot_at_detection: spot,
            confidence: 60.0,
            confidence_breakdown: ConfidenceBreakdown::default(),
            supporting_signals: vec![],
            implied_move: bet,
            reference_expiration: None,
            outcome: None,
            resolved_at: None,
        }
    }

    fn tracker() -> OutcomeTracker {
        OutcomeTracker::new(OutcomeConfig::default(), 20)
    }

    #[test]
    fn test_replayed_detection_counts_once() {
        let mut t = tracker();
        let p = pattern(PatternType::LiberationSetup, 0, 585.0, 583.0, ImpliedMove::Up);

        assert!(t.record(p.clone()));
        assert!(!t.record(p));
        assert_eq!(t.stats(PatternType::LiberationSetup).unwrap().occurrences, 1);
        assert_eq!(t.events().len(), 1);
        assert_eq!(t.pending_count(), 1);
    }

    #[test]
    fn test_drained_events_keep_stats_and_dedupe() {
        let mut t = tracker();
        let done = pattern(PatternType::FalseFloor, 0, 580.0, 590.0, ImpliedMove::Down);
        let open = pattern(PatternType::PinRisk, 5, 585.0, 585.1, ImpliedMove::Pin { strike: 585.0 });
        t.record(done.clone());
        assert_eq!(t.observe(at(3), 586.0)[0].id, done.id);
        t.record(open.clone());

        let drained = t.drain_resolved_events();
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|e| e.pattern_id() == done.id));
        assert_eq!(t.events().len(), 1);
        assert_eq!(t.events()[0].pattern_id(), open.id);
        assert!(t.pattern(&done.id).is_none());

        let stats = t.stats(PatternType::FalseFloor).unwrap();
        assert_eq!((stats.occurrences, stats.succeeded), (1, 1));
        assert!(!t.record(done));
        assert_eq!(t.stats(PatternType::FalseFloor).unwrap().occurrences, 1);
        assert!(t.drain_resolved_events().is_empty());
    }

    #[test]
    fn test_up_bet_succeeds_on_move() {
        let mut t = tracker();
        t.record(pattern(PatternType::GammaSqueeze, 0, 585.0, 585.0, ImpliedMove::Up));

        assert!(t.observe(at(5), 585.5).is_empty());
        let resolved = t.observe(at(10), 588.0);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].outcome, Some(PatternOutcome::Succeeded));
        assert_eq!(resolved[0].resolved_at, Some(at(10)));
        assert_eq!(t.pending_count(), 0);
    }

    #[test]
    fn test_down_bet_fails_when_price_rises() {
        let mut t = tracker();
        t.record(pattern(PatternType::FalseFloor, 0, 580.0, 590.0, ImpliedMove::Down));

        let resolved = t.observe(at(5), 593.5);
        assert_eq!(resolved[0].outcome, Some(PatternOutcome::Failed));
        let stats = t.stats(PatternType::FalseFloor).unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failure_rate, 1.0);
    }

    #[test]
    fn test_unresolved_horizon_is_inconclusive_and_excluded() {
        let mut t = tracker();
        t.record(pattern(PatternType::DangerZoneBuilding, 0, 590.0, 585.0, ImpliedMove::Breakout));

        for i in 1..12 {
            assert!(t.observe(at(i * 5), 585.1).is_empty());
        }
        let resolved = t.observe(at(60), 585.2);
        assert_eq!(resolved[0].outcome, Some(PatternOutcome::Inconclusive));

        let stats = t.stats(PatternType::DangerZoneBuilding).unwrap();
        assert_eq!(stats.inconclusive, 1);
        assert_eq!(stats.samples_in_window, 0);
        assert_eq!(stats.failure_rate, 0.0);
    }

    #[test]
    fn test_pin_graded_at_horizon() {
        let config = OutcomeConfig {
            horizon_bars: 3,
            ..Default::default()
        };
        let mut t = OutcomeTracker::new(config, 20);
        t.record(pattern(PatternType::PinRisk, 0, 585.0, 585.5, ImpliedMove::Pin { strike: 585.0 }));
        t.record(pattern(PatternType::PinRisk, 1, 590.0, 589.0, ImpliedMove::Pin { strike: 590.0 }));

        t.observe(at(5), 586.0);
        t.observe(at(10), 584.0);
        let resolved = t.observe(at(15), 585.4);

        assert_eq!(resolved.len(), 2);
        let by_strike = |s: f64| resolved.iter().find(|p| p.strike == s).unwrap().outcome;
        assert_eq!(by_strike(585.0), Some(PatternOutcome::Succeeded));
        assert_eq!(by_strike(590.0), Some(PatternOutcome::Failed));
    }

    #[test]
    fn test_reference_expiration_closes_horizon() {
        let mut t = tracker();
        let mut p = pattern(PatternType::PinRisk, 0, 585.0, 585.2, ImpliedMove::Pin { strike: 585.0 });
        p.reference_expiration = Some(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        t.record(p);

        assert!(t.observe(at(60), 585.3).is_empty());
        // next price lands after the 20:00 UTC settlement
        let resolved = t.observe(at(24 * 60), 600.0);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].outcome, Some(PatternOutcome::Succeeded));
    }

    #[test]
    fn test_prices_before_detection_ignored() {
        let mut t = tracker();
        t.record(pattern(PatternType::GammaSqueeze, 30, 585.0, 585.0, ImpliedMove::Up));
        assert!(t.observe(at(10), 600.0).is_empty());
        assert_eq!(t.pending_count(), 1);
    }

    #[test]
    fn test_low_confidence_until_min_samples() {
        let mut t = tracker();
        for i in 0..10 {
            t.record(pattern(PatternType::FalseFloor, i, 580.0 + i as f64, 590.0, ImpliedMove::Down));
        }

        let stats = t.stats(PatternType::FalseFloor).unwrap();
        assert!(stats.low_confidence);
        assert!(matches!(
            stats.reliable_failure_rate(),
            Err(GexError::InsufficientHistory { samples: 0, required: 10, .. })
        ));

        // a 0.5% drop settles every one of them
        t.observe(at(20), 587.0);
        let stats = t.stats(PatternType::FalseFloor).unwrap();
        assert_eq!(stats.samples_in_window, 10);
        assert!(!stats.low_confidence);
        assert!((stats.reliable_failure_rate().unwrap() - 0.0).abs() < 1e-12);
        assert_eq!(t.reliable_failure_rates().get(&PatternType::FalseFloor), Some(&0.0));
    }

    #[test]
    fn test_window_rolls() {
        let config = OutcomeConfig {
            sample_window: 4,
            min_samples: 2,
            ..Default::default()
        };
        let mut stats = PatternStatistics::new(PatternType::PinRisk, config.sample_window, config.min_samples);
        for outcome in [
            PatternOutcome::Failed,
            PatternOutcome::Failed,
            PatternOutcome::Succeeded,
            PatternOutcome::Succeeded,
            PatternOutcome::Succeeded,
            PatternOutcome::Inconclusive,
        ] {
            stats.record_outcome(outcome);
        }
        assert_eq!(stats.samples_in_window, 4);
        assert!((stats.failure_rate - 0.25).abs() < 1e-12);
        assert_eq!(stats.failed, 2);
    }

    #[test]
    fn test_rebuild_from_events_matches_live_state() {
        let mut live = tracker();
        live.record(pattern(PatternType::GammaSqueeze, 0, 585.0, 585.0, ImpliedMove::Up));
        live.record(pattern(PatternType::FalseFloor, 0, 580.0, 590.0, ImpliedMove::Down));
        live.observe(at(5), 588.5);

        let mut log = live.events().to_vec();
        // a replayed log carries duplicates
        log.extend(live.events().iter().cloned());
        let rebuilt = OutcomeTracker::from_events(OutcomeConfig::default(), 20, log);

        assert_eq!(rebuilt.statistics(), live.statistics());
        assert_eq!(rebuilt.events().len(), live.events().len());
        assert_eq!(rebuilt.pending_ids(), live.pending_ids());
    }

    #[test]
    fn test_occurrences_never_decrease() {
        let mut t = tracker();
        let mut last = 0;
        for i in 0..5 {
            let p = pattern(PatternType::PinRisk, i % 3, 585.0, 585.0, ImpliedMove::Pin { strike: 585.0 });
            t.record(p);
            t.observe(at(10 + i), 585.0);
            let now = t.stats(PatternType::PinRisk).unwrap().occurrences;
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn test_merge_combines_symbols() {
        let mut a = PatternStatistics::new(PatternType::FalseFloor, 50, 2);
        a.occurrences = 2;
        a.record_outcome(PatternOutcome::Failed);
        let mut b = PatternStatistics::new(PatternType::FalseFloor, 50, 2);
        b.occurrences = 3;
        b.record_outcome(PatternOutcome::Succeeded);
        b.record_outcome(PatternOutcome::Succeeded);
        b.record_outcome(PatternOutcome::Inconclusive);

        a.merge(&b);
        assert_eq!(a.occurrences, 5);
        assert_eq!(a.samples_in_window, 3);
        assert!((a.failure_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(a.inconclusive, 1);
        assert!(!a.low_confidence);
    }
}
