//! Per-symbol recomputation pipeline.
//!
//! One `SymbolPipeline` owns every piece of cross-snapshot state for a
//! symbol: the previous profile (danger zones), price history (momentum),
//! the pattern state machines and the outcome tracker. The engine wraps it
//! in a mutex so passes for one symbol are strictly serialized.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use gex_core::{
    DetectionContext, ExpirationDecayAnalyzer, ExpirationDecayReport, GammaCalculator,
    GammaLevels, GammaProfile, GexError, GexResult, LevelDetector, MomentumConfig,
    MomentumSnapshot, OptionsChainSnapshot, OutcomeTracker, PatternDetector, PricePoint,
    PriorOpenInterest, PsychologyPattern, RegimeClassifier, RegimeInputs, RegimeState,
    TrackerEvent,
};

use crate::config::{EngineConfig, PipelineSettings};

/// Everything one pass produced for a snapshot.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub profile: GammaProfile,
    pub levels: GammaLevels,
    pub regime: RegimeState,
    pub decay: ExpirationDecayReport,
    /// VIX value the regime was classified with
    pub vix: f64,
    pub detected: Vec<PsychologyPattern>,
    pub resolved: Vec<PsychologyPattern>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    NoData,
    Fresh,
    Stale { stale_for_secs: u64 },
    /// Crossed the staleness ceiling on this check
    Degraded { stale_for_secs: u64 },
    /// Already reported degraded earlier
    StillDegraded { stale_for_secs: u64 },
}

pub struct SymbolPipeline {
    symbol: String,
    settings: PipelineSettings,
    calculator: GammaCalculator,
    level_detector: LevelDetector,
    classifier: RegimeClassifier,
    decay_analyzer: ExpirationDecayAnalyzer,
    momentum: MomentumConfig,
    detector: PatternDetector,
    tracker: OutcomeTracker,
    last_output: Option<PipelineOutput>,
    price_history: VecDeque<PricePoint>,
    last_vix: Option<f64>,
    stale: bool,
    degraded: bool,
}

impl SymbolPipeline {
    pub fn new(symbol: impl Into<String>, config: &EngineConfig) -> Self {
        let symbol = symbol.into();
        tracing::debug!(symbol = %symbol, "Creating symbol pipeline");
        Self {
            detector: PatternDetector::new(symbol.clone(), config.patterns.clone()),
            tracker: OutcomeTracker::new(config.outcomes.clone(), config.gamma.expiry_hour_utc),
            symbol,
            settings: config.pipeline.clone(),
            calculator: GammaCalculator::new(config.gamma.clone()),
            level_detector: LevelDetector::new(config.levels.clone()),
            classifier: RegimeClassifier::new(config.regime.clone()),
            decay_analyzer: ExpirationDecayAnalyzer::new(config.decay.clone()),
            momentum: config.momentum.clone(),
            last_output: None,
            price_history: VecDeque::with_capacity(config.pipeline.price_history_len),
            last_vix: None,
            stale: false,
            degraded: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last_processed(&self) -> Option<DateTime<Utc>> {
        self.last_output.as_ref().map(|o| o.profile.timestamp)
    }

    pub fn last_output(&self) -> Option<&PipelineOutput> {
        self.last_output.as_ref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn tracker(&self) -> &OutcomeTracker {
        &self.tracker
    }

    /// Replace the outcome tracker with one rebuilt from a persisted log.
    pub fn restore_events(&mut self, events: Vec<TrackerEvent>) {
        self.tracker = OutcomeTracker::from_events(
            self.tracker.config().clone(),
            self.tracker.expiry_hour_utc(),
            events,
        );
        tracing::info!(
            symbol = %self.symbol,
            events = self.tracker.events().len(),
            pending = self.tracker.pending_count(),
            "Pattern log restored"
        );
    }

    /// Hand over the events of resolved patterns and drop them from memory.
    pub fn drain_resolved_events(&mut self) -> Vec<TrackerEvent> {
        self.tracker.drain_resolved_events()
    }

    /// One full recomputation pass. Rejects snapshots that are not newer
    /// than the last processed one and leaves state untouched on error.
    pub fn run(
        &mut self,
        snapshot: &OptionsChainSnapshot,
        vix: Option<f64>,
        prior_oi: Option<&PriorOpenInterest>,
    ) -> GexResult<PipelineOutput> {
        if snapshot.symbol != self.symbol {
            return Err(GexError::InvalidSnapshot(format!(
                "snapshot for {} routed to {} pipeline",
                snapshot.symbol, self.symbol
            )));
        }
        if let Some(last) = self.last_processed() {
            if snapshot.timestamp <= last {
                return Err(GexError::OrderingViolation {
                    symbol: self.symbol.clone(),
                    last_processed: last,
                    received: snapshot.timestamp,
                });
            }
        }

        let profile = self.calculator.compute(snapshot)?;
        let levels = self
            .level_detector
            .detect(&profile, self.last_output.as_ref().map(|o| &o.profile));

        let vix = match vix.filter(|v| v.is_finite() && *v > 0.0) {
            Some(v) => {
                self.last_vix = Some(v);
                v
            }
            None => {
                let fallback = self.last_vix.unwrap_or(self.settings.fallback_vix);
                tracing::warn!(symbol = %self.symbol, vix = fallback, "Volatility feed empty, using fallback");
                fallback
            }
        };
        let regime = self.classifier.classify(&RegimeInputs {
            total_net_gamma: profile.total_net_gamma,
            vix,
            spot_price: profile.spot_price,
            flip_point: levels.flip_point,
        });
        let decay = self.decay_analyzer.analyze(&profile);

        self.push_price(PricePoint {
            at: profile.timestamp,
            price: profile.spot_price,
        });
        let history: &[PricePoint] = self.price_history.make_contiguous();
        let momentum = MomentumSnapshot::from_history(history, &self.momentum);
        let failure_rates = self.tracker.reliable_failure_rates();

        let detected = self.detector.detect(&DetectionContext {
            profile: &profile,
            levels: &levels,
            regime: &regime,
            decay: &decay,
            price_history: history,
            momentum: &momentum,
            prior_oi,
            failure_rates: &failure_rates,
        });

        for pattern in &detected {
            self.tracker.record(pattern.clone());
        }
        let resolved = self.tracker.observe(profile.timestamp, profile.spot_price);

        tracing::info!(
            symbol = %self.symbol,
            timestamp = %profile.timestamp,
            total_net_gamma = profile.total_net_gamma,
            regime = ?regime.regime_type,
            mm_state = ?regime.mm_state,
            detected = detected.len(),
            resolved = resolved.len(),
            skipped_rows = profile.skipped_rows.len(),
            "Snapshot processed"
        );

        let output = PipelineOutput {
            profile,
            levels,
            regime,
            decay,
            vix,
            detected,
            resolved,
        };
        self.last_output = Some(output.clone());
        self.stale = false;
        self.degraded = false;
        Ok(output)
    }

    /// Feed an intra-snapshot price. Out-of-order prices are ignored.
    pub fn observe_price(&mut self, at: DateTime<Utc>, price: f64) -> Vec<PsychologyPattern> {
        if !price.is_finite() || price <= 0.0 {
            tracing::debug!(symbol = %self.symbol, price = price, "Ignoring invalid price");
            return Vec::new();
        }
        if !self.push_price(PricePoint { at, price }) {
            return Vec::new();
        }
        self.tracker.observe(at, price)
    }

    fn push_price(&mut self, point: PricePoint) -> bool {
        if let Some(last) = self.price_history.back() {
            if point.at <= last.at {
                tracing::debug!(
                    symbol = %self.symbol,
                    at = %point.at,
                    last = %last.at,
                    "Ignoring out-of-order price"
                );
                return false;
            }
        }
        self.price_history.push_back(point);
        while self.price_history.len() > self.settings.price_history_len {
            self.price_history.pop_front();
        }
        true
    }

    pub fn price_history(&self) -> impl Iterator<Item = &PricePoint> {
        self.price_history.iter()
    }

    /// Update stale/degraded flags for `now`.
    pub fn check_staleness(&mut self, now: DateTime<Utc>) -> Staleness {
        let Some(last) = self.last_processed() else {
            return Staleness::NoData;
        };
        let stale_for_secs = (now - last).num_seconds().max(0) as u64;

        if stale_for_secs >= self.settings.staleness_ceiling_secs {
            self.stale = true;
            if self.degraded {
                return Staleness::StillDegraded { stale_for_secs };
            }
            self.degraded = true;
            return Staleness::Degraded { stale_for_secs };
        }
        if stale_for_secs >= self.settings.stale_after_secs {
            if !self.stale {
                tracing::warn!(
                    symbol = %self.symbol,
                    stale_for_secs = stale_for_secs,
                    "Symbol marked stale, holding last known profile"
                );
            }
            self.stale = true;
            return Staleness::Stale { stale_for_secs };
        }
        Staleness::Fresh
    }
}
