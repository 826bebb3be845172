//! Snapshot-driven engine across symbols.
//!
//! Symbols run independently and may be processed in parallel; passes for
//! one symbol are serialized by that symbol's pipeline mutex. Output goes
//! out over a bounded channel and publishing never blocks a pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gex_core::{
    GexError, OptionsChainSnapshot, PatternStatistics, PatternType, TrackerEvent,
};

use crate::config::EngineConfig;
use crate::dto::{
    DecayTimelineResponse, EngineEvent, GammaSnapshotResponse, PatternEventDto,
    PatternStatisticsDto, StatisticsSummaryResponse,
};
use crate::error::{EngineError, EngineResult};
use crate::feeds::{OpenInterestHistory, VolatilityFeed};
use crate::pipeline::{PipelineOutput, Staleness, SymbolPipeline};

/// Summary of one processed snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub patterns_detected: usize,
    pub patterns_resolved: usize,
    pub skipped_rows: usize,
}

#[derive(Clone)]
pub struct GammaEngine {
    config: Arc<EngineConfig>,
    vix_feed: Arc<dyn VolatilityFeed>,
    oi_history: Arc<dyn OpenInterestHistory>,
    pipelines: Arc<RwLock<HashMap<String, Arc<Mutex<SymbolPipeline>>>>>,
    events: mpsc::Sender<EngineEvent>,
}

impl GammaEngine {
    /// Build an engine and the receiving end of its event stream.
    pub fn new(
        config: EngineConfig,
        vix_feed: Arc<dyn VolatilityFeed>,
        oi_history: Arc<dyn OpenInterestHistory>,
    ) -> EngineResult<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;
        let (events, rx) = mpsc::channel(config.pipeline.event_buffer);
        tracing::info!(
            stale_after_secs = config.pipeline.stale_after_secs,
            staleness_ceiling_secs = config.pipeline.staleness_ceiling_secs,
            event_buffer = config.pipeline.event_buffer,
            "Gamma engine initialized"
        );

        let engine = Self {
            config: Arc::new(config),
            vix_feed,
            oi_history,
            pipelines: Arc::new(RwLock::new(HashMap::new())),
            events,
        };
        Ok((engine, rx))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn pipeline(&self, symbol: &str) -> Arc<Mutex<SymbolPipeline>> {
        if let Some(p) = self.pipelines.read().await.get(symbol) {
            return p.clone();
        }
        let mut pipelines = self.pipelines.write().await;
        pipelines
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SymbolPipeline::new(symbol, &self.config))))
            .clone()
    }

    async fn existing(&self, symbol: &str) -> EngineResult<Arc<Mutex<SymbolPipeline>>> {
        self.pipelines
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| {
                GexError::DataUnavailable {
                    symbol: symbol.to_string(),
                }
                .into()
            })
    }

    fn publish(&self, event: EngineEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                EngineError::Publish(format!(
                    "event channel full, dropped event for {}",
                    event.symbol()
                ))
                .log();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Event receiver dropped, discarding event");
            }
        }
    }

    fn publish_output(&self, output: &PipelineOutput) {
        self.publish(EngineEvent::SnapshotPublished(
            GammaSnapshotResponse::from_output(output, false),
        ));
        self.publish(EngineEvent::DecayTimeline(DecayTimelineResponse::from_report(
            &output.profile.symbol,
            &output.decay,
        )));
        for pattern in &output.detected {
            self.publish(EngineEvent::PatternDetected(PatternEventDto::from(pattern)));
        }
        for pattern in &output.resolved {
            self.publish(EngineEvent::PatternResolved(PatternEventDto::from(pattern)));
        }
    }

    /// Run one full pass for a snapshot. Out-of-order and invalid snapshots
    /// are logged and returned as errors; the symbol's state is untouched.
    pub async fn process_snapshot(&self, snapshot: OptionsChainSnapshot) -> EngineResult<ProcessReport> {
        let pipeline = self.pipeline(&snapshot.symbol).await;
        let mut guard = pipeline.lock().await;

        let vix = self.vix_feed.vix_at(snapshot.timestamp);
        let prior_oi = self
            .oi_history
            .prior_day(&snapshot.symbol, snapshot.timestamp.date_naive());

        let output = match guard.run(&snapshot, vix, prior_oi.as_ref()) {
            Ok(output) => output,
            Err(e) => {
                let err = EngineError::from(e);
                err.log();
                return Err(err);
            }
        };
        // Publish under the lock so one symbol's events keep pass order
        self.publish_output(&output);
        drop(guard);

        Ok(ProcessReport {
            symbol: snapshot.symbol,
            timestamp: snapshot.timestamp,
            patterns_detected: output.detected.len(),
            patterns_resolved: output.resolved.len(),
            skipped_rows: output.profile.skipped_rows.len(),
        })
    }

    /// Process many snapshots: each symbol in timestamp order, symbols in
    /// parallel. Results come back grouped by symbol.
    pub async fn process_batch(
        &self,
        snapshots: Vec<OptionsChainSnapshot>,
    ) -> Vec<EngineResult<ProcessReport>> {
        let mut groups: BTreeMap<String, Vec<OptionsChainSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            groups.entry(snapshot.symbol.clone()).or_default().push(snapshot);
        }

        let handles: Vec<JoinHandle<Vec<EngineResult<ProcessReport>>>> = groups
            .into_values()
            .map(|mut group| {
                group.sort_by_key(|s| s.timestamp);
                let engine = self.clone();
                tokio::spawn(async move {
                    let mut results = Vec::with_capacity(group.len());
                    for snapshot in group {
                        results.push(engine.process_snapshot(snapshot).await);
                    }
                    results
                })
            })
            .collect();

        let mut results = Vec::new();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(group) => results.extend(group),
                Err(e) => {
                    let err = EngineError::Task(e.to_string());
                    err.log();
                    results.push(Err(err));
                }
            }
        }
        results
    }

    /// Feed a price between snapshots; returns how many patterns it resolved.
    pub async fn observe_price(&self, symbol: &str, at: DateTime<Utc>, price: f64) -> EngineResult<usize> {
        let pipeline = self.existing(symbol).await?;
        let mut guard = pipeline.lock().await;
        let resolved = guard.observe_price(at, price);
        for pattern in &resolved {
            self.publish(EngineEvent::PatternResolved(PatternEventDto::from(pattern)));
        }
        Ok(resolved.len())
    }

    /// Mark stale symbols and report the ones that just crossed the
    /// staleness ceiling.
    pub async fn check_staleness(&self, now: DateTime<Utc>) -> Vec<String> {
        let pipelines: Vec<Arc<Mutex<SymbolPipeline>>> =
            self.pipelines.read().await.values().cloned().collect();

        let mut degraded = Vec::new();
        for pipeline in pipelines {
            let mut guard = pipeline.lock().await;
            if let Staleness::Degraded { stale_for_secs } = guard.check_staleness(now) {
                let symbol = guard.symbol().to_string();
                EngineError::Degraded {
                    symbol: symbol.clone(),
                    stale_for_secs,
                }
                .log();
                self.publish(EngineEvent::Degraded {
                    symbol: symbol.clone(),
                    stale_for_secs,
                });
                degraded.push(symbol);
            }
        }
        degraded.sort();
        degraded
    }

    /// Run `check_staleness` every `interval` until cancelled.
    pub fn spawn_staleness_monitor(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Staleness monitor started");
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        engine.check_staleness(Utc::now()).await;
                    }
                }
            }
            tracing::info!("Staleness monitor stopped");
        })
    }

    /// Last published gamma snapshot for a symbol, flagged when stale.
    pub async fn latest(&self, symbol: &str) -> EngineResult<GammaSnapshotResponse> {
        let pipeline = self.existing(symbol).await?;
        let guard = pipeline.lock().await;
        guard
            .last_output()
            .map(|o| GammaSnapshotResponse::from_output(o, guard.is_stale()))
            .ok_or_else(|| {
                GexError::DataUnavailable {
                    symbol: symbol.to_string(),
                }
                .into()
            })
    }

    pub async fn latest_decay(&self, symbol: &str) -> EngineResult<DecayTimelineResponse> {
        let pipeline = self.existing(symbol).await?;
        let guard = pipeline.lock().await;
        guard
            .last_output()
            .map(|o| DecayTimelineResponse::from_report(symbol, &o.decay))
            .ok_or_else(|| {
                GexError::DataUnavailable {
                    symbol: symbol.to_string(),
                }
                .into()
            })
    }

    /// Append-only pattern log for one symbol, for audit persistence.
    pub async fn pattern_log(&self, symbol: &str) -> EngineResult<Vec<TrackerEvent>> {
        let pipeline = self.existing(symbol).await?;
        let events = pipeline.lock().await.tracker().events().to_vec();
        Ok(events)
    }

    /// Take the resolved part of a symbol's pattern log, once persisted
    /// elsewhere, so the tracker only keeps pending detections.
    pub async fn drain_resolved_patterns(&self, symbol: &str) -> EngineResult<Vec<TrackerEvent>> {
        let pipeline = self.existing(symbol).await?;
        let drained = pipeline.lock().await.drain_resolved_events();
        Ok(drained)
    }

    /// Rebuild a symbol's outcome tracker from a persisted pattern log.
    pub async fn restore_pattern_log(&self, symbol: &str, events: Vec<TrackerEvent>) {
        let pipeline = self.pipeline(symbol).await;
        pipeline.lock().await.restore_events(events);
    }

    pub async fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.pipelines.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Pattern statistics merged across symbols, one entry per pattern type.
    pub async fn statistics_summary(&self) -> StatisticsSummaryResponse {
        let config = &self.config.outcomes;
        let mut merged: BTreeMap<PatternType, PatternStatistics> = PatternType::ALL
            .into_iter()
            .map(|pt| (pt, PatternStatistics::new(pt, config.sample_window, config.min_samples)))
            .collect();

        let pipelines: Vec<Arc<Mutex<SymbolPipeline>>> =
            self.pipelines.read().await.values().cloned().collect();
        for pipeline in &pipelines {
            let guard = pipeline.lock().await;
            for stats in guard.tracker().statistics() {
                if let Some(total) = merged.get_mut(&stats.pattern_type) {
                    total.merge(&stats);
                }
            }
        }

        StatisticsSummaryResponse {
            symbols: pipelines.len(),
            patterns: merged.values().map(PatternStatisticsDto::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::{NoOpenInterestHistory, StaticVolatility};
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone};
    use gex_core::{OptionRow, OptionType, PatternOutcome};
    use tokio_test::{assert_err, assert_ok};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 15, 0, 0).unwrap() + ChronoDuration::minutes(minute)
    }

    fn row(strike: f64, day: u32, call_oi: u64, put_oi: u64, option_type: OptionType) -> OptionRow {
        OptionRow {
            strike,
            expiration_date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            call_open_interest: call_oi,
            put_open_interest: put_oi,
            implied_volatility: Some(0.16),
            option_type,
        }
    }

    /// A large call position at 585 expiring today, with spot sitting on it.
    fn pin_snapshot(symbol: &str, minute: i64, spot: f64) -> OptionsChainSnapshot {
        OptionsChainSnapshot {
            symbol: symbol.to_string(),
            timestamp: at(minute),
            spot_price: spot,
            rows: vec![
                row(570.0, 21, 0, 5_000, OptionType::Put),
                row(585.0, 10, 60_000, 0, OptionType::Call),
                row(600.0, 21, 3_000, 0, OptionType::Call),
            ],
        }
    }

    fn engine_with(config: EngineConfig) -> (GammaEngine, mpsc::Receiver<EngineEvent>) {
        GammaEngine::new(
            config,
            Arc::new(StaticVolatility(16.0)),
            Arc::new(NoOpenInterestHistory),
        )
        .unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_snapshot_publishes_levels_regime_and_decay() {
        let (engine, mut rx) = engine_with(EngineConfig::default());
        let report = assert_ok!(engine.process_snapshot(pin_snapshot("SPY", 0, 585.2)).await);
        assert_eq!(report.skipped_rows, 0);

        let events = drain(&mut rx);
        assert!(matches!(events[0], EngineEvent::SnapshotPublished(_)));
        assert!(matches!(events[1], EngineEvent::DecayTimeline(_)));

        let latest = assert_ok!(engine.latest("SPY").await);
        assert_eq!(latest.strikes.len(), 3);
        assert!(!latest.stale);
        let sum: f64 = latest.strikes.iter().map(|s| s.net_gamma).sum();
        assert!((sum - latest.total_net_gamma).abs() <= latest.total_net_gamma.abs() * 1e-9);
    }

    #[tokio::test]
    async fn test_pin_detected_and_resolved() {
        let mut config = EngineConfig::default();
        config.outcomes.horizon_bars = 2;
        let (engine, mut rx) = engine_with(config);

        let report = assert_ok!(engine.process_snapshot(pin_snapshot("SPY", 0, 585.2)).await);
        assert_eq!(report.patterns_detected, 1);
        let detected: Vec<PatternEventDto> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::PatternDetected(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(detected[0].pattern_type, PatternType::PinRisk);

        assert_eq!(assert_ok!(engine.observe_price("SPY", at(5), 585.6).await), 0);
        assert_eq!(assert_ok!(engine.observe_price("SPY", at(10), 585.3).await), 1);

        let resolved = drain(&mut rx);
        match &resolved[0] {
            EngineEvent::PatternResolved(p) => {
                assert_eq!(p.id, detected[0].id);
                assert_eq!(p.outcome, Some(PatternOutcome::Succeeded));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_passes_publish_in_order() {
        let (engine, mut rx) = engine_with(EngineConfig::default());

        let handles: Vec<_> = (0..40i64)
            .map(|minute| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.process_snapshot(pin_snapshot("SPY", minute, 585.2)).await })
            })
            .collect();
        let mut accepted = 0;
        for joined in futures::future::join_all(handles).await {
            if assert_ok!(joined).is_ok() {
                accepted += 1;
            }
        }

        let published: Vec<DateTime<Utc>> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::SnapshotPublished(s) => Some(s.timestamp),
                _ => None,
            })
            .collect();
        assert_eq!(published.len(), accepted);
        assert!(published.windows(2).all(|w| w[0] < w[1]), "out of order: {published:?}");
    }

    #[tokio::test]
    async fn test_replayed_snapshot_is_discarded() {
        let (engine, _rx) = engine_with(EngineConfig::default());
        assert_ok!(engine.process_snapshot(pin_snapshot("SPY", 0, 585.2)).await);

        let err = assert_err!(engine.process_snapshot(pin_snapshot("SPY", 0, 585.2)).await);
        assert_eq!(err.code(), "ORDERING_VIOLATION");
        let err = assert_err!(engine.process_snapshot(pin_snapshot("SPY", -5, 585.2)).await);
        assert_eq!(err.code(), "ORDERING_VIOLATION");

        let summary = engine.statistics_summary().await;
        let pin = summary
            .patterns
            .iter()
            .find(|s| s.pattern_type == PatternType::PinRisk)
            .unwrap();
        assert_eq!(pin.occurrences, 1);
        assert!(pin.low_confidence);
        assert_eq!(summary.patterns.len(), 5);
    }

    #[tokio::test]
    async fn test_batch_orders_each_symbol() {
        let (engine, _rx) = engine_with(EngineConfig::default());
        let results = engine
            .process_batch(vec![
                pin_snapshot("SPY", 10, 585.1),
                pin_snapshot("QQQ", 0, 585.0),
                pin_snapshot("SPY", 0, 585.2),
                pin_snapshot("SPY", 5, 585.3),
            ])
            .await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(engine.symbols().await, vec!["QQQ".to_string(), "SPY".to_string()]);
        assert_eq!(assert_ok!(engine.latest("SPY").await).timestamp, at(10));
    }

    #[tokio::test]
    async fn test_staleness_degrades_once() {
        let (engine, mut rx) = engine_with(EngineConfig::default());
        assert_ok!(engine.process_snapshot(pin_snapshot("SPY", 0, 585.2)).await);
        drain(&mut rx);

        assert!(engine.check_staleness(at(6)).await.is_empty());
        assert!(assert_ok!(engine.latest("SPY").await).stale);

        assert_eq!(engine.check_staleness(at(31)).await, vec!["SPY".to_string()]);
        assert!(engine.check_staleness(at(45)).await.is_empty());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], EngineEvent::Degraded { .. }));
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_unavailable() {
        let (engine, _rx) = engine_with(EngineConfig::default());
        let err = assert_err!(engine.latest("IWM").await);
        assert_eq!(err.code(), "DATA_UNAVAILABLE");
        assert_err!(engine.observe_price("IWM", at(0), 200.0).await);
    }

    #[tokio::test]
    async fn test_full_channel_never_blocks() {
        let mut config = EngineConfig::default();
        config.pipeline.event_buffer = 1;
        let (engine, mut rx) = engine_with(config);

        for minute in [0, 5, 10] {
            assert_ok!(engine.process_snapshot(pin_snapshot("SPY", minute, 585.2)).await);
        }
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_pattern_log_restores_statistics() {
        let (engine, _rx) = engine_with(EngineConfig::default());
        assert_ok!(engine.process_snapshot(pin_snapshot("SPY", 0, 585.2)).await);
        let log = assert_ok!(engine.pattern_log("SPY").await);
        assert_eq!(log.len(), 1);

        let (restored, _rx2) = engine_with(EngineConfig::default());
        restored.restore_pattern_log("SPY", log.clone()).await;
        restored.restore_pattern_log("SPY", log).await;
        let before = engine.statistics_summary().await;
        let after = restored.statistics_summary().await;
        assert_eq!(before.patterns, after.patterns);
    }

    #[tokio::test]
    async fn test_drained_log_leaves_statistics() {
        let mut config = EngineConfig::default();
        config.outcomes.horizon_bars = 1;
        let (engine, _rx) = engine_with(config);
        assert_ok!(engine.process_snapshot(pin_snapshot("SPY", 0, 585.2)).await);
        assert_eq!(assert_ok!(engine.observe_price("SPY", at(5), 585.3).await), 1);

        let before = engine.statistics_summary().await;
        let drained = assert_ok!(engine.drain_resolved_patterns("SPY").await);
        assert_eq!(drained.len(), 2);
        assert!(assert_ok!(engine.pattern_log("SPY").await).is_empty());
        assert_eq!(engine.statistics_summary().await.patterns, before.patterns);

        assert_ok!(engine.process_snapshot(pin_snapshot("SPY", 10, 585.2)).await);
        assert_err!(engine.drain_resolved_patterns("IWM").await);
    }

    #[tokio::test]
    async fn test_staleness_monitor_stops_on_cancel() {
        let (engine, _rx) = engine_with(EngineConfig::default());
        let cancel = CancellationToken::new();
        let handle = engine.spawn_staleness_monitor(Duration::from_millis(10), cancel.clone());
        cancel.cancel();
        assert_ok!(handle.await);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.levels.magnet_count = 0;
        let result = GammaEngine::new(
            config,
            Arc::new(StaticVolatility(16.0)),
            Arc::new(NoOpenInterestHistory),
        );
        assert!(matches!(result, Err(EngineError::Core(GexError::InvalidConfig(_)))));
    }
}
