//! Expiration decay analysis
//!
//! Buckets a gamma profile by expiration date and projects how much exposure
//! rolls off on each date. Percentages are shares of the profile's gross
//! gamma (sum of |net_gamma| over every row), so the buckets always
//! partition the whole profile.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{GexError, GexResult};
use crate::models::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// How far forward the published timeline reaches
    pub horizon_days: i64,
    /// A bucket above this share of total gamma is high-impact
    pub high_impact_threshold_pct: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            horizon_days: 14,
            high_impact_threshold_pct: 25.0,
        }
    }
}

impl DecayConfig {
    pub fn validate(&self) -> GexResult<()> {
        if self.horizon_days <= 0 {
            return Err(GexError::InvalidConfig(
                "decay.horizon_days must be positive".into(),
            ));
        }
        if !(0.0..100.0).contains(&self.high_impact_threshold_pct) {
            return Err(GexError::InvalidConfig(format!(
                "decay.high_impact_threshold_pct out of range: {}",
                self.high_impact_threshold_pct
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirationDecayReport {
    pub as_of: NaiveDate,
    pub horizon_days: i64,
    pub high_impact_threshold_pct: f64,
    /// Denominator of every `pct_of_total`
    pub total_gamma: f64,
    /// Every expiration in the profile, ascending
    pub buckets: Vec<ExpirationBucket>,
    pub high_impact_dates: Vec<NaiveDate>,
}

impl ExpirationDecayReport {
    /// Buckets from today through the horizon.
    pub fn timeline(&self) -> impl Iterator<Item = &ExpirationBucket> {
        self.buckets.iter().filter(|b| b.within_horizon)
    }

    pub fn bucket(&self, date: NaiveDate) -> Option<&ExpirationBucket> {
        self.buckets.iter().find(|b| b.expiration_date == date)
    }

    /// Earliest high-impact bucket expiring within `days`.
    pub fn next_high_impact_within(&self, days: i64) -> Option<&ExpirationBucket> {
        self.buckets
            .iter()
            .find(|b| b.high_impact && b.days_to_expiry >= 0 && b.days_to_expiry <= days)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[derive(Default)]
struct DateAccumulator {
    gross: f64,
    net: f64,
    /// Contracts, as a weight
    open_interest: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ExpirationDecayAnalyzer {
    config: DecayConfig,
}

impl ExpirationDecayAnalyzer {
    pub fn new(config: DecayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    pub fn analyze(&self, profile: &GammaProfile) -> ExpirationDecayReport {
        let as_of = profile.as_of();

        // Same-date rows aggregate; each row is one (strike, expiration) so no
        // strike is counted twice.
        let mut by_date: BTreeMap<NaiveDate, DateAccumulator> = BTreeMap::new();
        for row in &profile.rows {
            let acc = by_date.entry(row.expiration_date).or_default();
            acc.gross += row.net_gamma.abs();
            acc.net += row.net_gamma;
            acc.open_interest += row.open_interest_total as f64;
        }

        let total_gamma: f64 = by_date.values().map(|a| a.gross).sum();
        let total_oi: f64 = by_date.values().map(|a| a.open_interest).sum();
        // Perfectly hedged rows carry no net gamma; fall back to OI weights
        let use_oi = total_gamma <= 0.0 && total_oi > 0.0;

        let mut buckets = Vec::with_capacity(by_date.len());
        let mut cumulative_pct = 0.0;
        let mut remaining_net = profile.total_net_gamma;

        for (date, acc) in by_date {
            let pct_of_total = if use_oi {
                acc.open_interest / total_oi * 100.0
            } else if total_gamma > 0.0 {
                acc.gross / total_gamma * 100.0
            } else {
                0.0
            };
            cumulative_pct += pct_of_total;
            remaining_net -= acc.net;
            let days_to_expiry = (date - as_of).num_days();

            buckets.push(ExpirationBucket {
                expiration_date: date,
                days_to_expiry,
                gamma_expiring: acc.gross,
                net_gamma_expiring: acc.net,
                pct_of_total,
                cumulative_pct,
                projected_net_gamma_after: remaining_net,
                high_impact: pct_of_total > self.config.high_impact_threshold_pct,
                within_horizon: days_to_expiry >= 0 && days_to_expiry <= self.config.horizon_days,
            });
        }

        let high_impact_dates: Vec<NaiveDate> = buckets
            .iter()
            .filter(|b| b.high_impact)
            .map(|b| b.expiration_date)
            .collect();

        debug!(
            symbol = %profile.symbol,
            expirations = buckets.len(),
            high_impact = high_impact_dates.len(),
            "Decay timeline computed"
        );

        ExpirationDecayReport {
            as_of,
            horizon_days: self.config.horizon_days,
            high_impact_threshold_pct: self.config.high_impact_threshold_pct,
            total_gamma,
            buckets,
            high_impact_dates,
        }
    }
}

/// How much of one strike's exposure expires inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeDecayShare {
    pub strike: f64,
    pub gamma_share_pct: f64,
    pub call_oi_share_pct: f64,
    pub put_oi_share_pct: f64,
    /// Earliest qualifying expiration carrying this strike
    pub earliest_date: Option<NaiveDate>,
    pub earliest_days_to_expiry: Option<i64>,
}

pub fn strike_decay_share(
    profile: &GammaProfile,
    report: &ExpirationDecayReport,
    strike: f64,
    within_days: i64,
    high_impact_only: bool,
) -> Option<StrikeDecayShare> {
    let as_of = profile.as_of();
    let qualifies = |date: NaiveDate| {
        let dte = (date - as_of).num_days();
        dte >= 0
            && dte <= within_days
            && (!high_impact_only || report.bucket(date).is_some_and(|b| b.high_impact))
    };

    let mut gamma_all = 0.0;
    let mut gamma_in = 0.0;
    let (mut call_all, mut call_in, mut put_all, mut put_in) = (0u64, 0u64, 0u64, 0u64);
    let mut earliest: Option<NaiveDate> = None;
    let mut seen = false;

    for row in profile.rows_at(strike) {
        seen = true;
        gamma_all += row.net_gamma.abs();
        call_all = call_all.saturating_add(row.call_open_interest);
        put_all = put_all.saturating_add(row.put_open_interest);
        if qualifies(row.expiration_date) {
            gamma_in += row.net_gamma.abs();
            call_in = call_in.saturating_add(row.call_open_interest);
            put_in = put_in.saturating_add(row.put_open_interest);
            earliest = Some(earliest.map_or(row.expiration_date, |d| d.min(row.expiration_date)));
        }
    }

    if !seen {
        return None;
    }

    let share = |part: f64, whole: f64| if whole > 0.0 { part / whole * 100.0 } else { 0.0 };
    Some(StrikeDecayShare {
        strike,
        gamma_share_pct: share(gamma_in, gamma_all),
        call_oi_share_pct: share(call_in as f64, call_all as f64),
        put_oi_share_pct: share(put_in as f64, put_all as f64),
        earliest_date: earliest,
        earliest_days_to_expiry: earliest.map(|d| (d - as_of).num_days()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn profile(rows: Vec<StrikeGammaRow>) -> GammaProfile {
        let ts = Utc.with_ymd_and_hms(2024, 6, 10, 15, 0, 0).unwrap();
        GammaProfile::from_rows("SPY", ts, 585.0, rows)
    }

    fn call_row(strike: f64, exp: NaiveDate, gamma: f64) -> StrikeGammaRow {
        StrikeGammaRow::new(strike, exp, gamma, 0.0, 1_000, 0)
    }

    fn put_row(strike: f64, exp: NaiveDate, gamma: f64) -> StrikeGammaRow {
        StrikeGammaRow::new(strike, exp, 0.0, gamma, 0, 1_000)
    }

    #[test]
    fn test_buckets_partition_total() {
        let p = profile(vec![
            call_row(590.0, date(10), 1.3e8),
            put_row(580.0, date(12), 2.7e8),
            call_row(590.0, date(14), 0.4e8),
            put_row(575.0, date(21), 5.9e8),
        ]);
        let report = ExpirationDecayAnalyzer::default().analyze(&p);

        let sum: f64 = report.buckets.iter().map(|b| b.pct_of_total).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        let last = report.buckets.last().unwrap();
        assert!((last.cumulative_pct - 100.0).abs() < 1e-9);
        assert!(last.projected_net_gamma_after.abs() < 1e-3);
    }

    #[test]
    fn test_extreme_open_interest_keeps_partition() {
        let p = profile(vec![
            StrikeGammaRow::new(585.0, date(10), 0.0, 0.0, u64::MAX, u64::MAX),
            StrikeGammaRow::new(590.0, date(14), 0.0, 0.0, u64::MAX, 0),
        ]);
        assert_eq!(p.rows[0].open_interest_total, u64::MAX);

        let report = ExpirationDecayAnalyzer::default().analyze(&p);
        let sum: f64 = report.buckets.iter().map(|b| b.pct_of_total).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert_eq!(p.strike_exposures()[0].open_interest, u64::MAX);

        let share = strike_decay_share(&p, &report, 585.0, 7, false).unwrap();
        assert!((share.call_oi_share_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_thirty_five_percent_bucket_is_flagged() {
        let p = profile(vec![
            call_row(590.0, date(10), 3.5e8),
            put_row(580.0, date(12), 2.0e8),
            call_row(595.0, date(14), 2.0e8),
            put_row(570.0, date(17), 2.5e8),
        ]);
        let report = ExpirationDecayAnalyzer::default().analyze(&p);

        let first = report.bucket(date(10)).unwrap();
        assert!((first.pct_of_total - 35.0).abs() < 1e-9);
        assert!(first.high_impact);
        // exactly at the threshold does not exceed it
        assert!(!report.bucket(date(17)).unwrap().high_impact);
        assert_eq!(report.high_impact_dates, vec![date(10)]);
    }

    #[test]
    fn test_same_date_rows_aggregate() {
        let p = profile(vec![
            call_row(590.0, date(14), 1.0e8),
            put_row(580.0, date(14), 1.0e8),
            call_row(600.0, date(21), 2.0e8),
        ]);
        let report = ExpirationDecayAnalyzer::default().analyze(&p);

        assert_eq!(report.buckets.len(), 2);
        let b = report.bucket(date(14)).unwrap();
        assert!((b.gamma_expiring - 2.0e8).abs() < 1e-3);
        assert!(b.net_gamma_expiring.abs() < 1e-3);
        assert!((b.pct_of_total - 50.0).abs() < 1e-9);
        assert_eq!(b.days_to_expiry, 4);
    }

    #[test]
    fn test_projection_tracks_remaining_net_gamma() {
        let p = profile(vec![
            call_row(590.0, date(10), 3.0e8),
            put_row(580.0, date(21), 1.0e8),
        ]);
        let report = ExpirationDecayAnalyzer::default().analyze(&p);

        // the call-heavy date rolls off first and leaves negative gamma
        let first = report.bucket(date(10)).unwrap();
        assert!((first.projected_net_gamma_after + 1.0e8).abs() < 1e-3);
    }

    #[test]
    fn test_horizon_limits_timeline_not_buckets() {
        let p = profile(vec![
            call_row(590.0, date(11), 1.0e8),
            call_row(590.0, date(28), 1.0e8),
        ]);
        let report = ExpirationDecayAnalyzer::new(DecayConfig {
            horizon_days: 7,
            ..Default::default()
        })
        .analyze(&p);

        assert_eq!(report.buckets.len(), 2);
        assert_eq!(report.timeline().count(), 1);
    }

    #[test]
    fn test_empty_profile_has_no_buckets() {
        let report = ExpirationDecayAnalyzer::default().analyze(&profile(vec![]));
        assert!(report.is_empty());
        assert_eq!(report.total_gamma, 0.0);
    }

    #[test]
    fn test_hedged_rows_fall_back_to_open_interest() {
        let p = profile(vec![
            StrikeGammaRow::new(585.0, date(12), 1.0e8, 1.0e8, 300, 100),
            StrikeGammaRow::new(585.0, date(19), 2.0e8, 2.0e8, 100, 100),
        ]);
        let report = ExpirationDecayAnalyzer::default().analyze(&p);
        let sum: f64 = report.buckets.iter().map(|b| b.pct_of_total).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert!((report.bucket(date(12)).unwrap().pct_of_total - 66.666_666).abs() < 1e-3);
    }

    #[test]
    fn test_strike_decay_share() {
        let p = profile(vec![
            put_row(580.0, date(11), 3.0e8),
            put_row(580.0, date(28), 1.0e8),
            call_row(600.0, date(28), 0.5e8),
        ]);
        let report = ExpirationDecayAnalyzer::default().analyze(&p);

        let share = strike_decay_share(&p, &report, 580.0, 5, true).unwrap();
        assert!((share.gamma_share_pct - 75.0).abs() < 1e-9);
        assert!((share.put_oi_share_pct - 50.0).abs() < 1e-9);
        assert_eq!(share.earliest_date, Some(date(11)));
        assert_eq!(share.earliest_days_to_expiry, Some(1));

        assert!(strike_decay_share(&p, &report, 612.0, 5, false).is_none());
    }
}
