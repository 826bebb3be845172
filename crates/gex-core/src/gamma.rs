//! Gamma calculator
//!
//! Turns an options-chain snapshot into per-strike dollar gamma using the
//! Black-Scholes gamma. Dealers are modeled long calls and short puts, so
//! call gamma counts positive and put gamma negative.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::error::{GexError, GexResult, RowCalculationError, RowSkipReason};
use crate::models::*;

pub const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// Largest open interest a single chain row may carry, per side. Keeps every
/// downstream open-interest sum far from `u64` overflow.
pub const MAX_ROW_OPEN_INTEREST: u64 = 1_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GammaConfig {
    /// Shares per contract
    pub contract_multiplier: f64,
    pub risk_free_rate: f64,
    /// Lower clamp for time to expiry, in years
    pub min_time_to_expiry_years: f64,
    /// Hour (UTC) at which an expiration date settles
    pub expiry_hour_utc: u32,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            contract_multiplier: 100.0,
            risk_free_rate: 0.0,
            min_time_to_expiry_years: 60.0 / SECONDS_PER_YEAR,
            expiry_hour_utc: 20,
        }
    }
}

impl GammaConfig {
    pub fn validate(&self) -> GexResult<()> {
        if self.contract_multiplier <= 0.0 {
            return Err(GexError::InvalidConfig(format!(
                "gamma.contract_multiplier must be positive, got {}",
                self.contract_multiplier
            )));
        }
        if self.min_time_to_expiry_years <= 0.0 {
            return Err(GexError::InvalidConfig(
                "gamma.min_time_to_expiry_years must be positive".into(),
            ));
        }
        if self.expiry_hour_utc > 23 {
            return Err(GexError::InvalidConfig(format!(
                "gamma.expiry_hour_utc out of range: {}",
                self.expiry_hour_utc
            )));
        }
        Ok(())
    }
}

/// Standard normal PDF
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes gamma (identical for calls and puts).
pub fn black_scholes_gamma(spot: f64, strike: f64, years: f64, iv: f64, rate: f64) -> f64 {
    let sqrt_t = years.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * iv * iv) * years) / (iv * sqrt_t);
    norm_pdf(d1) / (spot * iv * sqrt_t)
}

/// Dollar gamma for a 1% move: `gamma × S² × 0.01 × multiplier × OI`.
pub fn dollar_gamma(gamma: f64, spot: f64, open_interest: u64, multiplier: f64) -> f64 {
    gamma * spot * spot * 0.01 * multiplier * open_interest as f64
}

/// Instant at which an expiration date settles.
pub fn expiry_instant(date: NaiveDate, expiry_hour_utc: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(expiry_hour_utc.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

/// Years from `now` to settlement, clamped to the configured minimum.
/// `None` when the expiration date is already in the past.
pub fn time_to_expiry_years(
    now: DateTime<Utc>,
    expiration_date: NaiveDate,
    config: &GammaConfig,
) -> Option<f64> {
    if expiration_date < now.date_naive() {
        return None;
    }
    let seconds = (expiry_instant(expiration_date, config.expiry_hour_utc) - now).num_seconds();
    Some((seconds as f64 / SECONDS_PER_YEAR).max(config.min_time_to_expiry_years))
}

#[derive(Default)]
struct RowAccumulator {
    call_gamma: f64,
    put_gamma: f64,
    call_oi: u64,
    put_oi: u64,
}

#[derive(Debug, Clone, Default)]
pub struct GammaCalculator {
    config: GammaConfig,
}

impl GammaCalculator {
    pub fn new(config: GammaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GammaConfig {
        &self.config
    }

    /// Compute the gamma profile for a snapshot.
    ///
    /// Bad rows are skipped and reported in `skipped_rows`; only a bad spot
    /// price fails the whole snapshot.
    pub fn compute(&self, snapshot: &OptionsChainSnapshot) -> GexResult<GammaProfile> {
        let spot = snapshot.spot_price;
        if !spot.is_finite() || spot <= 0.0 {
            return Err(GexError::InvalidSnapshot(format!(
                "{} spot price {} at {}",
                snapshot.symbol, spot, snapshot.timestamp
            )));
        }

        let mut buckets: BTreeMap<(i64, NaiveDate), (f64, RowAccumulator)> = BTreeMap::new();
        let mut skipped = Vec::new();

        for row in &snapshot.rows {
            let call_oi = row.effective_call_oi();
            let put_oi = row.effective_put_oi();
            if call_oi == 0 && put_oi == 0 {
                continue;
            }

            let (call_gamma, put_gamma) = match self.row_gamma(row, spot, snapshot.timestamp) {
                Ok(gamma) => (
                    dollar_gamma(gamma, spot, call_oi, self.config.contract_multiplier),
                    dollar_gamma(gamma, spot, put_oi, self.config.contract_multiplier),
                ),
                Err(e) => {
                    tracing::debug!(
                        symbol = %snapshot.symbol,
                        strike = row.strike,
                        expiration = %row.expiration_date,
                        reason = %e.reason,
                        "Skipping chain row"
                    );
                    skipped.push(e);
                    continue;
                }
            };

            let (_, acc) = buckets
                .entry((strike_key(row.strike), row.expiration_date))
                .or_insert_with(|| (row.strike, RowAccumulator::default()));
            acc.call_gamma += call_gamma;
            acc.put_gamma += put_gamma;
            acc.call_oi = acc.call_oi.saturating_add(call_oi);
            acc.put_oi = acc.put_oi.saturating_add(put_oi);
        }

        let rows: Vec<StrikeGammaRow> = buckets
            .into_iter()
            .map(|((_, expiration), (strike, acc))| {
                StrikeGammaRow::new(
                    strike,
                    expiration,
                    acc.call_gamma,
                    acc.put_gamma,
                    acc.call_oi,
                    acc.put_oi,
                )
            })
            .collect();

        if !skipped.is_empty() {
            tracing::warn!(
                symbol = %snapshot.symbol,
                timestamp = %snapshot.timestamp,
                skipped = skipped.len(),
                computed = rows.len(),
                "Gamma rows skipped"
            );
        }

        let mut profile =
            GammaProfile::from_rows(snapshot.symbol.clone(), snapshot.timestamp, spot, rows);
        profile.skipped_rows = skipped;

        tracing::debug!(
            symbol = %profile.symbol,
            rows = profile.rows.len(),
            total_net_gamma = profile.total_net_gamma,
            "Gamma profile computed"
        );

        Ok(profile)
    }

    fn row_gamma(
        &self,
        row: &OptionRow,
        spot: f64,
        now: DateTime<Utc>,
    ) -> Result<f64, RowCalculationError> {
        let skip = |reason| RowCalculationError {
            strike: row.strike,
            expiration_date: row.expiration_date,
            reason,
        };

        if !row.strike.is_finite() || row.strike <= 0.0 {
            return Err(skip(RowSkipReason::InvalidStrike));
        }
        if row.effective_call_oi() > MAX_ROW_OPEN_INTEREST
            || row.effective_put_oi() > MAX_ROW_OPEN_INTEREST
        {
            return Err(skip(RowSkipReason::InvalidOpenInterest));
        }
        let iv = match row.implied_volatility {
            None => return Err(skip(RowSkipReason::MissingVolatility)),
            Some(iv) if !iv.is_finite() || iv <= 0.0 => {
                return Err(skip(RowSkipReason::NonPositiveVolatility))
            }
            Some(iv) => iv,
        };
        let years = time_to_expiry_years(now, row.expiration_date, &self.config)
            .ok_or_else(|| skip(RowSkipReason::Expired))?;

        Ok(black_scholes_gamma(
            spot,
            row.strike,
            years,
            iv,
            self.config.risk_free_rate,
        ))
    }
}
