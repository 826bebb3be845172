use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use gex_core::{
    DecayConfig, GammaConfig, GexError, GexResult, LevelConfig, MomentumConfig, OutcomeConfig,
    PatternConfig, RegimeConfig,
};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub pipeline: PipelineSettings,
    pub gamma: GammaConfig,
    pub levels: LevelConfig,
    pub regime: RegimeConfig,
    pub decay: DecayConfig,
    pub momentum: MomentumConfig,
    pub patterns: PatternConfig,
    pub outcomes: OutcomeConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineSettings {
    /// Seconds without a snapshot before a symbol is marked stale
    pub stale_after_secs: u64,
    /// Seconds without a snapshot before a symbol is reported degraded
    pub staleness_ceiling_secs: u64,
    /// Price points kept per symbol for momentum
    pub price_history_len: usize,
    /// VIX used when the feed has never produced a value
    pub fallback_vix: f64,
    /// Capacity of the outbound event channel
    pub event_buffer: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
            staleness_ceiling_secs: 1800,
            price_history_len: 120,
            fallback_vix: 20.0,
            event_buffer: 1024,
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Pipeline defaults; per-module defaults come from serde
            .set_default("pipeline.stale_after_secs", 300)?
            .set_default("pipeline.staleness_ceiling_secs", 1800)?
            .set_default("pipeline.price_history_len", 120)?
            .set_default("pipeline.fallback_vix", 20.0)?
            .set_default("pipeline.event_buffer", 1024)?
            // Load from config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (GEX__LEVELS__MAGNET_COUNT, etc.)
            .add_source(
                Environment::with_prefix("GEX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> GexResult<()> {
        self.gamma.validate()?;
        self.levels.validate()?;
        self.regime.validate()?;
        self.decay.validate()?;
        self.momentum.validate()?;
        self.patterns.validate()?;
        self.outcomes.validate()?;

        let p = &self.pipeline;
        if p.stale_after_secs == 0 || p.staleness_ceiling_secs < p.stale_after_secs {
            return Err(GexError::InvalidConfig(format!(
                "pipeline staleness window invalid: stale_after={}s ceiling={}s",
                p.stale_after_secs, p.staleness_ceiling_secs
            )));
        }
        if p.price_history_len <= self.momentum.max_lookback() {
            return Err(GexError::InvalidConfig(format!(
                "pipeline.price_history_len ({}) must exceed the longest momentum lookback ({})",
                p.price_history_len,
                self.momentum.max_lookback()
            )));
        }
        if p.event_buffer == 0 {
            return Err(GexError::InvalidConfig("pipeline.event_buffer must be at least 1".into()));
        }
        if !p.fallback_vix.is_finite() || p.fallback_vix <= 0.0 {
            return Err(GexError::InvalidConfig(format!(
                "pipeline.fallback_vix must be positive, got {}",
                p.fallback_vix
            )));
        }
        Ok(())
    }
}
