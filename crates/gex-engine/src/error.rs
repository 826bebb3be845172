use gex_core::GexError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] GexError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Symbol {symbol} degraded: no snapshot for {stale_for_secs}s")]
    Degraded { symbol: String, stale_for_secs: u64 },

    #[error("Task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// Stable code for dashboards and alerting.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Core(GexError::DataUnavailable { .. }) => "DATA_UNAVAILABLE",
            EngineError::Core(GexError::RowCalculation(_)) => "ROW_CALCULATION",
            EngineError::Core(GexError::InsufficientHistory { .. }) => "INSUFFICIENT_HISTORY",
            EngineError::Core(GexError::OrderingViolation { .. }) => "ORDERING_VIOLATION",
            EngineError::Core(GexError::InvalidSnapshot(_)) => "INVALID_SNAPSHOT",
            EngineError::Core(GexError::InvalidConfig(_)) => "CONFIG_ERROR",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
            EngineError::Publish(_) => "PUBLISH_ERROR",
            EngineError::Degraded { .. } => "DEGRADED",
            EngineError::Task(_) => "TASK_ERROR",
        }
    }

    /// Emit one structured event at the level this error deserves.
    pub fn log(&self) {
        let code = self.code();
        match self {
            EngineError::Core(GexError::DataUnavailable { symbol }) => {
                tracing::info!(symbol = %symbol, error_code = code, "No data for symbol");
            }
            EngineError::Core(GexError::RowCalculation(e)) => {
                tracing::debug!(strike = e.strike, reason = %e.reason, error_code = code, "Row skipped");
            }
            EngineError::Core(GexError::InsufficientHistory {
                pattern_type,
                samples,
                required,
            }) => {
                tracing::debug!(
                    pattern_type = %pattern_type,
                    samples = samples,
                    required = required,
                    error_code = code,
                    "Insufficient pattern history"
                );
            }
            EngineError::Core(GexError::OrderingViolation {
                symbol,
                last_processed,
                received,
            }) => {
                tracing::warn!(
                    symbol = %symbol,
                    last_processed = %last_processed,
                    received = %received,
                    error_code = code,
                    "Out-of-order snapshot discarded"
                );
            }
            EngineError::Core(GexError::InvalidSnapshot(msg)) => {
                tracing::warn!(message = %msg, error_code = code, "Invalid snapshot rejected");
            }
            EngineError::Core(GexError::InvalidConfig(msg)) => {
                tracing::error!(message = %msg, error_code = code, "Configuration error");
            }
            EngineError::Config(e) => {
                tracing::error!(error = %e, error_code = code, "Configuration error");
            }
            EngineError::Serialization(e) => {
                tracing::error!(error = %e, error_code = code, "Serialization failed");
            }
            EngineError::Publish(msg) => {
                tracing::warn!(message = %msg, error_code = code, "Event not published");
            }
            EngineError::Degraded {
                symbol,
                stale_for_secs,
            } => {
                tracing::error!(
                    symbol = %symbol,
                    stale_for_secs = stale_for_secs,
                    error_code = code,
                    "Symbol degraded, data unavailable beyond staleness ceiling"
                );
            }
            EngineError::Task(msg) => {
                tracing::error!(message = %msg, error_code = code, "Pipeline task failed");
            }
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
