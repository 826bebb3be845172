//! Tracing setup for hosts embedding the engine.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "gex_engine=info,gex_core=info";

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(default_filter: Option<&str>) -> bool {
    let fallback = default_filter.unwrap_or(DEFAULT_FILTER).to_string();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init()
        .is_ok()
}
