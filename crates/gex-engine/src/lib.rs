//! GEX Engine
//!
//! Async service layer over `gex-core`: one pipeline per symbol, snapshots
//! processed in order, results published on a bounded event channel.

pub mod config;
pub mod dto;
pub mod engine;
pub mod error;
pub mod feeds;
pub mod pipeline;
pub mod telemetry;

pub use config::{EngineConfig, PipelineSettings};
pub use dto::{
    DecayTimelineResponse, EngineEvent, GammaSnapshotResponse, PatternEventDto,
    PatternStatisticsDto, StatisticsSummaryResponse,
};
pub use engine::{GammaEngine, ProcessReport};
pub use error::{EngineError, EngineResult};
pub use feeds::{
    InMemoryOpenInterest, NoOpenInterestHistory, OpenInterestHistory, StaticVolatility,
    VolatilityFeed, WatchVolatility,
};
pub use pipeline::{PipelineOutput, Staleness, SymbolPipeline};
pub use telemetry::init_tracing;
