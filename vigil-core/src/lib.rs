//! Vigil Core Library
//!
//! Bounded-concurrency VM telemetry collection: batch scraping of domain
//! stats, background sampling of live migrations, and conversion of both
//! into Prometheus metrics.

pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod inventory;
pub mod migration;
pub mod observability;
pub mod paths;
pub mod report;
pub mod stats;
pub mod types;

// Re-export commonly used items
pub use collector::{
    BufferSink, ChannelSink, CollectOutcome, ConcurrentCollector, ScrapeResult, Scraper,
    SinkError, StatsScraper, StatsSink, StatsSource,
};
pub use config::{CollectorSettings, Config};
pub use error::{Result, VigilError};
pub use events::{Event, EventBus, EventKind};
pub use inventory::{VmLookup, VmStore};
pub use migration::{MigrationSample, MigrationStatsHandler, PollQueue};
pub use observability::{init as init_observability, shutdown as shutdown_observability};
pub use stats::{SocketStatsSource, StatsClient};
pub use types::{DomainJobInfo, DomainStats, MigrationState, Vm, VmStats};
