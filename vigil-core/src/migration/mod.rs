//! Background sampling of live-migration progress.
//!
//! Domain stats are scraped once per cycle, which is too coarse to follow a
//! migration. Each migrating VM instead gets its own [`PollQueue`] that samples
//! job info on a short interval; [`MigrationStatsHandler::collect`] hands the
//! buffered samples to the exporter.

mod handler;
mod queue;

pub use handler::MigrationStatsHandler;
pub use queue::PollQueue;

use crate::types::DomainJobInfo;
use std::time::SystemTime;

/// One migration progress snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationSample {
    pub namespace: String,
    pub name: String,
    pub job_info: DomainJobInfo,
    pub timestamp: SystemTime,
}
