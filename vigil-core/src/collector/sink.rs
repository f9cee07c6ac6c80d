//! Result sinks for the concurrent collector.
//!
//! Two shapes are provided:
//! - [`ChannelSink`]: push-style, results flow to a receiver as they complete.
//! - [`BufferSink`]: pull-style, results accumulate and are read after `collect`.
//!
//! A scrape abandoned by its batch may report long after the consumer went
//! away. Writes therefore never panic: they return [`SinkError`] and the
//! scraping task logs it.

use crate::types::{Vm, VmStats};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::mpsc;

/// One VM's stats from a single scrape.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub vm: Vm,
    pub stats: VmStats,
    /// Wall-clock time the scrape started
    pub started_at: SystemTime,
}

/// Why a sink refused a result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The consumer closed the sink or went away.
    #[error("sink closed")]
    Closed,

    /// The bounded queue has no room left.
    #[error("sink full")]
    Full,
}

/// Destination for scrape results.
pub trait StatsSink: Send + Sync + 'static {
    /// Report one result. Must not block.
    fn report(&self, result: ScrapeResult) -> Result<(), SinkError>;
}

/// Push-style sink backed by a bounded channel.
///
/// Once [`close`](Self::close) is called, or the receiver is dropped, every
/// further write is refused.
pub struct ChannelSink {
    tx: mpsc::Sender<ScrapeResult>,
    closed: AtomicBool,
}

impl ChannelSink {
    /// Create a sink and the receiver results are pushed to.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ScrapeResult>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, closed: AtomicBool::new(false) }, rx)
    }

    /// Stop accepting results.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the sink still accepts results.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.tx.is_closed()
    }
}

impl StatsSink for ChannelSink {
    fn report(&self, result: ScrapeResult) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.tx.try_send(result).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Pull-style sink accumulating results in memory.
#[derive(Default)]
pub struct BufferSink {
    values: Mutex<Vec<ScrapeResult>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every result reported so far, leaving the buffer empty.
    pub fn take(&self) -> Vec<ScrapeResult> {
        let mut values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *values)
    }

    /// Number of buffered results.
    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatsSink for BufferSink {
    fn report(&self, result: ScrapeResult) -> Result<(), SinkError> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(result);
        Ok(())
    }
}
