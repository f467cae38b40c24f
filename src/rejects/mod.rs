//! Side-channel for plays that match no catalog song.
//!
//! The join never drops a play silently: every unmatched event is handed to
//! a [`RejectSink`] together with the reason it was rejected.

mod queue;
mod types;

pub use queue::RejectQueue;
pub use types::{RejectReason, RejectStats, RejectedPlay};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::RejectError;

/// Receives rejected plays during a run.
#[async_trait]
pub trait RejectSink: Send + Sync {
    /// Record a batch of rejected plays.
    async fn reject(&self, plays: Vec<RejectedPlay>) -> Result<(), RejectError>;

    /// Flush anything buffered and return the run's totals.
    async fn finish(&self) -> Result<RejectStats, RejectError>;
}

/// [`RejectSink`] that only counts.
#[derive(Debug, Default)]
pub struct DiscardRejects {
    stats: Mutex<RejectStats>,
}

impl DiscardRejects {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RejectSink for DiscardRejects {
    async fn reject(&self, plays: Vec<RejectedPlay>) -> Result<(), RejectError> {
        let mut stats = self.stats.lock().await;
        for play in &plays {
            stats.increment(play.reason);
        }
        Ok(())
    }

    async fn finish(&self) -> Result<RejectStats, RejectError> {
        let stats = *self.stats.lock().await;
        info!(
            "Discarded {} rejected plays (missing_join_key={}, no_catalog_match={})",
            stats.total(),
            stats.missing_join_key,
            stats.no_catalog_match
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discard_counts_by_reason() {
        let sink = DiscardRejects::new();
        let play = RejectedPlay {
            user_id: None,
            session_id: None,
            start_time: None,
            artist: None,
            song: None,
            reason: RejectReason::MissingJoinKey,
        };

        sink.reject(vec![play.clone(), play]).await.unwrap();
        let stats = sink.finish().await.unwrap();
        assert_eq!(stats.missing_join_key, 2);
        assert_eq!(stats.total(), 2);
    }
}
