//! Rejected play queue.
//!
//! Buffers unmatched plays in memory and writes them as NDJSON to a
//! configured storage location when the run finishes. Each run writes one
//! file named after its start time.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use object_store::path::Path;
use snafu::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::RejectConfig;
use crate::error::{RejectError, RejectSerializeSnafu, RejectStorageSnafu, RejectWriteSnafu};
use crate::storage::StorageProvider;

use super::RejectSink;
use super::types::{RejectStats, RejectedPlay};

/// [`RejectSink`] that persists rejected plays.
pub struct RejectQueue {
    storage: StorageProvider,
    filename: String,
    buffer: Mutex<Vec<RejectedPlay>>,
    stats: Mutex<RejectStats>,
}

impl RejectQueue {
    /// Create a queue from configuration.
    ///
    /// Returns `None` if no reject path is configured.
    pub async fn from_config(config: &RejectConfig) -> Result<Option<Self>, RejectError> {
        let Some(path) = &config.path else {
            return Ok(None);
        };

        let storage = StorageProvider::for_url_with_options(path, config.storage_options.clone())
            .await
            .context(RejectStorageSnafu)?;

        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let filename = format!("rejected-plays-{timestamp}.ndjson");

        info!("Rejected plays will be written to {}/{}", path, filename);

        Ok(Some(Self {
            storage,
            filename,
            buffer: Mutex::new(Vec::new()),
            stats: Mutex::new(RejectStats::default()),
        }))
    }

    /// Name of the file this run writes.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn to_ndjson(records: &[RejectedPlay]) -> Result<String, RejectError> {
        let mut ndjson = String::new();
        for record in records {
            let line = serde_json::to_string(record).context(RejectSerializeSnafu)?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }
        Ok(ndjson)
    }
}

#[async_trait]
impl RejectSink for RejectQueue {
    async fn reject(&self, plays: Vec<RejectedPlay>) -> Result<(), RejectError> {
        if plays.is_empty() {
            return Ok(());
        }
        debug!("Queueing {} rejected plays", plays.len());

        {
            let mut stats = self.stats.lock().await;
            for play in &plays {
                stats.increment(play.reason);
            }
        }
        self.buffer.lock().await.extend(plays);
        Ok(())
    }

    async fn finish(&self) -> Result<RejectStats, RejectError> {
        let records = std::mem::take(&mut *self.buffer.lock().await);
        let stats = *self.stats.lock().await;

        if !records.is_empty() {
            let ndjson = Self::to_ndjson(&records)?;
            self.storage
                .put(&Path::from(self.filename.as_str()), Bytes::from(ndjson))
                .await
                .context(RejectWriteSnafu)?;
            info!(
                "Wrote {} rejected plays to {}/{}",
                records.len(),
                self.storage.url(),
                self.filename
            );
        }

        info!(
            "Rejects finalized: {} total (missing_join_key={}, no_catalog_match={})",
            stats.total(),
            stats.missing_join_key,
            stats.no_catalog_match
        );
        Ok(stats)
    }
}
