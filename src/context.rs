//! Execution context handed to every pipeline entry point.
//!
//! Holds the collaborators a run needs (where tables are read from and
//! written to, the id generator, the reject sink) so nothing is process
//! global and tests can swap any of them.

use std::sync::Arc;

use snafu::prelude::*;
use tracing::info;

use crate::config::{Config, KeyConflictPolicy, MatchMode};
use crate::error::{EtlError, EtlStorageSnafu, RejectSnafu};
use crate::keys::SurrogateKeys;
use crate::rejects::{DiscardRejects, RejectQueue, RejectSink};
use crate::sink::{ObjectStoreSink, TableSink};
use crate::source::{ObjectStoreSource, TableSource};

/// Per-run job parameters.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Full glob for song records.
    pub song_pattern: String,
    /// Full glob for log records.
    pub log_pattern: String,
    pub match_mode: MatchMode,
    pub on_key_conflict: KeyConflictPolicy,
    /// Partition `time` by year and month.
    pub partition_time: bool,
}

impl JobSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            song_pattern: config.input.song_pattern(),
            log_pattern: config.input.log_pattern(),
            match_mode: config.join.match_mode,
            on_key_conflict: config.dimensions.on_key_conflict,
            partition_time: config.output.partition_time,
        }
    }
}

/// Everything a run needs besides its input data.
pub struct ExecutionContext {
    source: Arc<dyn TableSource>,
    sink: Arc<dyn TableSink>,
    rejects: Arc<dyn RejectSink>,
    keys: SurrogateKeys,
    settings: JobSettings,
}

impl ExecutionContext {
    pub fn new(
        source: Arc<dyn TableSource>,
        sink: Arc<dyn TableSink>,
        rejects: Arc<dyn RejectSink>,
        settings: JobSettings,
    ) -> Self {
        Self {
            source,
            sink,
            rejects,
            keys: SurrogateKeys::new(),
            settings,
        }
    }

    /// Build the object-store backed context described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, EtlError> {
        let source = Arc::new(ObjectStoreSource::from_config(&config.input));
        let sink = ObjectStoreSink::from_config(&config.output)
            .await
            .context(EtlStorageSnafu)?;
        info!("Writing tables under {}", sink.root().url());

        let rejects: Arc<dyn RejectSink> =
            match RejectQueue::from_config(&config.rejects).await.context(RejectSnafu)? {
                Some(queue) => Arc::new(queue),
                None => Arc::new(DiscardRejects::new()),
            };

        Ok(Self::new(
            source,
            Arc::new(sink),
            rejects,
            JobSettings::from_config(config),
        ))
    }

    pub fn source(&self) -> &dyn TableSource {
        self.source.as_ref()
    }

    pub fn sink(&self) -> &dyn TableSink {
        self.sink.as_ref()
    }

    pub fn rejects(&self) -> &dyn RejectSink {
        self.rejects.as_ref()
    }

    /// The run-wide `songplay_id` generator.
    pub fn keys(&self) -> &SurrogateKeys {
        &self.keys
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }
}
