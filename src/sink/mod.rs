//! Writing derived tables.
//!
//! [`TableSink`] is the write half of the execution context. The
//! object-store implementation lays tables out Hive-style as Parquet and
//! replaces previous contents with a staged commit.

pub mod parquet;
pub mod partition;
mod table;

pub use parquet::{ParquetEncoder, ParquetEncoderConfig};
pub use partition::{DEFAULT_PARTITION, PartitionSlice, split_partitions};
pub use table::{ObjectStoreSink, SUCCESS_MARKER, TEMPORARY_DIR};

use async_trait::async_trait;
use deltalake::arrow::array::RecordBatch;

use crate::error::SinkError;

/// What to do when the destination table already holds data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Replace previous contents.
    #[default]
    Overwrite,
    /// Fail with `TableExists`.
    ErrorIfExists,
}

/// Outcome of one table write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub table: String,
    pub rows: usize,
    pub files: usize,
    pub partitions: usize,
    pub bytes: usize,
}

/// Persists a table, replacing or refusing prior contents per [`SaveMode`].
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Write `batch` as table `table`, partitioned by `partition_by` in
    /// order.
    async fn write_table(
        &self,
        table: &'static str,
        batch: &RecordBatch,
        partition_by: &[&str],
        mode: SaveMode,
    ) -> Result<WriteSummary, SinkError>;
}
