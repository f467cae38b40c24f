//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a run. Events
//! implement the `InternalEvent` trait which records the corresponding
//! metric through the `metrics` facade.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when an input file has been fetched and decoded.
pub struct FileRead {
    pub dataset: &'static str,
    pub bytes: u64,
    pub records: u64,
}

impl InternalEvent for FileRead {
    fn emit(self) {
        trace!(
            dataset = self.dataset,
            bytes = self.bytes,
            records = self.records,
            "File read"
        );
        counter!("playlake_files_read_total", "dataset" => self.dataset).increment(1);
        counter!("playlake_bytes_read_total", "dataset" => self.dataset).increment(self.bytes);
        counter!("playlake_records_read_total", "dataset" => self.dataset)
            .increment(self.records);
    }
}

/// Event emitted when log records are dropped by the play filter.
pub struct EventsFiltered {
    pub count: u64,
}

impl InternalEvent for EventsFiltered {
    fn emit(self) {
        trace!(count = self.count, "Non-play events filtered");
        counter!("playlake_events_filtered_total").increment(self.count);
    }
}

/// Event emitted when deduplication removes rows from a table.
pub struct DuplicateRowsDropped {
    pub table: &'static str,
    pub count: u64,
}

impl InternalEvent for DuplicateRowsDropped {
    fn emit(self) {
        trace!(table = self.table, count = self.count, "Duplicate rows dropped");
        counter!("playlake_duplicate_rows_dropped_total", "table" => self.table)
            .increment(self.count);
    }
}

/// Event emitted when plays fail to join against the catalog.
pub struct PlaysUnmatched {
    pub count: u64,
}

impl InternalEvent for PlaysUnmatched {
    fn emit(self) {
        trace!(count = self.count, "Plays unmatched");
        counter!("playlake_plays_unmatched_total").increment(self.count);
    }
}

/// Event emitted when a table has been committed.
pub struct RowsWritten {
    pub table: &'static str,
    pub count: u64,
}

impl InternalEvent for RowsWritten {
    fn emit(self) {
        trace!(table = self.table, count = self.count, "Rows written");
        counter!("playlake_rows_written_total", "table" => self.table).increment(self.count);
    }
}

/// Event emitted when Parquet bytes are uploaded.
pub struct BytesWritten {
    pub bytes: u64,
}

impl InternalEvent for BytesWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes written");
        counter!("playlake_bytes_written_total").increment(self.bytes);
    }
}

/// Event emitted when a Parquet file has been encoded.
pub struct ParquetEncodeCompleted {
    pub duration: Duration,
}

impl InternalEvent for ParquetEncodeCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Parquet encode completed"
        );
        histogram!("playlake_parquet_encode_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a table build (transform + write) completes.
pub struct TableCompleted {
    pub table: &'static str,
    pub duration: Duration,
}

impl InternalEvent for TableCompleted {
    fn emit(self) {
        trace!(
            table = self.table,
            duration_ms = self.duration.as_millis(),
            "Table completed"
        );
        histogram!("playlake_table_duration_seconds", "table" => self.table)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
    Delete,
    Rename,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
            StorageOperation::Delete => "delete",
            StorageOperation::Rename => "rename",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

impl<T, E> From<&Result<T, E>> for RequestStatus {
    fn from(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request"
        );
        counter!(
            "playlake_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!(
            "playlake_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
