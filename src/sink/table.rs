//! Object-store table writer.
//!
//! A write stages every file under `<table>/_temporary/<run>/`, then deletes
//! the previous contents, renames the staged files into place and writes
//! `_SUCCESS` last. The marker is removed before staging starts, so a
//! reader that waits for it never sees a mix of old and new files.

use async_trait::async_trait;
use bytes::Bytes;
use deltalake::arrow::array::RecordBatch;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use snafu::prelude::*;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::OutputConfig;
use crate::emit;
use crate::error::{
    EncodeSnafu, EncodeTaskSnafu, InvalidObjectPathSnafu, PartitionSnafu, SinkError,
    SinkStorageSnafu, StorageError, TableExistsSnafu, UnknownPartitionColumnSnafu,
};
use crate::metrics::events::{BytesWritten, RowsWritten};
use crate::storage::StorageProvider;

use super::parquet::{ParquetEncoder, ParquetEncoderConfig};
use super::partition::split_partitions;
use super::{SaveMode, TableSink, WriteSummary};

/// Marker written after a table commit completes.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Directory under each table where files are staged.
pub const TEMPORARY_DIR: &str = "_temporary";

/// Data files are everything not hidden behind a `_` or `.` prefix.
fn is_data_file(path: &Path) -> bool {
    path.parts()
        .all(|part| !part.as_ref().starts_with('_') && !part.as_ref().starts_with('.'))
}

struct PendingFile {
    dir: String,
    batch: RecordBatch,
}

struct StagedFile {
    staged: Path,
    target: Path,
    rows: usize,
    bytes: usize,
}

/// [`TableSink`] writing Hive-partitioned Parquet below a root location.
#[derive(Debug, Clone)]
pub struct ObjectStoreSink {
    root: StorageProvider,
    encoder: ParquetEncoder,
    max_rows_per_file: usize,
    max_concurrent_uploads: usize,
}

impl ObjectStoreSink {
    pub fn new(
        root: StorageProvider,
        encoder: ParquetEncoder,
        max_rows_per_file: usize,
        max_concurrent_uploads: usize,
    ) -> Self {
        Self {
            root,
            encoder,
            max_rows_per_file: max_rows_per_file.max(1),
            max_concurrent_uploads: max_concurrent_uploads.max(1),
        }
    }

    /// Build a sink for the `output` config section.
    pub async fn from_config(config: &OutputConfig) -> Result<Self, StorageError> {
        let root =
            StorageProvider::for_url_with_options(&config.path, config.storage_options.clone())
                .await?;
        Ok(Self::new(
            root,
            ParquetEncoder::new(ParquetEncoderConfig::from_output(config)),
            config.max_rows_per_file,
            config.max_concurrent_uploads,
        ))
    }

    /// The output root all tables are written under.
    pub fn root(&self) -> &StorageProvider {
        &self.root
    }

    fn file_name(&self, index: usize, run_id: &Uuid) -> String {
        match self.encoder.config().compression.file_tag() {
            Some(tag) => format!("part-{index:05}-{run_id}.{tag}.parquet"),
            None => format!("part-{index:05}-{run_id}.parquet"),
        }
    }

    /// Cut slices into files of at most `max_rows_per_file` rows.
    ///
    /// Empty slices produce no file, except for an unpartitioned table so
    /// the schema stays readable.
    fn plan_files(
        &self,
        batch: &RecordBatch,
        partition_by: &[&str],
        table: &str,
    ) -> Result<Vec<PendingFile>, SinkError> {
        let slices = split_partitions(batch, partition_by).context(PartitionSnafu { table })?;

        let mut files = Vec::new();
        for slice in slices {
            if slice.batch.num_rows() == 0 {
                if partition_by.is_empty() {
                    files.push(PendingFile {
                        dir: slice.dir,
                        batch: slice.batch,
                    });
                }
                continue;
            }

            let mut offset = 0;
            while offset < slice.batch.num_rows() {
                let len = self.max_rows_per_file.min(slice.batch.num_rows() - offset);
                files.push(PendingFile {
                    dir: slice.dir.clone(),
                    batch: slice.batch.slice(offset, len),
                });
                offset += len;
            }
        }
        Ok(files)
    }

    async fn stage(
        &self,
        storage: &StorageProvider,
        table: &str,
        run_id: Uuid,
        files: Vec<PendingFile>,
    ) -> Result<Vec<StagedFile>, SinkError> {
        let staging = format!("{TEMPORARY_DIR}/{run_id}");

        futures::stream::iter(files.into_iter().enumerate())
            .map(|(index, file)| {
                let encoder = self.encoder.clone();
                let staging = &staging;
                async move {
                    let rows = file.batch.num_rows();
                    let batch = file.batch;
                    let bytes = tokio::task::spawn_blocking(move || encoder.encode(&batch))
                        .await
                        .context(EncodeTaskSnafu { table })?
                        .context(EncodeSnafu { table })?;

                    let name = self.file_name(index, &run_id);
                    let relative = if file.dir.is_empty() {
                        name
                    } else {
                        format!("{}/{}", file.dir, name)
                    };
                    let target = Path::parse(&relative)
                        .context(InvalidObjectPathSnafu { path: &relative })?;
                    let staged_name = format!("{staging}/{relative}");
                    let staged = Path::parse(&staged_name)
                        .context(InvalidObjectPathSnafu { path: &staged_name })?;

                    let size = bytes.len();
                    storage
                        .put(&staged, bytes)
                        .await
                        .context(SinkStorageSnafu { table })?;
                    debug!("Staged {} ({} rows, {} bytes)", staged, rows, size);

                    Ok::<_, SinkError>(StagedFile {
                        staged,
                        target,
                        rows,
                        bytes: size,
                    })
                }
            })
            .buffer_unordered(self.max_concurrent_uploads)
            .try_collect()
            .await
    }
}

#[async_trait]
impl TableSink for ObjectStoreSink {
    async fn write_table(
        &self,
        table: &'static str,
        batch: &RecordBatch,
        partition_by: &[&str],
        mode: SaveMode,
    ) -> Result<WriteSummary, SinkError> {
        let start = Instant::now();
        let storage = self.root.child(table);
        let schema = batch.schema();
        for column in partition_by {
            ensure!(
                schema.index_of(column).is_ok(),
                UnknownPartitionColumnSnafu { table, column: *column }
            );
        }

        let existing = storage.list(None).await.context(SinkStorageSnafu { table })?;
        if mode == SaveMode::ErrorIfExists && existing.iter().any(is_data_file) {
            return TableExistsSnafu { table }.fail();
        }

        let files = self.plan_files(batch, partition_by, table)?;
        let run_id = Uuid::now_v7();

        storage
            .delete(&Path::from(SUCCESS_MARKER))
            .await
            .context(SinkStorageSnafu { table })?;
        let staged = self.stage(&storage, table, run_id, files).await?;

        let concurrency = self.max_concurrent_uploads;
        let removed = existing.len();
        futures::stream::iter(existing)
            .map(|path| {
                let storage = &storage;
                async move { storage.delete(&path).await }
            })
            .buffer_unordered(concurrency)
            .try_collect::<Vec<()>>()
            .await
            .context(SinkStorageSnafu { table })?;

        let moves: Vec<(Path, Path)> = staged
            .iter()
            .map(|file| (file.staged.clone(), file.target.clone()))
            .collect();
        futures::stream::iter(moves)
            .map(|(from, to)| {
                let storage = &storage;
                async move { storage.rename(&from, &to).await }
            })
            .buffer_unordered(concurrency)
            .try_collect::<Vec<()>>()
            .await
            .context(SinkStorageSnafu { table })?;

        storage
            .prune_empty_dirs(&Path::default())
            .await
            .context(SinkStorageSnafu { table })?;
        storage
            .put(&Path::from(SUCCESS_MARKER), Bytes::new())
            .await
            .context(SinkStorageSnafu { table })?;

        let mut partitions: Vec<&str> = staged
            .iter()
            .filter_map(|f| f.target.as_ref().rsplit_once('/').map(|(dir, _)| dir))
            .collect();
        partitions.sort_unstable();
        partitions.dedup();

        let summary = WriteSummary {
            table: table.to_string(),
            rows: staged.iter().map(|f| f.rows).sum(),
            files: staged.len(),
            partitions: partitions.len(),
            bytes: staged.iter().map(|f| f.bytes).sum(),
        };

        emit!(RowsWritten {
            table,
            count: summary.rows as u64,
        });
        emit!(BytesWritten {
            bytes: summary.bytes as u64,
        });
        info!(
            "Wrote table {} to {}: {} rows in {} files across {} partitions ({} bytes, replaced {} objects) in {:?}",
            table,
            storage.url(),
            summary.rows,
            summary.files,
            summary.partitions,
            summary.bytes,
            removed,
            start.elapsed()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParquetCompression;
    use deltalake::arrow::array::{Int32Array, StringArray};
    use deltalake::arrow::datatypes::{DataType, Field, Schema};
    use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn plays(months: Vec<i32>) -> RecordBatch {
        let n = months.len();
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("user_id", DataType::Utf8, true),
                Field::new("year", DataType::Int32, true),
                Field::new("month", DataType::Int32, true),
            ])),
            vec![
                Arc::new(StringArray::from(
                    (0..n).map(|i| format!("u{i}")).collect::<Vec<_>>(),
                )),
                Arc::new(Int32Array::from(vec![2018; n])),
                Arc::new(Int32Array::from(months)),
            ],
        )
        .unwrap()
    }

    async fn sink(dir: &TempDir, max_rows_per_file: usize) -> ObjectStoreSink {
        let root = StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap();
        ObjectStoreSink::new(
            root,
            ParquetEncoder::new(ParquetEncoderConfig::default()),
            max_rows_per_file,
            4,
        )
    }

    async fn listing(sink: &ObjectStoreSink, table: &str) -> Vec<String> {
        sink.root()
            .child(table)
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_partitioned_layout() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 1000).await;

        let summary = sink
            .write_table("songplays", &plays(vec![11, 11, 12]), &["year", "month"], SaveMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.partitions, 2);

        let files = listing(&sink, "songplays").await;
        assert_eq!(files.len(), 3);
        assert_eq!(files[0], SUCCESS_MARKER);
        assert!(files[1].starts_with("year=2018/month=11/part-00000-"));
        assert!(files[1].ends_with(".snappy.parquet"));
        assert!(files[2].starts_with("year=2018/month=12/part-00001-"));
        assert!(!dir.path().join("songplays").join(TEMPORARY_DIR).exists());

        // partition columns live in the path only
        let bytes = std::fs::read(dir.path().join("songplays").join(&files[1])).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes)).unwrap();
        let names: Vec<String> = reader.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, ["user_id"]);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_previous_files() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 1000).await;

        sink.write_table("time", &plays(vec![1, 2, 3]), &["year", "month"], SaveMode::Overwrite)
            .await
            .unwrap();
        sink.write_table("time", &plays(vec![5]), &["year", "month"], SaveMode::Overwrite)
            .await
            .unwrap();

        let files = listing(&sink, "time").await;
        assert_eq!(files.len(), 2);
        assert!(files[1].starts_with("year=2018/month=5/"));
        assert!(!dir.path().join("time/year=2018/month=1").exists());
    }

    #[tokio::test]
    async fn test_error_if_exists() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 1000).await;

        sink.write_table("users", &plays(vec![1]), &[], SaveMode::ErrorIfExists)
            .await
            .unwrap();
        let err = sink
            .write_table("users", &plays(vec![1]), &[], SaveMode::ErrorIfExists)
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::TableExists { .. }));
    }

    #[tokio::test]
    async fn test_max_rows_per_file_splits() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 2).await;

        let summary = sink
            .write_table("users", &plays(vec![1, 1, 1, 1, 1]), &[], SaveMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.partitions, 0);
    }

    #[tokio::test]
    async fn test_empty_tables() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 1000).await;
        let empty = plays(vec![]);

        let flat = sink
            .write_table("artists", &empty, &[], SaveMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(flat.files, 1);
        assert_eq!(flat.rows, 0);

        let partitioned = sink
            .write_table("songs", &empty, &["year"], SaveMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(partitioned.files, 0);
        assert_eq!(listing(&sink, "songs").await, vec!["_SUCCESS".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_partition_column() {
        let dir = TempDir::new().unwrap();
        let sink = sink(&dir, 1000).await;

        let err = sink
            .write_table("songs", &plays(vec![1]), &["artist_id"], SaveMode::Overwrite)
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::UnknownPartitionColumn { .. }));
    }

    #[tokio::test]
    async fn test_uncompressed_file_name() {
        let dir = TempDir::new().unwrap();
        let root = StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap();
        let sink = ObjectStoreSink::new(
            root,
            ParquetEncoder::new(
                ParquetEncoderConfig::default().with_compression(ParquetCompression::Uncompressed),
            ),
            1000,
            1,
        );

        sink.write_table("users", &plays(vec![1]), &[], SaveMode::Overwrite)
            .await
            .unwrap();
        let files = listing(&sink, "users").await;
        assert_eq!(files[0], SUCCESS_MARKER);
        assert!(files[1].starts_with("part-00000-"));
        assert!(!files[1].contains(".snappy."));
        assert!(files[1].ends_with(".parquet"));
    }
}
