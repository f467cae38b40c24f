//! Reading raw datasets.
//!
//! [`TableSource`] is the read half of the execution context: given a glob
//! and a schema it returns the whole dataset as one RecordBatch.
//! [`ObjectStoreSource`] implements it over any [`StorageProvider`] backend,
//! fetching files concurrently and decoding them on the blocking pool.

pub mod reader;

pub use reader::{NdjsonReader, NdjsonReaderConfig};

use async_trait::async_trait;
use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::compute::concat_batches;
use deltalake::arrow::datatypes::SchemaRef;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::InputConfig;
use crate::emit;
use crate::error::{
    CombineBatchesSnafu, DecodeTaskSnafu, NoInputDataSnafu, ReadSnafu, SourceError,
    SourceStorageSnafu,
};
use crate::metrics::events::FileRead;
use crate::storage::{Glob, StorageProvider};

/// Reads line-delimited JSON matching a glob into a single batch.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Read every file matching `pattern` with the given schema.
    ///
    /// Fails with `NoInputData` when nothing matches.
    async fn read_json(
        &self,
        dataset: &'static str,
        pattern: &str,
        schema: SchemaRef,
    ) -> Result<RecordBatch, SourceError>;
}

/// [`TableSource`] backed by object storage.
#[derive(Debug, Clone)]
pub struct ObjectStoreSource {
    storage_options: HashMap<String, String>,
    reader_config: NdjsonReaderConfig,
    max_concurrent_files: usize,
}

impl ObjectStoreSource {
    pub fn new(
        storage_options: HashMap<String, String>,
        reader_config: NdjsonReaderConfig,
        max_concurrent_files: usize,
    ) -> Self {
        Self {
            storage_options,
            reader_config,
            max_concurrent_files: max_concurrent_files.max(1),
        }
    }

    /// Build a source from the `input` config section.
    pub fn from_config(config: &InputConfig) -> Self {
        Self::new(
            config.storage_options.clone(),
            NdjsonReaderConfig::new(config.batch_size, config.compression),
            config.max_concurrent_files,
        )
    }

    /// List the files under the glob base that match its pattern.
    async fn matching_files(
        &self,
        glob: &Glob,
    ) -> Result<(StorageProvider, Vec<Path>), SourceError> {
        let storage =
            StorageProvider::for_url_with_options(glob.base(), self.storage_options.clone())
                .await
                .context(SourceStorageSnafu)?;

        let listed = storage.list(None).await.context(SourceStorageSnafu)?;
        let total = listed.len();
        let files: Vec<Path> = listed
            .into_iter()
            .filter(|path| glob.matches(path.as_ref()))
            .collect();

        debug!(
            "Listed {} objects under {}, {} match {}",
            total,
            storage.url(),
            files.len(),
            glob.pattern()
        );
        Ok((storage, files))
    }
}

#[async_trait]
impl TableSource for ObjectStoreSource {
    async fn read_json(
        &self,
        dataset: &'static str,
        pattern: &str,
        schema: SchemaRef,
    ) -> Result<RecordBatch, SourceError> {
        let glob = Glob::parse(pattern).context(SourceStorageSnafu)?;
        let (storage, files) = self.matching_files(&glob).await?;
        ensure!(
            !files.is_empty(),
            NoInputDataSnafu {
                pattern: pattern.to_string(),
            }
        );

        let reader = Arc::new(NdjsonReader::new(
            Arc::clone(&schema),
            self.reader_config.clone(),
        ));
        let storage = &storage;

        // `buffered` keeps file order so row order is stable across runs
        let per_file: Vec<Vec<RecordBatch>> = futures::stream::iter(files.iter().cloned())
            .map(|path| {
                let reader = Arc::clone(&reader);
                async move {
                    let raw = storage.get(&path).await.context(SourceStorageSnafu)?;
                    let bytes = raw.len() as u64;
                    let name = path.to_string();
                    let result = tokio::task::spawn_blocking(move || reader.read(raw, &name))
                        .await
                        .context(DecodeTaskSnafu)?
                        .context(ReadSnafu)?;

                    emit!(FileRead {
                        dataset,
                        bytes,
                        records: result.total_records as u64,
                    });
                    Ok::<_, SourceError>(result.batches)
                }
            })
            .buffered(self.max_concurrent_files)
            .try_collect()
            .await?;

        let batches: Vec<RecordBatch> = per_file.into_iter().flatten().collect();
        let combined = concat_batches(&schema, &batches).context(CombineBatchesSnafu)?;

        info!(
            "Read {} {} records from {} files under {}",
            combined.num_rows(),
            dataset,
            files.len(),
            storage.url()
        );
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{raw_log_schema, raw_song_schema};
    use bytes::Bytes;
    use tempfile::TempDir;

    async fn put(root: &StorageProvider, path: &str, body: &str) {
        root.put(&Path::from(path), Bytes::from(body.to_string()))
            .await
            .unwrap();
    }

    async fn local_root(dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reads_only_matching_depth() {
        let dir = TempDir::new().unwrap();
        let root = local_root(&dir).await;
        put(&root, "song_data/A/B/C/one.json", r#"{"song_id": "S1", "year": 0}"#).await;
        put(&root, "song_data/A/B/D/two.json", r#"{"song_id": "S2", "year": 2001}"#).await;
        put(&root, "song_data/A/B/stray.json", r#"{"song_id": "S3"}"#).await;

        let source = ObjectStoreSource::new(HashMap::new(), NdjsonReaderConfig::default(), 4);
        let pattern = format!("{}/song_data/*/*/*/*.json", dir.path().display());
        let batch = source
            .read_json("songs", &pattern, raw_song_schema())
            .await
            .unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema(), raw_song_schema());
    }

    #[tokio::test]
    async fn test_no_matching_files_fails() {
        let dir = TempDir::new().unwrap();
        let source = ObjectStoreSource::new(HashMap::new(), NdjsonReaderConfig::default(), 4);
        let pattern = format!("{}/log_data/*.json", dir.path().display());

        let err = source
            .read_json("logs", &pattern, raw_log_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NoInputData { .. }));
    }
}
