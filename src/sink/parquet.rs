//! Parquet encoding.
//!
//! Turns a RecordBatch into the bytes of one Parquet file with the
//! configured codec and row group size. Uploading is the caller's job.

use bytes::{BufMut, Bytes, BytesMut};
use deltalake::arrow::array::RecordBatch;
use deltalake::parquet::arrow::ArrowWriter;
use deltalake::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use deltalake::parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::time::Instant;
use tracing::debug;

use crate::config::{OutputConfig, ParquetCompression};
use crate::emit;
use crate::error::{ParquetError, WriteSnafu, WriterCreateSnafu};
use crate::metrics::events::ParquetEncodeCompleted;

/// Configuration for the Parquet encoder.
#[derive(Debug, Clone, Copy)]
pub struct ParquetEncoderConfig {
    /// Compression codec.
    pub compression: ParquetCompression,
    /// Maximum rows per row group.
    pub row_group_rows: usize,
}

impl Default for ParquetEncoderConfig {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::Snappy,
            row_group_rows: 1024 * 1024,
        }
    }
}

impl ParquetEncoderConfig {
    pub fn from_output(config: &OutputConfig) -> Self {
        Self {
            compression: config.compression,
            row_group_rows: config.row_group_rows,
        }
    }

    /// Set the compression codec.
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the row group size in rows.
    pub fn with_row_group_rows(mut self, rows: usize) -> Self {
        self.row_group_rows = rows;
        self
    }
}

/// Encodes whole batches into in-memory Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetEncoder {
    config: ParquetEncoderConfig,
}

impl ParquetEncoder {
    pub fn new(config: ParquetEncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParquetEncoderConfig {
        &self.config
    }

    fn writer_properties(&self) -> WriterProperties {
        let compression = match self.config.compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        };

        WriterProperties::builder()
            .set_compression(compression)
            .set_max_row_group_size(self.config.row_group_rows.max(1))
            .build()
    }

    /// Encode `batch` as a complete Parquet file.
    ///
    /// A zero-row batch still produces a valid file carrying the schema.
    pub fn encode(&self, batch: &RecordBatch) -> Result<Bytes, ParquetError> {
        let start = Instant::now();
        let buffer = BytesMut::with_capacity(batch.get_array_memory_size() / 4).writer();
        let mut writer = ArrowWriter::try_new(buffer, batch.schema(), Some(self.writer_properties()))
            .context(WriterCreateSnafu)?;

        if batch.num_rows() > 0 {
            writer.write(batch).context(WriteSnafu)?;
        }
        let bytes = writer.into_inner().context(WriteSnafu)?.into_inner().freeze();

        debug!(
            "Encoded {} rows into {} bytes of Parquet",
            batch.num_rows(),
            bytes.len()
        );
        emit!(ParquetEncodeCompleted {
            duration: start.elapsed()
        });
        Ok(bytes)
    }
}
