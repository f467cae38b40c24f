//! NDJSON reader.
//!
//! Decodes (optionally compressed) newline-delimited JSON files into Arrow
//! RecordBatches using a fixed schema. Fields outside the schema are
//! ignored and missing fields decode as null.

use bytes::Bytes;
use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;
use deltalake::arrow::json::ReaderBuilder;
use snafu::prelude::*;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

use crate::config::CompressionFormat;
use crate::error::{
    BatchFlushSnafu, DecoderBuildSnafu, GzipDecompressionSnafu, JsonDecodeSnafu, ReaderError,
    ZstdDecompressionSnafu,
};

/// Configuration for the NDJSON reader.
#[derive(Debug, Clone)]
pub struct NdjsonReaderConfig {
    /// Number of records per batch.
    pub batch_size: usize,
    /// Compression format of input files.
    pub compression: CompressionFormat,
}

impl NdjsonReaderConfig {
    /// Create a new reader configuration.
    pub fn new(batch_size: usize, compression: CompressionFormat) -> Self {
        Self {
            batch_size,
            compression,
        }
    }
}

impl Default for NdjsonReaderConfig {
    fn default() -> Self {
        Self::new(8192, CompressionFormat::None)
    }
}

/// Result of reading and parsing a file.
#[derive(Debug)]
pub struct ReadResult {
    /// Parsed record batches.
    pub batches: Vec<RecordBatch>,
    /// Total number of records read.
    pub total_records: usize,
}

/// A reader for NDJSON files that yields Arrow RecordBatches.
#[derive(Debug, Clone)]
pub struct NdjsonReader {
    schema: SchemaRef,
    config: NdjsonReaderConfig,
}

impl NdjsonReader {
    /// Create a new NDJSON reader with the given schema and configuration.
    pub fn new(schema: SchemaRef, config: NdjsonReaderConfig) -> Self {
        Self { schema, config }
    }

    /// The schema batches are decoded into.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn decompress(&self, raw: &Bytes, path: &str) -> Result<Vec<u8>, ReaderError> {
        match self.config.compression {
            CompressionFormat::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(&raw[..]);
                let mut buf = Vec::new();
                decoder
                    .read_to_end(&mut buf)
                    .context(GzipDecompressionSnafu {
                        path: path.to_string(),
                    })?;
                Ok(buf)
            }
            CompressionFormat::Zstd => zstd::decode_all(&raw[..]).context(ZstdDecompressionSnafu {
                path: path.to_string(),
            }),
            CompressionFormat::None => Ok(raw.to_vec()),
        }
    }

    /// Decode one file into record batches.
    ///
    /// `path` is only used for error messages and logging.
    pub fn read(&self, raw: Bytes, path: &str) -> Result<ReadResult, ReaderError> {
        let data = self.decompress(&raw, path)?;

        // Numbers in string columns (e.g. "userId": 39) are kept as text
        let mut decoder = ReaderBuilder::new(Arc::clone(&self.schema))
            .with_batch_size(self.config.batch_size)
            .with_strict_mode(false)
            .with_coerce_primitive(true)
            .build_decoder()
            .map_err(|e| {
                DecoderBuildSnafu {
                    message: e.to_string(),
                }
                .build()
            })?;

        // decode() stops after batch_size records, so flush after each call
        let mut offset = 0;
        let mut batches = Vec::new();
        let mut total_records = 0;

        loop {
            let consumed = decoder.decode(&data[offset..]).map_err(|e| {
                JsonDecodeSnafu {
                    path: path.to_string(),
                    message: e.to_string(),
                }
                .build()
            })?;

            if let Some(batch) = decoder.flush().map_err(|e| {
                BatchFlushSnafu {
                    path: path.to_string(),
                    message: e.to_string(),
                }
                .build()
            })? {
                total_records += batch.num_rows();
                batches.push(batch);
            }

            if consumed == 0 {
                let remaining = &data[offset..];
                if !remaining.iter().all(|&b| b.is_ascii_whitespace()) {
                    debug!(
                        "Could not parse {} trailing bytes in {}",
                        remaining.len(),
                        path
                    );
                }
                break;
            }
            offset += consumed;
        }

        debug!(
            "Parsed {} batches ({} records) from {}",
            batches.len(),
            total_records,
            path
        );

        Ok(ReadResult {
            batches,
            total_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalake::arrow::array::{Array, Int64Array, StringArray};
    use deltalake::arrow::datatypes::{DataType, Field, Schema};
    use std::io::Write;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("userId", DataType::Utf8, true),
            Field::new("ts", DataType::Int64, true),
        ]))
    }

    fn reader(compression: CompressionFormat) -> NdjsonReader {
        NdjsonReader::new(schema(), NdjsonReaderConfig::new(2, compression))
    }

    #[test]
    fn test_read_plain_with_coercion_and_missing_fields() {
        let data = concat!(
            r#"{"userId": "39", "ts": 1541105830796, "page": "NextSong"}"#,
            "\n",
            r#"{"userId": 8, "ts": 1541106106796}"#,
            "\n",
            r#"{"ts": 1541106132796}"#,
            "\n",
        );

        let result = reader(CompressionFormat::None)
            .read(Bytes::from(data), "log.json")
            .unwrap();

        assert_eq!(result.total_records, 3);
        // batch size 2 splits the file
        assert_eq!(result.batches.len(), 2);

        let first = &result.batches[0];
        let users = first
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(users.value(0), "39");
        assert_eq!(users.value(1), "8");

        let second = &result.batches[1];
        assert!(second.column(0).is_null(0));
        let ts = second
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ts.value(0), 1541106132796);
    }

    #[test]
    fn test_read_gzip() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder
            .write_all(b"{\"userId\": \"1\", \"ts\": 5}\n")
            .unwrap();
        let compressed = encoder.finish().unwrap();

        let result = reader(CompressionFormat::Gzip)
            .read(Bytes::from(compressed), "log.json.gz")
            .unwrap();
        assert_eq!(result.total_records, 1);
    }

    #[test]
    fn test_read_zstd() {
        let compressed = zstd::encode_all(&b"{\"userId\": \"1\", \"ts\": 5}\n"[..], 3).unwrap();

        let result = reader(CompressionFormat::Zstd)
            .read(Bytes::from(compressed), "log.json.zst")
            .unwrap();
        assert_eq!(result.total_records, 1);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let err = reader(CompressionFormat::None)
            .read(Bytes::from_static(b"{\"userId\": \n"), "broken.json")
            .unwrap_err();
        assert!(matches!(
            err,
            ReaderError::JsonDecode { .. } | ReaderError::BatchFlush { .. }
        ));
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let err = reader(CompressionFormat::Gzip)
            .read(Bytes::from_static(b"not gzip"), "log.json.gz")
            .unwrap_err();
        assert!(matches!(err, ReaderError::GzipDecompression { .. }));
    }
}
