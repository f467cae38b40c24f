//! Error types for playlake using snafu.
//!
//! Each layer owns an error enum with context selectors; [`EtlError`]
//! aggregates them for the binary.

use deltalake::arrow::error::ArrowError;
use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Glob segment could not be compiled.
    #[snafu(display("Invalid glob pattern: {pattern}"))]
    InvalidGlob {
        pattern: String,
        source: regex::Error,
    },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error"))]
    GcsConfig { source: object_store::Error },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Input root is empty.
    #[snafu(display("Input path cannot be empty"))]
    EmptyInputPath,

    /// Output root is empty.
    #[snafu(display("Output path cannot be empty"))]
    EmptyOutputPath,

    /// A glob pattern is empty.
    #[snafu(display("Glob pattern for {name} cannot be empty"))]
    EmptyGlob { name: &'static str },

    /// A size setting is zero.
    #[snafu(display("{name} must be greater than zero"))]
    ZeroSize { name: &'static str },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Reader Errors ============

/// Errors that can occur while decoding one NDJSON file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// Gzip decompression failed.
    #[snafu(display("Gzip decompression failed for {path}"))]
    GzipDecompression {
        source: std::io::Error,
        path: String,
    },

    /// Zstd decompression failed.
    #[snafu(display("Zstd decompression failed for {path}"))]
    ZstdDecompression {
        source: std::io::Error,
        path: String,
    },

    /// Failed to build JSON decoder.
    #[snafu(display("Failed to build JSON decoder: {message}"))]
    DecoderBuild { message: String },

    /// Failed to decode JSON.
    #[snafu(display("Failed to decode JSON for {path}: {message}"))]
    JsonDecode { path: String, message: String },

    /// Failed to flush decoded rows into a batch.
    #[snafu(display("Failed to flush batch for {path}: {message}"))]
    BatchFlush { path: String, message: String },
}

// ============ Source Errors ============

/// Errors raised by a [`crate::source::TableSource`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// The glob matched no files.
    #[snafu(display("No input files match {pattern}"))]
    NoInputData { pattern: String },

    /// Listing or fetching input failed.
    #[snafu(display("Failed to access input storage"))]
    SourceStorage { source: StorageError },

    /// A file could not be decoded.
    #[snafu(display("Failed to read input file"))]
    Read { source: ReaderError },

    /// The blocking decode task panicked or was cancelled.
    #[snafu(display("Decode task failed"))]
    DecodeTask { source: tokio::task::JoinError },

    /// Per-file batches could not be combined.
    #[snafu(display("Failed to combine input batches"))]
    CombineBatches { source: ArrowError },
}

// ============ Transform Errors ============

/// Errors that can occur while deriving tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// An Arrow kernel failed.
    #[snafu(display("Arrow compute failed during {operation}"))]
    Compute {
        operation: &'static str,
        source: ArrowError,
    },

    /// A required column is absent from the input batch.
    #[snafu(display("Column {column} is missing"))]
    MissingColumn { column: String },

    /// A column has an unexpected Arrow type.
    #[snafu(display("Column {column} is not {expected}"))]
    UnexpectedType {
        column: String,
        expected: &'static str,
    },

    /// Two distinct rows share a dimension key under the `fail` policy.
    #[snafu(display("Conflicting rows for key {key} in table {table}"))]
    KeyConflict { table: &'static str, key: String },
}

// ============ Parquet Errors ============

/// Errors that can occur during Parquet encoding.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParquetError {
    /// Parquet write error.
    #[snafu(display("Parquet write error"))]
    Write {
        source: deltalake::parquet::errors::ParquetError,
    },

    /// Failed to create Parquet writer.
    #[snafu(display("Failed to create Parquet writer"))]
    WriterCreate {
        source: deltalake::parquet::errors::ParquetError,
    },
}

// ============ Sink Errors ============

/// Errors raised by a [`crate::sink::TableSink`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Output storage failed.
    #[snafu(display("Failed to write table {table}"))]
    SinkStorage { table: String, source: StorageError },

    /// Encoding a partition failed.
    #[snafu(display("Failed to encode table {table}"))]
    Encode { table: String, source: ParquetError },

    /// The blocking encode task panicked or was cancelled.
    #[snafu(display("Encode task failed for table {table}"))]
    EncodeTask {
        table: String,
        source: tokio::task::JoinError,
    },

    /// A partition directory does not form a valid object path.
    #[snafu(display("Invalid object path {path}"))]
    InvalidObjectPath {
        path: String,
        source: object_store::path::Error,
    },

    /// Splitting the batch into partitions failed.
    #[snafu(display("Failed to partition table {table}"))]
    Partition { table: String, source: ArrowError },

    /// A partition column is not part of the table.
    #[snafu(display("Partition column {column} is not in table {table}"))]
    UnknownPartitionColumn { table: String, column: String },

    /// Destination holds data and the mode forbids replacing it.
    #[snafu(display("Table {table} already exists"))]
    TableExists { table: String },
}

// ============ Reject Errors ============

/// Errors that can occur while recording rejected plays.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix avoids selector clashes with other enums (e.g. WriteSnafu)
#[allow(clippy::enum_variant_names)]
pub enum RejectError {
    /// Failed to write the reject file.
    #[snafu(display("Failed to write rejected plays"))]
    RejectWrite { source: StorageError },

    /// Failed to serialize a rejected play.
    #[snafu(display("Failed to serialize rejected play"))]
    RejectSerialize { source: serde_json::Error },

    /// Failed to open the reject location.
    #[snafu(display("Failed to create reject storage"))]
    RejectStorage { source: StorageError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics setup and export.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to install the Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Failed to write the textfile export.
    #[snafu(display("Failed to write metrics textfile {path}"))]
    TextfileWrite {
        path: String,
        source: std::io::Error,
    },
}

// ============ ETL Error (top-level) ============

/// Top-level errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EtlError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Storage setup error.
    #[snafu(display("Storage error"))]
    EtlStorage { source: StorageError },

    /// Input error.
    #[snafu(display("Failed to read {dataset}"))]
    Source {
        dataset: &'static str,
        source: SourceError,
    },

    /// Transformation error.
    #[snafu(display("Failed to build table {table}"))]
    Transform {
        table: &'static str,
        source: TransformError,
    },

    /// Output error.
    #[snafu(display("Sink error"))]
    Sink { source: SinkError },

    /// Reject sink setup or flush error.
    #[snafu(display("Reject sink error"))]
    Reject { source: RejectError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}

impl EtlError {
    /// Check if the run failed because an input glob matched nothing.
    pub fn is_no_input_data(&self) -> bool {
        matches!(
            self,
            EtlError::Source {
                source: SourceError::NoInputData { .. },
                ..
            }
        )
    }
}
