//! Configuration parsing.
//!
//! Loads the job configuration from a YAML file, with environment variable
//! interpolation, and validates it before any storage is touched.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{
    ConfigError, EmptyGlobSnafu, EmptyInputPathSnafu, EmptyOutputPathSnafu,
    EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu, ZeroSizeSnafu,
};

pub use vars::{interpolate, interpolate_with};

/// Main configuration structure for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    /// How plays are matched against the song catalog.
    #[serde(default)]
    pub join: JoinConfig,
    /// Conflict handling for `songs` and `artists`.
    #[serde(default)]
    pub dimensions: DimensionConfig,
    /// Where unmatched plays go (optional).
    #[serde(default)]
    pub rejects: RejectConfig,
    /// Metrics configuration (optional, disabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Location and format of the raw datasets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Root under which both datasets live.
    /// Examples: "s3a://bucket/", "/data/raw"
    pub path: String,

    /// Song catalog glob, relative to `path`.
    #[serde(default = "default_song_glob")]
    pub song_glob: String,

    /// Play log glob, relative to `path`.
    #[serde(default = "default_log_glob")]
    pub log_glob: String,

    /// Compression format of input files.
    #[serde(default)]
    pub compression: CompressionFormat,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Batch size for decoding records (default: 8192)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of files fetched concurrently (default: 16)
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
}

impl InputConfig {
    /// Full glob for the song catalog.
    pub fn song_pattern(&self) -> String {
        join_path(&self.path, &self.song_glob)
    }

    /// Full glob for the play logs.
    pub fn log_pattern(&self) -> String {
        join_path(&self.path, &self.log_glob)
    }
}

fn default_song_glob() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_log_glob() -> String {
    "log_data/*.json".to_string()
}

fn default_batch_size() -> usize {
    8192
}

fn default_max_concurrent_files() -> usize {
    16
}

/// Output settings for the star schema tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root under which the five table directories are written.
    /// Examples: "s3://bucket/lake", "/data/lake"
    pub path: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Maximum rows per row group (default: 1,048,576)
    #[serde(default = "default_row_group_rows")]
    pub row_group_rows: usize,

    /// Split a partition into several files above this many rows (default: 5,000,000)
    #[serde(default = "default_max_rows_per_file")]
    pub max_rows_per_file: usize,

    /// Maximum concurrent file uploads (default: 8)
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,

    /// Partition `time` by year and month (default: true).
    #[serde(default = "default_partition_time")]
    pub partition_time: bool,
}

fn default_row_group_rows() -> usize {
    1024 * 1024
}

fn default_max_rows_per_file() -> usize {
    5_000_000
}

fn default_max_concurrent_uploads() -> usize {
    8
}

fn default_partition_time() -> bool {
    true
}

/// Join settings for building `songplays`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinConfig {
    #[serde(default)]
    pub match_mode: MatchMode,
}

/// How the free-text artist and title fields are compared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Byte-for-byte equality.
    #[default]
    Exact,
    /// Trimmed and lowercased equality.
    Normalized,
}

/// Dimension table settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionConfig {
    #[serde(default)]
    pub on_key_conflict: KeyConflictPolicy,
}

/// What to do when distinct rows share a dimension key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyConflictPolicy {
    /// Keep every distinct row.
    #[default]
    KeepAll,
    /// Keep the lowest row per key in full-row order.
    First,
    /// Abort the run.
    Fail,
}

/// Reject side-channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RejectConfig {
    /// Directory to write unmatched plays to. Unset means count only.
    #[serde(default)]
    pub path: Option<String>,
    /// Storage options for the reject location.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are recorded (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Prometheus text file written at the end of the run.
    #[serde(default)]
    pub textfile_path: Option<String>,
}

/// Compression format for source files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    #[default]
    None,
    Gzip,
    Zstd,
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl ParquetCompression {
    /// Codec tag used in file names (`part-00000-<run>.snappy.parquet`).
    pub fn file_tag(&self) -> Option<&'static str> {
        match self {
            ParquetCompression::Uncompressed => None,
            ParquetCompression::Snappy => Some("snappy"),
            ParquetCompression::Gzip => Some("gz"),
            ParquetCompression::Zstd => Some("zstd"),
            ParquetCompression::Lz4 => Some("lz4"),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content, true)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str, interpolate_env: bool) -> Result<Self, ConfigError> {
        let content = if interpolate_env {
            vars::interpolate(content).map_err(|errors| {
                EnvInterpolationSnafu {
                    message: errors.join("\n"),
                }
                .build()
            })?
        } else {
            content.to_string()
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.input.path.is_empty(), EmptyInputPathSnafu);
        ensure!(!self.output.path.is_empty(), EmptyOutputPathSnafu);
        ensure!(
            !self.input.song_glob.is_empty(),
            EmptyGlobSnafu { name: "song_glob" }
        );
        ensure!(
            !self.input.log_glob.is_empty(),
            EmptyGlobSnafu { name: "log_glob" }
        );
        ensure!(
            self.input.batch_size > 0,
            ZeroSizeSnafu { name: "batch_size" }
        );
        ensure!(
            self.input.max_concurrent_files > 0,
            ZeroSizeSnafu {
                name: "max_concurrent_files"
            }
        );
        ensure!(
            self.output.row_group_rows > 0,
            ZeroSizeSnafu {
                name: "row_group_rows"
            }
        );
        ensure!(
            self.output.max_rows_per_file > 0,
            ZeroSizeSnafu {
                name: "max_rows_per_file"
            }
        );
        ensure!(
            self.output.max_concurrent_uploads > 0,
            ZeroSizeSnafu {
                name: "max_concurrent_uploads"
            }
        );
        Ok(())
    }
}

/// Join a root and a relative path with exactly one separator.
pub fn join_path(root: &str, relative: &str) -> String {
    if root.is_empty() {
        return relative.to_string();
    }
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
input:
  path: "s3a://udacity-dend/"
output:
  path: "/tmp/lake"
"#;
        let config = Config::from_yaml(yaml, false).unwrap();

        assert_eq!(
            config.input.song_pattern(),
            "s3a://udacity-dend/song_data/*/*/*/*.json"
        );
        assert_eq!(config.input.log_pattern(), "s3a://udacity-dend/log_data/*.json");
        assert_eq!(config.input.compression, CompressionFormat::None);
        assert_eq!(config.output.compression, ParquetCompression::Snappy);
        assert!(config.output.partition_time);
        assert_eq!(config.join.match_mode, MatchMode::Exact);
        assert_eq!(config.dimensions.on_key_conflict, KeyConflictPolicy::KeepAll);
        assert!(config.rejects.path.is_none());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
input:
  path: "/data/raw"
  song_glob: "songs/**/*.json"
  compression: gzip
  batch_size: 1024
output:
  path: "/data/lake"
  compression: zstd
  partition_time: false
join:
  match_mode: normalized
dimensions:
  on_key_conflict: first
rejects:
  path: "/data/rejects"
metrics:
  enabled: true
  textfile_path: "/var/lib/node_exporter/playlake.prom"
"#;
        let config = Config::from_yaml(yaml, false).unwrap();

        assert_eq!(config.input.song_pattern(), "/data/raw/songs/**/*.json");
        assert_eq!(config.input.compression, CompressionFormat::Gzip);
        assert_eq!(config.input.batch_size, 1024);
        assert_eq!(config.output.compression, ParquetCompression::Zstd);
        assert!(!config.output.partition_time);
        assert_eq!(config.join.match_mode, MatchMode::Normalized);
        assert_eq!(config.dimensions.on_key_conflict, KeyConflictPolicy::First);
        assert_eq!(config.rejects.path.as_deref(), Some("/data/rejects"));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_empty_output_rejected() {
        let yaml = r#"
input:
  path: "/data/raw"
output:
  path: ""
"#;
        let err = Config::from_yaml(yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyOutputPath));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let yaml = r#"
input:
  path: "/data/raw"
  batch_size: 0
output:
  path: "/data/lake"
"#;
        let err = Config::from_yaml(yaml, false).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroSize { name: "batch_size" }));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("s3://b/", "/log_data/*.json"), "s3://b/log_data/*.json");
        assert_eq!(join_path("/raw", "x"), "/raw/x");
        assert_eq!(join_path("", "x"), "x");
    }
}
