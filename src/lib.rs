//! playlake: turns raw song metadata and listening logs into a star schema.
//!
//! The song catalog and the event logs are read as line-delimited JSON from
//! local disk, S3 or GCS, reshaped into one fact table (`songplays`) and
//! four dimensions (`songs`, `artists`, `users`, `time`), and written as
//! Hive-partitioned Parquet.
//!
//! # Example
//!
//! ```ignore
//! use playlake::error::{ConfigSnafu, EtlError};
//! use playlake::{Config, run_pipeline};
//! use snafu::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EtlError> {
//!     let config = Config::from_file("config.yaml").context(ConfigSnafu)?;
//!     let stats = run_pipeline(config).await?;
//!     println!("Wrote {} songplays", stats.logs.songplays.rows);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod pipeline;
pub mod rejects;
pub mod schema;
pub mod sink;
pub mod source;
pub mod storage;
pub mod transform;

// Re-export main types
pub use config::Config;
pub use context::{ExecutionContext, JobSettings};
pub use pipeline::{RunStats, run, run_pipeline};
pub use storage::StorageProvider;
