//! Storage abstraction over object stores.
//!
//! Provides a unified interface for S3, GCS and the local filesystem. A
//! provider is rooted at a key prefix and every path passed to it is
//! relative to that prefix.

mod cloud;
mod glob;
mod local;

pub use glob::Glob;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

pub use cloud::{GcsConfig, S3Config};
pub use local::LocalConfig;

/// Storage provider that abstracts over different storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for different storage backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aAnN]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.*))?$";

const GCS_PATH: &str =
    r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$";
const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.*))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Local,
}

fn matchers() -> &'static Vec<(Backend, Regex)> {
    static MATCHERS: OnceLock<Vec<(Backend, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        [
            (Backend::S3, S3_PATH),
            (Backend::S3, S3_VIRTUAL),
            (Backend::S3, S3_ENDPOINT_URL),
            (Backend::S3, S3_URL),
            (Backend::Gcs, GCS_PATH),
            (Backend::Gcs, GCS_URL),
            (Backend::Local, FILE_URI),
            (Backend::Local, FILE_PATH),
        ]
        .into_iter()
        .map(|(backend, pattern)| {
            (
                backend,
                Regex::new(pattern).expect("storage URL patterns are valid"),
            )
        })
        .collect()
    })
}

/// Turn an optional captured key into an object path, ignoring empty keys.
fn key_path(key: Option<regex::Match<'_>>) -> Option<Path> {
    key.map(|m| m.as_str().trim_matches('/'))
        .filter(|k| !k.is_empty())
        .map(Path::from)
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, regex) in matchers() {
            if let Some(matches) = regex.captures(url) {
                return Ok(match backend {
                    Backend::S3 => Self::parse_s3(&matches),
                    Backend::Gcs => Self::parse_gcs(&matches),
                    Backend::Local => Self::parse_local(&matches),
                });
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: &regex::Captures) -> Self {
        let bucket = matches["bucket"].to_string();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{}://{}:{}", protocol, endpoint.as_str(), port)
            })
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: key_path(matches.name("key")),
        })
    }

    fn parse_gcs(matches: &regex::Captures) -> Self {
        BackendConfig::Gcs(GcsConfig {
            bucket: matches["bucket"].to_string(),
            key: key_path(matches.name("key")),
        })
    }

    fn parse_local(matches: &regex::Captures) -> Self {
        let path = matches["path"].trim_end_matches('/');
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        BackendConfig::Local(LocalConfig {
            key: key_path(matches.name("path")),
            path,
        })
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Local(local) => local.key.as_ref(),
        }
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, &options),
            BackendConfig::Gcs(config) => Self::construct_gcs(config, &options),
            BackendConfig::Local(config) => Ok(Self::construct_local(config)),
        }
    }

    /// Create a provider rooted at `prefix` below this provider's root.
    pub fn child(&self, prefix: &str) -> Self {
        let mut config = self.config.clone();
        let joined: Path = self.qualify_path(&Path::from(prefix)).into_owned();
        let key = Some(joined);
        match &mut config {
            BackendConfig::S3(s3) => s3.key = key,
            BackendConfig::Gcs(gcs) => gcs.key = key,
            BackendConfig::Local(local) => {
                local.path = format!("{}/{}", local.path, prefix.trim_matches('/'));
                local.key = key;
            }
        }

        Self {
            canonical_url: format!("{}/{}", self.canonical_url, prefix.trim_matches('/')),
            config,
            object_store: self.object_store.clone(),
        }
    }

    /// Human-readable location of this provider's root.
    pub fn url(&self) -> &str {
        &self.canonical_url
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List every object below `prefix` (relative to the root).
    ///
    /// Returns paths relative to the root, sorted for a stable order. A
    /// missing prefix lists as empty.
    pub async fn list(&self, prefix: Option<&Path>) -> Result<Vec<Path>, StorageError> {
        let full_prefix: Option<Path> = match prefix {
            Some(prefix) => Some(self.qualify_path(prefix).into_owned()),
            None => self.config.key().cloned(),
        };
        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        let start = Instant::now();
        let result: Result<Vec<_>, _> = self
            .object_store
            .list(full_prefix.as_ref())
            .try_collect()
            .await;
        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::from(&result),
            duration: start.elapsed(),
        });

        let metas = match result {
            Ok(metas) => metas,
            Err(object_store::Error::NotFound { .. }) => Vec::new(),
            Err(source) => return Err(StorageError::ObjectStore { source }),
        };

        let mut paths: Vec<Path> = metas
            .into_iter()
            .map(|meta| meta.location.parts().skip(key_part_count).collect())
            .collect();
        paths.sort();

        debug!(
            "Listed {} objects under {}/{}",
            paths.len(),
            self.canonical_url,
            prefix.map(|p| p.as_ref()).unwrap_or("")
        );
        Ok(paths)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = match self.object_store.get(&self.qualify_path(path)).await {
            Ok(response) => response.bytes().await,
            Err(err) => Err(err),
        };
        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)
    }

    /// Put bytes to a path, replacing any existing object.
    pub async fn put(&self, path: &Path, bytes: Bytes) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .put(&self.qualify_path(path), PutPayload::from(bytes))
            .await;
        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::from(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete an object. Deleting a missing object is not an error.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.object_store.delete(&self.qualify_path(path)).await;
        emit!(StorageRequest {
            operation: StorageOperation::Delete,
            status: RequestStatus::from(&result),
            duration: start.elapsed(),
        });

        match result {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// Move an object, overwriting the destination.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .rename(&self.qualify_path(from), &self.qualify_path(to))
            .await;
        emit!(StorageRequest {
            operation: StorageOperation::Rename,
            status: RequestStatus::from(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)
    }

    /// Remove directories left empty under `prefix`.
    ///
    /// Object stores have no directories, so this only acts on the local
    /// filesystem backend.
    pub async fn prune_empty_dirs(&self, prefix: &Path) -> Result<(), StorageError> {
        match &self.config {
            BackendConfig::Local(local) => local.prune_empty_dirs(prefix).await,
            _ => Ok(()),
        }
    }
}
