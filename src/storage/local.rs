//! Local filesystem storage backend implementation.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{IoSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
///
/// The store is rooted at `/` and `key` holds the directory, so a missing
/// input directory lists as empty instead of failing construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
    pub key: Option<Path>,
}

impl LocalConfig {
    /// Remove empty directories below `prefix`, bottom-up.
    pub(super) async fn prune_empty_dirs(&self, prefix: &Path) -> Result<(), StorageError> {
        let root = std::path::PathBuf::from(&self.path).join(prefix.as_ref());
        tokio::task::spawn_blocking(move || prune(&root))
            .await
            .map_err(|e| StorageError::Io {
                source: std::io::Error::other(e),
            })?
            .map(|_| ())
            .context(IoSnafu)
    }
}

/// Returns whether `dir` was removed.
fn prune(dir: &std::path::Path) -> std::io::Result<bool> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let mut empty = true;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if !prune(&entry.path())? {
                empty = false;
            }
        } else {
            empty = false;
        }
    }

    if empty {
        std::fs::remove_dir(dir)?;
    }
    Ok(empty)
}

impl StorageProvider {
    pub(super) fn construct_local(config: LocalConfig) -> Self {
        let object_store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new());
        Self {
            canonical_url: format!("file://{}", config.path),
            config: BackendConfig::Local(config),
            object_store,
        }
    }
}
