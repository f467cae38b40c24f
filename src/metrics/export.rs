//! Prometheus export for a batch run.
//!
//! A batch job exits before a scraper would see it, so the rendered
//! exposition text is written once to a file at the end of the run
//! (node_exporter textfile collector layout).

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::MetricsConfig;
use crate::error::{MetricsError, PrometheusInitSnafu, TextfileWriteSnafu};

/// Handle to the installed recorder.
pub struct MetricsExporter {
    handle: PrometheusHandle,
    textfile_path: Option<PathBuf>,
}

impl MetricsExporter {
    /// Install the global recorder if metrics are enabled.
    ///
    /// Returns `None` when disabled; events are then no-ops.
    pub fn install(config: &MetricsConfig) -> Result<Option<Self>, MetricsError> {
        if !config.enabled {
            return Ok(None);
        }

        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context(PrometheusInitSnafu)?;
        debug!("Prometheus recorder installed");

        Ok(Some(Self::with_handle(
            handle,
            config.textfile_path.as_ref().map(PathBuf::from),
        )))
    }

    fn with_handle(handle: PrometheusHandle, textfile_path: Option<PathBuf>) -> Self {
        Self {
            handle,
            textfile_path,
        }
    }

    /// Current exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition text to the configured file, if any.
    ///
    /// Writes to a sibling temp file first and renames it so the collector
    /// never reads a truncated file.
    pub async fn finish(&self) -> Result<(), MetricsError> {
        let Some(path) = &self.textfile_path else {
            return Ok(());
        };

        let shown = path.display().to_string();
        let tmp = path.with_extension("prom.tmp");
        tokio::fs::write(&tmp, self.render())
            .await
            .context(TextfileWriteSnafu {
                path: shown.clone(),
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .context(TextfileWriteSnafu {
                path: shown.clone(),
            })?;

        info!("Metrics written to {}", shown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::metrics::events::RowsWritten;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tempfile::TempDir;

    #[test]
    fn test_disabled_installs_nothing() {
        let exporter = MetricsExporter::install(&MetricsConfig::default()).unwrap();
        assert!(exporter.is_none());
    }

    #[tokio::test]
    async fn test_finish_writes_textfile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playlake.prom");

        let recorder = PrometheusBuilder::new().build_recorder();
        let exporter = MetricsExporter::with_handle(recorder.handle(), Some(path.clone()));
        metrics::with_local_recorder(&recorder, || {
            emit!(RowsWritten {
                table: "songs",
                count: 3,
            });
        });

        exporter.finish().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("playlake_rows_written_total"));
        assert!(text.contains("table=\"songs\""));
        assert!(!path.with_extension("prom.tmp").exists());
    }

    #[tokio::test]
    async fn test_finish_without_path_is_noop() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let exporter = MetricsExporter::with_handle(recorder.handle(), None);
        exporter.finish().await.unwrap();
    }
}
