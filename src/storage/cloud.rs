//! Bucket-backed stores: S3 (and S3-compatible endpoints) and GCS.
//!
//! Both builders start from the environment, then apply the `storage_options`
//! map from the config section. Option keys are whatever `object_store`
//! accepts (`aws_region`, `skip_signature`, `google_service_account`, ...),
//! so a public input bucket can be read anonymously with
//! `skip_signature: "true"`.

use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::{ObjectStore, RetryConfig};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{GcsConfigSnafu, S3ConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// An S3 bucket, optionally behind a custom endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// `protocol://host:port` of an S3-compatible service.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
    pub key: Option<Path>,
}

/// A GCS bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsConfig {
    pub bucket: String,
    pub key: Option<Path>,
}

fn bucket_url(scheme: &str, bucket: &str, key: Option<&Path>) -> String {
    match key {
        Some(key) => format!("{scheme}://{bucket}/{key}"),
        None => format!("{scheme}://{bucket}"),
    }
}

impl StorageProvider {
    pub(super) fn construct_s3(
        config: S3Config,
        options: &HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_retry(RetryConfig::default());
        for (key, value) in options {
            builder = builder.with_config(key.parse().context(S3ConfigSnafu)?, value);
        }

        // explicit URL parts win over the environment
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            debug!("Using S3 endpoint {}", endpoint);
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(S3ConfigSnafu)?);
        Ok(Self {
            canonical_url: bucket_url("s3", &config.bucket, config.key.as_ref()),
            config: BackendConfig::S3(config),
            object_store,
        })
    }

    pub(super) fn construct_gcs(
        config: GcsConfig,
        options: &HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&config.bucket)
            .with_retry(RetryConfig::default());
        for (key, value) in options {
            builder = builder.with_config(key.parse().context(GcsConfigSnafu)?, value);
        }

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(GcsConfigSnafu)?);
        Ok(Self {
            canonical_url: bucket_url("gs", &config.bucket, config.key.as_ref()),
            config: BackendConfig::Gcs(config),
            object_store,
        })
    }
}
