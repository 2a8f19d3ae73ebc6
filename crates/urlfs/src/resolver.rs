// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Turns URL strings into [`FileUrl`] and [`DirectoryUrl`] handles.
//!
//! Supported schemes:
//! - `file://` local filesystem
//! - `mem://bucket/...` in-memory buckets, shared by everything using one resolver
//! - `s3://bucket/...` Amazon S3 (or a compatible endpoint)
//! - `gs://bucket/...` Google Cloud Storage

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use diagnostics::*;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::location::AwsCreds;
use crate::handle::{DirectoryUrl, FileUrl, Location};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// S3-compatible endpoint, e.g. MinIO
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

impl AwsConfig {
    fn creds(&self) -> Option<AwsCreds> {
        Some(AwsCreds {
            access_key_id: self.access_key_id.clone()?,
            secret_access_key: self.secret_access_key.clone()?,
            session_token: self.session_token.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcsConfig {
    #[serde(default)]
    pub service_account_path: Option<String>,
}

/// Credentials for the cloud schemes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlConfig {
    #[serde(default)]
    pub aws: Option<AwsConfig>,
    #[serde(default)]
    pub gcs: Option<GcsConfig>,
}

type StoreMap = Mutex<HashMap<String, Arc<dyn ObjectStore>>>;

/// Resolves URLs, caching one store per bucket.
#[derive(Debug)]
pub struct UrlResolver {
    config: UrlConfig,
    local: Arc<dyn ObjectStore>,
    stores: StoreMap,
}

impl UrlResolver {
    #[must_use]
    pub fn new(config: UrlConfig) -> Self {
        Self {
            config,
            local: Arc::new(LocalFileSystem::new()),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Serve every URL under `bucket_url` (e.g. `s3://bucket`) from `store`.
    #[must_use]
    pub fn with_store(self, bucket_url: &str, store: Arc<dyn ObjectStore>) -> Self {
        let key = bucket_url.trim_end_matches('/').to_string();
        _ = self
            .stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, store);
        self
    }

    /// Back a cloud bucket with process memory
    #[must_use]
    pub fn with_memory_bucket(self, bucket_url: &str) -> Self {
        self.with_store(bucket_url, Arc::new(InMemory::new()))
    }

    fn cached_store<F>(&self, key: String, build: F) -> Result<Arc<dyn ObjectStore>>
    where
        F: FnOnce() -> Result<Arc<dyn ObjectStore>>,
    {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| Error::Config("store cache lock poisoned".into()))?;
        if let Some(store) = stores.get(&key) {
            return Ok(store.clone());
        }
        let store = build()?;
        _ = stores.insert(key, store.clone());
        Ok(store)
    }

    fn build_s3(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let aws = self.config.aws.clone().unwrap_or_default();
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = &aws.region {
            builder = builder.with_region(region);
        }
        if let Some(key) = &aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(token) = &aws.session_token {
            builder = builder.with_token(token);
        }
        if let Some(endpoint) = &aws.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        let store = builder
            .with_allow_http(aws.allow_http)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build S3 store: {e}")))?;
        debug!("Built S3 store for bucket {bucket}", bucket: bucket);
        Ok(Arc::new(store))
    }

    fn build_gcs(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Some(path) = self
            .config
            .gcs
            .as_ref()
            .and_then(|g| g.service_account_path.as_ref())
        {
            builder = builder.with_service_account_path(path);
        }
        let store = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build GCS store: {e}")))?;
        debug!("Built GCS store for bucket {bucket}", bucket: bucket);
        Ok(Arc::new(store))
    }

    fn locate(&self, url: Url) -> Result<Location> {
        let path = Path::from_url_path(url.path())?;
        let bucket = url.host_str().unwrap_or_default().to_string();
        let (store, aws, region) = match url.scheme() {
            "file" => (self.local.clone(), None, None),
            "mem" => {
                let store = self.cached_store(format!("mem://{bucket}"), || {
                    Ok(Arc::new(InMemory::new()) as Arc<dyn ObjectStore>)
                })?;
                (store, None, None)
            }
            "s3" => {
                let store = self.cached_store(format!("s3://{bucket}"), || self.build_s3(&bucket))?;
                let aws = self.config.aws.as_ref();
                (
                    store,
                    aws.and_then(AwsConfig::creds),
                    aws.and_then(|a| a.region.clone()),
                )
            }
            "gs" => {
                let store = self.cached_store(format!("gs://{bucket}"), || self.build_gcs(&bucket))?;
                (store, None, None)
            }
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        };
        if url.scheme() != "file" && bucket.is_empty() {
            return Err(Error::invalid_url(url.as_str(), "missing bucket"));
        }
        Ok(Location {
            url,
            store,
            path,
            aws,
            region,
        })
    }

    fn parse(url: &str) -> Result<Url> {
        Url::parse(url).map_err(|e| Error::invalid_url(url, e.to_string()))
    }

    pub fn file_url(&self, url: &str) -> Result<FileUrl> {
        let parsed = Self::parse(url)?;
        if parsed.path().ends_with('/') {
            return Err(Error::invalid_url(url, "file URL ends with /"));
        }
        Ok(FileUrl::new(self.locate(parsed)?))
    }

    /// Directory handle; a trailing `/` is added when missing.
    pub fn directory_url(&self, url: &str) -> Result<DirectoryUrl> {
        let url = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };
        Ok(DirectoryUrl::new(self.locate(Self::parse(&url)?)?))
    }
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new(UrlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_url_gets_trailing_slash() {
        let resolver = UrlResolver::default();
        let dir = resolver.directory_url("mem://bucket/out").unwrap();
        assert_eq!(dir.url(), "mem://bucket/out/");
        let file = dir.file_in_this_directory("_manifest").unwrap();
        assert_eq!(file.url(), "mem://bucket/out/_manifest");
        assert_eq!(file.filename(), "_manifest");
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        let resolver = UrlResolver::default();
        assert!(matches!(
            resolver.file_url("ftp://host/x.csv"),
            Err(Error::UnsupportedScheme(_))
        ));
        assert!(resolver.file_url("mem://bucket/dir/").is_err());
    }

    #[test]
    fn test_cloud_location_and_creds() {
        let resolver = UrlResolver::new(UrlConfig {
            aws: Some(AwsConfig {
                region: Some("us-east-1".into()),
                access_key_id: Some("AKIA".into()),
                secret_access_key: Some("secret".into()),
                ..AwsConfig::default()
            }),
            gcs: None,
        });
        let dir = resolver.directory_url("s3://bucket/some/prefix").unwrap();
        let loc = dir.cloud_location().unwrap();
        assert!(loc.is_s3());
        assert_eq!(loc.bucket, "bucket");
        assert_eq!(loc.key, "some/prefix/");
        assert!(dir.aws_creds().unwrap().is_long_lived());
        assert_eq!(dir.region(), Some("us-east-1"));
    }

    #[tokio::test]
    async fn test_memory_bucket_serves_cloud_urls() {
        let resolver = UrlResolver::default().with_memory_bucket("s3://bucket/");
        let file = resolver.file_url("s3://bucket/a/b.txt").unwrap();
        file.store_string("hello").await.unwrap();
        let again = resolver.file_url("s3://bucket/a/b.txt").unwrap();
        assert_eq!(again.read_string().await.unwrap(), "hello");
        assert_eq!(again.scheme(), "s3");
    }
}
