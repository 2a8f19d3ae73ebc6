// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! File and directory handles addressed by URL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use bytes::Bytes;
use diagnostics::*;
use futures::TryStreamExt;
use object_store::buffered::{BufReader, BufWriter};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWriteExt};
use url::Url;

use crate::error::{Error, Result};
use crate::location::{AwsCreds, CloudLocation};

/// A readable, rewindable byte stream
pub trait AsyncReadSeek: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> AsyncReadSeek for T {}

pub type Fileobj = Box<dyn AsyncReadSeek>;

/// Everything needed to reach one object or prefix.
#[derive(Clone)]
pub(crate) struct Location {
    pub(crate) url: Url,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) path: Path,
    pub(crate) aws: Option<AwsCreds>,
    pub(crate) region: Option<String>,
}

impl Location {
    fn child(&self, name: &str, directory: bool) -> Result<Location> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::invalid_url(
                self.url.as_str(),
                format!("invalid child name {name:?}"),
            ));
        }
        let segment = if directory {
            format!("{name}/")
        } else {
            name.to_string()
        };
        let url = self
            .url
            .join(&segment)
            .map_err(|e| Error::invalid_url(self.url.as_str(), e.to_string()))?;
        Ok(Location {
            url,
            store: self.store.clone(),
            path: self.path.child(name),
            aws: self.aws.clone(),
            region: self.region.clone(),
        })
    }

    fn cloud_location(&self) -> Option<CloudLocation> {
        match self.url.scheme() {
            scheme @ ("s3" | "gs") => Some(CloudLocation {
                scheme: scheme.to_string(),
                bucket: self.url.host_str().unwrap_or_default().to_string(),
                key: self.url.path().trim_start_matches('/').to_string(),
            }),
            _ => None,
        }
    }

    fn same_store(&self, other: &Location) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

#[derive(Clone)]
pub struct FileUrl {
    loc: Location,
}

impl FileUrl {
    pub(crate) fn new(loc: Location) -> Self {
        Self { loc }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.loc.url.as_str()
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.loc.url.scheme()
    }

    /// Last path segment
    #[must_use]
    pub fn filename(&self) -> &str {
        self.loc.path.filename().unwrap_or_default()
    }

    pub async fn exists(&self) -> Result<bool> {
        match self.loc.store.head(&self.loc.path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn size(&self) -> Result<u64> {
        let meta = self
            .loc
            .store
            .head(&self.loc.path)
            .await
            .map_err(|e| Error::from_store(self.url(), e))?;
        Ok(meta.size)
    }

    pub async fn read_bytes(&self) -> Result<Bytes> {
        let result = self
            .loc
            .store
            .get(&self.loc.path)
            .await
            .map_err(|e| Error::from_store(self.url(), e))?;
        Ok(result.bytes().await?)
    }

    pub async fn read_string(&self) -> Result<String> {
        let bytes = self.read_bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Open for streaming reads; the handle can seek back to the start.
    pub async fn open(&self) -> Result<Fileobj> {
        let meta = self
            .loc
            .store
            .head(&self.loc.path)
            .await
            .map_err(|e| Error::from_store(self.url(), e))?;
        Ok(Box::new(BufReader::new(self.loc.store.clone(), &meta)))
    }

    pub async fn write_bytes(&self, data: Bytes) -> Result<()> {
        _ = self
            .loc
            .store
            .put(&self.loc.path, PutPayload::from(data))
            .await?;
        Ok(())
    }

    pub async fn store_string(&self, contents: &str) -> Result<()> {
        self.write_bytes(Bytes::from(contents.to_string())).await
    }

    /// Parsed JSON contents, or `None` when the file does not exist
    pub async fn json_contents(&self) -> Result<Option<serde_json::Value>> {
        match self.read_bytes().await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stream a reader into this file, returning the bytes written.
    pub async fn upload_fileobj<R>(&self, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut writer = BufWriter::new(self.loc.store.clone(), self.loc.path.clone());
        let written = tokio::io::copy(reader, &mut writer).await?;
        writer.shutdown().await?;
        let url = self.url();
        debug!("Uploaded {written} bytes to {url}", written: written, url: url);
        Ok(written)
    }

    pub async fn delete(&self) -> Result<()> {
        self.loc
            .store
            .delete(&self.loc.path)
            .await
            .map_err(|e| Error::from_store(self.url(), e))
    }

    pub async fn copy_to(&self, other: &FileUrl) -> Result<()> {
        if self.loc.same_store(&other.loc) {
            return self
                .loc
                .store
                .copy(&self.loc.path, &other.loc.path)
                .await
                .map_err(|e| Error::from_store(self.url(), e));
        }
        let mut reader = self.open().await?;
        _ = other.upload_fileobj(&mut reader).await?;
        Ok(())
    }

    /// Move this file; object stores copy then delete.
    pub async fn rename_to(&self, other: &FileUrl) -> Result<()> {
        if self.loc.same_store(&other.loc) {
            return self
                .loc
                .store
                .rename(&self.loc.path, &other.loc.path)
                .await
                .map_err(|e| Error::from_store(self.url(), e));
        }
        self.copy_to(other).await?;
        self.delete().await
    }

    /// Replace this file with the byte-wise concatenation of `files`.
    pub async fn concatenate_from(&self, files: &[FileUrl]) -> Result<u64> {
        let mut writer = BufWriter::new(self.loc.store.clone(), self.loc.path.clone());
        let mut total = 0;
        for file in files {
            let mut reader = file.open().await?;
            total += tokio::io::copy(&mut reader, &mut writer).await?;
        }
        writer.shutdown().await?;
        Ok(total)
    }

    /// Poll until the file is visible, giving up after `timeout`.
    pub async fn wait_to_exist(&self, poll: Duration, timeout: Duration) -> Result<()> {
        let attempts = usize::try_from(timeout.as_millis() / poll.as_millis().max(1))
            .unwrap_or(usize::MAX);
        let url = self.url();
        let check = || async {
            if self.exists().await? {
                Ok(())
            } else {
                Err(Error::NotVisible(self.url().to_string()))
            }
        };
        check
            .retry(
                ConstantBuilder::default()
                    .with_delay(poll)
                    .with_max_times(attempts),
            )
            .sleep(tokio::time::sleep)
            .when(|e| matches!(e, Error::NotVisible(_)))
            .notify(|_, _| debug!("Waiting for {url} to exist", url: url))
            .await
    }

    #[must_use]
    pub fn cloud_location(&self) -> Option<CloudLocation> {
        self.loc.cloud_location()
    }

    #[must_use]
    pub fn aws_creds(&self) -> Option<&AwsCreds> {
        self.loc.aws.as_ref()
    }
}

impl fmt::Debug for FileUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileUrl({})", self.url())
    }
}

impl PartialEq for FileUrl {
    fn eq(&self, other: &Self) -> bool {
        self.loc.url == other.loc.url
    }
}

/// A directory URL; always ends with `/`.
#[derive(Clone)]
pub struct DirectoryUrl {
    loc: Location,
}

impl DirectoryUrl {
    pub(crate) fn new(loc: Location) -> Self {
        Self { loc }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.loc.url.as_str()
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.loc.url.scheme()
    }

    pub fn file_in_this_directory(&self, name: &str) -> Result<FileUrl> {
        Ok(FileUrl::new(self.loc.child(name, false)?))
    }

    pub fn directory_in_this_directory(&self, name: &str) -> Result<DirectoryUrl> {
        Ok(DirectoryUrl::new(self.loc.child(name, true)?))
    }

    /// Files directly inside this directory, in name order
    pub async fn files_in_directory(&self) -> Result<Vec<FileUrl>> {
        let listing = self
            .loc
            .store
            .list_with_delimiter(Some(&self.loc.path))
            .await?;
        let mut names: Vec<String> = listing
            .objects
            .iter()
            .filter_map(|meta| meta.location.filename().map(str::to_string))
            .collect();
        names.sort();
        names
            .iter()
            .map(|name| self.file_in_this_directory(name))
            .collect()
    }

    /// True when nothing at all lives under this prefix
    pub async fn is_empty(&self) -> Result<bool> {
        let mut listing = self.loc.store.list(Some(&self.loc.path));
        Ok(listing.try_next().await?.is_none())
    }

    /// Delete everything under this prefix.
    pub async fn purge_directory(&self) -> Result<()> {
        let objects: Vec<_> = self
            .loc
            .store
            .list(Some(&self.loc.path))
            .try_collect()
            .await?;
        for meta in objects {
            match self.loc.store.delete(&meta.location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        let url = self.url();
        debug!("Purged {url}", url: url);
        Ok(())
    }

    /// Copy every file in this directory into `other`.
    pub async fn copy_to(&self, other: &DirectoryUrl) -> Result<Vec<FileUrl>> {
        let mut copied = Vec::new();
        for file in self.files_in_directory().await? {
            let target = other.file_in_this_directory(file.filename())?;
            file.copy_to(&target).await?;
            copied.push(target);
        }
        Ok(copied)
    }

    #[must_use]
    pub fn cloud_location(&self) -> Option<CloudLocation> {
        self.loc.cloud_location()
    }

    #[must_use]
    pub fn aws_creds(&self) -> Option<&AwsCreds> {
        self.loc.aws.as_ref()
    }

    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.loc.region.as_deref()
    }
}

impl fmt::Debug for DirectoryUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirectoryUrl({})", self.url())
    }
}

impl PartialEq for DirectoryUrl {
    fn eq(&self, other: &Self) -> bool {
        self.loc.url == other.loc.url
    }
}
