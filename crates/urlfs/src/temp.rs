// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Scoped temporary directories under a scratch location.

use std::future::Future;

use diagnostics::*;

use crate::error::Result;
use crate::handle::DirectoryUrl;

/// A uniquely named child directory that is purged by [`cleanup`](Self::cleanup).
pub struct TemporaryDirectory {
    dir: DirectoryUrl,
    cleaned: bool,
}

impl TemporaryDirectory {
    /// Reserve a new, empty child of `parent`.
    pub fn create(parent: &DirectoryUrl) -> Result<Self> {
        let name = uuid7::uuid7().to_string();
        let dir = parent.directory_in_this_directory(&name)?;
        let url = dir.url();
        debug!("Created temporary directory {url}", url: url);
        Ok(Self {
            dir,
            cleaned: false,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &DirectoryUrl {
        &self.dir
    }

    pub async fn cleanup(mut self) -> Result<()> {
        self.cleaned = true;
        self.dir.purge_directory().await
    }
}

impl Drop for TemporaryDirectory {
    fn drop(&mut self) {
        if !self.cleaned {
            let url = self.dir.url();
            warn!("Temporary directory {url} dropped without cleanup", url: url);
        }
    }
}

/// Run `body` with a fresh temporary directory under `parent`, purging it
/// afterwards whether or not `body` succeeded.
pub async fn with_temporary_directory<T, E, F, Fut>(
    parent: &DirectoryUrl,
    body: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(DirectoryUrl) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<crate::Error>,
{
    let temp = TemporaryDirectory::create(parent)?;
    let outcome = body(temp.dir().clone()).await;
    let cleaned = temp.cleanup().await;
    let value = outcome?;
    cleaned?;
    Ok(value)
}
