// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! URL-addressed files and directories over `object_store`.
//!
//! Every location a records mover touches (local paths, S3 and GCS buckets,
//! in-memory scratch space) is handled through [`FileUrl`] and
//! [`DirectoryUrl`], obtained from a [`UrlResolver`].

pub mod error;
pub mod location;
pub mod resolver;
pub mod temp;
mod handle;

pub use error::{Error, Result};
pub use location::{AwsCreds, CloudLocation};
pub use resolver::{AwsConfig, GcsConfig, UrlConfig, UrlResolver};
pub use temp::{TemporaryDirectory, with_temporary_directory};
pub use handle::{AsyncReadSeek, DirectoryUrl, FileUrl, Fileobj};
