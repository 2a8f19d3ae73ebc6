// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Records directories: data files plus `_schema.json`, `_format_<type>`
//! and a manifest.
//!
//! A writer saves data files, writes `manifest`, saves the schema and
//! format documents, then renames `manifest` to `_manifest`. Readers treat
//! the existence of `_manifest` as the completion signal.

pub mod manifest;

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use diagnostics::*;
use records::{ProcessingInstructions, RecordsFormat, RecordsSchema};
use tokio::io::AsyncSeekExt;
use urlfs::{DirectoryUrl, FileUrl, Fileobj, UrlResolver};

use crate::error::{MoverError, Result};
use manifest::{FINAL, Manifest, ManifestEntry, PRELIMINARY, is_data_file};

/// Name of the schema document
pub const SCHEMA_FILE: &str = "_schema.json";

const FORMAT_FILES: [&str; 3] = ["_format_delimited", "_format_parquet", "_format_avro"];

/// Polling used while waiting for eventually consistent objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub poll: Duration,
    pub timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Whether several files in `format` can be joined byte-wise into one.
///
/// Only headerless delimited data qualifies; LZO members do not
/// concatenate.
pub fn check_concatenation(format: &RecordsFormat) -> Result<()> {
    match format.as_delimited() {
        Some(d) if d.header_row() => Err(MoverError::not_supported(
            "concatenating delimited files that carry header rows",
        )),
        Some(d) if d.compression() == Some(records::Compression::Lzo) => Err(
            MoverError::not_supported("concatenating LZO compressed files"),
        ),
        Some(_) => Ok(()),
        None => Err(MoverError::not_supported(format!(
            "concatenating {} files",
            format.format_type()
        ))),
    }
}

#[derive(Clone)]
pub struct RecordsDirectory {
    loc: DirectoryUrl,
    resolver: Arc<UrlResolver>,
    wait: WaitSettings,
}

impl RecordsDirectory {
    #[must_use]
    pub fn new(loc: DirectoryUrl, resolver: Arc<UrlResolver>) -> Self {
        Self {
            loc,
            resolver,
            wait: WaitSettings::default(),
        }
    }

    #[must_use]
    pub fn with_wait(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    /// Another directory sharing this one's resolver and wait settings
    #[must_use]
    pub fn sibling(&self, loc: DirectoryUrl) -> Self {
        Self {
            loc,
            resolver: self.resolver.clone(),
            wait: self.wait,
        }
    }

    #[must_use]
    pub fn loc(&self) -> &DirectoryUrl {
        &self.loc
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<UrlResolver> {
        &self.resolver
    }

    #[must_use]
    pub fn wait_settings(&self) -> WaitSettings {
        self.wait
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.loc.is_empty().await?)
    }

    /// URL of the finalized manifest, whether or not it exists yet
    pub fn manifest_url(&self) -> Result<String> {
        Ok(self.loc.file_in_this_directory(FINAL)?.url().to_string())
    }

    /// Write each named stream as-is, then the manifest, schema and format,
    /// and finalize.
    pub async fn save_fileobjs(
        &self,
        fileobjs: &mut [(String, Fileobj)],
        schema: Option<&RecordsSchema>,
        format: Option<&RecordsFormat>,
    ) -> Result<Vec<(FileUrl, u64)>> {
        let mut details = Vec::with_capacity(fileobjs.len());
        for (name, fileobj) in fileobjs.iter_mut() {
            _ = fileobj.seek(SeekFrom::Start(0)).await?;
            let file = self.loc.file_in_this_directory(name)?;
            let length = file.upload_fileobj(fileobj).await?;
            details.push((file, length));
        }
        self.save_preliminary_manifest(Some(details.as_slice()))
            .await?;
        if let Some(schema) = schema {
            self.save_schema(schema).await?;
        }
        if let Some(format) = format {
            self.save_format(format).await?;
        }
        self.finalize_manifest().await?;
        Ok(details)
    }

    /// Write `manifest` from explicit entries, or from a listing of the
    /// directory when none are given.
    pub async fn save_preliminary_manifest(
        &self,
        url_details: Option<&[(FileUrl, u64)]>,
    ) -> Result<()> {
        let entries = match url_details {
            Some(details) => details
                .iter()
                .map(|(file, length)| ManifestEntry::new(file.url(), *length))
                .collect(),
            None => {
                let url = self.loc.url();
                warn!("Building manifest for {url} from a directory listing; this is best effort", url: url);
                let mut entries = Vec::new();
                for file in self.loc.files_in_directory().await? {
                    if is_data_file(file.filename()) {
                        let length = file.size().await?;
                        entries.push(ManifestEntry::new(file.url(), length));
                    }
                }
                entries
            }
        };
        self.write_manifest(&Manifest { entries }).await
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let file = self.loc.file_in_this_directory(PRELIMINARY)?;
        file.store_string(&serde_json::to_string(manifest)?).await?;
        let count = manifest.entries.len();
        let url = file.url();
        debug!("Wrote manifest {url} with {count} entries", url: url, count: count);
        Ok(())
    }

    /// Rename `manifest` to `_manifest` and wait until it is visible.
    pub async fn finalize_manifest(&self) -> Result<()> {
        let preliminary = self.loc.file_in_this_directory(PRELIMINARY)?;
        let finalized = self.loc.file_in_this_directory(FINAL)?;
        if finalized.exists().await? {
            finalized.delete().await?;
        }
        preliminary.rename_to(&finalized).await?;
        finalized
            .wait_to_exist(self.wait.poll, self.wait.timeout)
            .await?;
        Ok(())
    }

    pub async fn is_finalized(&self) -> Result<bool> {
        Ok(self.loc.file_in_this_directory(FINAL)?.exists().await?)
    }

    /// The finalized manifest, else the preliminary one
    pub async fn load_manifest(&self) -> Result<Option<Manifest>> {
        for name in [FINAL, PRELIMINARY] {
            let file = self.loc.file_in_this_directory(name)?;
            if let Some(doc) = file.json_contents().await? {
                return Ok(Some(serde_json::from_value(doc)?));
            }
        }
        Ok(None)
    }

    async fn require_manifest(&self) -> Result<Manifest> {
        self.load_manifest().await?.ok_or_else(|| {
            MoverError::Url(urlfs::Error::NotFound(format!(
                "{}{FINAL}",
                self.loc.url()
            )))
        })
    }

    pub async fn manifest_entry_urls(&self) -> Result<Vec<String>> {
        Ok(self.require_manifest().await?.urls())
    }

    /// Manifest entries with their resolved files. Missing non-mandatory
    /// entries are skipped with a warning.
    pub async fn entry_files(&self) -> Result<Vec<(ManifestEntry, FileUrl)>> {
        let manifest = self.require_manifest().await?;
        let mut files = Vec::with_capacity(manifest.entries.len());
        for entry in manifest.entries {
            let file = self.resolver.file_url(&entry.url)?;
            if !entry.mandatory && !file.exists().await? {
                let url = entry.url.as_str();
                warn!("Skipping missing optional manifest entry {url}", url: url);
                continue;
            }
            files.push((entry, file));
        }
        Ok(files)
    }

    pub async fn save_schema(&self, schema: &RecordsSchema) -> Result<()> {
        let file = self.loc.file_in_this_directory(SCHEMA_FILE)?;
        file.store_string(&schema.to_json_string()?).await?;
        Ok(())
    }

    pub async fn load_schema(&self) -> Result<Option<RecordsSchema>> {
        let file = self.loc.file_in_this_directory(SCHEMA_FILE)?;
        match file.json_contents().await? {
            Some(doc) => Ok(Some(RecordsSchema::from_json_value(&doc)?)),
            None => Ok(None),
        }
    }

    pub async fn save_format(&self, format: &RecordsFormat) -> Result<()> {
        let file = self.loc.file_in_this_directory(&format.document_name())?;
        file.store_string(&format.to_document().to_string()).await?;
        Ok(())
    }

    pub async fn load_format(&self, pi: &ProcessingInstructions) -> Result<Option<RecordsFormat>> {
        for name in FORMAT_FILES {
            let file = self.loc.file_in_this_directory(name)?;
            if let Some(doc) = file.json_contents().await? {
                return Ok(Some(RecordsFormat::from_document(&doc, pi)?));
            }
        }
        Ok(None)
    }

    /// Copy data and documents to `other`, regenerating the manifest with
    /// the new URLs. `other` is finalized iff this directory is.
    pub async fn copy_to(&self, other: &RecordsDirectory) -> Result<()> {
        let finalized = self.is_finalized().await?;
        let mut entries = Vec::new();
        for (entry, file) in self.entry_files().await? {
            let target = other.loc.file_in_this_directory(file.filename())?;
            file.copy_to(&target).await?;
            let length = match entry.content_length() {
                Some(length) => length,
                None => target.size().await?,
            };
            entries.push(ManifestEntry {
                mandatory: entry.mandatory,
                ..ManifestEntry::new(target.url(), length)
            });
        }
        let mut documents = FORMAT_FILES.to_vec();
        documents.push(SCHEMA_FILE);
        for name in documents {
            let file = self.loc.file_in_this_directory(name)?;
            if file.exists().await? {
                file.copy_to(&other.loc.file_in_this_directory(name)?)
                    .await?;
            }
        }
        other.write_manifest(&Manifest { entries }).await?;
        if finalized {
            other.finalize_manifest().await?;
        }
        let from = self.loc.url();
        let to = other.loc.url();
        info!("Copied records directory {from} to {to}", from: from, to: to);
        Ok(())
    }

    /// Write the directory's data as one file.
    ///
    /// A single entry is copied. Several entries are concatenated only for
    /// headerless delimited data; GZIP and BZIP members concatenate into a
    /// valid multi-member stream.
    pub async fn save_to_url(&self, output: &FileUrl, format: &RecordsFormat) -> Result<u64> {
        let files: Vec<FileUrl> = self
            .entry_files()
            .await?
            .into_iter()
            .map(|(_, file)| file)
            .collect();
        if let [only] = files.as_slice() {
            only.copy_to(output).await?;
            return Ok(output.size().await?);
        }
        if files.len() > 1 {
            check_concatenation(format)?;
        }
        Ok(output.concatenate_from(&files).await?)
    }

    /// Wait for `_manifest`, then for every file it names.
    pub async fn await_completion(&self) -> Result<()> {
        let finalized = self.loc.file_in_this_directory(FINAL)?;
        finalized
            .wait_to_exist(self.wait.poll, self.wait.timeout)
            .await?;
        for entry in self.require_manifest().await?.entries {
            let file = self.resolver.file_url(&entry.url)?;
            if entry.mandatory {
                file.wait_to_exist(self.wait.poll, self.wait.timeout)
                    .await?;
            } else if !file.exists().await? {
                let url = entry.url.as_str();
                warn!("Optional manifest entry {url} is missing", url: url);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for RecordsDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordsDirectory({})", self.loc.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use records::{FieldConstraints, FieldType, RecordsSchemaField, Variant};
    use serde_json::json;

    fn fast() -> WaitSettings {
        WaitSettings {
            poll: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        }
    }

    fn directory(resolver: &Arc<UrlResolver>, url: &str) -> RecordsDirectory {
        RecordsDirectory::new(resolver.directory_url(url).unwrap(), resolver.clone())
            .with_wait(fast())
    }

    fn cursor(data: &'static [u8]) -> Fileobj {
        Box::new(std::io::Cursor::new(data))
    }

    #[tokio::test]
    async fn test_save_fileobjs_finalizes() {
        let resolver = Arc::new(UrlResolver::default());
        let dir = directory(&resolver, "mem://bucket/out/");
        let schema = RecordsSchema::new(vec![RecordsSchemaField::new(
            "n",
            FieldType::Integer,
            FieldConstraints::integer(0, 10),
        )]);
        let format = RecordsFormat::delimited(Variant::Csv, records::PartialHints::new());
        let mut fileobjs = vec![
            ("data000.csv.gz".to_string(), cursor(b"abc")),
            ("data001.csv.gz".to_string(), cursor(b"defgh")),
        ];

        _ = dir
            .save_fileobjs(&mut fileobjs, Some(&schema), Some(&format))
            .await
            .unwrap();

        assert!(dir.is_finalized().await.unwrap());
        let files = dir.loc().files_in_directory().await.unwrap();
        let names: Vec<&str> = files.iter().map(FileUrl::filename).collect();
        assert_eq!(
            names,
            vec!["_format_delimited", "_manifest", "_schema.json", "data000.csv.gz", "data001.csv.gz"]
        );
        for (entry, file) in dir.entry_files().await.unwrap() {
            assert_eq!(entry.content_length(), Some(file.size().await.unwrap()));
        }
        let pi = ProcessingInstructions::default();
        assert_eq!(dir.load_format(&pi).await.unwrap(), Some(format));
        assert_eq!(dir.load_schema().await.unwrap(), Some(schema));
    }

    #[tokio::test]
    async fn test_preliminary_manifest_from_listing() {
        let resolver = Arc::new(UrlResolver::default());
        let dir = directory(&resolver, "mem://bucket/listing/");
        for (name, data) in [("a.csv", "1\n"), ("b.csv", "22\n"), ("_schema.json", "{}")] {
            dir.loc()
                .file_in_this_directory(name)
                .unwrap()
                .write_bytes(Bytes::from(data))
                .await
                .unwrap();
        }
        dir.save_preliminary_manifest(None).await.unwrap();
        assert!(!dir.is_finalized().await.unwrap());
        assert_eq!(
            dir.manifest_entry_urls().await.unwrap(),
            vec!["mem://bucket/listing/a.csv", "mem://bucket/listing/b.csv"]
        );
        dir.finalize_manifest().await.unwrap();
        assert!(dir.is_finalized().await.unwrap());
        dir.await_completion().await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_to_regenerates_manifest() {
        let resolver = Arc::new(UrlResolver::default());
        let src = directory(&resolver, "mem://one/src/");
        let mut fileobjs = vec![("data.csv".to_string(), cursor(b"x,y\n"))];
        _ = src
            .save_fileobjs(&mut fileobjs, None, Some(&RecordsFormat::bluelabs()))
            .await
            .unwrap();

        let dst = directory(&resolver, "mem://two/dst/");
        src.copy_to(&dst).await.unwrap();

        assert!(dst.is_finalized().await.unwrap());
        assert_eq!(
            dst.manifest_entry_urls().await.unwrap(),
            vec!["mem://two/dst/data.csv"]
        );
        assert_eq!(
            src.manifest_entry_urls().await.unwrap().len(),
            dst.manifest_entry_urls().await.unwrap().len()
        );
        assert!(
            dst.loc()
                .file_in_this_directory("_format_delimited")
                .unwrap()
                .exists()
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_copy_of_unfinalized_stays_unfinalized() {
        let resolver = Arc::new(UrlResolver::default());
        let src = directory(&resolver, "mem://one/partial/");
        let file = src.loc().file_in_this_directory("part").unwrap();
        file.write_bytes(Bytes::from("x")).await.unwrap();
        src.save_preliminary_manifest(Some(&[(file, 1)][..]))
            .await
            .unwrap();

        let dst = directory(&resolver, "mem://two/partial/");
        src.copy_to(&dst).await.unwrap();
        assert!(!dst.is_finalized().await.unwrap());
        assert_eq!(dst.manifest_entry_urls().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_to_url_rules() {
        let resolver = Arc::new(UrlResolver::default());
        let dir = directory(&resolver, "mem://bucket/multi/");
        let mut fileobjs = vec![
            ("a.csv".to_string(), cursor(b"1,2\n")),
            ("b.csv".to_string(), cursor(b"3,4\n")),
        ];
        _ = dir.save_fileobjs(&mut fileobjs, None, None).await.unwrap();

        let headerless = RecordsFormat::delimited(Variant::Bluelabs, records::PartialHints::new())
            .alter_hints(&[("compression".to_string(), json!(null))].into());
        let out = resolver.file_url("mem://bucket/single.csv").unwrap();
        assert_eq!(dir.save_to_url(&out, &headerless).await.unwrap(), 8);
        assert_eq!(out.read_string().await.unwrap(), "1,2\n3,4\n");

        let with_header = headerless.alter_hints(&[("header-row".to_string(), json!(true))].into());
        assert!(matches!(
            dir.save_to_url(&out, &with_header).await,
            Err(MoverError::NotSupported(_))
        ));
        assert!(matches!(
            dir.save_to_url(&out, &RecordsFormat::Parquet).await,
            Err(MoverError::NotSupported(_))
        ));
    }

    #[tokio::test]
    async fn test_optional_entries_may_be_missing() {
        let resolver = Arc::new(UrlResolver::default());
        let dir = directory(&resolver, "mem://bucket/optional/");
        let present = dir.loc().file_in_this_directory("present").unwrap();
        present.write_bytes(Bytes::from("p")).await.unwrap();
        let manifest = json!({"entries": [
            {"url": "mem://bucket/optional/present", "mandatory": true},
            {"url": "mem://bucket/optional/absent", "mandatory": false},
        ]});
        dir.loc()
            .file_in_this_directory(FINAL)
            .unwrap()
            .store_string(&manifest.to_string())
            .await
            .unwrap();

        dir.await_completion().await.unwrap();
        let files = dir.entry_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1.filename(), "present");
    }

    #[tokio::test]
    async fn test_await_completion_times_out() {
        let resolver = Arc::new(UrlResolver::default());
        let dir = directory(&resolver, "mem://bucket/never/");
        let err = dir.await_completion().await.unwrap_err();
        assert!(matches!(err, MoverError::Url(urlfs::Error::NotVisible(_))));
    }
}
