// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A single data file addressed by URL.

use diagnostics::*;
use records::sniff::SNIFF_BYTES;
use records::{PartialHints, RecordsFormat, RecordsSchema, Variant, sniff_hints};
use tokio::io::AsyncReadExt;
use urlfs::FileUrl;

use crate::error::Result;
use crate::sources::fileobjs::FileobjsSource;

#[derive(Debug)]
pub struct DataUrlSource {
    file: FileUrl,
    records_format: RecordsFormat,
    records_schema: Option<RecordsSchema>,
}

impl DataUrlSource {
    /// A file whose format is known
    #[must_use]
    pub fn new(file: FileUrl, records_format: RecordsFormat) -> Self {
        Self {
            file,
            records_format,
            records_schema: None,
        }
    }

    /// A file whose format is guessed from its name and first bytes.
    ///
    /// `.parquet` and `.avro` files are taken at their word; anything else
    /// is delimited, with `hints` winning over sniffed values.
    pub async fn sniff(file: FileUrl, hints: PartialHints) -> Result<Self> {
        let records_format = sniff_format(&file, hints).await?;
        Ok(Self::new(file, records_format))
    }

    #[must_use]
    pub fn with_records_schema(mut self, records_schema: Option<RecordsSchema>) -> Self {
        self.records_schema = records_schema;
        self
    }

    #[must_use]
    pub fn file(&self) -> &FileUrl {
        &self.file
    }

    #[must_use]
    pub fn records_format(&self) -> &RecordsFormat {
        &self.records_format
    }

    #[must_use]
    pub fn can_move_to_format(&self, format: &RecordsFormat) -> bool {
        *format == self.records_format
    }

    pub async fn to_fileobjs_source(&self) -> Result<FileobjsSource> {
        let fileobj = self.file.open().await?;
        let name = self.file.filename().to_string();
        Ok(FileobjsSource::new(vec![(name, fileobj)], self.records_format.clone())
            .with_records_schema(self.records_schema.clone()))
    }
}

/// Hints sniffed from the head of `file`, overlaid with `hints`
pub async fn sniffed_hints(file: &FileUrl, hints: &PartialHints) -> Result<PartialHints> {
    let mut head = Vec::new();
    _ = file.open().await?.take(SNIFF_BYTES as u64).read_to_end(&mut head).await?;
    let mut sniffed = sniff_hints(&head, Some(file.filename()));
    let found = sniffed.len();
    let url = file.url();
    debug!("Sniffed {found} hints from {url}", found: found, url: url);
    sniffed.extend(hints.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(sniffed)
}

async fn sniff_format(file: &FileUrl, hints: PartialHints) -> Result<RecordsFormat> {
    let name = file.filename().to_ascii_lowercase();
    if name.ends_with(".parquet") {
        return Ok(RecordsFormat::Parquet);
    }
    if name.ends_with(".avro") {
        return Ok(RecordsFormat::Avro);
    }
    let hints = sniffed_hints(file, &hints).await?;
    Ok(RecordsFormat::delimited(Variant::Csv, hints))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use records::ProcessingInstructions;
    use records::compression::compress_bytes;
    use serde_json::json;
    use urlfs::UrlResolver;

    #[tokio::test]
    async fn test_sniff_gzip_tab_separated() {
        let resolver = UrlResolver::default();
        let file = resolver.file_url("mem://bucket/in/data.tsv.gz").unwrap();
        let text = b"name\tcount\nann\t1\nbob\t2\n";
        let data = compress_bytes(Some(records::Compression::Gzip), text).unwrap();
        file.write_bytes(Bytes::from(data)).await.unwrap();

        let source = DataUrlSource::sniff(file, PartialHints::new()).await.unwrap();
        let delimited = source.records_format().as_delimited().unwrap();
        assert_eq!(delimited.compression(), Some(records::Compression::Gzip));
        assert_eq!(delimited.hints()["field-delimiter"], json!("\t"));
        assert!(delimited.header_row());

        let mut fileobjs = source.to_fileobjs_source().await.unwrap();
        assert_eq!(fileobjs.names(), vec!["data.tsv.gz"]);
        let pi = ProcessingInstructions::default();
        let schema = fileobjs.records_schema(&pi).await.unwrap().unwrap();
        assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["name", "count"]);
    }

    #[tokio::test]
    async fn test_caller_hints_win() {
        let resolver = UrlResolver::default();
        let file = resolver.file_url("mem://bucket/in/plain.csv").unwrap();
        file.store_string("a,b\n1,2\n").await.unwrap();
        let mut hints = PartialHints::new();
        _ = hints.insert("header-row".into(), json!(false));
        let source = DataUrlSource::sniff(file, hints).await.unwrap();
        let delimited = source.records_format().as_delimited().unwrap();
        assert!(!delimited.header_row());
        assert_eq!(delimited.compression(), None);
    }

    #[tokio::test]
    async fn test_columnar_files_by_extension() {
        let resolver = UrlResolver::default();
        let file = resolver.file_url("mem://bucket/in/x.parquet").unwrap();
        let source = DataUrlSource::sniff(file, PartialHints::new()).await.unwrap();
        assert_eq!(source.records_format(), &RecordsFormat::Parquet);
    }
}
