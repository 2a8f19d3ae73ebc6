// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A lazy sequence of dataframe chunks, and its serialization to files.

use std::io::{SeekFrom, Write};

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use diagnostics::*;
use futures::TryStreamExt;
use records::compression::CompressedWriter;
use records::encoding::encode_text;
use records::{ProcessingInstructions, RecordsFormat, RecordsSchema, Variant};
use tokio::io::AsyncSeekExt;
use urlfs::Fileobj;

use crate::dataframes::columnar::{avro_unsupported, write_parquet};
use crate::dataframes::encode::{DelimitedEncoder, writer_hints};
use crate::dataframes::{DataframeStream, rows_per_chunk, split_batch, stream_from_batches};
use crate::directory::RecordsDirectory;
use crate::error::Result;
use crate::sources::fileobjs::FileobjsSource;

/// Encodes chunks in one records format
enum ChunkWriter {
    Delimited(DelimitedEncoder),
    Parquet,
}

impl ChunkWriter {
    fn new(format: &RecordsFormat, pi: &ProcessingInstructions) -> Result<Self> {
        match format {
            RecordsFormat::Delimited(delimited) => Ok(ChunkWriter::Delimited(DelimitedEncoder::new(
                writer_hints(delimited, pi)?,
            ))),
            RecordsFormat::Parquet => Ok(ChunkWriter::Parquet),
            RecordsFormat::Avro => Err(avro_unsupported()),
        }
    }

    /// One file per chunk; a delimited header row goes in the first only
    fn encode(&self, batch: &RecordBatch, first: bool) -> Result<Vec<u8>> {
        match self {
            ChunkWriter::Delimited(encoder) => encoder.encode_file(batch, first),
            ChunkWriter::Parquet => write_parquet(batch.schema(), std::slice::from_ref(batch)),
        }
    }
}

/// Spill bytes to an anonymous temporary file, removed when closed
async fn spill(data: &[u8]) -> Result<Fileobj> {
    let mut file = tempfile::tempfile()?;
    file.write_all(data)?;
    let mut file = tokio::fs::File::from_std(file);
    _ = file.seek(SeekFrom::Start(0)).await?;
    Ok(Box::new(file))
}

pub struct DataframesSource {
    stream: DataframeStream,
    arrow_schema: Option<SchemaRef>,
    records_schema: Option<RecordsSchema>,
    preferred_format: Option<RecordsFormat>,
}

impl DataframesSource {
    #[must_use]
    pub fn new(stream: DataframeStream) -> Self {
        Self {
            stream,
            arrow_schema: None,
            records_schema: None,
            preferred_format: None,
        }
    }

    #[must_use]
    pub fn from_batches(batches: Vec<RecordBatch>) -> Self {
        let arrow_schema = batches.first().map(RecordBatch::schema);
        let mut source = Self::new(stream_from_batches(batches));
        source.arrow_schema = arrow_schema;
        source
    }

    /// Column types to use when the stream turns out to be empty
    #[must_use]
    pub fn with_arrow_schema(mut self, schema: SchemaRef) -> Self {
        self.arrow_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_records_schema(mut self, schema: RecordsSchema) -> Self {
        self.records_schema = Some(schema);
        self
    }

    /// Format to keep when the destination can take it
    #[must_use]
    pub fn with_preferred_format(mut self, format: Option<RecordsFormat>) -> Self {
        self.preferred_format = format;
        self
    }

    #[must_use]
    pub fn preferred_format(&self) -> Option<&RecordsFormat> {
        self.preferred_format.as_ref()
    }

    #[must_use]
    pub fn into_stream(self) -> DataframeStream {
        self.stream
    }

    /// Whether chunks can be serialized in `format`
    #[must_use]
    pub fn can_write_format(format: &RecordsFormat, pi: &ProcessingInstructions) -> bool {
        match format {
            RecordsFormat::Delimited(delimited) => writer_hints(delimited, pi).is_ok(),
            RecordsFormat::Parquet => true,
            RecordsFormat::Avro => false,
        }
    }

    /// Best first: the preferred format, then bluelabs, csv and Parquet
    #[must_use]
    pub fn known_supported_records_formats(&self) -> Vec<RecordsFormat> {
        let mut formats: Vec<RecordsFormat> = self.preferred_format.iter().cloned().collect();
        for format in [
            RecordsFormat::bluelabs(),
            RecordsFormat::delimited(Variant::Csv, records::PartialHints::new()),
            RecordsFormat::Parquet,
        ] {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        formats
    }

    /// The format to serialize in for a destination offering `supported`.
    ///
    /// Keeps the preferred format when the destination accepts it, else
    /// the destination's first writable format, else bluelabs.
    #[must_use]
    pub fn choose_format<F>(
        &self,
        supported: &[RecordsFormat],
        accepts: F,
        pi: &ProcessingInstructions,
    ) -> RecordsFormat
    where
        F: Fn(&RecordsFormat) -> bool,
    {
        if let Some(preferred) = &self.preferred_format {
            if accepts(preferred) && Self::can_write_format(preferred, pi) {
                return preferred.clone();
            }
        }
        supported
            .iter()
            .find(|format| Self::can_write_format(format, pi))
            .cloned()
            .unwrap_or_else(RecordsFormat::bluelabs)
    }

    fn schema_from_sample(
        records_schema: Option<RecordsSchema>,
        arrow_schema: Option<&SchemaRef>,
        sample: &[RecordBatch],
        pi: &ProcessingInstructions,
    ) -> Result<Option<RecordsSchema>> {
        if records_schema.is_some() {
            return Ok(records_schema);
        }
        let Some(arrow_schema) = arrow_schema else {
            return Ok(None);
        };
        Ok(Some(
            RecordsSchema::from_arrow_schema(arrow_schema)?
                .with_sampled_statistics(sample, pi.inference_rows()),
        ))
    }

    /// Write every chunk to its own temporary file `dataNNN.<ext>`.
    ///
    /// Chunks are capped at two million cells. The temporary files go away
    /// when the returned source is dropped.
    pub async fn to_fileobjs_source(
        self,
        format: &RecordsFormat,
        pi: &ProcessingInstructions,
    ) -> Result<FileobjsSource> {
        let writer = ChunkWriter::new(format, pi)?;
        let mut stream = self.stream;
        let mut arrow_schema = self.arrow_schema;
        let mut sample: Vec<RecordBatch> = Vec::new();
        let mut sampled = 0usize;
        let mut fileobjs = Vec::new();
        let mut rows = 0u64;
        while let Some(batch) = stream.try_next().await? {
            for chunk in split_batch(&batch, rows_per_chunk(batch.num_columns())) {
                if arrow_schema.is_none() {
                    arrow_schema = Some(chunk.schema());
                }
                if sampled < pi.inference_rows() {
                    sampled += chunk.num_rows();
                    sample.push(chunk.clone());
                }
                let name = format.generate_filename(&format!("data{:03}", fileobjs.len()));
                let data = writer.encode(&chunk, fileobjs.is_empty())?;
                fileobjs.push((name, spill(&data).await?));
                rows += chunk.num_rows() as u64;
            }
        }
        let files = fileobjs.len();
        debug!("Serialized {rows} rows into {files} files", rows: rows, files: files);
        let records_schema =
            Self::schema_from_sample(self.records_schema, arrow_schema.as_ref(), &sample, pi)?;
        Ok(FileobjsSource::new(fileobjs, format.clone())
            .with_records_schema(records_schema)
            .with_row_count(Some(rows)))
    }

    pub async fn move_to_records_directory(
        self,
        directory: &RecordsDirectory,
        format: &RecordsFormat,
        pi: &ProcessingInstructions,
    ) -> Result<Option<u64>> {
        self.to_fileobjs_source(format, pi)
            .await?
            .move_to_records_directory(directory, pi)
            .await
    }

    /// Every chunk in one file.
    ///
    /// Delimited output carries the header on the first chunk only and is
    /// compressed once. Returns the bytes, rows and records schema.
    pub async fn into_single_file(
        self,
        format: &RecordsFormat,
        pi: &ProcessingInstructions,
    ) -> Result<(Vec<u8>, u64, Option<RecordsSchema>)> {
        let mut stream = self.stream;
        let mut batches = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            batches.push(batch);
        }
        let arrow_schema = self
            .arrow_schema
            .or_else(|| batches.first().map(RecordBatch::schema));
        let rows: u64 = batches.iter().map(|b| b.num_rows() as u64).sum();
        let data = match format {
            RecordsFormat::Delimited(delimited) => {
                let encoder = DelimitedEncoder::new(writer_hints(delimited, pi)?);
                let mut text = String::new();
                for (index, batch) in batches.iter().enumerate() {
                    text.push_str(&encoder.encode_text(batch, index == 0)?);
                }
                let hints = encoder.hints();
                let mut writer = CompressedWriter::new(hints.compression, Vec::new())?;
                writer.write_all(&encode_text(hints.encoding, &text)?)?;
                writer.finish()?
            }
            RecordsFormat::Parquet => match &arrow_schema {
                Some(schema) => write_parquet(schema.clone(), &batches)?,
                None => Vec::new(),
            },
            RecordsFormat::Avro => return Err(avro_unsupported()),
        };
        let records_schema =
            Self::schema_from_sample(self.records_schema, arrow_schema.as_ref(), &batches, pi)?;
        let size = data.len();
        debug!("Serialized {rows} rows into one {size} byte file", rows: rows, size: size);
        Ok((data, rows, records_schema))
    }
}

impl std::fmt::Debug for DataframesSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataframesSource")
            .field("arrow_schema", &self.arrow_schema)
            .field("preferred_format", &self.preferred_format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::vendors::read_fileobj;
    use arrow_array::record_batch;
    use records::PartialHints;
    use serde_json::json;

    fn csv_uncompressed() -> RecordsFormat {
        let mut hints = PartialHints::new();
        _ = hints.insert("compression".into(), json!(null));
        RecordsFormat::delimited(Variant::Csv, hints)
    }

    fn batches() -> Vec<RecordBatch> {
        vec![
            record_batch!(("id", Int64, [1, 2]), ("name", Utf8, ["a", "b"])).unwrap(),
            record_batch!(("id", Int64, [3]), ("name", Utf8, ["c"])).unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_fileobjs_one_per_chunk() {
        let pi = ProcessingInstructions::default();
        let mut fileobjs = DataframesSource::from_batches(batches())
            .to_fileobjs_source(&csv_uncompressed(), &pi)
            .await
            .unwrap();
        assert_eq!(fileobjs.names(), vec!["data000.csv", "data001.csv"]);
        assert_eq!(fileobjs.row_count(), Some(3));
        let schema = fileobjs.records_schema(&pi).await.unwrap().unwrap();
        assert_eq!(schema.len(), 2);
        let parts = fileobjs.fileobjs_mut();
        let first = String::from_utf8(read_fileobj(&mut parts[0].1).await.unwrap()).unwrap();
        assert_eq!(first, "id,name\n1,a\n2,b\n");
        let second = String::from_utf8(read_fileobj(&mut parts[1].1).await.unwrap()).unwrap();
        assert_eq!(second, "3,c\n");
    }

    #[tokio::test]
    async fn test_single_file_has_one_header() {
        let pi = ProcessingInstructions::default();
        let (data, rows, schema) = DataframesSource::from_batches(batches())
            .into_single_file(&csv_uncompressed(), &pi)
            .await
            .unwrap();
        assert_eq!(rows, 3);
        assert_eq!(schema.unwrap().len(), 2);
        assert_eq!(String::from_utf8(data).unwrap(), "id,name\n1,a\n2,b\n3,c\n");
    }

    #[tokio::test]
    async fn test_empty_stream_keeps_declared_schema() {
        let pi = ProcessingInstructions::default();
        let schema = batches()[0].schema();
        let mut fileobjs = DataframesSource::from_batches(Vec::new())
            .with_arrow_schema(schema)
            .to_fileobjs_source(&RecordsFormat::bluelabs(), &pi)
            .await
            .unwrap();
        assert!(fileobjs.names().is_empty());
        assert_eq!(fileobjs.row_count(), Some(0));
        assert_eq!(fileobjs.records_schema(&pi).await.unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_choose_format() {
        let pi = ProcessingInstructions::default();
        let source = DataframesSource::from_batches(Vec::new());
        let supported = vec![RecordsFormat::Avro, RecordsFormat::Parquet];
        assert_eq!(
            source.choose_format(&supported, |_| true, &pi),
            RecordsFormat::Parquet
        );
        assert_eq!(
            source.choose_format(&[], |_| true, &pi),
            RecordsFormat::bluelabs()
        );
        let source = source.with_preferred_format(Some(csv_uncompressed()));
        assert_eq!(
            source.choose_format(&supported, |_| true, &pi),
            csv_uncompressed()
        );
        assert_eq!(
            source.choose_format(&supported, |f| *f == RecordsFormat::Parquet, &pi),
            RecordsFormat::Parquet
        );
    }
}
