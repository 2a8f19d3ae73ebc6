// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Opened byte streams with a known records format.

use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use diagnostics::*;
use futures::{StreamExt, TryStreamExt};
use records::{ProcessingInstructions, RecordsFormat, RecordsSchema};
use urlfs::Fileobj;

use crate::dataframes::columnar::{avro_unsupported, read_parquet};
use crate::dataframes::decode::{DelimitedDecoder, reader_hints};
use crate::dataframes::{rows_per_chunk, split_batch};
use crate::db::vendors::read_fileobj;
use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use crate::sources::dataframes::DataframesSource;

/// Named streams in one records format.
pub struct FileobjsSource {
    fileobjs: Vec<(String, Fileobj)>,
    records_format: RecordsFormat,
    records_schema: Option<RecordsSchema>,
    row_count: Option<u64>,
}

/// Decode one whole file, using `schema` for column types when given
pub fn decode_file(
    format: &RecordsFormat,
    pi: &ProcessingInstructions,
    data: Vec<u8>,
    schema: Option<SchemaRef>,
) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let (schema, batches) = match format {
        RecordsFormat::Delimited(delimited) => {
            let decoder = DelimitedDecoder::new(reader_hints(delimited, pi)?, pi);
            decoder.decode_bytes(&data, schema, usize::MAX)?
        }
        RecordsFormat::Parquet => read_parquet(data.into(), usize::MAX)?,
        RecordsFormat::Avro => return Err(avro_unsupported()),
    };
    let rows = rows_per_chunk(schema.fields().len());
    let batches = batches
        .iter()
        .flat_map(|batch| split_batch(batch, rows))
        .collect();
    Ok((schema, batches))
}

impl FileobjsSource {
    #[must_use]
    pub fn new(fileobjs: Vec<(String, Fileobj)>, records_format: RecordsFormat) -> Self {
        Self {
            fileobjs,
            records_format,
            records_schema: None,
            row_count: None,
        }
    }

    #[must_use]
    pub fn with_records_schema(mut self, records_schema: Option<RecordsSchema>) -> Self {
        self.records_schema = records_schema;
        self
    }

    /// Rows in the streams, when whoever produced them counted
    #[must_use]
    pub fn with_row_count(mut self, row_count: Option<u64>) -> Self {
        self.row_count = row_count;
        self
    }

    #[must_use]
    pub fn records_format(&self) -> &RecordsFormat {
        &self.records_format
    }

    #[must_use]
    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.fileobjs.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn fileobjs_mut(&mut self) -> &mut [(String, Fileobj)] {
        &mut self.fileobjs
    }

    #[must_use]
    pub fn into_fileobjs(self) -> Vec<(String, Fileobj)> {
        self.fileobjs
    }

    /// The declared schema, else one inferred from a sample of the first
    /// stream. Avro streams are never sampled.
    pub async fn records_schema(&mut self, pi: &ProcessingInstructions) -> Result<Option<RecordsSchema>> {
        if let Some(schema) = &self.records_schema {
            return Ok(Some(schema.clone()));
        }
        if self.records_format == RecordsFormat::Avro {
            return Ok(None);
        }
        let Some((name, first)) = self.fileobjs.first_mut() else {
            return Ok(None);
        };
        let data = read_fileobj(first).await?;
        let (arrow_schema, batches) = decode_file(&self.records_format, pi, data, None)?;
        let schema = RecordsSchema::from_arrow_schema(&arrow_schema)?
            .with_sampled_statistics(&batches, pi.inference_rows());
        let name = name.as_str();
        let columns = schema.len();
        debug!("Inferred {columns} columns from {name}", columns: columns, name: name);
        self.records_schema = Some(schema.clone());
        Ok(Some(schema))
    }

    /// A fileobjs source writes itself out as-is, so only its own format
    #[must_use]
    pub fn can_move_to_format(&self, format: &RecordsFormat) -> bool {
        *format == self.records_format
    }

    pub async fn move_to_records_directory(
        mut self,
        directory: &RecordsDirectory,
        pi: &ProcessingInstructions,
    ) -> Result<Option<u64>> {
        let schema = self.records_schema(pi).await?;
        _ = directory
            .save_fileobjs(&mut self.fileobjs, schema.as_ref(), Some(&self.records_format))
            .await?;
        Ok(self.row_count)
    }

    /// Decode the streams in order, one file at a time.
    ///
    /// Column types come from the declared schema or from the first
    /// stream, so every chunk shares one arrow schema. A delimited header
    /// row is expected in the first stream only.
    pub async fn to_dataframes_source(mut self, pi: &ProcessingInstructions) -> Result<DataframesSource> {
        let records_schema = self.records_schema(pi).await?;
        let arrow_schema: Option<SchemaRef> = records_schema
            .as_ref()
            .map(|schema| Arc::new(schema.to_arrow_schema()));
        let format = self.records_format.clone();
        let chunk_pi = pi.clone();
        let chunk_schema = arrow_schema.clone();
        let stream = futures::stream::iter(self.fileobjs.into_iter().enumerate())
            .then(move |(index, (_, mut fileobj))| {
                let format = if index == 0 {
                    format.clone()
                } else {
                    format.without_header_row()
                };
                let pi = chunk_pi.clone();
                let schema = chunk_schema.clone();
                async move {
                    let data = read_fileobj(&mut fileobj).await?;
                    let (_, batches) = decode_file(&format, &pi, data, schema)?;
                    Ok::<_, MoverError>(futures::stream::iter(
                        batches.into_iter().map(Ok::<RecordBatch, MoverError>),
                    ))
                }
            })
            .try_flatten()
            .boxed();
        let mut source = DataframesSource::new(stream)
            .with_preferred_format(Some(self.records_format));
        if let Some(schema) = arrow_schema {
            source = source.with_arrow_schema(schema);
        }
        if let Some(schema) = records_schema {
            source = source.with_records_schema(schema);
        }
        Ok(source)
    }
}

impl std::fmt::Debug for FileobjsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileobjsSource")
            .field("names", &self.names())
            .field("records_format", &self.records_format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::WaitSettings;
    use arrow_array::cast::AsArray;
    use arrow::datatypes::Int64Type;
    use records::{PartialHints, Variant};
    use serde_json::json;
    use std::io::Cursor;
    use std::time::Duration;
    use urlfs::UrlResolver;

    fn csv() -> RecordsFormat {
        let mut hints = PartialHints::new();
        _ = hints.insert("compression".into(), json!(null));
        RecordsFormat::delimited(Variant::Csv, hints)
    }

    fn source(parts: &[&str]) -> FileobjsSource {
        let fileobjs = parts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let fileobj: Fileobj = Box::new(Cursor::new(text.as_bytes().to_vec()));
                (format!("part{i}.csv"), fileobj)
            })
            .collect();
        FileobjsSource::new(fileobjs, csv())
    }

    #[tokio::test]
    async fn test_schema_inferred_from_first_stream() {
        let mut source = source(&["id,name\n1,a\n2,b\n", "3,c\n"]);
        let pi = ProcessingInstructions::default();
        let schema = source.records_schema(&pi).await.unwrap().unwrap();
        let names: Vec<&str> = schema.field_names().collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(
            schema.fields[0].statistics.as_ref().unwrap().rows_sampled,
            2
        );
    }

    #[tokio::test]
    async fn test_to_dataframes_decodes_every_stream() {
        let source = source(&["id,name\n1,a\n2,b\n", "3,c\n"]);
        let pi = ProcessingInstructions::default();
        let batches: Vec<RecordBatch> = source
            .to_dataframes_source(&pi)
            .await
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(batches.len(), 2);
        let ids: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.column(0).as_primitive::<Int64Type>().values().to_vec())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_move_to_records_directory() {
        let resolver = Arc::new(UrlResolver::default());
        let loc = resolver.directory_url("mem://bucket/out/").unwrap();
        let directory = RecordsDirectory::new(loc, resolver).with_wait(WaitSettings {
            poll: Duration::from_millis(5),
            timeout: Duration::from_millis(100),
        });
        let source = source(&["id,name\n1,a\n"]).with_row_count(Some(1));
        assert!(source.can_move_to_format(&csv()));
        assert!(!source.can_move_to_format(&RecordsFormat::Parquet));
        let count = source
            .move_to_records_directory(&directory, &ProcessingInstructions::default())
            .await
            .unwrap();
        assert_eq!(count, Some(1));
        assert!(directory.is_finalized().await.unwrap());
        assert_eq!(
            directory.manifest_entry_urls().await.unwrap(),
            vec!["mem://bucket/out/part0.csv".to_string()]
        );
        let pi = ProcessingInstructions::default();
        assert_eq!(directory.load_format(&pi).await.unwrap(), Some(csv()));
        assert_eq!(directory.load_schema().await.unwrap().unwrap().len(), 2);
    }
}
