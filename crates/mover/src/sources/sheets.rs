// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A spreadsheet range, read as one dataframe.

use std::collections::BTreeSet;
use std::sync::Arc;

use diagnostics::*;
use records::{ProcessingInstructions, RecordsFormat};

use crate::dataframes::decode::{DelimitedDecoder, TextRow, reader_hints};
use crate::dataframes::{rows_per_chunk, stream_from_batches};
use crate::error::{MoverError, Result};
use crate::sheets::{SheetsClient, cell_text};
use crate::sources::dataframes::DataframesSource;

pub struct GoogleSheetsSource {
    client: Arc<dyn SheetsClient>,
    spreadsheet_id: String,
    range: String,
}

/// Column names from the first row; blank headers are named by position
fn header_names(first: &[serde_json::Value]) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::with_capacity(first.len());
    for (index, cell) in first.iter().enumerate() {
        let name = cell_text(cell).unwrap_or_else(|| format!("column_{index}"));
        if !seen.insert(name.clone()) {
            return Err(MoverError::DuplicateColumnName(name));
        }
        names.push(name);
    }
    Ok(names)
}

impl GoogleSheetsSource {
    #[must_use]
    pub fn new(client: Arc<dyn SheetsClient>, spreadsheet_id: &str, range: &str) -> Self {
        Self {
            client,
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
        }
    }

    /// Fetch the range and decode it; the first row holds the headers
    pub async fn to_dataframes_source(&self, pi: &ProcessingInstructions) -> Result<DataframesSource> {
        let mut rows = self
            .client
            .values(&self.spreadsheet_id, &self.range)
            .await?
            .into_iter();
        let Some(first) = rows.next() else {
            return Err(MoverError::SchemaMissing(format!(
                "sheet {} range {} is empty",
                self.spreadsheet_id, self.range
            )));
        };
        let header = header_names(&first)?;
        let body: Vec<TextRow> = rows
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        let columns = header.len();
        let count = body.len();
        let range = self.range.as_str();
        info!("Read {count} rows of {columns} columns from {range}", count: count, columns: columns, range: range);

        let format = RecordsFormat::bluelabs();
        let hints = match format.as_delimited() {
            Some(delimited) => reader_hints(delimited, pi)?,
            None => return Err(MoverError::NoCompatibleFormat),
        };
        let decoder = DelimitedDecoder::new(hints, pi);
        let (schema, batches) = decoder.decode_rows(Some(header), body, None, rows_per_chunk(columns))?;
        Ok(DataframesSource::new(stream_from_batches(batches)).with_arrow_schema(schema))
    }
}

impl std::fmt::Debug for GoogleSheetsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsSource")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use serde_json::{Value, json};

    struct FixedSheet(Vec<Vec<Value>>);

    #[async_trait]
    impl SheetsClient for FixedSheet {
        async fn values(&self, _: &str, _: &str) -> Result<Vec<Vec<Value>>> {
            Ok(self.0.clone())
        }
    }

    fn rows(value: Value) -> Vec<Vec<Value>> {
        crate::sheets::rows_from_response(&json!({ "values": value }))
    }

    #[tokio::test]
    async fn test_headers_and_padding() {
        let client = Arc::new(FixedSheet(rows(json!([
            ["name", "count"],
            ["ann", 1],
            ["bob"]
        ]))));
        let source = GoogleSheetsSource::new(client, "sheet", "A1:B3");
        let pi = ProcessingInstructions::default();
        let batches: Vec<_> = source
            .to_dataframes_source(&pi)
            .await
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["name", "count"]);
        assert!(batch.column(1).is_null(1));
    }

    #[tokio::test]
    async fn test_duplicate_headers_rejected() {
        let client = Arc::new(FixedSheet(rows(json!([["a", "a"], [1, 2]]))));
        let source = GoogleSheetsSource::new(client, "sheet", "A1:B2");
        let err = source
            .to_dataframes_source(&ProcessingInstructions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MoverError::DuplicateColumnName(name) if name == "a"));
    }
}
