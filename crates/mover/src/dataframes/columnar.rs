// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Parquet files for dataframes. Avro is named in formats but never
//! encoded or decoded here.

use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::{Schema, SchemaRef};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::{MoverError, Result};

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Encode batches as one Parquet file. Timestamps keep their unit.
pub fn write_parquet(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(writer_properties()))?;
    for batch in batches {
        writer.write(batch)?;
    }
    _ = writer.close()?;
    Ok(buffer)
}

/// Decode a Parquet file into batches of at most `batch_rows` rows.
pub fn read_parquet(data: Bytes, batch_rows: usize) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema: SchemaRef = Arc::new(Schema::clone(builder.schema()));
    let reader = builder.with_batch_size(batch_rows.max(1)).build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

pub(crate) fn avro_unsupported() -> MoverError {
    MoverError::not_supported("Avro cannot be encoded or decoded in this process")
}
