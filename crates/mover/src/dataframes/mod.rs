// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Dataframes are arrow record batches delivered as a stream of chunks.

pub mod columnar;
pub mod decode;
pub mod encode;

use arrow_array::RecordBatch;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::error::Result;

/// A lazy sequence of dataframe chunks
pub type DataframeStream = BoxStream<'static, Result<RecordBatch>>;

/// Upper bound on cells held in one chunk
pub const MAX_CELLS_PER_CHUNK: usize = 2_000_000;

/// Rows per chunk for a table of `columns` columns
#[must_use]
pub fn rows_per_chunk(columns: usize) -> usize {
    MAX_CELLS_PER_CHUNK.div_ceil(columns.max(1))
}

/// Slice a batch into pieces of at most `rows` rows.
#[must_use]
pub fn split_batch(batch: &RecordBatch, rows: usize) -> Vec<RecordBatch> {
    let rows = rows.max(1);
    if batch.num_rows() <= rows {
        return vec![batch.clone()];
    }
    (0..batch.num_rows())
        .step_by(rows)
        .map(|offset| batch.slice(offset, rows.min(batch.num_rows() - offset)))
        .collect()
}

#[must_use]
pub fn stream_from_batches(batches: Vec<RecordBatch>) -> DataframeStream {
    futures::stream::iter(batches.into_iter().map(Ok)).boxed()
}
