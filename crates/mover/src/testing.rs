// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! An in-process [`Connection`] that records every statement.
//!
//! Used by driver, target and planner tests; nothing here talks to a
//! server.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use arrow_array::RecordBatch;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::dataframes::{DataframeStream, split_batch, stream_from_batches};
use crate::db::{ColumnInfo, Connection};
use crate::error::{MoverError, Result};

#[derive(Default)]
struct State {
    statements: Vec<String>,
    tables: BTreeSet<(String, String)>,
    columns: BTreeMap<(String, String), Vec<ColumnInfo>>,
    failures: Vec<(String, usize)>,
    row_count: Option<u64>,
    query_result: Vec<RecordBatch>,
    copy_out_data: Vec<u8>,
    copied_in: Vec<(String, Vec<u8>)>,
}

#[derive(Default)]
pub struct RecordingConnection {
    state: Mutex<State>,
}

fn is_bulk_statement(sql: &str) -> bool {
    let upper = sql.trim_start().to_ascii_uppercase();
    ["COPY", "LOAD", "UNLOAD"].iter().any(|p| upper.starts_with(p)) || upper.contains("S3EXPORT")
}

impl RecordingConnection {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Statements in execution order, including `BEGIN`/`COMMIT`/`ROLLBACK`
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn add_table(&self, schema: &str, table: &str) {
        _ = self
            .state()
            .tables
            .insert((schema.to_string(), table.to_string()));
    }

    pub fn set_columns(&self, schema: &str, table: &str, columns: Vec<ColumnInfo>) {
        self.add_table(schema, table);
        _ = self
            .state()
            .columns
            .insert((schema.to_string(), table.to_string()), columns);
    }

    /// Fail the next `times` statements containing `pattern`
    pub fn fail_statements_containing(&self, pattern: &str, times: usize) {
        self.state().failures.push((pattern.to_string(), times));
    }

    /// Row count reported by bulk statements (`COPY`, `LOAD`, `UNLOAD`, exports)
    pub fn set_row_count(&self, count: Option<u64>) {
        self.state().row_count = count;
    }

    pub fn set_query_result(&self, batches: Vec<RecordBatch>) {
        self.state().query_result = batches;
    }

    pub fn set_copy_out_data(&self, data: &[u8]) {
        self.state().copy_out_data = data.to_vec();
    }

    /// Statement and bytes of every `copy_in`
    pub fn copied_in(&self) -> Vec<(String, Vec<u8>)> {
        self.state().copied_in.clone()
    }

    fn record(&self, sql: &str) -> Result<()> {
        let mut state = self.state();
        state.statements.push(sql.to_string());
        if let Some(failure) = state
            .failures
            .iter_mut()
            .find(|(pattern, times)| *times > 0 && sql.contains(pattern.as_str()))
        {
            failure.1 -= 1;
            return Err(MoverError::database(format!("injected failure: {sql}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn execute(&self, sql: &str) -> Result<Option<u64>> {
        self.record(sql)?;
        if is_bulk_statement(sql) {
            return Ok(self.state().row_count);
        }
        Ok(None)
    }

    async fn begin(&self) -> Result<()> {
        self.record("BEGIN")
    }

    async fn commit(&self) -> Result<()> {
        self.record("COMMIT")
    }

    async fn rollback(&self) -> Result<()> {
        self.record("ROLLBACK")
    }

    async fn query_batches(&self, sql: &str, rows_per_batch: usize) -> Result<DataframeStream> {
        self.record(sql)?;
        let batches = self
            .state()
            .query_result
            .iter()
            .flat_map(|batch| split_batch(batch, rows_per_batch))
            .collect();
        Ok(stream_from_batches(batches))
    }

    /// Counts newline-terminated rows, less one for a `HEADER` option
    async fn copy_in(&self, sql: &str, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64> {
        self.record(sql)?;
        let mut data = Vec::new();
        _ = reader.read_to_end(&mut data).await?;
        let lines = data.iter().filter(|b| **b == b'\n').count() as u64;
        let header = u64::from(sql.contains("HEADER"));
        self.state().copied_in.push((sql.to_string(), data));
        Ok(lines.saturating_sub(header))
    }

    async fn copy_out(&self, sql: &str, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64> {
        self.record(sql)?;
        let data = self.state().copy_out_data.clone();
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(data.len() as u64)
    }

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        Ok(self
            .state()
            .tables
            .contains(&(schema.to_string(), table.to_string())))
    }

    async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self
            .state()
            .columns
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
