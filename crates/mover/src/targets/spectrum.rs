// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A Redshift Spectrum external table over a Parquet records directory.
//!
//! The directory is filled first; the external table is (re)registered
//! over it afterwards. External table DDL cannot run in a transaction.

use std::sync::Arc;

use diagnostics::*;
use records::{RecordsFormat, RecordsSchema};

use crate::db::DbDriver;
use crate::db::ddl::{column_names, drop_table_sql};
use crate::db::prep::{ExistingTableHandling, run_autocommit};
use crate::db::vendors::sql_string;
use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use crate::planner::MoveContext;
use crate::results::MoveResult;
use crate::sources::DataframesSource;

pub struct SpectrumTarget {
    driver: Arc<dyn DbDriver>,
    schema: String,
    table: String,
    directory: RecordsDirectory,
    existing_table_handling: ExistingTableHandling,
}

impl SpectrumTarget {
    #[must_use]
    pub fn new(
        driver: Arc<dyn DbDriver>,
        schema: &str,
        table: &str,
        directory: RecordsDirectory,
        existing_table_handling: ExistingTableHandling,
    ) -> Self {
        Self {
            driver,
            schema: schema.to_string(),
            table: table.to_string(),
            directory,
            existing_table_handling,
        }
    }

    #[must_use]
    pub fn directory(&self) -> &RecordsDirectory {
        &self.directory
    }

    #[must_use]
    pub fn known_supported_records_formats(&self) -> Vec<RecordsFormat> {
        vec![RecordsFormat::Parquet]
    }

    #[must_use]
    pub fn can_load_format(&self, format: &RecordsFormat) -> bool {
        *format == RecordsFormat::Parquet
    }

    /// Empty the directory unless appending to it
    pub async fn pre_load_hook(&self) -> Result<()> {
        if self.existing_table_handling == ExistingTableHandling::Append {
            return Ok(());
        }
        let url = self.directory.loc().url();
        info!("Purging Spectrum directory {url}", url: url);
        Ok(self.directory.loc().purge_directory().await?)
    }

    /// `CREATE EXTERNAL TABLE` over the directory
    pub fn create_external_table_sql(&self, records_schema: &RecordsSchema, num_rows: Option<u64>) -> Result<String> {
        if records_schema.is_empty() {
            return Err(MoverError::SchemaMissing(self.qualified_table()));
        }
        let driver = self.driver.as_ref();
        let columns = column_names(driver, records_schema)?
            .iter()
            .zip(&records_schema.fields)
            .map(|(name, field)| format!("{} {}", driver.quote_identifier(name), driver.type_for_field(field)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "CREATE EXTERNAL TABLE {} ({columns}) STORED AS PARQUET LOCATION {}",
            self.qualified_table(),
            sql_string(self.directory.loc().url())
        );
        if let Some(rows) = num_rows {
            sql.push_str(&format!(" TABLE PROPERTIES ('numRows'='{rows}')"));
        }
        Ok(sql)
    }

    fn qualified_table(&self) -> String {
        self.driver.qualified_table(&self.schema, &self.table)
    }

    /// Register the external table once the directory holds its data
    pub async fn post_load_hook(&self, num_rows: Option<u64>) -> Result<()> {
        let conn = self.driver.connection().as_ref();
        let exists = conn.table_exists(&self.schema, &self.table).await?;
        if exists && self.existing_table_handling == ExistingTableHandling::Append {
            return Ok(());
        }
        let records_schema = self
            .directory
            .load_schema()
            .await?
            .ok_or_else(|| MoverError::SchemaMissing(self.directory.loc().url().to_string()))?;
        let statements = vec![
            drop_table_sql(self.driver.sql_builder(), &self.schema, &self.table),
            self.create_external_table_sql(&records_schema, num_rows)?,
        ];
        let target = self.qualified_table();
        warn!("Spectrum DDL is not transactional; registering {target} in autocommit", target: target);
        run_autocommit(conn, &statements).await
    }

    pub async fn move_from_dataframes_source(
        &self,
        cx: &MoveContext,
        dataframes: DataframesSource,
    ) -> Result<MoveResult> {
        self.pre_load_hook().await?;
        let count = dataframes
            .move_to_records_directory(&self.directory, &RecordsFormat::Parquet, cx.processing_instructions())
            .await?;
        self.post_load_hook(count).await?;
        Ok(MoveResult::with_count(count).with_output_url("manifest", &self.directory.manifest_url()?))
    }
}

impl std::fmt::Debug for SpectrumTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SpectrumTarget({} at {})", self.qualified_table(), self.directory.loc().url())
    }
}
