// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Database driver contract.
//!
//! A [`Connection`] is the external collaborator that talks to a server.
//! A [`DbDriver`] wraps one and describes the vendor: its column types,
//! identifier rules, and which of the bulk [`Loader`], [`FileobjLoader`]
//! and [`Unloader`] paths it offers.

pub mod ddl;
pub mod prep;
pub mod types;
pub mod vendors;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use records::{
    FieldRepresentation, ProcessingInstructions, RecordsFormat, RecordsSchema,
    RecordsSchemaField, SchemaRepresentation,
};
use tokio::io::{AsyncRead, AsyncWrite};
use urlfs::{DirectoryUrl, Fileobj};

use crate::dataframes::DataframeStream;
use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use ddl::SqlBuilder;
use types::TypeTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Redshift,
    Vertica,
    BigQuery,
    MySql,
}

impl Dialect {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgresql",
            Dialect::Redshift => "redshift",
            Dialect::Vertica => "vertica",
            Dialect::BigQuery => "bigquery",
            Dialect::MySql => "mysql",
        }
    }

    /// Representation key used in records schema documents
    #[must_use]
    pub fn rep_type(self) -> String {
        format!("sql/{}", self.as_str())
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column as reported by the server's catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn new<N: Into<String>, T: Into<String>>(name: N, type_name: T, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

/// A live session with a database server.
///
/// `execute` returns the affected row count when the server reports one.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Option<u64>>;

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    /// Run a query and stream its result in batches
    async fn query_batches(&self, sql: &str, rows_per_batch: usize) -> Result<DataframeStream>;

    /// Feed a `COPY ... FROM STDIN` style statement; returns rows loaded
    async fn copy_in(&self, sql: &str, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<u64>;

    /// Drain a `COPY ... TO STDOUT` style statement; returns bytes written
    async fn copy_out(&self, sql: &str, writer: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64>;

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>>;
}

/// What to load and how strictly
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub records_format: RecordsFormat,
    pub processing_instructions: ProcessingInstructions,
}

impl LoadPlan {
    #[must_use]
    pub fn has_header_row(&self) -> bool {
        self.records_format.has_header_row()
    }

    /// The plan for the part at `index`; only the first part of a
    /// multi-part delimited load carries a header row.
    #[must_use]
    pub fn for_part(&self, index: usize) -> LoadPlan {
        if index == 0 {
            return self.clone();
        }
        LoadPlan {
            records_format: self.records_format.without_header_row(),
            processing_instructions: self.processing_instructions.clone(),
        }
    }
}

/// What to unload and how strictly
#[derive(Debug, Clone)]
pub struct UnloadPlan {
    pub records_format: RecordsFormat,
    pub processing_instructions: ProcessingInstructions,
}

/// Wrap a vendor failure during a load so retry policy can recognise it.
#[must_use]
pub fn load_failure(err: MoverError) -> MoverError {
    match err {
        MoverError::Load(_) => err,
        MoverError::Database(message) => MoverError::Load(message),
        other => other,
    }
}

#[must_use]
pub fn unload_failure(err: MoverError) -> MoverError {
    match err {
        MoverError::Database(message) => MoverError::Unload(message),
        other => other,
    }
}

/// Bulk load from a records directory the server can read itself
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>>;

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool;

    /// Best first
    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat>;

    fn best_scheme_to_load_from(&self) -> &str;

    /// Parent of scratch directories this loader can read from
    fn temporary_loadable_directory_parent(&self) -> Option<DirectoryUrl>;
}

/// Bulk load from byte streams pushed through this process
#[async_trait]
pub trait FileobjLoader: Send + Sync {
    async fn load_from_fileobjs(
        &self,
        schema: &str,
        table: &str,
        plan: &LoadPlan,
        fileobjs: &mut [(String, Fileobj)],
    ) -> Result<Option<u64>>;

    fn can_load_this_format(&self, format: &RecordsFormat) -> bool;

    fn known_supported_records_formats_for_load(&self) -> Vec<RecordsFormat>;
}

/// Bulk export into a records directory
#[async_trait]
pub trait Unloader: Send + Sync {
    async fn unload(
        &self,
        schema: &str,
        table: &str,
        plan: &UnloadPlan,
        directory: &RecordsDirectory,
    ) -> Result<Option<u64>>;

    fn can_unload_format(&self, format: &RecordsFormat) -> bool;

    fn can_unload_to_scheme(&self, scheme: &str) -> bool;

    /// Best first
    fn known_supported_records_formats_for_unload(&self) -> Vec<RecordsFormat>;

    /// Parent of scratch directories this unloader can write to
    fn temporary_unloadable_directory_parent(&self) -> Option<DirectoryUrl>;
}

/// Double embedded quotes and wrap
#[must_use]
pub fn quote_with(name: &str, quote: char) -> String {
    let doubled = format!("{quote}{quote}");
    format!("{quote}{}{quote}", name.replace(quote, &doubled))
}

/// A vendor: its connection, type system and bulk paths.
#[async_trait]
pub trait DbDriver: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn connection(&self) -> &Arc<dyn Connection>;

    fn type_table(&self) -> &TypeTable;

    fn sql_builder(&self) -> SqlBuilder {
        SqlBuilder::Postgres
    }

    fn loader(&self) -> Option<&dyn Loader> {
        None
    }

    fn fileobj_loader(&self) -> Option<&dyn FileobjLoader> {
        None
    }

    fn unloader(&self) -> Option<&dyn Unloader> {
        None
    }

    /// Whether DDL can be rolled back inside a transaction
    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '"')
    }

    fn qualified_table(&self, schema: &str, table: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(schema),
            self.quote_identifier(table)
        )
    }

    fn make_column_name_valid(&self, name: &str) -> String {
        name.to_string()
    }

    fn type_for_integer(&self, min: Option<i128>, max: Option<i128>) -> String {
        self.type_table().type_for_integer(min, max)
    }

    fn type_for_fixed_point(&self, precision: u32, scale: i32) -> String {
        self.type_table().type_for_fixed_point(precision, scale)
    }

    fn type_for_floating_point(&self, total_bits: u32, significand_bits: u32) -> String {
        self.type_table()
            .type_for_floating_point(total_bits, significand_bits)
    }

    fn type_for_date_plus_time(&self, has_tz: bool) -> String {
        self.type_table().type_for_date_plus_time(has_tz)
    }

    fn type_for_field(&self, field: &RecordsSchemaField) -> String {
        field
            .representations
            .get(&self.dialect().rep_type())
            .and_then(|rep| rep.col_type.clone())
            .unwrap_or_else(|| self.type_table().type_for_field(field))
    }

    fn integer_limits(&self, col_type: &str) -> Option<(i128, i128)> {
        self.type_table().integer_limits(col_type)
    }

    fn fp_constraints(&self, col_type: &str) -> Option<(u32, u32)> {
        self.type_table().fp_constraints(col_type)
    }

    fn fixed_point_constraints(&self, col_type: &str) -> Option<(u32, i32)> {
        self.type_table().fixed_point_constraints(col_type)
    }

    /// Grant statement, or `None` when the vendor manages access elsewhere
    fn grant_sql(
        &self,
        permission: &str,
        schema: &str,
        table: &str,
        grantee: &str,
        group: bool,
    ) -> Option<String> {
        let to = if group { "GROUP " } else { "" };
        Some(format!(
            "GRANT {permission} ON TABLE {} TO {to}{}",
            self.qualified_table(schema, table),
            self.quote_identifier(grantee)
        ))
    }

    /// Records schema for an existing table from its catalog entry
    async fn schema_from_table(&self, schema: &str, table: &str) -> Result<RecordsSchema> {
        let columns = self.connection().table_columns(schema, table).await?;
        if columns.is_empty() {
            return Err(MoverError::SchemaMissing(self.qualified_table(schema, table)));
        }
        let rep_type = self.dialect().rep_type();
        let fields = columns
            .iter()
            .map(|column| {
                let (field_type, constraints) = self
                    .type_table()
                    .classify_column(&column.type_name, column.nullable);
                let col_ddl = format!("{} {}", self.quote_identifier(&column.name), column.type_name);
                RecordsSchemaField::new(&column.name, field_type, constraints).with_representation(
                    &rep_type,
                    FieldRepresentation {
                        rep_type: rep_type.clone(),
                        col_ddl: Some(col_ddl),
                        col_type: Some(column.type_name.clone()),
                    },
                )
            })
            .collect();
        let mut records_schema = RecordsSchema::new(fields);
        _ = records_schema.known_representations.insert(
            rep_type.clone(),
            SchemaRepresentation {
                rep_type,
                table_ddl: None,
            },
        );
        Ok(records_schema)
    }
}
