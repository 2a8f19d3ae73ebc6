// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Table DDL from a records schema.

use std::collections::BTreeSet;

use sea_query::{Alias, ColumnDef, MysqlQueryBuilder, PostgresQueryBuilder, Query, Table};

use crate::db::DbDriver;
use crate::error::{MoverError, Result};
use records::RecordsSchema;

/// Which sea-query backend renders a vendor's statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBuilder {
    /// Double quoted identifiers
    Postgres,
    /// Backquoted identifiers
    MySql,
}

fn table_ref(schema: &str, table: &str) -> (Alias, Alias) {
    (Alias::new(schema), Alias::new(table))
}

/// Column names made valid for the vendor; duplicates are an error.
pub fn column_names(driver: &dyn DbDriver, records_schema: &RecordsSchema) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    records_schema
        .fields
        .iter()
        .map(|field| {
            let name = driver.make_column_name_valid(&field.name);
            if !seen.insert(name.clone()) {
                return Err(MoverError::DuplicateColumnName(name));
            }
            Ok(name)
        })
        .collect()
}

/// `CREATE TABLE` with driver-chosen column types
pub fn create_table_sql(
    driver: &dyn DbDriver,
    schema: &str,
    table: &str,
    records_schema: &RecordsSchema,
) -> Result<String> {
    if records_schema.is_empty() {
        return Err(MoverError::SchemaMissing(driver.qualified_table(schema, table)));
    }
    let names = column_names(driver, records_schema)?;
    let mut create = Table::create();
    _ = create.table(table_ref(schema, table));
    for (name, field) in names.iter().zip(&records_schema.fields) {
        let mut column = ColumnDef::new(Alias::new(name));
        _ = column.custom(Alias::new(driver.type_for_field(field)));
        if field.required() {
            _ = column.not_null();
        }
        _ = create.col(&mut column);
    }
    Ok(match driver.sql_builder() {
        SqlBuilder::Postgres => create.to_string(PostgresQueryBuilder),
        SqlBuilder::MySql => create.to_string(MysqlQueryBuilder),
    })
}

#[must_use]
pub fn drop_table_sql(builder: SqlBuilder, schema: &str, table: &str) -> String {
    let mut drop = Table::drop();
    _ = drop.table(table_ref(schema, table)).if_exists();
    match builder {
        SqlBuilder::Postgres => drop.to_string(PostgresQueryBuilder),
        SqlBuilder::MySql => drop.to_string(MysqlQueryBuilder),
    }
}

#[must_use]
pub fn truncate_table_sql(builder: SqlBuilder, schema: &str, table: &str) -> String {
    let mut truncate = Table::truncate();
    _ = truncate.table(table_ref(schema, table));
    match builder {
        SqlBuilder::Postgres => truncate.to_string(PostgresQueryBuilder),
        SqlBuilder::MySql => truncate.to_string(MysqlQueryBuilder),
    }
}

#[must_use]
pub fn delete_from_sql(builder: SqlBuilder, schema: &str, table: &str) -> String {
    let mut delete = Query::delete();
    _ = delete.from_table(table_ref(schema, table));
    match builder {
        SqlBuilder::Postgres => delete.to_string(PostgresQueryBuilder),
        SqlBuilder::MySql => delete.to_string(MysqlQueryBuilder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::vendors::postgres::PostgresDriver;
    use crate::testing::RecordingConnection;
    use records::{FieldConstraints, FieldType, RecordsSchemaField};
    use std::sync::Arc;

    fn driver() -> PostgresDriver {
        PostgresDriver::new(Arc::new(RecordingConnection::default()))
    }

    #[test]
    fn test_create_table_uses_driver_types() {
        let schema = RecordsSchema::new(vec![
            RecordsSchemaField::new("id", FieldType::Integer, FieldConstraints::integer(0, 100).required(true)),
            RecordsSchemaField::new("big", FieldType::Integer, FieldConstraints::integer(0, i64::MAX as i128 + 1)),
            RecordsSchemaField::new("at", FieldType::Datetimetz, FieldConstraints::default()),
        ]);
        let sql = create_table_sql(&driver(), "s", "t", &schema).unwrap();
        assert!(sql.starts_with(r#"CREATE TABLE "s"."t""#), "{sql}");
        assert!(sql.contains(r#""id" SMALLINT NOT NULL"#), "{sql}");
        assert!(sql.contains(r#""big" NUMERIC(19,0)"#), "{sql}");
        assert!(sql.contains(r#""at" TIMESTAMPTZ"#), "{sql}");
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let schema = RecordsSchema::new(vec![
            RecordsSchemaField::new("a", FieldType::String, FieldConstraints::default()),
            RecordsSchemaField::new("a", FieldType::String, FieldConstraints::default()),
        ]);
        assert!(matches!(
            create_table_sql(&driver(), "s", "t", &schema),
            Err(MoverError::DuplicateColumnName(name)) if name == "a"
        ));
    }

    #[test]
    fn test_housekeeping_statements() {
        assert_eq!(
            drop_table_sql(SqlBuilder::Postgres, "s", "t"),
            r#"DROP TABLE IF EXISTS "s"."t""#
        );
        assert_eq!(
            truncate_table_sql(SqlBuilder::MySql, "s", "t"),
            "TRUNCATE TABLE `s`.`t`"
        );
        assert_eq!(
            delete_from_sql(SqlBuilder::Postgres, "s", "t"),
            r#"DELETE FROM "s"."t""#
        );
    }
}
