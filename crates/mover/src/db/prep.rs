// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Preparing a table before a load.

use std::collections::BTreeMap;

use diagnostics::*;
use records::RecordsSchema;
use serde::{Deserialize, Serialize};

use crate::db::ddl::{create_table_sql, delete_from_sql, drop_table_sql, truncate_table_sql};
use crate::db::{Connection, DbDriver};
use crate::error::{MoverError, Result};

/// What to do with rows already in the target table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingTableHandling {
    #[default]
    DeleteAndOverwrite,
    TruncateAndOverwrite,
    DropAndRecreate,
    Append,
}

/// Grants issued after a table is created, keyed by permission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(default)]
    pub users: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

/// Scope of one database transaction.
///
/// Commit or roll back explicitly; a guard dropped while open logs the
/// abandoned transaction.
pub struct TransactionGuard<'a> {
    conn: &'a dyn Connection,
    open: bool,
}

impl<'a> TransactionGuard<'a> {
    pub async fn begin(conn: &'a dyn Connection) -> Result<Self> {
        conn.begin().await?;
        Ok(Self { conn, open: true })
    }

    #[must_use]
    pub fn connection(&self) -> &dyn Connection {
        self.conn
    }

    pub async fn commit(mut self) -> Result<()> {
        self.open = false;
        self.conn.commit().await
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.open = false;
        self.conn.rollback().await
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!("Transaction dropped without commit or rollback");
        }
    }
}

/// Run statements in one transaction, rolling back on the first failure.
pub async fn run_in_transaction(conn: &dyn Connection, statements: &[String]) -> Result<()> {
    let guard = TransactionGuard::begin(conn).await?;
    for sql in statements {
        let result = conn.execute(sql).await;
        if let Err(err) = result {
            if let Err(rollback_err) = guard.rollback().await {
                let message = rollback_err.to_string();
                warn!("Rollback failed: {message}", message: message);
            }
            return Err(err);
        }
    }
    guard.commit().await
}

/// Run statements in autocommit mode.
pub async fn run_autocommit(conn: &dyn Connection, statements: &[String]) -> Result<()> {
    for sql in statements {
        _ = conn.execute(sql).await?;
    }
    Ok(())
}

fn create_statements(
    driver: &dyn DbDriver,
    schema: &str,
    table: &str,
    records_schema: Option<&RecordsSchema>,
    grants: &Grants,
) -> Result<Vec<String>> {
    let records_schema =
        records_schema.ok_or_else(|| MoverError::SchemaMissing(driver.qualified_table(schema, table)))?;
    let mut statements = vec![create_table_sql(driver, schema, table, records_schema)?];
    for (group, grantees) in [(false, &grants.users), (true, &grants.groups)] {
        for (permission, names) in grantees {
            for name in names {
                match driver.grant_sql(permission, schema, table, name, group) {
                    Some(sql) => statements.push(sql),
                    None => {
                        let dialect = driver.dialect().as_str();
                        let permission = permission.as_str();
                        let name = name.as_str();
                        warn!("{dialect} grants are managed outside SQL; skipping {permission} for {name}", dialect: dialect, permission: permission, name: name);
                    }
                }
            }
        }
    }
    Ok(statements)
}

/// Statements that bring the table into the state `handling` asks for.
pub async fn prep_statements(
    driver: &dyn DbDriver,
    schema: &str,
    table: &str,
    records_schema: Option<&RecordsSchema>,
    handling: ExistingTableHandling,
    grants: &Grants,
) -> Result<Vec<String>> {
    let exists = driver.connection().table_exists(schema, table).await?;
    let builder = driver.sql_builder();
    if !exists {
        return create_statements(driver, schema, table, records_schema, grants);
    }
    Ok(match handling {
        ExistingTableHandling::DeleteAndOverwrite => vec![delete_from_sql(builder, schema, table)],
        ExistingTableHandling::TruncateAndOverwrite => {
            vec![truncate_table_sql(builder, schema, table)]
        }
        ExistingTableHandling::DropAndRecreate => {
            let mut statements = vec![drop_table_sql(builder, schema, table)];
            statements.extend(create_statements(driver, schema, table, records_schema, grants)?);
            statements
        }
        ExistingTableHandling::Append => Vec::new(),
    })
}

/// Prepare a table for a load.
///
/// Statements run in one transaction when the vendor supports
/// transactional DDL, otherwise in autocommit with a warning.
pub async fn prep_table_for_load(
    driver: &dyn DbDriver,
    schema: &str,
    table: &str,
    records_schema: Option<&RecordsSchema>,
    handling: ExistingTableHandling,
    grants: &Grants,
) -> Result<()> {
    let statements = prep_statements(driver, schema, table, records_schema, handling, grants).await?;
    if statements.is_empty() {
        return Ok(());
    }
    let target = driver.qualified_table(schema, table);
    let count = statements.len();
    debug!("Preparing {target} with {count} statements", target: target, count: count);
    let conn = driver.connection().as_ref();
    if driver.supports_transactional_ddl() {
        run_in_transaction(conn, &statements).await
    } else {
        let dialect = driver.dialect().as_str();
        warn!("{dialect} DDL is not transactional; preparing {target} in autocommit", dialect: dialect, target: target);
        run_autocommit(conn, &statements).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::vendors::mysql::MySqlDriver;
    use crate::db::vendors::postgres::PostgresDriver;
    use crate::testing::RecordingConnection;
    use records::{FieldConstraints, FieldType, RecordsSchemaField};
    use std::sync::Arc;

    fn schema() -> RecordsSchema {
        RecordsSchema::new(vec![RecordsSchemaField::new(
            "n",
            FieldType::Integer,
            FieldConstraints::integer(0, 10),
        )])
    }

    #[tokio::test]
    async fn test_missing_table_is_created_with_grants() {
        let conn = Arc::new(RecordingConnection::default());
        let driver = PostgresDriver::new(conn.clone());
        let grants = Grants {
            users: [("select".to_string(), vec!["reader".to_string()])].into(),
            groups: BTreeMap::new(),
        };
        prep_table_for_load(
            &driver,
            "s",
            "t",
            Some(&schema()),
            ExistingTableHandling::DeleteAndOverwrite,
            &grants,
        )
        .await
        .unwrap();
        let statements = conn.statements();
        assert_eq!(statements[0], "BEGIN");
        assert!(statements[1].starts_with("CREATE TABLE"));
        assert_eq!(statements[2], r#"GRANT select ON TABLE "s"."t" TO "reader""#);
        assert_eq!(statements[3], "COMMIT");
    }

    #[tokio::test]
    async fn test_existing_table_policies() {
        let conn = Arc::new(RecordingConnection::default());
        conn.add_table("s", "t");
        let driver = PostgresDriver::new(conn.clone());
        let grants = Grants::default();

        let delete = prep_statements(&driver, "s", "t", None, ExistingTableHandling::DeleteAndOverwrite, &grants)
            .await
            .unwrap();
        assert_eq!(delete, vec![r#"DELETE FROM "s"."t""#.to_string()]);

        let append = prep_statements(&driver, "s", "t", None, ExistingTableHandling::Append, &grants)
            .await
            .unwrap();
        assert!(append.is_empty());

        let recreate = prep_statements(
            &driver,
            "s",
            "t",
            Some(&schema()),
            ExistingTableHandling::DropAndRecreate,
            &grants,
        )
        .await
        .unwrap();
        assert_eq!(recreate.len(), 2);
        assert!(recreate[0].starts_with("DROP TABLE IF EXISTS"));

        let err = prep_statements(&driver, "s", "t", None, ExistingTableHandling::DropAndRecreate, &grants)
            .await
            .unwrap_err();
        assert!(matches!(err, MoverError::SchemaMissing(_)));
    }

    #[tokio::test]
    async fn test_failure_rolls_back() {
        let conn = Arc::new(RecordingConnection::default());
        conn.fail_statements_containing("CREATE TABLE", 1);
        let driver = PostgresDriver::new(conn.clone());
        let result = prep_table_for_load(
            &driver,
            "s",
            "t",
            Some(&schema()),
            ExistingTableHandling::Append,
            &Grants::default(),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn test_non_transactional_vendor_autocommits() {
        let conn = Arc::new(RecordingConnection::default());
        conn.add_table("s", "t");
        let driver = MySqlDriver::new(conn.clone());
        prep_table_for_load(
            &driver,
            "s",
            "t",
            None,
            ExistingTableHandling::TruncateAndOverwrite,
            &Grants::default(),
        )
        .await
        .unwrap();
        assert_eq!(conn.statements(), vec!["TRUNCATE TABLE `s`.`t`".to_string()]);
    }
}
