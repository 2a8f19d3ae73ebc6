// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A database table read through its driver.

use std::sync::Arc;

use diagnostics::*;
use records::{RecordsFormat, RecordsSchema};
use urlfs::with_temporary_directory;

use crate::dataframes::rows_per_chunk;
use crate::db::{DbDriver, UnloadPlan, Unloader};
use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use crate::planner::MoveContext;
use crate::sources::dataframes::DataframesSource;

pub struct TableSource {
    driver: Arc<dyn DbDriver>,
    schema: String,
    table: String,
}

impl TableSource {
    #[must_use]
    pub fn new(driver: Arc<dyn DbDriver>, schema: &str, table: &str) -> Self {
        Self {
            driver,
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<dyn DbDriver> {
        &self.driver
    }

    #[must_use]
    pub fn qualified_table(&self) -> String {
        self.driver.qualified_table(&self.schema, &self.table)
    }

    fn unloader(&self) -> Option<&dyn Unloader> {
        self.driver.unloader()
    }

    #[must_use]
    pub fn can_move_to_records_directory(&self) -> bool {
        self.unloader().is_some()
    }

    #[must_use]
    pub fn can_move_to_format(&self, format: &RecordsFormat) -> bool {
        self.unloader()
            .is_some_and(|unloader| unloader.can_unload_format(format))
    }

    #[must_use]
    pub fn known_supported_records_formats(&self) -> Vec<RecordsFormat> {
        self.unloader()
            .map(Unloader::known_supported_records_formats_for_unload)
            .unwrap_or_default()
    }

    pub async fn records_schema(&self) -> Result<RecordsSchema> {
        self.driver.schema_from_table(&self.schema, &self.table).await
    }

    /// Unload into `directory` and complete it with schema, format and
    /// `_manifest`. Unloaders that cannot write the manifest themselves get
    /// one built from a directory listing.
    async fn unload_into(
        &self,
        unloader: &dyn Unloader,
        plan: &UnloadPlan,
        directory: &RecordsDirectory,
        records_schema: &RecordsSchema,
    ) -> Result<Option<u64>> {
        let count = unloader
            .unload(&self.schema, &self.table, plan, directory)
            .await?;
        if directory.load_manifest().await?.is_none() {
            directory.save_preliminary_manifest(None).await?;
        }
        directory.save_schema(records_schema).await?;
        directory.save_format(&plan.records_format).await?;
        directory.finalize_manifest().await?;
        Ok(count)
    }

    /// Unload straight into `directory` when the vendor can write there,
    /// else into a scratch directory that is then copied over.
    pub async fn move_to_records_directory(
        &self,
        cx: &MoveContext,
        directory: &RecordsDirectory,
        format: &RecordsFormat,
    ) -> Result<Option<u64>> {
        let unloader = self.unloader().ok_or_else(|| {
            MoverError::not_supported(format!("{} cannot unload", self.driver.dialect()))
        })?;
        let records_schema = self.records_schema().await?;
        let plan = UnloadPlan {
            records_format: format.clone(),
            processing_instructions: cx.processing_instructions().clone(),
        };
        let scheme = directory.loc().scheme();
        if unloader.can_unload_to_scheme(scheme) {
            return self
                .unload_into(unloader, &plan, directory, &records_schema)
                .await;
        }
        let parent = unloader.temporary_unloadable_directory_parent().ok_or_else(|| {
            MoverError::NoTemporaryBucketConfiguration(format!(
                "{} unload to {scheme}://",
                self.driver.dialect()
            ))
        })?;
        let source = self.qualified_table();
        let url = directory.loc().url();
        info!("Unloading {source} through scratch space for {url}", source: source, url: url);
        with_temporary_directory(&parent, |loc| async move {
            let staging = directory.sibling(loc);
            let count = self
                .unload_into(unloader, &plan, &staging, &records_schema)
                .await?;
            staging.copy_to(directory).await?;
            Ok::<_, MoverError>(count)
        })
        .await
    }

    /// Stream the table in chunks of at most two million cells
    pub async fn to_dataframes_source(&self) -> Result<DataframesSource> {
        let records_schema = self.records_schema().await?;
        let arrow_schema = Arc::new(records_schema.to_arrow_schema());
        let rows = rows_per_chunk(records_schema.len());
        let sql = format!("SELECT * FROM {}", self.qualified_table());
        let stream = self.driver.connection().query_batches(&sql, rows).await?;
        Ok(DataframesSource::new(stream)
            .with_arrow_schema(arrow_schema)
            .with_records_schema(records_schema))
    }
}

impl std::fmt::Debug for TableSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableSource({} {})", self.driver.dialect(), self.qualified_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ColumnInfo;
    use crate::db::vendors::postgres::PostgresDriver;
    use crate::testing::RecordingConnection;
    use futures::TryStreamExt;
    use records::ProcessingInstructions;
    use urlfs::UrlResolver;

    fn source(conn: &Arc<RecordingConnection>) -> TableSource {
        conn.set_columns(
            "public",
            "people",
            vec![
                ColumnInfo::new("id", "INTEGER", false),
                ColumnInfo::new("name", "VARCHAR(32)", true),
            ],
        );
        TableSource::new(Arc::new(PostgresDriver::new(conn.clone())), "public", "people")
    }

    #[tokio::test]
    async fn test_unload_completes_directory() {
        let conn = Arc::new(RecordingConnection::default());
        conn.set_copy_out_data(b"1\tann\n2\tbob\n");
        let source = source(&conn);
        let cx = MoveContext::new(Arc::new(UrlResolver::default()), ProcessingInstructions::default());
        let directory = cx.records_directory("mem://bucket/unload/").unwrap();
        let format = RecordsFormat::bluelabs();
        assert!(source.can_move_to_format(&format));
        _ = source
            .move_to_records_directory(&cx, &directory, &format)
            .await
            .unwrap();
        assert!(directory.is_finalized().await.unwrap());
        assert_eq!(
            directory.manifest_entry_urls().await.unwrap(),
            vec!["mem://bucket/unload/data.csv.gz".to_string()]
        );
        let schema = directory.load_schema().await.unwrap().unwrap();
        assert_eq!(schema.field_names().collect::<Vec<_>>(), vec!["id", "name"]);
        assert!(
            conn.statements()
                .iter()
                .any(|s| s.starts_with("COPY \"public\".\"people\" TO STDOUT"))
        );
    }

    #[tokio::test]
    async fn test_to_dataframes_queries_table() {
        let conn = Arc::new(RecordingConnection::default());
        conn.set_query_result(vec![
            arrow_array::record_batch!(("id", Int32, [1, 2]), ("name", Utf8, ["a", "b"])).unwrap(),
        ]);
        let source = source(&conn);
        let batches: Vec<_> = source
            .to_dataframes_source()
            .await
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert!(
            conn.statements()
                .contains(&"SELECT * FROM \"public\".\"people\"".to_string())
        );
    }
}
