// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A database table loaded through its driver.

use std::sync::Arc;

use diagnostics::*;
use records::{RecordsFormat, RecordsSchema};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use urlfs::{DirectoryUrl, Fileobj, with_temporary_directory};

use crate::db::prep::{ExistingTableHandling, Grants, prep_table_for_load};
use crate::db::{DbDriver, FileobjLoader, LoadPlan, Loader};
use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use crate::planner::MoveContext;
use crate::results::MoveResult;
use crate::sources::{DataframesSource, FileobjsSource, Source};

/// How the table is prepared and what happens when a load fails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTargetOptions {
    #[serde(default)]
    pub existing_table_handling: ExistingTableHandling,
    /// Drop and recreate the table, then load once more, after a load error
    #[serde(default)]
    pub drop_and_recreate_on_load_error: bool,
    #[serde(default)]
    pub grants: Grants,
}

/// What a single load reads from
enum LoadInput<'a> {
    Directory(&'a RecordsDirectory),
    Fileobjs(&'a mut [(String, Fileobj)]),
}

pub struct TableTarget {
    driver: Arc<dyn DbDriver>,
    schema: String,
    table: String,
    options: TableTargetOptions,
}

impl TableTarget {
    #[must_use]
    pub fn new(driver: Arc<dyn DbDriver>, schema: &str, table: &str) -> Self {
        Self {
            driver,
            schema: schema.to_string(),
            table: table.to_string(),
            options: TableTargetOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: TableTargetOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<dyn DbDriver> {
        &self.driver
    }

    #[must_use]
    pub fn qualified_table(&self) -> String {
        self.driver.qualified_table(&self.schema, &self.table)
    }

    fn loader(&self) -> Result<&dyn Loader> {
        self.driver.loader().ok_or_else(|| {
            MoverError::not_supported(format!("{} cannot load from a directory", self.driver.dialect()))
        })
    }

    fn fileobj_loader(&self) -> Result<&dyn FileobjLoader> {
        self.driver.fileobj_loader().ok_or_else(|| {
            MoverError::not_supported(format!("{} cannot load from streams", self.driver.dialect()))
        })
    }

    #[must_use]
    pub fn can_move_from_records_directory(&self) -> bool {
        self.driver.loader().is_some()
    }

    /// Whether the loader reads `scheme` URLs in place
    #[must_use]
    pub fn accepts_scheme(&self, scheme: &str) -> bool {
        self.driver
            .loader()
            .is_some_and(|loader| loader.best_scheme_to_load_from() == scheme)
    }

    /// Formats the directory loader takes, or the stream loader when
    /// there is no directory loader
    #[must_use]
    pub fn can_load_format(&self, format: &RecordsFormat) -> bool {
        match self.driver.loader() {
            Some(loader) => loader.can_load_this_format(format),
            None => self.can_load_fileobjs_format(format),
        }
    }

    #[must_use]
    pub fn can_move_from_fileobjs(&self) -> bool {
        self.driver.fileobj_loader().is_some()
    }

    #[must_use]
    pub fn can_load_fileobjs_format(&self, format: &RecordsFormat) -> bool {
        self.driver
            .fileobj_loader()
            .is_some_and(|loader| loader.can_load_this_format(format))
    }

    /// Any directory loader can be handed scratch space; one without
    /// configured scratch fails when asked
    #[must_use]
    pub fn can_move_from_temp_loc(&self) -> bool {
        self.driver.loader().is_some()
    }

    #[must_use]
    pub fn can_move_from_dataframes(&self) -> bool {
        self.driver.loader().is_some() || self.driver.fileobj_loader().is_some()
    }

    /// Best first, from the same loader as [`Self::can_load_format`]
    #[must_use]
    pub fn known_supported_records_formats(&self) -> Vec<RecordsFormat> {
        match (self.driver.loader(), self.driver.fileobj_loader()) {
            (Some(loader), _) => loader.known_supported_records_formats_for_load(),
            (None, Some(loader)) => loader.known_supported_records_formats_for_load(),
            (None, None) => Vec::new(),
        }
    }

    /// Scratch space the loader can read, plus the local directory backing
    /// it when the loader reads local files
    fn temporary_parent(&self, cx: &MoveContext, loader: &dyn Loader) -> Result<(DirectoryUrl, Option<TempDir>)> {
        if let Some(parent) = loader.temporary_loadable_directory_parent() {
            return Ok((parent, None));
        }
        if loader.best_scheme_to_load_from() == "file" {
            let local = tempfile::tempdir()?;
            let url = format!("file://{}/", local.path().display());
            return Ok((cx.resolver().directory_url(&url)?, Some(local)));
        }
        Err(MoverError::NoTemporaryBucketConfiguration(format!(
            "{} load into {}",
            self.driver.dialect(),
            self.qualified_table()
        )))
    }

    async fn prep(&self, records_schema: Option<&RecordsSchema>, handling: ExistingTableHandling) -> Result<()> {
        prep_table_for_load(
            self.driver.as_ref(),
            &self.schema,
            &self.table,
            records_schema,
            handling,
            &self.options.grants,
        )
        .await
    }

    async fn load_once(&self, plan: &LoadPlan, input: &mut LoadInput<'_>) -> Result<Option<u64>> {
        match input {
            LoadInput::Directory(directory) => {
                self.loader()?
                    .load(&self.schema, &self.table, plan, *directory)
                    .await
            }
            LoadInput::Fileobjs(fileobjs) => {
                self.fileobj_loader()?
                    .load_from_fileobjs(&self.schema, &self.table, plan, &mut **fileobjs)
                    .await
            }
        }
    }

    /// Prepare the table and load it, retrying once after dropping and
    /// recreating it when the options ask for that
    async fn prep_and_load(
        &self,
        cx: &MoveContext,
        format: &RecordsFormat,
        records_schema: Option<&RecordsSchema>,
        mut input: LoadInput<'_>,
    ) -> Result<Option<u64>> {
        self.prep(records_schema, self.options.existing_table_handling)
            .await?;
        let plan = LoadPlan {
            records_format: format.clone(),
            processing_instructions: cx.processing_instructions().clone(),
        };
        let count = match self.load_once(&plan, &mut input).await {
            Ok(count) => count,
            Err(err) if err.is_load_error() && self.options.drop_and_recreate_on_load_error => {
                let target = self.qualified_table();
                let message = err.to_string();
                warn!("Load into {target} failed ({message}); dropping, recreating and retrying once", target: target, message: message);
                self.prep(records_schema, ExistingTableHandling::DropAndRecreate)
                    .await?;
                self.load_once(&plan, &mut input).await?
            }
            Err(err) => return Err(err),
        };
        if let Some(rows) = count {
            let target = self.qualified_table();
            info!("Loaded {rows} rows into {target}", rows: rows, target: target);
        }
        Ok(count)
    }

    /// Load a completed directory, copying it to scratch space first when
    /// the loader cannot read it where it is
    pub async fn move_from_records_directory(
        &self,
        cx: &MoveContext,
        directory: &RecordsDirectory,
        format: &RecordsFormat,
    ) -> Result<MoveResult> {
        let loader = self.loader()?;
        let records_schema = directory.load_schema().await?;
        if loader.best_scheme_to_load_from() == directory.loc().scheme() {
            let count = self
                .prep_and_load(cx, format, records_schema.as_ref(), LoadInput::Directory(directory))
                .await?;
            return Ok(MoveResult::with_count(count));
        }
        let (parent, _local) = self.temporary_parent(cx, loader)?;
        let count = with_temporary_directory(&parent, |loc| async move {
            let staging = directory.sibling(loc);
            directory.copy_to(&staging).await?;
            self.prep_and_load(cx, format, records_schema.as_ref(), LoadInput::Directory(&staging))
                .await
        })
        .await?;
        Ok(MoveResult::with_count(count))
    }

    pub async fn move_from_fileobjs_source(
        &self,
        cx: &MoveContext,
        mut fileobjs: FileobjsSource,
    ) -> Result<MoveResult> {
        let records_schema = fileobjs.records_schema(cx.processing_instructions()).await?;
        let format = fileobjs.records_format().clone();
        let count = self
            .prep_and_load(
                cx,
                &format,
                records_schema.as_ref(),
                LoadInput::Fileobjs(fileobjs.fileobjs_mut()),
            )
            .await?;
        Ok(MoveResult::with_count(count))
    }

    /// Have `source` fill a scratch directory, then load from it
    pub async fn move_from_temp_loc_after_filling_it(
        &self,
        cx: &MoveContext,
        source: Source,
        format: &RecordsFormat,
    ) -> Result<MoveResult> {
        let loader = self.loader()?;
        let (parent, _local) = self.temporary_parent(cx, loader)?;
        let count = with_temporary_directory(&parent, |loc| async move {
            let directory = cx.directory(loc);
            _ = source.move_to_records_directory(cx, &directory, format).await?;
            let records_schema = directory.load_schema().await?;
            self.prep_and_load(cx, format, records_schema.as_ref(), LoadInput::Directory(&directory))
                .await
        })
        .await?;
        Ok(MoveResult::with_count(count))
    }

    /// Stream loaders get one file per chunk; directory loaders get a
    /// filled scratch directory
    pub async fn move_from_dataframes_source(
        &self,
        cx: &MoveContext,
        dataframes: DataframesSource,
    ) -> Result<MoveResult> {
        let pi = cx.processing_instructions();
        if let Some(loader) = self.driver.fileobj_loader() {
            let format = dataframes.choose_format(
                &loader.known_supported_records_formats_for_load(),
                |format| loader.can_load_this_format(format),
                pi,
            );
            let fileobjs = dataframes.to_fileobjs_source(&format, pi).await?;
            return self.move_from_fileobjs_source(cx, fileobjs).await;
        }
        let loader = self.loader()?;
        let format = dataframes.choose_format(
            &loader.known_supported_records_formats_for_load(),
            |format| loader.can_load_this_format(format),
            pi,
        );
        self.move_from_temp_loc_after_filling_it(cx, Source::Dataframes(dataframes), &format)
            .await
    }
}

impl std::fmt::Debug for TableTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableTarget({} {})", self.driver.dialect(), self.qualified_table())
    }
}
