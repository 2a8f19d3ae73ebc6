// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! An empty records directory to be filled.

use records::RecordsFormat;

use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use crate::planner::MoveContext;
use crate::results::MoveResult;
use crate::sources::{DataframesSource, FileobjsSource};

#[derive(Debug)]
pub struct DirectoryTarget {
    directory: RecordsDirectory,
    records_format: Option<RecordsFormat>,
}

impl DirectoryTarget {
    /// `records_format` pins the format written; `None` takes whatever
    /// the source offers first.
    #[must_use]
    pub fn new(directory: RecordsDirectory, records_format: Option<RecordsFormat>) -> Self {
        Self {
            directory,
            records_format,
        }
    }

    #[must_use]
    pub fn directory(&self) -> &RecordsDirectory {
        &self.directory
    }

    #[must_use]
    pub fn known_supported_records_formats(&self) -> Vec<RecordsFormat> {
        self.records_format.iter().cloned().collect()
    }

    #[must_use]
    pub fn can_load_format(&self, format: &RecordsFormat) -> bool {
        self.records_format.as_ref().is_none_or(|own| own == format)
    }

    /// Refuse to write over existing contents
    pub async fn pre_load_hook(&self) -> Result<()> {
        if self.directory.is_empty().await? {
            Ok(())
        } else {
            Err(MoverError::RecordsFolderNonEmpty(self.directory.loc().url().to_string()))
        }
    }

    fn result(&self, count: Option<u64>) -> Result<MoveResult> {
        Ok(MoveResult::with_count(count).with_output_url("manifest", &self.directory.manifest_url()?))
    }

    pub async fn move_from_records_directory(&self, source: &RecordsDirectory) -> Result<MoveResult> {
        self.pre_load_hook().await?;
        source.copy_to(&self.directory).await?;
        self.result(None)
    }

    pub async fn move_from_fileobjs_source(
        &self,
        cx: &MoveContext,
        fileobjs: FileobjsSource,
    ) -> Result<MoveResult> {
        self.pre_load_hook().await?;
        let count = fileobjs
            .move_to_records_directory(&self.directory, cx.processing_instructions())
            .await?;
        self.result(count)
    }

    pub async fn move_from_dataframes_source(
        &self,
        cx: &MoveContext,
        dataframes: DataframesSource,
    ) -> Result<MoveResult> {
        self.pre_load_hook().await?;
        let pi = cx.processing_instructions();
        let format = dataframes.choose_format(
            &self.known_supported_records_formats(),
            |format| self.can_load_format(format),
            pi,
        );
        let count = dataframes
            .move_to_records_directory(&self.directory, &format, pi)
            .await?;
        self.result(count)
    }
}
