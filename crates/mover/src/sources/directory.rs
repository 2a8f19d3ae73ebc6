// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! An existing, completed records directory.

use records::{ProcessingInstructions, RecordsFormat, RecordsSchema};

use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use crate::sources::fileobjs::FileobjsSource;

#[derive(Debug)]
pub struct DirectorySource {
    directory: RecordsDirectory,
    records_format: RecordsFormat,
    records_schema: Option<RecordsSchema>,
}

impl DirectorySource {
    /// Wait for the directory to complete, then read its format and schema
    /// documents. `format` overrides the format document.
    pub async fn open(
        directory: RecordsDirectory,
        format: Option<RecordsFormat>,
        pi: &ProcessingInstructions,
    ) -> Result<Self> {
        directory.await_completion().await?;
        let records_format = match format {
            Some(format) => format,
            None => directory.load_format(pi).await?.ok_or_else(|| {
                MoverError::not_supported(format!(
                    "{} has no _format document",
                    directory.loc().url()
                ))
            })?,
        };
        let records_schema = directory.load_schema().await?;
        Ok(Self {
            directory,
            records_format,
            records_schema,
        })
    }

    #[must_use]
    pub fn directory(&self) -> &RecordsDirectory {
        &self.directory
    }

    #[must_use]
    pub fn records_format(&self) -> &RecordsFormat {
        &self.records_format
    }

    #[must_use]
    pub fn records_schema(&self) -> Option<&RecordsSchema> {
        self.records_schema.as_ref()
    }

    #[must_use]
    pub fn can_move_to_format(&self, format: &RecordsFormat) -> bool {
        *format == self.records_format
    }

    /// Copy into `other`; rows are not counted
    pub async fn move_to_records_directory(&self, other: &RecordsDirectory) -> Result<Option<u64>> {
        self.directory.copy_to(other).await?;
        Ok(None)
    }

    /// Open every manifest entry, named by its filename
    pub async fn to_fileobjs_source(&self) -> Result<FileobjsSource> {
        let mut fileobjs = Vec::new();
        for (_, file) in self.directory.entry_files().await? {
            let name = file.filename().to_string();
            fileobjs.push((name, file.open().await?));
        }
        Ok(FileobjsSource::new(fileobjs, self.records_format.clone())
            .with_records_schema(self.records_schema.clone()))
    }
}
