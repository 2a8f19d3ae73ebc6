// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Where records come from, and what each kind of source can do.

pub mod data_url;
pub mod dataframes;
pub mod directory;
pub mod fileobjs;
pub mod sheets;
pub mod table;

use records::{ProcessingInstructions, RecordsFormat};

use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use crate::planner::MoveContext;

pub use data_url::DataUrlSource;
pub use dataframes::DataframesSource;
pub use directory::DirectorySource;
pub use fileobjs::FileobjsSource;
pub use sheets::GoogleSheetsSource;
pub use table::TableSource;

/// A source of records.
///
/// Capabilities are queried through the `can_*` methods; the planner never
/// looks at which variant it holds beyond what those report.
#[derive(Debug)]
pub enum Source {
    Fileobjs(FileobjsSource),
    DataUrl(DataUrlSource),
    Table(TableSource),
    Dataframes(DataframesSource),
    Directory(DirectorySource),
    GoogleSheets(GoogleSheetsSource),
}

impl Source {
    /// Short name used in logs and promotion bookkeeping
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Fileobjs(_) => "fileobjs",
            Source::DataUrl(_) => "data_url",
            Source::Table(_) => "table",
            Source::Dataframes(_) => "dataframes",
            Source::Directory(_) => "directory",
            Source::GoogleSheets(_) => "google_sheets",
        }
    }

    /// An existing records directory and its format
    #[must_use]
    pub fn records_directory(&self) -> Option<(&RecordsDirectory, &RecordsFormat)> {
        match self {
            Source::Directory(source) => Some((source.directory(), source.records_format())),
            _ => None,
        }
    }

    /// Opened streams with a known format
    #[must_use]
    pub fn fileobjs(&self) -> Option<&FileobjsSource> {
        match self {
            Source::Fileobjs(source) => Some(source),
            _ => None,
        }
    }

    #[must_use]
    pub fn can_move_to_records_directory(&self) -> bool {
        match self {
            Source::Fileobjs(_)
            | Source::DataUrl(_)
            | Source::Dataframes(_)
            | Source::Directory(_) => true,
            Source::Table(source) => source.can_move_to_records_directory(),
            Source::GoogleSheets(_) => false,
        }
    }

    /// Whether this source can write `format` without converting records
    #[must_use]
    pub fn can_move_to_format(&self, format: &RecordsFormat, pi: &ProcessingInstructions) -> bool {
        match self {
            Source::Fileobjs(source) => source.can_move_to_format(format),
            Source::DataUrl(source) => source.can_move_to_format(format),
            Source::Table(source) => source.can_move_to_format(format),
            Source::Dataframes(_) => DataframesSource::can_write_format(format, pi),
            Source::Directory(source) => source.can_move_to_format(format),
            Source::GoogleSheets(_) => false,
        }
    }

    /// Formats this source can write, best first
    #[must_use]
    pub fn known_supported_records_formats(&self) -> Vec<RecordsFormat> {
        match self {
            Source::Fileobjs(source) => vec![source.records_format().clone()],
            Source::DataUrl(source) => vec![source.records_format().clone()],
            Source::Table(source) => source.known_supported_records_formats(),
            Source::Dataframes(source) => source.known_supported_records_formats(),
            Source::Directory(source) => vec![source.records_format().clone()],
            Source::GoogleSheets(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn can_produce_fileobjs(&self) -> bool {
        matches!(self, Source::DataUrl(_) | Source::Directory(_))
    }

    #[must_use]
    pub fn can_produce_dataframes(&self) -> bool {
        matches!(
            self,
            Source::Fileobjs(_) | Source::Table(_) | Source::Dataframes(_) | Source::GoogleSheets(_)
        )
    }

    /// Write records into `directory` in `format` and complete it
    pub async fn move_to_records_directory(
        self,
        cx: &MoveContext,
        directory: &RecordsDirectory,
        format: &RecordsFormat,
    ) -> Result<Option<u64>> {
        let pi = cx.processing_instructions();
        match self {
            Source::Fileobjs(source) => source.move_to_records_directory(directory, pi).await,
            Source::DataUrl(source) => {
                source
                    .to_fileobjs_source()
                    .await?
                    .move_to_records_directory(directory, pi)
                    .await
            }
            Source::Table(source) => source.move_to_records_directory(cx, directory, format).await,
            Source::Dataframes(source) => source.move_to_records_directory(directory, format, pi).await,
            Source::Directory(source) => source.move_to_records_directory(directory).await,
            Source::GoogleSheets(source) => Err(MoverError::not_supported(format!(
                "{source:?} cannot write a records directory"
            ))),
        }
    }

    pub async fn to_fileobjs_source(self) -> Result<FileobjsSource> {
        match self {
            Source::Fileobjs(source) => Ok(source),
            Source::DataUrl(source) => source.to_fileobjs_source().await,
            Source::Directory(source) => source.to_fileobjs_source().await,
            other => Err(MoverError::not_supported(format!(
                "{} source cannot produce fileobjs",
                other.kind()
            ))),
        }
    }

    pub async fn to_dataframes_source(self, pi: &ProcessingInstructions) -> Result<DataframesSource> {
        match self {
            Source::Fileobjs(source) => source.to_dataframes_source(pi).await,
            Source::DataUrl(source) => source.to_fileobjs_source().await?.to_dataframes_source(pi).await,
            Source::Table(source) => source.to_dataframes_source().await,
            Source::Dataframes(source) => Ok(source),
            Source::Directory(source) => source.to_fileobjs_source().await?.to_dataframes_source(pi).await,
            Source::GoogleSheets(source) => source.to_dataframes_source(pi).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use urlfs::Fileobj;

    fn fileobjs_source(format: RecordsFormat) -> Source {
        let fileobj: Fileobj = Box::new(Cursor::new(b"a\n1\n".to_vec()));
        Source::Fileobjs(FileobjsSource::new(vec![("a.csv".into(), fileobj)], format))
    }

    #[test]
    fn test_fileobjs_capabilities() {
        let pi = ProcessingInstructions::default();
        let source = fileobjs_source(RecordsFormat::bluelabs());
        assert_eq!(source.kind(), "fileobjs");
        assert!(source.fileobjs().is_some());
        assert!(source.records_directory().is_none());
        assert!(source.can_move_to_records_directory());
        assert!(source.can_move_to_format(&RecordsFormat::bluelabs(), &pi));
        assert!(!source.can_move_to_format(&RecordsFormat::Parquet, &pi));
        assert!(!source.can_produce_fileobjs());
        assert!(source.can_produce_dataframes());
        assert_eq!(
            source.known_supported_records_formats(),
            vec![RecordsFormat::bluelabs()]
        );
    }

    #[test]
    fn test_dataframes_capabilities() {
        let pi = ProcessingInstructions::default();
        let source = Source::Dataframes(DataframesSource::from_batches(Vec::new()));
        assert!(source.can_move_to_format(&RecordsFormat::Parquet, &pi));
        assert!(!source.can_move_to_format(&RecordsFormat::Avro, &pi));
        assert!(!source.can_produce_fileobjs());
        assert!(source.can_produce_dataframes());
    }
}
