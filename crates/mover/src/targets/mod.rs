// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Where records go, and what each kind of target can take.

pub mod data_url;
pub mod directory;
pub mod spectrum;
pub mod table;

use diagnostics::*;
use records::RecordsFormat;

use crate::directory::RecordsDirectory;
use crate::error::{MoverError, Result};
use crate::planner::MoveContext;
use crate::results::MoveResult;
use crate::sources::{DataframesSource, FileobjsSource, Source};

pub use data_url::DataUrlTarget;
pub use directory::DirectoryTarget;
pub use spectrum::SpectrumTarget;
pub use table::{TableTarget, TableTargetOptions};

#[derive(Debug)]
pub enum Target {
    Directory(DirectoryTarget),
    DataUrl(DataUrlTarget),
    Table(TableTarget),
    Spectrum(SpectrumTarget),
}

fn unsupported(target: &Target, what: &str) -> MoverError {
    MoverError::not_supported(format!("{} target cannot {what}", target.kind()))
}

impl Target {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Directory(_) => "directory",
            Target::DataUrl(_) => "data_url",
            Target::Table(_) => "table",
            Target::Spectrum(_) => "spectrum",
        }
    }

    /// A directory the target owns and sources may write into
    #[must_use]
    pub fn records_directory(&self) -> Option<&RecordsDirectory> {
        match self {
            Target::Directory(target) => Some(target.directory()),
            Target::Spectrum(target) => Some(target.directory()),
            Target::DataUrl(_) | Target::Table(_) => None,
        }
    }

    /// Formats this target takes, best first; empty means anything
    #[must_use]
    pub fn known_supported_records_formats(&self) -> Vec<RecordsFormat> {
        match self {
            Target::Directory(target) => target.known_supported_records_formats(),
            Target::DataUrl(target) => target.known_supported_records_formats(),
            Target::Table(target) => target.known_supported_records_formats(),
            Target::Spectrum(target) => target.known_supported_records_formats(),
        }
    }

    #[must_use]
    pub fn can_load_format(&self, format: &RecordsFormat) -> bool {
        match self {
            Target::Directory(target) => target.can_load_format(format),
            Target::DataUrl(target) => target.can_load_format(format),
            Target::Table(target) => target.can_load_format(format),
            Target::Spectrum(target) => target.can_load_format(format),
        }
    }

    #[must_use]
    pub fn can_move_from_records_directory(&self) -> bool {
        match self {
            Target::Directory(_) | Target::DataUrl(_) => true,
            Target::Table(target) => target.can_move_from_records_directory(),
            Target::Spectrum(_) => false,
        }
    }

    /// Whether a directory at `scheme` can be read where it stands
    #[must_use]
    pub fn accepts_scheme(&self, scheme: &str) -> bool {
        match self {
            Target::Directory(_) | Target::DataUrl(_) => true,
            Target::Table(target) => target.accepts_scheme(scheme),
            Target::Spectrum(_) => false,
        }
    }

    #[must_use]
    pub fn can_move_from_fileobjs(&self) -> bool {
        match self {
            Target::DataUrl(_) => true,
            Target::Table(target) => target.can_move_from_fileobjs(),
            Target::Directory(_) | Target::Spectrum(_) => false,
        }
    }

    #[must_use]
    pub fn can_load_fileobjs_format(&self, format: &RecordsFormat) -> bool {
        match self {
            Target::DataUrl(target) => target.can_load_format(format),
            Target::Table(target) => target.can_load_fileobjs_format(format),
            Target::Directory(_) | Target::Spectrum(_) => false,
        }
    }

    #[must_use]
    pub fn can_move_from_temp_loc(&self) -> bool {
        match self {
            Target::Table(target) => target.can_move_from_temp_loc(),
            _ => false,
        }
    }

    #[must_use]
    pub fn can_move_from_dataframes(&self) -> bool {
        match self {
            Target::Table(target) => target.can_move_from_dataframes(),
            Target::Directory(_) | Target::DataUrl(_) | Target::Spectrum(_) => true,
        }
    }

    /// Runs before a source fills [`Self::records_directory`]
    pub async fn pre_load_hook(&self, _cx: &MoveContext) -> Result<()> {
        match self {
            Target::Directory(target) => target.pre_load_hook().await,
            Target::Spectrum(target) => target.pre_load_hook().await,
            Target::DataUrl(_) | Target::Table(_) => Ok(()),
        }
    }

    /// Runs after a source filled [`Self::records_directory`]
    pub async fn post_load_hook(&self, _cx: &MoveContext, num_rows: Option<u64>) -> Result<()> {
        match self {
            Target::Spectrum(target) => target.post_load_hook(num_rows).await,
            Target::Directory(target) => {
                if let Some(rows) = num_rows {
                    let url = target.directory().loc().url();
                    debug!("Wrote {rows} rows to {url}", rows: rows, url: url);
                }
                Ok(())
            }
            Target::DataUrl(_) | Target::Table(_) => Ok(()),
        }
    }

    pub async fn move_from_records_directory(
        &self,
        cx: &MoveContext,
        directory: &RecordsDirectory,
        format: &RecordsFormat,
    ) -> Result<MoveResult> {
        match self {
            Target::Directory(target) => target.move_from_records_directory(directory).await,
            Target::DataUrl(target) => target.move_from_records_directory(directory, format).await,
            Target::Table(target) => target.move_from_records_directory(cx, directory, format).await,
            Target::Spectrum(_) => Err(unsupported(self, "load a records directory")),
        }
    }

    pub async fn move_from_fileobjs_source(
        &self,
        cx: &MoveContext,
        fileobjs: FileobjsSource,
    ) -> Result<MoveResult> {
        match self {
            Target::DataUrl(target) => target.move_from_fileobjs_source(fileobjs).await,
            Target::Table(target) => target.move_from_fileobjs_source(cx, fileobjs).await,
            Target::Directory(target) => target.move_from_fileobjs_source(cx, fileobjs).await,
            Target::Spectrum(_) => Err(unsupported(self, "load fileobjs")),
        }
    }

    pub async fn move_from_temp_loc_after_filling_it(
        &self,
        cx: &MoveContext,
        source: Source,
        format: &RecordsFormat,
    ) -> Result<MoveResult> {
        match self {
            Target::Table(target) => target.move_from_temp_loc_after_filling_it(cx, source, format).await,
            _ => Err(unsupported(self, "load from scratch space")),
        }
    }

    pub async fn move_from_dataframes_source(
        &self,
        cx: &MoveContext,
        dataframes: DataframesSource,
    ) -> Result<MoveResult> {
        match self {
            Target::Directory(target) => target.move_from_dataframes_source(cx, dataframes).await,
            Target::DataUrl(target) => target.move_from_dataframes_source(cx, dataframes).await,
            Target::Table(target) => target.move_from_dataframes_source(cx, dataframes).await,
            Target::Spectrum(target) => target.move_from_dataframes_source(cx, dataframes).await,
        }
    }
}
