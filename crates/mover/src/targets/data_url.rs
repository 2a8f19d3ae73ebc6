// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A single output file addressed by URL.

use std::io::SeekFrom;

use bytes::Bytes;
use diagnostics::*;
use records::RecordsFormat;
use tokio::io::AsyncSeekExt;
use urlfs::FileUrl;

use crate::db::vendors::read_fileobj;
use crate::directory::{RecordsDirectory, check_concatenation};
use crate::error::Result;
use crate::planner::MoveContext;
use crate::results::MoveResult;
use crate::sources::{DataframesSource, FileobjsSource};

#[derive(Debug)]
pub struct DataUrlTarget {
    file: FileUrl,
    records_format: Option<RecordsFormat>,
}

impl DataUrlTarget {
    #[must_use]
    pub fn new(file: FileUrl, records_format: Option<RecordsFormat>) -> Self {
        Self {
            file,
            records_format,
        }
    }

    #[must_use]
    pub fn file(&self) -> &FileUrl {
        &self.file
    }

    /// The pinned format; a `.parquet` name pins Parquet
    fn pinned_format(&self) -> Option<RecordsFormat> {
        match &self.records_format {
            Some(format) => Some(format.clone()),
            None if self.file.filename().ends_with(".parquet") => Some(RecordsFormat::Parquet),
            None => None,
        }
    }

    #[must_use]
    pub fn known_supported_records_formats(&self) -> Vec<RecordsFormat> {
        self.pinned_format().into_iter().collect()
    }

    #[must_use]
    pub fn can_load_format(&self, format: &RecordsFormat) -> bool {
        self.pinned_format().is_none_or(|own| own == *format)
    }

    fn result(&self, count: Option<u64>) -> MoveResult {
        MoveResult::with_count(count).with_output_url("data", self.file.url())
    }

    /// Copy or concatenate the directory's entries into the file
    pub async fn move_from_records_directory(
        &self,
        source: &RecordsDirectory,
        format: &RecordsFormat,
    ) -> Result<MoveResult> {
        let size = source.save_to_url(&self.file, format).await?;
        let url = self.file.url();
        debug!("Wrote {size} bytes to {url}", size: size, url: url);
        Ok(self.result(None))
    }

    /// Upload a single stream as-is; several are joined under the same
    /// rules as a directory's entries
    pub async fn move_from_fileobjs_source(&self, mut fileobjs: FileobjsSource) -> Result<MoveResult> {
        let count = fileobjs.row_count();
        let format = fileobjs.records_format().clone();
        let parts = fileobjs.fileobjs_mut();
        if let [(_, only)] = parts {
            _ = only.seek(SeekFrom::Start(0)).await?;
            _ = self.file.upload_fileobj(only).await?;
            return Ok(self.result(count));
        }
        if parts.len() > 1 {
            check_concatenation(&format)?;
        }
        let mut data = Vec::new();
        for (_, fileobj) in parts.iter_mut() {
            data.extend(read_fileobj(fileobj).await?);
        }
        self.file.write_bytes(Bytes::from(data)).await?;
        Ok(self.result(count))
    }

    /// Serialize every chunk into the one file.
    ///
    /// Without a pinned format the source's preferred format is kept,
    /// and anything else is bluelabs.
    pub async fn move_from_dataframes_source(
        &self,
        cx: &MoveContext,
        dataframes: DataframesSource,
    ) -> Result<MoveResult> {
        let format = match self.pinned_format() {
            Some(format) => format,
            None => dataframes.choose_format(&[], |_| true, cx.processing_instructions()),
        };
        let (data, rows, _) = dataframes
            .into_single_file(&format, cx.processing_instructions())
            .await?;
        self.file.write_bytes(Bytes::from(data)).await?;
        Ok(self.result(Some(rows)))
    }
}
