// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::Args;
use mover::sources::DataUrlSource;
use mover::targets::DirectoryTarget;
use mover::{MoveContext, Source, Target, move_records};

use crate::common::FormatArgs;

#[derive(Args, Debug)]
pub struct File2dirArgs {
    /// Data file URL
    pub source: String,

    /// Empty records directory URL
    pub directory: String,

    /// Format of the data file; sniffed when not given
    #[command(flatten)]
    pub format: FormatArgs,
}

pub async fn file2dir_command(cx: &MoveContext, args: &File2dirArgs) -> Result<String> {
    let pi = cx.processing_instructions();
    let file = cx.file_url(&args.source)?;
    let source = match args.format.records_format(pi)? {
        Some(format) if args.format.variant.is_some() => DataUrlSource::new(file, format),
        _ => DataUrlSource::sniff(file, args.format.partial_hints()?).await?,
    };
    let target = Target::Directory(DirectoryTarget::new(cx.records_directory(&args.directory)?, None));
    let result = move_records(cx, Source::DataUrl(source), &target).await?;
    Ok(super::describe(&result))
}
