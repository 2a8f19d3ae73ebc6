// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::Args;
use mover::targets::DirectoryTarget;
use mover::{MoveContext, Target, move_records};
use records::PartialHints;

use crate::common::{FormatArgs, open_source};

#[derive(Args, Debug)]
pub struct Dir2dirArgs {
    /// Records directory URL to read
    pub source: String,

    /// Empty records directory URL to fill
    pub target: String,

    /// Re-encode into this format; copied as-is when not given
    #[command(flatten)]
    pub format: FormatArgs,
}

pub async fn dir2dir_command(cx: &MoveContext, args: &Dir2dirArgs) -> Result<String> {
    let url = format!("{}/", args.source.trim_end_matches('/'));
    let source = open_source(cx, &url, PartialHints::new()).await?;
    let format = args.format.records_format(cx.processing_instructions())?;
    let target = Target::Directory(DirectoryTarget::new(cx.records_directory(&args.target)?, format));
    let result = move_records(cx, source, &target)
        .await
        .with_context(|| format!("Failed to fill {}", args.target))?;
    Ok(super::describe(&result))
}
