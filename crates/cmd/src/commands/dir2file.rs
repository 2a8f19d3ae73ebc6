// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::Args;
use mover::targets::DataUrlTarget;
use mover::{MoveContext, Target, move_records};
use records::PartialHints;

use crate::common::{FormatArgs, open_source};

#[derive(Args, Debug)]
pub struct Dir2fileArgs {
    /// Records directory URL
    pub directory: String,

    /// Output file URL
    pub file: String,

    /// Output format; the directory's own format is kept when not given
    #[command(flatten)]
    pub format: FormatArgs,
}

pub async fn dir2file_command(cx: &MoveContext, args: &Dir2fileArgs) -> Result<String> {
    let url = format!("{}/", args.directory.trim_end_matches('/'));
    let source = open_source(cx, &url, PartialHints::new()).await?;
    let format = args.format.records_format(cx.processing_instructions())?;
    let target = Target::DataUrl(DataUrlTarget::new(cx.file_url(&args.file)?, format));
    let result = move_records(cx, source, &target)
        .await
        .with_context(|| format!("Failed to write {}", args.file))?;
    Ok(super::describe(&result))
}
