// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::Args;
use mover::targets::DataUrlTarget;
use mover::{MoveContext, Target, move_records};

use crate::common::{FormatArgs, hints_from_args, open_source};

#[derive(Args, Debug)]
pub struct File2fileArgs {
    /// Input file URL
    pub source: String,

    /// Output file URL
    pub target: String,

    /// Hint override for reading the input
    #[arg(long = "input-hint", value_name = "KEY=VALUE")]
    pub input_hints: Vec<String>,

    /// Output format; the input is copied unchanged when not given
    #[command(flatten)]
    pub format: FormatArgs,
}

pub async fn file2file_command(cx: &MoveContext, args: &File2fileArgs) -> Result<String> {
    let source_url = args.source.trim_end_matches('/');
    let source = open_source(cx, source_url, hints_from_args(&args.input_hints)?).await?;
    let format = args.format.records_format(cx.processing_instructions())?;
    let target = Target::DataUrl(DataUrlTarget::new(cx.file_url(&args.target)?, format));
    let result = move_records(cx, source, &target)
        .await
        .with_context(|| format!("Failed to re-encode {} as {}", args.source, args.target))?;
    Ok(super::describe(&result))
}
