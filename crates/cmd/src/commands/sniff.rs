// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::Args;
use mover::MoveContext;
use mover::sources::data_url::sniffed_hints;

use crate::common::hints_from_args;

#[derive(Args, Debug)]
pub struct SniffArgs {
    /// Data file URL
    pub file: String,

    /// Known hint, reported as given instead of sniffed
    #[arg(long = "hint", value_name = "KEY=VALUE")]
    pub hints: Vec<String>,
}

/// Hints guessed from the head of a delimited file, as JSON
pub async fn sniff_command(cx: &MoveContext, args: &SniffArgs) -> Result<String> {
    let file = cx.file_url(&args.file)?;
    let hints = sniffed_hints(&file, &hints_from_args(&args.hints)?).await?;
    Ok(format!("{}\n", serde_json::to_string_pretty(&hints)?))
}
