// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use arrow::util::pretty::pretty_format_batches;
use clap::Args;
use futures::TryStreamExt;
use mover::MoveContext;

use crate::common::{hints_from_args, open_source};

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Records directory URL (ending in `/`) or data file URL
    pub url: String,

    /// Rows to show
    #[arg(long, default_value_t = 10)]
    pub rows: usize,

    /// Hint override for reading a data file
    #[arg(long = "hint", value_name = "KEY=VALUE")]
    pub hints: Vec<String>,
}

/// The first rows as a table
pub async fn preview_command(cx: &MoveContext, args: &PreviewArgs) -> Result<String> {
    let source = open_source(cx, &args.url, hints_from_args(&args.hints)?).await?;
    let mut stream = source
        .to_dataframes_source(cx.processing_instructions())
        .await?
        .into_stream();
    let mut batches = Vec::new();
    let mut remaining = args.rows;
    while remaining > 0 {
        let Some(batch) = stream.try_next().await? else {
            break;
        };
        let take = remaining.min(batch.num_rows());
        batches.push(batch.slice(0, take));
        remaining -= take;
    }
    Ok(format!("{}\n", pretty_format_batches(&batches)?))
}
