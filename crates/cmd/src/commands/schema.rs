// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Result, anyhow};
use clap::Args;
use mover::{MoveContext, Source};

use crate::common::{hints_from_args, open_source};

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Records directory URL (ending in `/`) or data file URL
    pub url: String,

    /// Hint override for reading a data file
    #[arg(long = "hint", value_name = "KEY=VALUE")]
    pub hints: Vec<String>,
}

/// The `_schema.json` of a directory, or the schema inferred from a file
pub async fn schema_command(cx: &MoveContext, args: &SchemaArgs) -> Result<String> {
    let records_schema = match open_source(cx, &args.url, hints_from_args(&args.hints)?).await? {
        Source::Directory(source) => source
            .records_schema()
            .cloned()
            .ok_or_else(|| anyhow!("{} has no _schema.json", args.url))?,
        source => {
            let mut fileobjs = source.to_fileobjs_source().await?;
            fileobjs
                .records_schema(cx.processing_instructions())
                .await?
                .ok_or_else(|| anyhow!("Could not infer a schema for {}", args.url))?
        }
    };
    let doc = records_schema.to_json_value()?;
    Ok(format!("{}\n", serde_json::to_string_pretty(&doc)?))
}
