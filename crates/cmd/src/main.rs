// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cmd::commands::{
    Dir2dirArgs, Dir2fileArgs, File2dirArgs, File2fileArgs, PreviewArgs, SchemaArgs, SniffArgs,
    dir2dir_command, dir2file_command, file2dir_command, file2file_command, preview_command,
    schema_command, sniff_command,
};
use cmd::common::load_context;

#[derive(Parser)]
#[command(author, version, about = "Move records between files and records directories", long_about = None)]
#[command(name = "mvrec")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(long, global = true, env = "MVREC_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a data file into an empty records directory
    File2dir(File2dirArgs),
    /// Write a records directory out as one file
    Dir2file(Dir2fileArgs),
    /// Copy or re-encode a records directory into another
    Dir2dir(Dir2dirArgs),
    /// Re-encode one data file as another
    File2file(File2fileArgs),
    /// Print the hints sniffed from a delimited file
    Sniff(SniffArgs),
    /// Print a records schema
    Schema(SchemaArgs),
    /// Print the first rows of a file or records directory
    Preview(PreviewArgs),
}

#[allow(clippy::print_stdout)]
fn emit_output(output: &str) {
    print!("{output}");
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let cx = load_context(cli.config.as_deref())?;

    let output = match &cli.command {
        Commands::File2dir(args) => file2dir_command(&cx, args).await?,
        Commands::Dir2file(args) => dir2file_command(&cx, args).await?,
        Commands::Dir2dir(args) => dir2dir_command(&cx, args).await?,
        Commands::File2file(args) => file2file_command(&cx, args).await?,
        Commands::Sniff(args) => sniff_command(&cx, args).await?,
        Commands::Schema(args) => schema_command(&cx, args).await?,
        Commands::Preview(args) => preview_command(&cx, args).await?,
    };
    emit_output(&output);
    Ok(())
}
