// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! One module per subcommand. Each returns the text to print.

pub mod dir2dir;
pub mod dir2file;
pub mod file2dir;
pub mod file2file;
pub mod preview;
pub mod schema;
pub mod sniff;

pub use dir2dir::{Dir2dirArgs, dir2dir_command};
pub use dir2file::{Dir2fileArgs, dir2file_command};
pub use file2dir::{File2dirArgs, file2dir_command};
pub use file2file::{File2fileArgs, file2file_command};
pub use preview::{PreviewArgs, preview_command};
pub use schema::{SchemaArgs, schema_command};
pub use sniff::{SniffArgs, sniff_command};

use mover::MoveResult;

fn describe(result: &MoveResult) -> String {
    format!("{result}\n")
}
