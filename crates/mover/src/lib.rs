// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Moving tabular records between databases, object stores, files and
//! dataframes.
//!
//! Build a [`Source`] and a [`Target`], then hand both to
//! [`move_records`]. The planner picks the cheapest path the two support,
//! staging through records directories when neither side can talk to the
//! other directly.

pub mod config;
pub mod dataframes;
pub mod db;
pub mod directory;
pub mod error;
pub mod planner;
pub mod results;
pub mod sheets;
pub mod sources;
pub mod targets;
pub mod testing;

pub use config::{MoverConfig, load_config, validate_config};
pub use directory::{RecordsDirectory, WaitSettings};
pub use error::{MoverError, Result};
pub use planner::{MoveContext, Strategy, choose_strategy, move_records};
pub use results::MoveResult;
pub use sources::Source;
pub use targets::Target;
