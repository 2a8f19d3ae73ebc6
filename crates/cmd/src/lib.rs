// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Subcommands of the `mvrec` binary, kept in a library so they can be
//! driven from tests.

pub mod commands;
pub mod common;
