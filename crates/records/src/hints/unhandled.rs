// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The consuming hint set.
//!
//! Each translator removes the hints it honours; whatever is left at the end
//! was silently ignored and is reported by [`UnhandledHints::complain_if_unhandled`].

use std::collections::BTreeSet;
use std::fmt::Display;

use diagnostics::*;

use super::{HintName, PartialHints};
use crate::error::{RecordsError, Result};
use crate::processing::ProcessingInstructions;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnhandledHints {
    keys: BTreeSet<String>,
}

impl UnhandledHints {
    /// Seed with every key of a hint map
    #[must_use]
    pub fn from_hints(hints: &PartialHints) -> Self {
        Self {
            keys: hints.keys().cloned().collect(),
        }
    }

    pub fn consume(&mut self, hint: HintName) {
        _ = self.keys.remove(hint.as_str());
    }

    pub fn consume_all<I: IntoIterator<Item = HintName>>(&mut self, hints: I) {
        for hint in hints {
            self.consume(hint);
        }
    }

    #[must_use]
    pub fn contains(&self, hint: HintName) -> bool {
        self.keys.contains(hint.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Error (strict) or warn (lenient) about any hint still in the set.
    pub fn complain_if_unhandled(&self, pi: &ProcessingInstructions) -> Result<()> {
        if self.keys.is_empty() {
            return Ok(());
        }
        let hints: Vec<String> = self.keys.iter().cloned().collect();
        if pi.fail_if_dont_understand {
            return Err(RecordsError::UnhandledHint { hints });
        }
        let joined = hints.join(", ");
        warn!("Did not understand these hints: {hints}", hints: joined);
        Ok(())
    }
}

/// Report a hint value a translator cannot represent.
pub fn cant_handle_hint<V: Display>(
    pi: &ProcessingInstructions,
    hint: HintName,
    value: V,
    reason: &str,
) -> Result<()> {
    if pi.fail_if_cant_handle_hint {
        return Err(RecordsError::cant_handle(hint.as_str(), value, reason));
    }
    let name = hint.as_str();
    let value = value.to_string();
    warn!("Ignoring hint {name} = {value}: {reason}", name: name, value: value, reason: reason);
    Ok(())
}
