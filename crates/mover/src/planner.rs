// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Choosing how to move records from a source to a target.
//!
//! Strategies are tried in cost order: loading straight from a directory
//! the source already has, streaming opened files, filling a directory the
//! target owns, staging through scratch space, and finally going through
//! dataframes. A source that cannot take part as it is may be promoted to
//! fileobjs or dataframes once each, after which planning starts over.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use diagnostics::*;
use futures::future::BoxFuture;
use records::{ProcessingInstructions, RecordsFormat, negotiate};
use urlfs::{DirectoryUrl, FileUrl, UrlResolver};

use crate::config::{MoverConfig, ScratchConfig};
use crate::directory::{RecordsDirectory, WaitSettings};
use crate::error::{MoverError, Result};
use crate::results::MoveResult;
use crate::sources::Source;
use crate::targets::Target;

/// Everything a move needs besides its endpoints
#[derive(Debug, Clone)]
pub struct MoveContext {
    resolver: Arc<UrlResolver>,
    processing_instructions: ProcessingInstructions,
    wait: WaitSettings,
    scratch: ScratchConfig,
}

impl MoveContext {
    #[must_use]
    pub fn new(resolver: Arc<UrlResolver>, processing_instructions: ProcessingInstructions) -> Self {
        Self {
            resolver,
            processing_instructions,
            wait: WaitSettings::default(),
            scratch: ScratchConfig::default(),
        }
    }

    pub fn from_config(config: &MoverConfig) -> Result<Self> {
        let resolver = Arc::new(UrlResolver::new(config.url_config()));
        Ok(Self::new(resolver, config.processing_instructions.clone())
            .with_wait(config.wait_settings()?)
            .with_scratch(config.scratch.clone()))
    }

    #[must_use]
    pub fn with_wait(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    #[must_use]
    pub fn with_scratch(mut self, scratch: ScratchConfig) -> Self {
        self.scratch = scratch;
        self
    }

    #[must_use]
    pub fn processing_instructions(&self) -> &ProcessingInstructions {
        &self.processing_instructions
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<UrlResolver> {
        &self.resolver
    }

    pub fn file_url(&self, url: &str) -> Result<FileUrl> {
        Ok(self.resolver.file_url(url)?)
    }

    /// A records directory at `url` using this context's wait settings
    pub fn records_directory(&self, url: &str) -> Result<RecordsDirectory> {
        Ok(self.directory(self.resolver.directory_url(url)?))
    }

    #[must_use]
    pub fn directory(&self, loc: DirectoryUrl) -> RecordsDirectory {
        RecordsDirectory::new(loc, self.resolver.clone()).with_wait(self.wait)
    }

    /// The configured scratch location for `scheme` (`s3` or `gs`)
    pub fn scratch_directory(&self, scheme: &str) -> Result<Option<DirectoryUrl>> {
        let url = match scheme {
            "s3" => self.scratch.s3.as_deref(),
            "gs" => self.scratch.gcs.as_deref(),
            _ => None,
        };
        url.map(|url| self.resolver.directory_url(url))
            .transpose()
            .map_err(MoverError::from)
    }
}

/// How a move will be carried out, cheapest first
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// The target loads the source's directory where it stands
    LoadFromDirectory,
    /// The target loads the source's opened files
    StreamFileobjs,
    /// The source writes into the target's directory in the given format
    FillTargetDirectory(RecordsFormat),
    /// The target loads the source's directory after relocating it
    LoadFromRelocatedDirectory,
    /// Open the source's files and plan again
    PromoteToFileobjs,
    /// The source fills scratch space the target then loads from
    FillTemporaryDirectory(RecordsFormat),
    /// The target takes the source's dataframes
    ThroughDataframes,
    /// Read the source into dataframes and plan again
    PromoteToDataframes,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::LoadFromDirectory => "load from directory",
            Strategy::StreamFileobjs => "stream fileobjs",
            Strategy::FillTargetDirectory(_) => "fill target directory",
            Strategy::LoadFromRelocatedDirectory => "load from relocated directory",
            Strategy::PromoteToFileobjs => "promote to fileobjs",
            Strategy::FillTemporaryDirectory(_) => "fill temporary directory",
            Strategy::ThroughDataframes => "through dataframes",
            Strategy::PromoteToDataframes => "promote to dataframes",
        };
        f.write_str(name)
    }
}

fn compatible_format(source: &Source, target: &Target, pi: &ProcessingInstructions) -> Option<RecordsFormat> {
    negotiate(
        &source.known_supported_records_formats(),
        &target.known_supported_records_formats(),
        |format| target.can_load_format(format),
        |format| source.can_move_to_format(format, pi),
    )
}

/// Pick the first strategy that applies.
///
/// `promoted` names the promotions already made for this move, so a source
/// is never promoted to the same kind twice.
pub fn choose_strategy(
    source: &Source,
    target: &Target,
    promoted: &BTreeSet<&'static str>,
    pi: &ProcessingInstructions,
) -> Result<Strategy> {
    if let Some((directory, format)) = source.records_directory() {
        if target.can_move_from_records_directory()
            && target.accepts_scheme(directory.loc().scheme())
            && target.can_load_format(format)
        {
            return Ok(Strategy::LoadFromDirectory);
        }
    }
    if let Some(fileobjs) = source.fileobjs() {
        if target.can_move_from_fileobjs() && target.can_load_fileobjs_format(fileobjs.records_format()) {
            return Ok(Strategy::StreamFileobjs);
        }
    }
    if source.can_move_to_records_directory() && target.records_directory().is_some() {
        if let Some(format) = compatible_format(source, target, pi) {
            return Ok(Strategy::FillTargetDirectory(format));
        }
    }
    if let Some((_, format)) = source.records_directory() {
        if target.can_move_from_records_directory() && target.can_load_format(format) {
            return Ok(Strategy::LoadFromRelocatedDirectory);
        }
    }
    if source.can_produce_fileobjs() && !promoted.contains("fileobjs") {
        return Ok(Strategy::PromoteToFileobjs);
    }
    if source.can_move_to_records_directory() && target.can_move_from_temp_loc() {
        if let Some(format) = compatible_format(source, target, pi) {
            return Ok(Strategy::FillTemporaryDirectory(format));
        }
    }
    if source.can_produce_dataframes() {
        if target.can_move_from_dataframes() {
            return Ok(Strategy::ThroughDataframes);
        }
        if !promoted.contains("dataframes") && !matches!(source, Source::Dataframes(_)) {
            return Ok(Strategy::PromoteToDataframes);
        }
    }
    Err(MoverError::NoCompatibleMovePath(format!(
        "{} source to {} target",
        source.kind(),
        target.kind()
    )))
}

/// Move every record from `source` into `target`.
pub async fn move_records(cx: &MoveContext, source: Source, target: &Target) -> Result<MoveResult> {
    move_with(cx, source, target, BTreeSet::new()).await
}

fn move_with<'a>(
    cx: &'a MoveContext,
    source: Source,
    target: &'a Target,
    mut promoted: BTreeSet<&'static str>,
) -> BoxFuture<'a, Result<MoveResult>> {
    Box::pin(async move {
        let pi = cx.processing_instructions();
        let strategy = choose_strategy(&source, target, &promoted, pi)?;
        let from = source.kind();
        let to = target.kind();
        let chosen = strategy.to_string();
        info!("Moving {from} to {to}: {chosen}", from: from, to: to, chosen: chosen);
        match strategy {
            Strategy::LoadFromDirectory | Strategy::LoadFromRelocatedDirectory => {
                let Source::Directory(source) = source else {
                    return Err(MoverError::NoCompatibleMovePath(format!("{from} has no directory")));
                };
                target
                    .move_from_records_directory(cx, source.directory(), source.records_format())
                    .await
            }
            Strategy::StreamFileobjs => {
                let fileobjs = source.to_fileobjs_source().await?;
                target.move_from_fileobjs_source(cx, fileobjs).await
            }
            Strategy::FillTargetDirectory(format) => {
                let directory = target.records_directory().ok_or_else(|| {
                    MoverError::NoCompatibleMovePath(format!("{to} has no directory"))
                })?;
                target.pre_load_hook(cx).await?;
                let count = source.move_to_records_directory(cx, directory, &format).await?;
                target.post_load_hook(cx, count).await?;
                Ok(MoveResult::with_count(count).with_output_url("manifest", &directory.manifest_url()?))
            }
            Strategy::PromoteToFileobjs => {
                _ = promoted.insert("fileobjs");
                let fileobjs = source.to_fileobjs_source().await?;
                move_with(cx, Source::Fileobjs(fileobjs), target, promoted).await
            }
            Strategy::FillTemporaryDirectory(format) => {
                target.move_from_temp_loc_after_filling_it(cx, source, &format).await
            }
            Strategy::ThroughDataframes => {
                let dataframes = source.to_dataframes_source(pi).await?;
                target.move_from_dataframes_source(cx, dataframes).await
            }
            Strategy::PromoteToDataframes => {
                _ = promoted.insert("dataframes");
                let dataframes = source.to_dataframes_source(pi).await?;
                move_with(cx, Source::Dataframes(dataframes), target, promoted).await
            }
        }
    })
}
