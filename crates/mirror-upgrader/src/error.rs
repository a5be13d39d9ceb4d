// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of mirror-upgrader.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Error types for the upgrader crate

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpgraderError {
    #[error("malformed version: {0:?}")]
    MalformedVersion(String),

    #[error("cannot select a maximum from an empty set of versions")]
    EmptySet,

    #[error("release catalog unreachable: {0}")]
    CatalogUnreachable(String),

    #[error("no version directories found at {0}")]
    NoVersionsFound(String),

    #[error("cannot read version metadata of {path}: {reason}")]
    VersionMetadataUnreadable { path: PathBuf, reason: String },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("installer artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("failed to launch installer {program}: {reason}")]
    InstallerLaunchFailed { program: String, reason: String },

    #[error("{stage} did not finish within {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UpgraderError>;
