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

//! Mirror Upgrader - unattended updates for a desktop application
//!
//! Checks a release mirror for a version newer than the one installed
//! locally, downloads the installer and runs it silently. The outcome is
//! returned as a value so the caller can write its audit record.

pub mod artifact;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod installer;
pub mod orchestrator;
pub mod probe;
pub mod version;

pub use artifact::{ArtifactResolver, ReleaseTarget};
pub use catalog::{MirrorCatalog, ReleaseSource};
pub use config::{UpgraderConfig, load_config};
pub use error::UpgraderError;
pub use orchestrator::{Stage, UpgradeDecision, UpgradeOrchestrator, UpgradeOutcome};
pub use probe::InstallationState;
pub use version::{Version, compare, is_older, max_version, parse_version};
