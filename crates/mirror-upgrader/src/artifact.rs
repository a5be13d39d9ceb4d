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

//! Download URL and staging path derivation for a release

use crate::config::{ARCH_PLACEHOLDER, UpgraderConfig, VERSION_PLACEHOLDER};
use crate::version::Version;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Everything needed to fetch and install one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseTarget {
    pub version: Version,
    pub artifact_file_name: String,
    pub download_url: String,
    pub local_staging_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    mirror_base_url: String,
    platform_segment: String,
    arch: String,
    artifact_template: String,
    staging_dir: PathBuf,
}

impl ArtifactResolver {
    /// `staging_dir` should be unique per run so that concurrent runs never
    /// write the same file.
    pub fn new(config: &UpgraderConfig, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            mirror_base_url: config.mirror_base_url.clone(),
            platform_segment: config.platform_segment.clone(),
            arch: config.arch.clone(),
            artifact_template: config.artifact_template.clone(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Resolver staging under `<temp>/<staging_dir_name>/<run_suffix>`
    pub fn in_temp_dir(config: &UpgraderConfig, run_suffix: &str) -> Self {
        let staging_dir = std::env::temp_dir()
            .join(&config.staging_dir_name)
            .join(run_suffix);
        Self::new(config, staging_dir)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn resolve(&self, version: &Version) -> ReleaseTarget {
        let version_text = version.to_string();
        let artifact_file_name = self
            .artifact_template
            .replace(VERSION_PLACEHOLDER, &version_text)
            .replace(ARCH_PLACEHOLDER, &self.arch);

        let download_url = [
            self.mirror_base_url.as_str(),
            version_text.as_str(),
            self.platform_segment.as_str(),
            artifact_file_name.as_str(),
        ]
        .iter()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

        ReleaseTarget {
            version: version.clone(),
            local_staging_path: self.staging_dir.join(&artifact_file_name),
            artifact_file_name,
            download_url,
        }
    }
}

/// Per-process suffix for the staging directory
pub fn default_run_suffix() -> String {
    format!("run-{}", std::process::id())
}
