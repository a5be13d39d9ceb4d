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

//! Detection of the locally installed application and its version

use crate::error::{Result, UpgraderError};
use crate::version::{Version, parse_version};
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;

// ASCII digits only, at least two components
static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u:\d)+(?:\.(?-u:\d)+)+").expect("valid version token pattern")
});

/// Result of probing the local machine once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationState {
    pub installed: bool,
    pub local_version: Option<Version>,
}

impl InstallationState {
    pub fn not_installed() -> Self {
        Self {
            installed: false,
            local_version: None,
        }
    }

    pub fn installed(version: Version) -> Self {
        Self {
            installed: true,
            local_version: Some(version),
        }
    }
}

#[async_trait]
pub trait InstallationProbe: Send + Sync {
    async fn probe(&self) -> Result<InstallationState>;
}

/// Reads the raw version text embedded in an executable
#[async_trait]
pub trait VersionMetadataReader: Send + Sync {
    async fn read_version(&self, path: &Path) -> Result<String>;
}

/// Probe that looks for a marker executable at a fixed location
pub struct LocalInstallationProbe {
    marker_path: PathBuf,
    reader: Box<dyn VersionMetadataReader>,
}

impl std::fmt::Debug for LocalInstallationProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalInstallationProbe")
            .field("marker_path", &self.marker_path)
            .finish_non_exhaustive()
    }
}

impl LocalInstallationProbe {
    pub fn new(marker_path: impl Into<PathBuf>, reader: Box<dyn VersionMetadataReader>) -> Self {
        Self {
            marker_path: marker_path.into(),
            reader,
        }
    }

    /// Probe using the platform's native way of reading file versions
    pub fn with_platform_reader(marker_path: impl Into<PathBuf>) -> Self {
        Self::new(marker_path, platform_reader())
    }
}

#[async_trait]
impl InstallationProbe for LocalInstallationProbe {
    async fn probe(&self) -> Result<InstallationState> {
        if !self.marker_path.is_file() {
            tracing::info!(
                "Marker {} not found, application not installed",
                self.marker_path.display()
            );
            return Ok(InstallationState::not_installed());
        }

        let raw = self.reader.read_version(&self.marker_path).await?;
        let version = extract_version(&raw).ok_or_else(|| {
            UpgraderError::VersionMetadataUnreadable {
                path: self.marker_path.clone(),
                reason: format!("no version in {raw:?}"),
            }
        })?;

        tracing::info!("Installed version: {version} (raw {raw:?})");
        Ok(InstallationState::installed(version))
    }
}

/// First dotted version token of `raw`, with qualifiers around it dropped
///
/// Bare numbers such as the `64` in `x64` are not version tokens.
pub fn extract_version(raw: &str) -> Option<Version> {
    VERSION_TOKEN
        .find(raw)
        .and_then(|token| parse_version(token.as_str()).ok())
}

/// Reads the Windows file-version resource through PowerShell
#[derive(Debug, Clone, Default)]
pub struct PowerShellFileVersion;

impl PowerShellFileVersion {
    fn script(path: &Path) -> String {
        let quoted = path.display().to_string().replace('\'', "''");
        format!("(Get-Item -LiteralPath '{quoted}').VersionInfo.FileVersion")
    }
}

#[async_trait]
impl VersionMetadataReader for PowerShellFileVersion {
    async fn read_version(&self, path: &Path) -> Result<String> {
        let script = Self::script(path);
        let mut command = Command::new("powershell");
        command.args([
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            script.as_str(),
        ]);
        run_for_stdout(path, &mut command).await
    }
}

/// Runs the marker with `--version` and returns what it prints
#[derive(Debug, Clone, Default)]
pub struct ExecutableVersionFlag;

#[async_trait]
impl VersionMetadataReader for ExecutableVersionFlag {
    async fn read_version(&self, path: &Path) -> Result<String> {
        let mut command = Command::new(path);
        command.arg("--version");
        run_for_stdout(path, &mut command).await
    }
}

pub fn platform_reader() -> Box<dyn VersionMetadataReader> {
    if cfg!(windows) {
        Box::new(PowerShellFileVersion)
    } else {
        Box::new(ExecutableVersionFlag)
    }
}

async fn run_for_stdout(path: &Path, command: &mut Command) -> Result<String> {
    let unreadable = |reason: String| UpgraderError::VersionMetadataUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| unreadable(format!("failed to run version query: {e}")))?;

    if !output.status.success() {
        return Err(unreadable(format!(
            "version query exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    if text.is_empty() {
        return Err(unreadable("empty version metadata".to_owned()));
    }
    Ok(text)
}
