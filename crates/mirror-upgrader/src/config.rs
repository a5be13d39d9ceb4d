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

//! Configuration module for the upgrader
//!
//! Every value has a default matching the LibreOffice Windows x64 layout on
//! the Document Foundation mirror, so an empty `{}` file is a valid config.

use crate::error::{Result, UpgraderError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";
pub const VERSION_PLACEHOLDER: &str = "{version}";
pub const ARCH_PLACEHOLDER: &str = "{arch}";

fn default_product_name() -> String {
    "LibreOffice".to_owned()
}

fn default_mirror_base_url() -> String {
    "https://download.documentfoundation.org/libreoffice/stable".to_owned()
}

fn default_platform_segment() -> String {
    "win/x86_64".to_owned()
}

fn default_arch() -> String {
    "x86-64".to_owned()
}

fn default_artifact_template() -> String {
    "LibreOffice_{version}_Win_{arch}.msi".to_owned()
}

fn default_marker_path() -> PathBuf {
    PathBuf::from(r"C:\Program Files\LibreOffice\program\soffice.exe")
}

fn default_installer_program() -> String {
    "msiexec".to_owned()
}

fn default_installer_args() -> Vec<String> {
    ["/i", ARTIFACT_PLACEHOLDER, "/qn", "/norestart"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_staging_dir_name() -> String {
    "mirror-upgrader".to_owned()
}

#[expect(clippy::unnecessary_wraps, reason = "serde default of an optional field")]
fn default_request_timeout_secs() -> Option<u64> {
    Some(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgraderConfig {
    /// Product name, used in the HTTP user agent and log lines
    #[serde(default = "default_product_name")]
    pub product_name: String,

    /// Mirror root whose index lists one directory per release
    #[serde(default = "default_mirror_base_url")]
    pub mirror_base_url: String,

    /// Path between the version directory and the artifact (e.g. "win/x86_64")
    #[serde(default = "default_platform_segment")]
    pub platform_segment: String,

    /// Architecture suffix substituted for `{arch}` in the artifact template
    #[serde(default = "default_arch")]
    pub arch: String,

    /// Artifact file name template with `{version}` and `{arch}` placeholders
    #[serde(default = "default_artifact_template")]
    pub artifact_template: String,

    /// Installed executable whose file version is the installed version
    #[serde(default = "default_marker_path")]
    pub marker_path: PathBuf,

    /// Installer program, looked up on PATH
    #[serde(default = "default_installer_program")]
    pub installer_program: String,

    /// Silent installer arguments; `{artifact}` is replaced by the staged file
    #[serde(default = "default_installer_args")]
    pub installer_args: Vec<String>,

    /// Directory under the system temp dir used for staging downloads
    #[serde(default = "default_staging_dir_name")]
    pub staging_dir_name: String,

    /// Per-request limit for mirror index queries and download connects;
    /// `null` disables it
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: Option<u64>,

    /// Abort the download after this many seconds (unbounded if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_timeout_secs: Option<u64>,

    /// Abort the installer after this many seconds (unbounded if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_timeout_secs: Option<u64>,
}

impl Default for UpgraderConfig {
    fn default() -> Self {
        Self {
            product_name: default_product_name(),
            mirror_base_url: default_mirror_base_url(),
            platform_segment: default_platform_segment(),
            arch: default_arch(),
            artifact_template: default_artifact_template(),
            marker_path: default_marker_path(),
            installer_program: default_installer_program(),
            installer_args: default_installer_args(),
            staging_dir_name: default_staging_dir_name(),
            request_timeout_secs: default_request_timeout_secs(),
            download_timeout_secs: None,
            install_timeout_secs: None,
        }
    }
}

impl UpgraderConfig {
    pub fn user_agent(&self) -> String {
        format!(
            "mirror-upgrader/{} ({})",
            env!("CARGO_PKG_VERSION"),
            self.product_name
        )
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.mirror_base_url.starts_with("http://")
            || self.mirror_base_url.starts_with("https://"))
        {
            return Err(UpgraderError::Config(format!(
                "mirror_base_url must be an http(s) URL, got {}",
                self.mirror_base_url
            )));
        }
        if !self.artifact_template.contains(VERSION_PLACEHOLDER) {
            return Err(UpgraderError::Config(format!(
                "artifact_template must contain {VERSION_PLACEHOLDER}"
            )));
        }
        if self.installer_program.trim().is_empty() {
            return Err(UpgraderError::Config(
                "installer_program must not be empty".to_owned(),
            ));
        }
        if !self
            .installer_args
            .iter()
            .any(|arg| arg.contains(ARTIFACT_PLACEHOLDER))
        {
            return Err(UpgraderError::Config(format!(
                "installer_args must reference {ARTIFACT_PLACEHOLDER}"
            )));
        }
        if [
            self.request_timeout_secs,
            self.download_timeout_secs,
            self.install_timeout_secs,
        ]
        .contains(&Some(0))
        {
            return Err(UpgraderError::Config(
                "timeouts must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Load the config from `path`, or use the defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<UpgraderConfig> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(UpgraderError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| UpgraderError::Config(format!("Failed to parse config: {e}")))?
        }
        None => UpgraderConfig::default(),
    };

    config.validate()?;
    Ok(config)
}
