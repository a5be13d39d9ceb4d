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

//! Silent installer invocation

use crate::config::{ARTIFACT_PLACEHOLDER, UpgraderConfig};
use crate::error::{Result, UpgraderError};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tokio::process::Command;

/// Exit status of an installer run
///
/// A non-zero code is a normal result, not an error: the caller decides what
/// to do with it. MSI reports e.g. 1603 for a fatal install error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub exit_code: i32,
}

impl InstallResult {
    pub fn from_code(exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            exit_code,
        }
    }
}

#[async_trait]
pub trait SilentInstaller: Send + Sync {
    async fn install_silently(&self, artifact: &Path, extra_args: &[String])
    -> Result<InstallResult>;
}

/// Runs an installer program with a fixed argument template
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &UpgraderConfig) -> Self {
        Self::new(config.installer_program.clone(), config.installer_args.clone())
    }

    fn command_args(&self, artifact: &Path, extra_args: &[String]) -> Vec<String> {
        let artifact = artifact.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(ARTIFACT_PLACEHOLDER, &artifact))
            .chain(extra_args.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl SilentInstaller for CommandInstaller {
    async fn install_silently(
        &self,
        artifact: &Path,
        extra_args: &[String],
    ) -> Result<InstallResult> {
        if !artifact.is_file() {
            return Err(UpgraderError::ArtifactMissing(artifact.to_path_buf()));
        }

        let args = self.command_args(artifact, extra_args);
        tracing::info!("Running installer: {} {}", self.program, args.join(" "));

        let status = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| UpgraderError::InstallerLaunchFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let exit_code = status.code().unwrap_or_else(|| {
            tracing::warn!("Installer terminated without an exit code: {status}");
            -1
        });

        let result = InstallResult::from_code(exit_code);
        if result.success {
            tracing::info!("Installer finished successfully");
        } else {
            tracing::warn!("Installer exited with code {exit_code}");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandInstaller {
        CommandInstaller::new(
            "sh",
            vec!["-c".to_owned(), script.to_owned(), ARTIFACT_PLACEHOLDER.to_owned()],
        )
    }

    #[test]
    fn test_default_msiexec_arguments() {
        let installer = CommandInstaller::from_config(&UpgraderConfig::default());
        let args = installer.command_args(Path::new(r"C:\Temp\lo.msi"), &["ALLUSERS=1".to_owned()]);

        assert_eq!(installer.program, "msiexec");
        assert_eq!(args, vec!["/i", r"C:\Temp\lo.msi", "/qn", "/norestart", "ALLUSERS=1"]);
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let result = sh("exit 0")
            .install_silently(&dir.path().join("absent.msi"), &[])
            .await;

        assert!(matches!(result, Err(UpgraderError::ArtifactMissing(_))));
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let artifact = tempfile::NamedTempFile::new().unwrap();
        let installer = CommandInstaller::new("mirror-upgrader-no-such-installer", vec![]);

        let result = installer.install_silently(artifact.path(), &[]).await;

        assert!(matches!(
            result,
            Err(UpgraderError::InstallerLaunchFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_receives_artifact_path() {
        let artifact = tempfile::NamedTempFile::new().unwrap();

        let result = sh(r#"test -f "$0""#)
            .install_silently(artifact.path(), &[])
            .await
            .unwrap();

        assert_eq!(result, InstallResult { success: true, exit_code: 0 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_returned() {
        let artifact = tempfile::NamedTempFile::new().unwrap();

        let result = sh("exit 3")
            .install_silently(artifact.path(), &[])
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extra_args_are_appended() {
        let artifact = tempfile::NamedTempFile::new().unwrap();

        let result = sh("exit $#")
            .install_silently(artifact.path(), &["A=1".to_owned(), "B=2".to_owned()])
            .await
            .unwrap();

        assert_eq!(result.exit_code, 2);
    }
}
