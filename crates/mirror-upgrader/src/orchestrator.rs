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

//! Upgrade orchestration: decide, fetch, install
//!
//! A run is an explicit [`RunState`] value advanced by [`UpgradeOrchestrator::step`]
//! until it reaches a terminal state:
//!
//! ```text
//! Idle -> Checking -> UpToDate
//!                  -> Preparing -> Downloading -> Installing -> Done
//!      (any stage) -> Failed
//! Idle{force} -> Preparing (decision gate skipped)
//! ```
//!
//! Stages run strictly one after another. Downloading and installing block
//! until they finish unless a deadline is configured; there is no
//! cancellation once they have started.
//!
//! Force mode skips only the decision gate. It re-downloads and reinstalls the
//! latest release even when the installed version is already current, which
//! makes it usable as a repair run. Forced runs carry
//! [`DecisionReason::Forced`] through to their outcome.

use crate::artifact::{ArtifactResolver, ReleaseTarget, default_run_suffix};
use crate::catalog::{MirrorCatalog, ReleaseSource};
use crate::config::UpgraderConfig;
use crate::downloader::{ArtifactDownloader, DownloadReceipt, HttpDownloader};
use crate::error::{Result, UpgraderError};
use crate::installer::{CommandInstaller, SilentInstaller};
use crate::probe::{InstallationProbe, InstallationState, LocalInstallationProbe};
use crate::version::{Version, is_older};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Check,
    Download,
    Install,
    Timeout,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Download => "download",
            Self::Install => "install",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    NotInstalled,
    UpToDate { local: Version, latest: Version },
    Outdated { local: Version, latest: Version },
    /// Decision gate skipped on request
    Forced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeDecision {
    pub required: bool,
    pub reason: DecisionReason,
}

impl UpgradeDecision {
    fn from_reason(reason: DecisionReason) -> Self {
        let required = matches!(
            reason,
            DecisionReason::Outdated { .. } | DecisionReason::Forced
        );
        Self { required, reason }
    }
}

/// Installed version before the run and release version the run aimed for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionTransition {
    pub from: Option<Version>,
    pub to: Option<Version>,
}

#[derive(Debug)]
pub enum FailureCause {
    Error(UpgraderError),
    ExitCode(i32),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::ExitCode(code) => write!(f, "installer exited with code {code}"),
        }
    }
}

/// Terminal result of a run
#[derive(Debug)]
pub enum UpgradeOutcome {
    NotNeeded(DecisionReason),
    Installed {
        previous: Option<Version>,
        target: ReleaseTarget,
        receipt: DownloadReceipt,
        /// `Outdated` for a regular upgrade, `Forced` for a repair run
        reason: DecisionReason,
    },
    Failed {
        stage: Stage,
        cause: FailureCause,
        transition: VersionTransition,
        /// Why an install was attempted; `None` if the check itself failed
        reason: Option<DecisionReason>,
    },
}

impl UpgradeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Failed { stage, .. } => Some(*stage),
            Self::NotNeeded(_) | Self::Installed { .. } => None,
        }
    }

    /// Installer exit code of a failed install, if that is why the run failed
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed {
                cause: FailureCause::ExitCode(code),
                ..
            } => Some(*code),
            Self::NotNeeded(_) | Self::Installed { .. } | Self::Failed { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&DecisionReason> {
        match self {
            Self::NotNeeded(reason) | Self::Installed { reason, .. } => Some(reason),
            Self::Failed { reason, .. } => reason.as_ref(),
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self.reason(), Some(DecisionReason::Forced))
    }

    pub fn transition(&self) -> VersionTransition {
        match self {
            Self::NotNeeded(DecisionReason::UpToDate { local, latest })
            | Self::NotNeeded(DecisionReason::Outdated { local, latest }) => VersionTransition {
                from: Some(local.clone()),
                to: Some(latest.clone()),
            },
            Self::NotNeeded(DecisionReason::NotInstalled | DecisionReason::Forced) => {
                VersionTransition::default()
            }
            Self::Installed {
                previous, target, ..
            } => VersionTransition {
                from: previous.clone(),
                to: Some(target.version.clone()),
            },
            Self::Failed { transition, .. } => transition.clone(),
        }
    }
}

/// State of a single run
#[derive(Debug)]
pub enum RunState {
    Idle {
        force: bool,
    },
    Checking,
    UpToDate(DecisionReason),
    Preparing {
        previous: Option<Version>,
        latest: Version,
        reason: DecisionReason,
    },
    Downloading {
        previous: Option<Version>,
        target: ReleaseTarget,
        reason: DecisionReason,
    },
    Installing {
        previous: Option<Version>,
        target: ReleaseTarget,
        receipt: DownloadReceipt,
        reason: DecisionReason,
    },
    Done {
        previous: Option<Version>,
        target: ReleaseTarget,
        receipt: DownloadReceipt,
        reason: DecisionReason,
    },
    Failed {
        stage: Stage,
        cause: FailureCause,
        transition: VersionTransition,
        reason: Option<DecisionReason>,
    },
}

impl RunState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "idle",
            Self::Checking => "checking",
            Self::UpToDate(_) => "up-to-date",
            Self::Preparing { .. } => "preparing",
            Self::Downloading { .. } => "downloading",
            Self::Installing { .. } => "installing",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::UpToDate(_) | Self::Done { .. } | Self::Failed { .. })
    }

    /// Outcome of a terminal state, or the state itself if the run continues
    pub fn into_outcome(self) -> std::result::Result<UpgradeOutcome, RunState> {
        match self {
            Self::UpToDate(reason) => Ok(UpgradeOutcome::NotNeeded(reason)),
            Self::Done {
                previous,
                target,
                receipt,
                reason,
            } => Ok(UpgradeOutcome::Installed {
                previous,
                target,
                receipt,
                reason,
            }),
            Self::Failed {
                stage,
                cause,
                transition,
                reason,
            } => Ok(UpgradeOutcome::Failed {
                stage,
                cause,
                transition,
                reason,
            }),
            state @ (Self::Idle { .. }
            | Self::Checking
            | Self::Preparing { .. }
            | Self::Downloading { .. }
            | Self::Installing { .. }) => Err(state),
        }
    }

    fn failed(
        stage: Stage,
        error: UpgraderError,
        transition: VersionTransition,
        reason: Option<DecisionReason>,
    ) -> Self {
        let stage = if matches!(error, UpgraderError::Timeout { .. }) {
            Stage::Timeout
        } else {
            stage
        };
        Self::Failed {
            stage,
            cause: FailureCause::Error(error),
            transition,
            reason,
        }
    }
}

struct Evaluation {
    installation: InstallationState,
    reason: DecisionReason,
    latest: Option<Version>,
}

pub struct UpgradeOrchestrator {
    source: Box<dyn ReleaseSource>,
    probe: Box<dyn InstallationProbe>,
    resolver: ArtifactResolver,
    downloader: Box<dyn ArtifactDownloader>,
    installer: Box<dyn SilentInstaller>,
    extra_install_args: Vec<String>,
    download_timeout: Option<Duration>,
    install_timeout: Option<Duration>,
}

impl fmt::Debug for UpgradeOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeOrchestrator")
            .field("source", &self.source.name())
            .field("resolver", &self.resolver)
            .field("download_timeout", &self.download_timeout)
            .field("install_timeout", &self.install_timeout)
            .finish_non_exhaustive()
    }
}

impl UpgradeOrchestrator {
    pub fn new(
        source: Box<dyn ReleaseSource>,
        probe: Box<dyn InstallationProbe>,
        resolver: ArtifactResolver,
        downloader: Box<dyn ArtifactDownloader>,
        installer: Box<dyn SilentInstaller>,
    ) -> Self {
        Self {
            source,
            probe,
            resolver,
            downloader,
            installer,
            extra_install_args: Vec::new(),
            download_timeout: None,
            install_timeout: None,
        }
    }

    /// Wire the HTTP mirror, marker probe and command installer from config
    pub fn from_config(config: &UpgraderConfig) -> Result<Self> {
        Self::from_config_with_suffix(config, &default_run_suffix())
    }

    pub fn from_config_with_suffix(config: &UpgraderConfig, run_suffix: &str) -> Result<Self> {
        config.validate()?;

        let orchestrator = Self::new(
            Box::new(MirrorCatalog::new(config)?),
            Box::new(LocalInstallationProbe::with_platform_reader(
                config.marker_path.clone(),
            )),
            ArtifactResolver::in_temp_dir(config, run_suffix),
            Box::new(HttpDownloader::new(config)?),
            Box::new(CommandInstaller::from_config(config)),
        )
        .with_timeouts(
            config.download_timeout_secs.map(Duration::from_secs),
            config.install_timeout_secs.map(Duration::from_secs),
        );

        Ok(orchestrator)
    }

    pub fn with_timeouts(mut self, download: Option<Duration>, install: Option<Duration>) -> Self {
        self.download_timeout = download;
        self.install_timeout = install;
        self
    }

    pub fn with_extra_install_args(mut self, args: Vec<String>) -> Self {
        self.extra_install_args = args;
        self
    }

    /// Probe the local install and the mirror, and decide whether to upgrade
    pub async fn decide(&self) -> Result<UpgradeDecision> {
        let evaluation = self.evaluate().await?;
        Ok(UpgradeDecision::from_reason(evaluation.reason))
    }

    pub async fn is_upgrade_needed(&self) -> Result<bool> {
        Ok(self.decide().await?.required)
    }

    /// Run the whole pipeline to a terminal outcome
    pub async fn upgrade(&self, force: bool) -> UpgradeOutcome {
        let mut state = RunState::Idle { force };
        loop {
            state = match state.into_outcome() {
                Ok(outcome) => {
                    log_outcome(&outcome);
                    return outcome;
                }
                Err(state) => {
                    let from = state.name();
                    let next = self.step(state).await;
                    debug!("Upgrade run: {from} -> {}", next.name());
                    next
                }
            };
        }
    }

    /// Advance a run by one transition; terminal states are returned unchanged
    pub async fn step(&self, state: RunState) -> RunState {
        match state {
            RunState::Idle { force: false } => RunState::Checking,
            RunState::Idle { force: true } => self.discover_forced().await,
            RunState::Checking => self.check().await,
            RunState::Preparing {
                previous,
                latest,
                reason,
            } => self.prepare(previous, &latest, reason).await,
            RunState::Downloading {
                previous,
                target,
                reason,
            } => self.download(previous, target, reason).await,
            RunState::Installing {
                previous,
                target,
                receipt,
                reason,
            } => self.install(previous, target, receipt, reason).await,
            terminal @ (RunState::UpToDate(_) | RunState::Done { .. } | RunState::Failed { .. }) => {
                terminal
            }
        }
    }

    async fn evaluate(&self) -> Result<Evaluation> {
        let installation = self.probe.probe().await?;

        let local = match installation.local_version.clone() {
            Some(local) if installation.installed => local,
            Some(_) | None => {
                info!("Application not installed, nothing to upgrade");
                return Ok(Evaluation {
                    installation,
                    reason: DecisionReason::NotInstalled,
                    latest: None,
                });
            }
        };

        let latest = self.source.latest_version().await?;
        info!("Installed {local}, latest on {} is {latest}", self.source.name());

        let reason = if is_older(&local, &latest) {
            DecisionReason::Outdated {
                local,
                latest: latest.clone(),
            }
        } else {
            DecisionReason::UpToDate {
                local,
                latest: latest.clone(),
            }
        };

        Ok(Evaluation {
            installation,
            reason,
            latest: Some(latest),
        })
    }

    async fn check(&self) -> RunState {
        let Evaluation {
            installation,
            reason,
            latest,
        } = match self.evaluate().await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                return RunState::failed(Stage::Check, e, VersionTransition::default(), None);
            }
        };

        match (reason, latest) {
            (reason @ DecisionReason::Outdated { .. }, Some(latest)) => RunState::Preparing {
                previous: installation.local_version,
                latest,
                reason,
            },
            (reason, _) => RunState::UpToDate(reason),
        }
    }

    async fn discover_forced(&self) -> RunState {
        info!("Forced upgrade requested, skipping version check");

        let previous = match self.probe.probe().await {
            Ok(installation) => installation.local_version,
            Err(e) => {
                warn!("Ignoring probe failure for forced upgrade: {e}");
                None
            }
        };

        match self.source.latest_version().await {
            Ok(latest) => RunState::Preparing {
                previous,
                latest,
                reason: DecisionReason::Forced,
            },
            Err(e) => RunState::failed(
                Stage::Check,
                e,
                VersionTransition {
                    from: previous,
                    to: None,
                },
                Some(DecisionReason::Forced),
            ),
        }
    }

    async fn prepare(
        &self,
        previous: Option<Version>,
        latest: &Version,
        reason: DecisionReason,
    ) -> RunState {
        let target = self.resolver.resolve(latest);
        info!("Upgrading to {latest} from {}", target.download_url);

        if let Some(dir) = target.local_staging_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(dir).await
        {
            let error = UpgraderError::DownloadFailed(format!(
                "Failed to create staging directory {}: {e}",
                dir.display()
            ));
            let transition = transition(previous, &target);
            return RunState::failed(Stage::Download, error, transition, Some(reason));
        }

        RunState::Downloading {
            previous,
            target,
            reason,
        }
    }

    async fn download(
        &self,
        previous: Option<Version>,
        target: ReleaseTarget,
        reason: DecisionReason,
    ) -> RunState {
        let fetch = self
            .downloader
            .fetch(&target.download_url, &target.local_staging_path);

        match with_deadline(self.download_timeout, "download", fetch).await {
            Ok(receipt) => RunState::Installing {
                previous,
                target,
                receipt,
                reason,
            },
            Err(e) => {
                let transition = transition(previous, &target);
                RunState::failed(Stage::Download, e, transition, Some(reason))
            }
        }
    }

    async fn install(
        &self,
        previous: Option<Version>,
        target: ReleaseTarget,
        receipt: DownloadReceipt,
        reason: DecisionReason,
    ) -> RunState {
        let install = self
            .installer
            .install_silently(&target.local_staging_path, &self.extra_install_args);

        match with_deadline(self.install_timeout, "install", install).await {
            Ok(result) if result.success => RunState::Done {
                previous,
                target,
                receipt,
                reason,
            },
            Ok(result) => RunState::Failed {
                stage: Stage::Install,
                cause: FailureCause::ExitCode(result.exit_code),
                transition: transition(previous, &target),
                reason: Some(reason),
            },
            Err(e) => {
                let transition = transition(previous, &target);
                RunState::failed(Stage::Install, e, transition, Some(reason))
            }
        }
    }
}

fn transition(previous: Option<Version>, target: &ReleaseTarget) -> VersionTransition {
    VersionTransition {
        from: previous,
        to: Some(target.version.clone()),
    }
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    stage: &'static str,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| UpgraderError::Timeout {
                stage,
                secs: limit.as_secs(),
            })?,
        None => work.await,
    }
}

fn log_outcome(outcome: &UpgradeOutcome) {
    match outcome {
        UpgradeOutcome::NotNeeded(reason) => info!("No upgrade needed: {reason:?}"),
        UpgradeOutcome::Installed { target, reason, .. } => {
            info!("Upgrade to {} installed ({reason:?})", target.version);
        }
        UpgradeOutcome::Failed { stage, cause, .. } => {
            error!("Upgrade failed at {stage}: {cause}");
        }
    }
}
