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

//! Completion record written once per run
//!
//! The orchestrator only produces values; where the line ends up is the
//! caller's choice. [`append_record`] is the append-only file sink used by the
//! bundled binary.

use crate::error::Result;
use crate::orchestrator::{DecisionReason, FailureCause, Stage, UpgradeDecision, UpgradeOutcome};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    Check,
    Upgrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    NotInstalled,
    UpToDate,
    UpgradeAvailable,
    Installed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub result: AuditResult,
    pub from_version: Option<Version>,
    pub to_version: Option<Version>,
    pub host: String,
    /// Set for `--force` repair runs that skipped the version check
    pub forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_sha256: Option<String>,
}

impl AuditRecord {
    fn base(action: ActionKind, result: AuditResult, host: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            result,
            from_version: None,
            to_version: None,
            host: host.to_owned(),
            forced: false,
            stage: None,
            exit_code: None,
            detail: None,
            artifact_sha256: None,
        }
    }

    pub fn for_upgrade(outcome: &UpgradeOutcome, host: &str) -> Self {
        let transition = outcome.transition();
        let mut record = match outcome {
            UpgradeOutcome::NotNeeded(reason) => {
                Self::base(ActionKind::Upgrade, result_for_reason(reason), host)
            }
            UpgradeOutcome::Installed { receipt, .. } => {
                let mut record = Self::base(ActionKind::Upgrade, AuditResult::Installed, host);
                record.artifact_sha256 = Some(receipt.sha256.clone());
                record
            }
            UpgradeOutcome::Failed { stage, cause, .. } => {
                let mut record = Self::base(ActionKind::Upgrade, AuditResult::Failed, host);
                record.stage = Some(*stage);
                record.detail = Some(cause.to_string());
                if let FailureCause::ExitCode(code) = cause {
                    record.exit_code = Some(*code);
                }
                record
            }
        };
        record.from_version = transition.from;
        record.to_version = transition.to;
        record.forced = outcome.is_forced();
        record
    }

    pub fn for_check(decision: &Result<UpgradeDecision>, host: &str) -> Self {
        match decision {
            Ok(decision) => {
                let mut record =
                    Self::base(ActionKind::Check, result_for_reason(&decision.reason), host);
                if let DecisionReason::UpToDate { local, latest }
                | DecisionReason::Outdated { local, latest } = &decision.reason
                {
                    record.from_version = Some(local.clone());
                    record.to_version = Some(latest.clone());
                }
                record
            }
            Err(e) => {
                let mut record = Self::base(ActionKind::Check, AuditResult::Failed, host);
                record.stage = Some(Stage::Check);
                record.detail = Some(e.to_string());
                record
            }
        }
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn result_for_reason(reason: &DecisionReason) -> AuditResult {
    match reason {
        DecisionReason::NotInstalled => AuditResult::NotInstalled,
        DecisionReason::UpToDate { .. } => AuditResult::UpToDate,
        DecisionReason::Outdated { .. } | DecisionReason::Forced => AuditResult::UpgradeAvailable,
    }
}

/// Host name of this machine, or "unknown" if it cannot be read
pub fn host_identifier() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to read host name: {e}");
            "unknown".to_owned()
        })
}

/// Append `record` as one JSON line, creating the file if needed
///
/// The line and its newline go out in a single write so concurrent runs
/// sharing a log never interleave within a line.
pub fn append_record(path: &Path, record: &AuditRecord) -> Result<()> {
    let line = format!("{}\n", record.to_line()?);
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
