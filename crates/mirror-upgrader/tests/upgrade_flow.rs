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

//! End-to-end runs against a mock mirror with the real HTTP catalog and
//! downloader.

use async_trait::async_trait;
use mirror_upgrader::artifact::ArtifactResolver;
use mirror_upgrader::catalog::MirrorCatalog;
use mirror_upgrader::downloader::HttpDownloader;
use mirror_upgrader::error::Result;
use mirror_upgrader::installer::CommandInstaller;
use mirror_upgrader::orchestrator::{DecisionReason, FailureCause};
use mirror_upgrader::probe::{LocalInstallationProbe, VersionMetadataReader};
use mirror_upgrader::{Stage, UpgradeOrchestrator, UpgradeOutcome, UpgraderConfig, UpgraderError};
use mockito::{Server, ServerGuard};
use std::path::Path;
use std::time::Duration;

const LISTING: &str = r#"<html><body><pre>
<a href="../">../</a>
<a href="7.5.9/">7.5.9/</a>
<a href="7.6.2/">7.6.2/</a>
<a href="7.6.10/">7.6.10/</a>
<a href="testing/">testing/</a>
</pre></body></html>"#;

struct StaticVersion(&'static str);

#[async_trait]
impl VersionMetadataReader for StaticVersion {
    async fn read_version(&self, _path: &Path) -> Result<String> {
        Ok(self.0.to_owned())
    }
}

struct Fixture {
    orchestrator: UpgradeOrchestrator,
    staging: tempfile::TempDir,
    _marker: tempfile::NamedTempFile,
}

fn fixture(server: &ServerGuard, installed: &'static str, installer: CommandInstaller) -> Fixture {
    let config = UpgraderConfig {
        mirror_base_url: format!("{}/libreoffice/stable", server.url()),
        ..Default::default()
    };
    let marker = tempfile::NamedTempFile::new().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let client = reqwest::Client::new();

    let orchestrator = UpgradeOrchestrator::new(
        Box::new(MirrorCatalog::with_client(client.clone(), &config.mirror_base_url)),
        Box::new(LocalInstallationProbe::new(
            marker.path(),
            Box::new(StaticVersion(installed)),
        )),
        ArtifactResolver::new(&config, staging.path().join("run-1")),
        Box::new(HttpDownloader::with_client(client)),
        Box::new(installer),
    );

    Fixture {
        orchestrator,
        staging,
        _marker: marker,
    }
}

fn shell_installer(script: &str) -> CommandInstaller {
    CommandInstaller::new(
        "sh",
        vec!["-c".to_owned(), script.to_owned(), "{artifact}".to_owned()],
    )
}

async fn mock_listing(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/libreoffice/stable/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(LISTING)
        .create_async()
        .await
}

#[cfg(unix)]
#[tokio::test]
async fn upgrade_downloads_latest_and_runs_installer() {
    let mut server = Server::new_async().await;
    let listing = mock_listing(&mut server).await;
    let artifact = server
        .mock(
            "GET",
            "/libreoffice/stable/7.6.10/win/x86_64/LibreOffice_7.6.10_Win_x86-64.msi",
        )
        .with_status(200)
        .with_body("MSI payload")
        .create_async()
        .await;

    let fx = fixture(
        &server,
        "7.6.2.1",
        shell_installer(r#"test "$(cat "$0")" = "MSI payload""#),
    );

    let outcome = fx.orchestrator.upgrade(false).await;

    let UpgradeOutcome::Installed {
        previous, target, ..
    } = outcome
    else {
        panic!("expected install, got {outcome:?}");
    };
    assert_eq!(previous.unwrap().to_string(), "7.6.2.1");
    assert_eq!(target.version.to_string(), "7.6.10");
    assert!(target.local_staging_path.starts_with(fx.staging.path()));
    listing.assert_async().await;
    artifact.assert_async().await;
}

#[cfg(unix)]
#[tokio::test]
async fn installer_failure_is_reported_with_exit_code() {
    let mut server = Server::new_async().await;
    let _listing = mock_listing(&mut server).await;
    let _artifact = server
        .mock(
            "GET",
            "/libreoffice/stable/7.6.10/win/x86_64/LibreOffice_7.6.10_Win_x86-64.msi",
        )
        .with_body("MSI payload")
        .create_async()
        .await;

    let fx = fixture(&server, "7.5.0", shell_installer("exit 43"));

    let outcome = fx.orchestrator.upgrade(false).await;

    assert_eq!(outcome.failed_stage(), Some(Stage::Install));
    assert_eq!(outcome.exit_code(), Some(43));
}

#[tokio::test]
async fn missing_artifact_fails_download_without_installing() {
    let mut server = Server::new_async().await;
    let _listing = mock_listing(&mut server).await;
    let artifact = server
        .mock(
            "GET",
            "/libreoffice/stable/7.6.10/win/x86_64/LibreOffice_7.6.10_Win_x86-64.msi",
        )
        .with_status(404)
        .create_async()
        .await;

    // Launching this would fail the install stage, so reaching it shows up.
    let fx = fixture(
        &server,
        "7.5.0",
        CommandInstaller::new("mirror-upgrader-no-such-installer", vec![]),
    );

    let outcome = fx.orchestrator.upgrade(false).await;

    assert_eq!(outcome.failed_stage(), Some(Stage::Download));
    assert!(matches!(
        outcome,
        UpgradeOutcome::Failed {
            cause: FailureCause::Error(UpgraderError::DownloadFailed(_)),
            ..
        }
    ));
    artifact.assert_async().await;
}

#[tokio::test]
async fn current_install_is_left_alone() {
    let mut server = Server::new_async().await;
    let listing = server
        .mock("GET", "/libreoffice/stable/")
        .with_body(LISTING)
        .expect(2)
        .create_async()
        .await;

    let fx = fixture(
        &server,
        "7.6.10.2",
        CommandInstaller::new("mirror-upgrader-no-such-installer", vec![]),
    );

    assert!(!fx.orchestrator.is_upgrade_needed().await.unwrap());
    let outcome = fx.orchestrator.upgrade(false).await;

    assert!(matches!(
        outcome,
        UpgradeOutcome::NotNeeded(DecisionReason::UpToDate { .. })
    ));
    listing.assert_async().await;
}

#[tokio::test]
async fn unexpected_listing_layout_fails_check() {
    let mut server = Server::new_async().await;
    let _listing = server
        .mock("GET", "/libreoffice/stable/")
        .with_body("<html><p>Mirror under maintenance</p></html>")
        .create_async()
        .await;

    let fx = fixture(
        &server,
        "7.5.0",
        CommandInstaller::new("mirror-upgrader-no-such-installer", vec![]),
    );

    let outcome = fx.orchestrator.upgrade(false).await;

    assert_eq!(outcome.failed_stage(), Some(Stage::Check));
    assert!(matches!(
        outcome,
        UpgradeOutcome::Failed {
            cause: FailureCause::Error(UpgraderError::NoVersionsFound(_)),
            ..
        }
    ));
}

#[tokio::test]
async fn silent_mirror_ends_forced_run_with_timeout() {
    // Accepts connections through the backlog but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = UpgraderConfig {
        mirror_base_url: format!("http://{}/libreoffice/stable", listener.local_addr().unwrap()),
        request_timeout_secs: Some(1),
        download_timeout_secs: Some(1),
        install_timeout_secs: Some(1),
        ..Default::default()
    };
    let orchestrator = UpgradeOrchestrator::from_config_with_suffix(&config, "run-silent").unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), orchestrator.upgrade(true))
        .await
        .expect("run should end once the request timeout elapses");

    assert_eq!(outcome.failed_stage(), Some(Stage::Timeout));
    assert!(outcome.is_forced());
    assert!(matches!(
        outcome,
        UpgradeOutcome::Failed {
            cause: FailureCause::Error(UpgraderError::Timeout { stage: "check", .. }),
            ..
        }
    ));
    drop(listener);
}
