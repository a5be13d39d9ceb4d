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

//! Artifact downloader module
//!
//! Downloads stream into `<dest>.part` and are renamed over `dest` only once
//! complete, so `dest` never holds a truncated artifact.

use crate::config::UpgraderConfig;
use crate::error::{Result, UpgraderError};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// What was written to disk by a successful download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReceipt {
    pub bytes: u64,
    /// Hex SHA-256 of the artifact, recorded for forensics only
    pub sha256: String,
}

#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<DownloadReceipt>;
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// The request timeout only bounds connecting; the transfer itself is
    /// bounded by the orchestrator's download deadline
    pub fn new(config: &UpgraderConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.connect_timeout(std::time::Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| UpgraderError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn stream_to(&self, url: &str, path: &Path) -> Result<DownloadReceipt> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpgraderError::DownloadFailed(format!("Request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(UpgraderError::DownloadFailed(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        let write_failed = |e: std::io::Error| {
            UpgraderError::DownloadFailed(format!("Failed to write {}: {e}", path.display()))
        };

        let mut file = tokio::fs::File::create(path).await.map_err(write_failed)?;
        let mut hasher = Sha256::new();
        let mut bytes: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| UpgraderError::DownloadFailed(format!("Stream from {url} broke: {e}")))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(write_failed)?;
            bytes += chunk.len() as u64;
        }

        file.flush().await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;

        Ok(DownloadReceipt {
            bytes,
            sha256: format!("{:x}", hasher.finalize()),
        })
    }
}

#[async_trait]
impl ArtifactDownloader for HttpDownloader {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<DownloadReceipt> {
        let partial = partial_path(destination);
        tracing::info!("Downloading {url} to {}", destination.display());

        let receipt = match self.stream_to(url, &partial).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!("Failed to remove {}: {cleanup}", partial.display());
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, destination).await.map_err(|e| {
            UpgraderError::DownloadFailed(format!(
                "Failed to move download into {}: {e}",
                destination.display()
            ))
        })?;

        tracing::info!(
            "Download complete: {} bytes, sha256 {}",
            receipt.bytes,
            receipt.sha256
        );
        Ok(receipt)
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
