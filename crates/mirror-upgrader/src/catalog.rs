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

//! Release discovery on the download mirror
//!
//! The orchestrator only talks to [`ReleaseSource`]. [`MirrorCatalog`] is the
//! implementation that scrapes the mirror's directory index; a structured feed
//! can be added as another implementation without touching the orchestrator.

use crate::config::UpgraderConfig;
use crate::error::{Result, UpgraderError};
use crate::version::{Version, max_version, parse_version};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"'#?]+)["']"#).expect("valid href pattern")
});

static VERSION_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+(\.\d+)?$").expect("valid version pattern"));

/// Source of published release versions
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// All published versions, in no particular order
    async fn list_versions(&self) -> Result<Vec<Version>>;

    /// Highest published version
    async fn latest_version(&self) -> Result<Version> {
        max_version(self.list_versions().await?)
    }

    /// Source name for logging
    fn name(&self) -> &str;
}

/// HTML directory index of the mirror, one directory per release
#[derive(Debug, Clone)]
pub struct MirrorCatalog {
    client: reqwest::Client,
    index_url: String,
    request_timeout: Option<Duration>,
}

impl MirrorCatalog {
    pub fn new(config: &UpgraderConfig) -> Result<Self> {
        let request_timeout = config.request_timeout_secs.map(Duration::from_secs);
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent());
        if let Some(limit) = request_timeout {
            builder = builder.timeout(limit);
        }
        let client = builder
            .build()
            .map_err(|e| UpgraderError::Config(format!("Failed to build HTTP client: {e}")))?;

        let mut catalog = Self::with_client(client, &config.mirror_base_url);
        catalog.request_timeout = request_timeout;
        Ok(catalog)
    }

    pub fn with_client(client: reqwest::Client, mirror_base_url: &str) -> Self {
        Self {
            client,
            index_url: format!("{}/", mirror_base_url.trim_end_matches('/')),
            request_timeout: None,
        }
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    /// Elapsed request limits become `Timeout`, everything else is unreachable
    fn transport_error(&self, e: &reqwest::Error, context: &str) -> UpgraderError {
        match self.request_timeout {
            Some(limit) if e.is_timeout() => UpgraderError::Timeout {
                stage: "check",
                secs: limit.as_secs(),
            },
            Some(_) | None => UpgraderError::CatalogUnreachable(format!("{context}: {e}")),
        }
    }

    async fn fetch_index(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.index_url)
            .send()
            .await
            .map_err(|e| self.transport_error(&e, &self.index_url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpgraderError::CatalogUnreachable(format!(
                "{} returned {status}",
                self.index_url
            )));
        }

        response.text().await.map_err(|e| {
            self.transport_error(&e, &format!("Failed to read index {}", self.index_url))
        })
    }
}

#[async_trait]
impl ReleaseSource for MirrorCatalog {
    async fn list_versions(&self) -> Result<Vec<Version>> {
        let body = self.fetch_index().await?;
        let versions = versions_from_index(&body);

        if versions.is_empty() {
            return Err(UpgraderError::NoVersionsFound(self.index_url.clone()));
        }

        tracing::debug!(
            "Found {} release directories at {}",
            versions.len(),
            self.index_url
        );
        Ok(versions)
    }

    fn name(&self) -> &str {
        &self.index_url
    }
}

/// Version-shaped directory names linked from an index page
pub fn versions_from_index(body: &str) -> Vec<Version> {
    HREF.captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .filter_map(|target| entry_name(target.as_str()))
        .filter(|name| VERSION_DIR.is_match(name))
        .filter_map(|name| parse_version(name).ok())
        .collect()
}

/// Last path segment of a link target, without the trailing slash
fn entry_name(target: &str) -> Option<&str> {
    target
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}
