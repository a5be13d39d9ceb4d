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

//! Version parsing and comparison module

use crate::error::{Result, UpgraderError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Dot-separated numeric version such as `7.6.2` or `7.6.2.1`.
///
/// Missing trailing components count as zero, so `7.6` and `7.6.0` are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(Vec<u32>);

impl Version {
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// True if `self` sorts strictly before `other`
    pub fn is_older_than(&self, other: &Version) -> bool {
        self < other
    }
}

/// Parse a version string made only of digits and dots (e.g. "7.6.2")
pub fn parse_version(s: &str) -> Result<Version> {
    if s.is_empty() {
        return Err(UpgraderError::MalformedVersion(s.to_owned()));
    }

    let components = s
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(UpgraderError::MalformedVersion(s.to_owned()));
            }
            part.parse::<u32>()
                .map_err(|_| UpgraderError::MalformedVersion(s.to_owned()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Version(components))
}

/// Compare two versions, padding the shorter one with zeros
pub fn compare(a: &Version, b: &Version) -> Ordering {
    let len = a.0.len().max(b.0.len());
    (0..len)
        .map(|i| {
            let left = a.0.get(i).copied().unwrap_or(0);
            let right = b.0.get(i).copied().unwrap_or(0);
            left.cmp(&right)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Returns true if `local` is strictly older than `remote`
pub fn is_older(local: &Version, remote: &Version) -> bool {
    compare(local, remote) == Ordering::Less
}

/// Greatest version of the sequence
pub fn max_version<I>(versions: I) -> Result<Version>
where
    I: IntoIterator<Item = Version>,
{
    versions
        .into_iter()
        .reduce(|best, candidate| {
            if compare(&candidate, &best) == Ordering::Greater {
                candidate
            } else {
                best
            }
        })
        .ok_or(UpgraderError::EmptySet)
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl FromStr for Version {
    type Err = UpgraderError;

    fn from_str(s: &str) -> Result<Self> {
        parse_version(s)
    }
}

impl TryFrom<String> for Version {
    type Error = UpgraderError;

    fn try_from(value: String) -> Result<Self> {
        parse_version(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
            first = false;
        }
        Ok(())
    }
}
