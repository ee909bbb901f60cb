//! Request - the immutable input to one pipeline run

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Platform versions offered to users. The first entry is the default.
pub const SUPPORTED_VERSIONS: &[&str] = &[
    "1.21.120", "1.20.80", "1.20.70", "1.20.60", "1.20.50", "1.20.40", "1.20.30",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid platform version '{0}': expected a dotted numeric triple such as 1.21.120")]
    InvalidVersion(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub text: String,
    pub version: semver::Version,
}

impl Request {
    pub fn new(text: impl Into<String>, version: &str) -> Result<Self, RequestError> {
        Ok(Self {
            text: text.into(),
            version: parse_version(version)?,
        })
    }

    /// Request targeting the default platform version.
    pub fn with_default_version(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            version: default_version(),
        }
    }

    /// The version as the `[major, minor, patch]` array manifests expect.
    pub fn engine_version_array(&self) -> [u64; 3] {
        [self.version.major, self.version.minor, self.version.patch]
    }

    pub fn version_tag(&self) -> String {
        self.version.to_string()
    }
}

pub fn default_version() -> semver::Version {
    semver::Version::new(1, 21, 120)
}

/// Parse a dotted numeric triple. Pre-release and build suffixes are refused.
pub fn parse_version(tag: &str) -> Result<semver::Version, RequestError> {
    let trimmed = tag.trim();
    let numeric = trimmed.split('.').count() == 3
        && trimmed
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if !numeric {
        return Err(RequestError::InvalidVersion(tag.to_string()));
    }
    semver::Version::parse(trimmed).map_err(|_| RequestError::InvalidVersion(tag.to_string()))
}
