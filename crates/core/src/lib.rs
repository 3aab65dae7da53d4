mod duration;
mod specifier;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use duration::{DEFAULT_MIN_AGE_DAYS, DurationError, MinAge};
pub use specifier::{PackageSpec, split_specifier};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Audit severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Ordinal rank used by the action table: `low` = 1 through `critical` = 4.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Moderate => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Maps an audit label onto the closed severity set.
    ///
    /// Unknown or missing labels fall back to [`Severity::Low`].
    pub fn from_label(label: Option<&str>) -> Self {
        Self::parse_label(label).unwrap_or(Self::Low)
    }

    /// Strict variant of [`Severity::from_label`]; `None` for anything unrecognized.
    pub fn parse_label(label: Option<&str>) -> Option<Self> {
        match label?.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "moderate" => Some(Self::Moderate),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical findings are the ones the `block` mode acts on.
    pub fn is_blocking(self) -> bool {
        self.ordinal() >= Self::High.ordinal()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How vulnerability findings translate into install actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Block,
    Warn,
    Off,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Warn => "warn",
            Self::Off => "off",
        }
    }
}

impl FromStr for Mode {
    type Err = PolicyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "warn" => Ok(Self::Warn),
            "off" => Ok(Self::Off),
            _ => Err(PolicyError::InvalidMode {
                value: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a batch does after one package fails to resolve or install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchErrorPolicy {
    #[default]
    Continue,
    Abort,
}

impl FromStr for BatchErrorPolicy {
    type Err = PolicyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            _ => Err(PolicyError::InvalidErrorPolicy {
                value: raw.to_string(),
            }),
        }
    }
}

/// Immutable settings for one resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub min_age: MinAge,
    pub mode: Mode,
    pub excluded: BTreeSet<String>,
    pub exact_install: bool,
    pub on_error: BatchErrorPolicy,
}

impl Policy {
    pub fn is_excluded(&self, package: &str) -> bool {
        self.excluded.contains(package)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_age: MinAge::default(),
            mode: Mode::Block,
            excluded: BTreeSet::new(),
            exact_install: false,
            on_error: BatchErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("invalid mode '{value}' (expected one of: block, warn, off)")]
    InvalidMode { value: String },
    #[error("invalid error policy '{value}' (expected one of: continue, abort)")]
    InvalidErrorPolicy { value: String },
    #[error(transparent)]
    MinAge(#[from] DurationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub version: String,
    pub published: Option<DateTime<Utc>>,
}

/// Snapshot of one package's registry document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name: String,
    pub latest: Option<String>,
    pub dist_tags: BTreeMap<String, String>,
    pub versions: BTreeMap<String, PackageVersion>,
}

impl PackageMetadata {
    pub fn published(&self, version: &str) -> Option<DateTime<Utc>> {
        self.versions.get(version).and_then(|entry| entry.published)
    }
}

/// Whole days elapsed between `published` and `now`, rounded toward negative infinity.
pub fn age_in_days(now: DateTime<Utc>, published: DateTime<Utc>) -> i64 {
    (now - published)
        .num_milliseconds()
        .div_euclid(MILLIS_PER_DAY)
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("package '{package}' was not found in {registry}")]
    NotFound {
        registry: &'static str,
        package: String,
    },
    #[error("registry request failed: {message}")]
    Transport { message: String },
    #[error("registry returned invalid data: {message}")]
    InvalidResponse { message: String },
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    fn registry(&self) -> &'static str;
    async fn fetch_package(&self, package: &str) -> Result<PackageMetadata, RegistryError>;
}
