//! Picks the version to install under a minimum-age policy and an npm range.
//!
//! The age filter always runs before the range filter: a version that is too
//! new is never a candidate, so it can never be skipped over in favour of a
//! satisfying-but-too-new release.

mod range;

use age_guard_core::{MinAge, PackageMetadata, Policy, age_in_days};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;
use thiserror::Error;

pub use range::{NpmRange, RangeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVersion {
    pub name: String,
    pub version: String,
    pub age_days: i64,
    pub published: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
}

/// Result of running a request through the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The package is on the exclusion list and is installed as requested.
    Excluded,
    Resolved(ResolvedVersion),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("no version of '{package}' is at least {min_age} old")]
    NoCandidatesOldEnough { package: String, min_age: MinAge },
    #[error("no version of '{package}' matching '{range}' is at least {min_age} old")]
    NoVersionInRange {
        package: String,
        range: String,
        min_age: MinAge,
    },
    #[error("invalid version range '{range}': {message}")]
    InvalidRange { range: String, message: String },
}

impl From<RangeError> for ResolveError {
    fn from(err: RangeError) -> Self {
        Self::InvalidRange {
            range: err.range,
            message: err.message,
        }
    }
}

/// A version old enough to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub raw: &'a str,
    pub version: Version,
    pub age_days: i64,
    pub published: DateTime<Utc>,
}

/// Versions whose whole-day age meets `min_age`, in ascending semver order.
///
/// Versions without a publish time or with an unparseable version string are
/// never candidates.
pub fn candidate_set(
    metadata: &PackageMetadata,
    min_age: MinAge,
    now: DateTime<Utc>,
) -> Vec<Candidate<'_>> {
    let mut candidates = metadata
        .versions
        .iter()
        .filter_map(|(raw, entry)| {
            let Some(published) = entry.published else {
                tracing::debug!(package = %metadata.name, version = %raw, "no publish time; skipping");
                return None;
            };
            let version = match Version::parse(raw) {
                Ok(version) => version,
                Err(err) => {
                    tracing::debug!(package = %metadata.name, version = %raw, "unparseable version: {err}");
                    return None;
                }
            };
            let age_days = age_in_days(now, published);
            min_age.admits(age_days).then_some(Candidate {
                raw: raw.as_str(),
                version,
                age_days,
                published,
            })
        })
        .collect::<Vec<_>>();
    candidates.sort_by(|left, right| left.version.cmp(&right.version));
    candidates
}

/// Candidates that also satisfy `range`, in ascending semver order.
pub fn candidates_in_range<'a>(
    candidates: &[Candidate<'a>],
    range: &NpmRange,
) -> Vec<Candidate<'a>> {
    candidates
        .iter()
        .filter(|candidate| range.matches(&candidate.version))
        .cloned()
        .collect()
}

/// Resolves `package` against the current time.
pub fn resolve(
    package: &str,
    range: Option<&str>,
    policy: &Policy,
    metadata: &PackageMetadata,
) -> Result<Resolution, ResolveError> {
    resolve_at(package, range, policy, metadata, Utc::now())
}

pub fn resolve_at(
    package: &str,
    range: Option<&str>,
    policy: &Policy,
    metadata: &PackageMetadata,
    now: DateTime<Utc>,
) -> Result<Resolution, ResolveError> {
    if policy.is_excluded(package) {
        return Ok(Resolution::Excluded);
    }

    let min_age = policy.min_age;
    let candidates = candidate_set(metadata, min_age, now);
    if candidates.is_empty() {
        return Err(ResolveError::NoCandidatesOldEnough {
            package: package.to_string(),
            min_age,
        });
    }

    let chosen = match range {
        None => candidates.last().cloned(),
        Some(range) => match metadata.dist_tags.get(range) {
            Some(tagged) => candidates
                .iter()
                .find(|candidate| candidate.raw == tagged)
                .cloned(),
            None => {
                let parsed = NpmRange::parse(range)?;
                candidates_in_range(&candidates, &parsed).pop()
            }
        },
    };

    let Some(chosen) = chosen else {
        return Err(ResolveError::NoVersionInRange {
            package: package.to_string(),
            range: range.unwrap_or_default().to_string(),
            min_age,
        });
    };

    if metadata.latest.as_deref() != Some(chosen.raw) {
        tracing::debug!(
            package,
            resolved = chosen.raw,
            latest = metadata.latest.as_deref().unwrap_or("unknown"),
            "resolved version differs from dist-tags.latest"
        );
    }

    Ok(Resolution::Resolved(ResolvedVersion {
        name: package.to_string(),
        version: chosen.raw.to_string(),
        age_days: chosen.age_days,
        published: chosen.published,
        latest: metadata.latest.clone(),
    }))
}
