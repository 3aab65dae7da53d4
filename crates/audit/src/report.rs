use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditParseError {
    #[error("audit output is empty")]
    Empty,
    #[error("failed to parse audit report JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },
    #[error("audit failed ({code}): {summary}")]
    Failed { code: String, summary: String },
    #[error("audit output has no vulnerabilities section")]
    MissingVulnerabilities,
}

/// `npm audit --json` output, or any report with the same `vulnerabilities` field.
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub vulnerabilities: Vulnerabilities,
}

/// Top-level document as printed by npm; failures carry `error` instead of findings.
#[derive(Debug, Deserialize)]
struct AuditDocument {
    #[serde(default)]
    error: Option<AuditFailure>,
    #[serde(default)]
    vulnerabilities: Option<Vulnerabilities>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuditFailure {
    code: Option<String>,
    summary: Option<String>,
}

/// Reports either key findings by package name or list them flat.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Vulnerabilities {
    ByPackage(BTreeMap<String, AuditEntry>),
    Flat(Vec<AuditEntry>),
}

impl Default for Vulnerabilities {
    fn default() -> Self {
        Self::ByPackage(BTreeMap::new())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditEntry {
    pub name: Option<String>,
    pub version: Option<String>,
    pub severity: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub range: Option<String>,
    pub via: Vec<ViaEntry>,
}

/// One element of an entry's `via` list: an advisory object or the name of
/// the dependency the vulnerability arrives through.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ViaEntry {
    Advisory(ViaAdvisory),
    Package(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ViaAdvisory {
    pub name: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub severity: Option<String>,
    pub range: Option<String>,
}

impl AuditReport {
    /// Parses audit output, tolerating noise printed before the JSON document.
    pub fn from_json(raw: &str) -> Result<Self, AuditParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AuditParseError::Empty);
        }

        let document: AuditDocument = match serde_json::from_str(trimmed) {
            Ok(document) => document,
            Err(source) => {
                let Some(start) = trimmed.find('{').filter(|start| *start > 0) else {
                    return Err(AuditParseError::Json { source });
                };
                tracing::debug!("skipping {start} byte(s) of non-JSON audit output");
                serde_json::from_str(&trimmed[start..])
                    .map_err(|source| AuditParseError::Json { source })?
            }
        };

        if let Some(failure) = document.error {
            return Err(AuditParseError::Failed {
                code: failure.code.unwrap_or_else(|| "unknown".to_string()),
                summary: failure.summary.unwrap_or_default(),
            });
        }
        let vulnerabilities = document
            .vulnerabilities
            .ok_or(AuditParseError::MissingVulnerabilities)?;
        Ok(Self { vulnerabilities })
    }

    pub fn is_empty(&self) -> bool {
        match &self.vulnerabilities {
            Vulnerabilities::ByPackage(entries) => entries.is_empty(),
            Vulnerabilities::Flat(entries) => entries.is_empty(),
        }
    }
}
