use serde::Serialize;

use age_guard_audit::{Decision, VulnerabilityFinding};
use age_guard_resolver::ResolvedVersion;

/// Where a package's processing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// Named on the command line but not declared in package.json.
    Manifest,
    Fetch,
    Resolve,
    Install,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manifest => "manifest",
            Self::Fetch => "fetch",
            Self::Resolve => "resolve",
            Self::Install => "install",
        }
    }
}

/// Final state of one requested package.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PackageOutcome {
    /// On the exclusion list; installed as given with no checks.
    Excluded { spec: String, installed: bool },
    /// Resolved only (`--dry-run`).
    Resolved { resolved: ResolvedVersion },
    Installed {
        resolved: ResolvedVersion,
        decision: Decision,
        /// False when npm produced no usable audit report for the install.
        audited: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        finding: Option<VulnerabilityFinding>,
    },
    /// Installed, then removed because of a blocking vulnerability.
    Blocked {
        resolved: ResolvedVersion,
        finding: VulnerabilityFinding,
        uninstalled: bool,
    },
    Failed {
        spec: String,
        stage: FailureStage,
        reason: String,
    },
    /// Not attempted because an earlier package failed and the batch aborted.
    Skipped { spec: String },
}

impl PackageOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Blocked { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<PackageOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        !self.outcomes.iter().any(PackageOutcome::is_failure)
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_failure())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedFinding {
    pub finding: VulnerabilityFinding,
    pub decision: Decision,
}

/// Result of the whole-project `audit` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditSummary {
    /// False when the audit could not be run or its output not parsed.
    pub available: bool,
    pub findings: Vec<ClassifiedFinding>,
}

impl AuditSummary {
    pub fn blocked(&self) -> bool {
        self.findings
            .iter()
            .any(|item| item.decision.action == age_guard_audit::Action::Block)
    }
}
