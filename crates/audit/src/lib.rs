//! Turns audit reports into per-package findings and findings into actions.

mod report;

use age_guard_core::{Mode, Severity};
use serde::Serialize;
use std::collections::BTreeMap;

pub use report::{
    AuditEntry, AuditParseError, AuditReport, ViaAdvisory, ViaEntry, Vulnerabilities,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Dependency the vulnerability is inherited through, when the report
    /// names one instead of an advisory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

impl AuditIssue {
    pub fn describe(&self) -> String {
        match (&self.title, &self.url, &self.via) {
            (Some(title), Some(url), _) => format!("{title} ({url})"),
            (Some(title), None, _) => title.clone(),
            (None, Some(url), _) => url.clone(),
            (None, None, Some(via)) => format!("via {via}"),
            (None, None, None) => "unnamed advisory".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VulnerabilityFinding {
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Severity stated on the entry itself.
    pub severity: Severity,
    /// Maximum of `severity` and every contributing issue's severity.
    pub highest_severity: Severity,
    pub issues: Vec<AuditIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Warn,
    /// Report the findings and remove the package.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub action: Action,
    /// Whether findings are shown to the user.
    pub report: bool,
}

/// Finds the entry (or entries) for `package` and folds them into one finding.
///
/// Keyed reports are looked up by name only. Flat reports are filtered by
/// name and, when both sides carry a version, by exact version.
pub fn classify(
    report: &AuditReport,
    package: &str,
    version: Option<&str>,
) -> Option<VulnerabilityFinding> {
    match &report.vulnerabilities {
        Vulnerabilities::ByPackage(entries) => entries
            .get(package)
            .map(|entry| finding_from_entries(package, version, [entry])),
        Vulnerabilities::Flat(entries) => {
            let matching = entries
                .iter()
                .filter(|entry| entry.name.as_deref() == Some(package))
                .filter(|entry| match (entry.version.as_deref(), version) {
                    (Some(reported), Some(requested)) => reported == requested,
                    _ => true,
                })
                .collect::<Vec<_>>();
            if matching.is_empty() {
                None
            } else {
                let version = version.or_else(|| {
                    matching
                        .iter()
                        .copied()
                        .find_map(|entry| entry.version.as_deref())
                });
                Some(finding_from_entries(package, version, matching))
            }
        }
    }
}

/// Classifies every package named in a whole-tree report, most severe first.
pub fn summarize(report: &AuditReport) -> Vec<VulnerabilityFinding> {
    let mut findings = match &report.vulnerabilities {
        Vulnerabilities::ByPackage(entries) => entries
            .iter()
            .map(|(name, entry)| finding_from_entries(name, entry.version.as_deref(), [entry]))
            .collect::<Vec<_>>(),
        Vulnerabilities::Flat(entries) => {
            let mut grouped: BTreeMap<(&str, Option<&str>), Vec<&AuditEntry>> = BTreeMap::new();
            for entry in entries {
                let Some(name) = entry.name.as_deref() else {
                    tracing::debug!("ignoring audit entry without a package name");
                    continue;
                };
                grouped
                    .entry((name, entry.version.as_deref()))
                    .or_default()
                    .push(entry);
            }
            grouped
                .into_iter()
                .map(|((name, version), entries)| finding_from_entries(name, version, entries))
                .collect()
        }
    };
    findings.sort_by(|left, right| {
        right
            .highest_severity
            .cmp(&left.highest_severity)
            .then_with(|| left.package.cmp(&right.package))
    });
    findings
}

/// The action table: a pure function of the mode and the highest severity.
pub fn decide(mode: Mode, finding: Option<&VulnerabilityFinding>) -> Decision {
    let Some(finding) = finding else {
        return Decision {
            action: Action::Allow,
            report: false,
        };
    };

    let blocking = finding.highest_severity.is_blocking();
    match mode {
        Mode::Block if blocking => Decision {
            action: Action::Block,
            report: true,
        },
        Mode::Warn if blocking => Decision {
            action: Action::Warn,
            report: true,
        },
        Mode::Block | Mode::Warn => Decision {
            action: Action::Allow,
            report: true,
        },
        Mode::Off => Decision {
            action: Action::Allow,
            report: false,
        },
    }
}

fn finding_from_entries<'a>(
    package: &str,
    version: Option<&str>,
    entries: impl IntoIterator<Item = &'a AuditEntry>,
) -> VulnerabilityFinding {
    let mut severity = Severity::Low;
    let mut issues = Vec::new();

    for entry in entries {
        severity = severity.max(Severity::from_label(entry.severity.as_deref()));
        if entry.title.is_some() || entry.url.is_some() {
            issues.push(AuditIssue {
                title: entry.title.clone(),
                url: entry.url.clone(),
                severity: Severity::parse_label(entry.severity.as_deref()),
                via: None,
            });
        }
        issues.extend(entry.via.iter().map(issue_from_via));
    }

    let highest_severity = issues
        .iter()
        .filter_map(|issue| issue.severity)
        .fold(severity, Severity::max);

    VulnerabilityFinding {
        package: package.to_string(),
        version: version.map(ToOwned::to_owned),
        severity,
        highest_severity,
        issues,
    }
}

fn issue_from_via(via: &ViaEntry) -> AuditIssue {
    match via {
        ViaEntry::Advisory(advisory) => AuditIssue {
            title: advisory.title.clone(),
            url: advisory.url.clone(),
            severity: advisory
                .severity
                .as_deref()
                .map(|label| Severity::from_label(Some(label))),
            via: None,
        },
        ViaEntry::Package(name) => AuditIssue {
            title: None,
            url: None,
            severity: None,
            via: Some(name.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_report() -> AuditReport {
        AuditReport::from_json(
            r#"{"vulnerabilities": {
                "semver": {
                    "name": "semver",
                    "severity": "moderate",
                    "via": [{"title": "ReDoS", "url": "https://example.test/1", "severity": "moderate"}]
                },
                "tar": {
                    "name": "tar",
                    "severity": "moderate",
                    "via": [
                        {"title": "Arbitrary File Creation", "severity": "high"},
                        "fstream"
                    ]
                },
                "left-pad": {"name": "left-pad", "severity": "unheard-of", "via": []}
            }}"#,
        )
        .expect("valid report")
    }

    fn finding(highest: Severity) -> VulnerabilityFinding {
        VulnerabilityFinding {
            package: "demo".to_string(),
            version: Some("1.0.0".to_string()),
            severity: highest,
            highest_severity: highest,
            issues: Vec::new(),
        }
    }

    #[test]
    fn keyed_lookup_takes_max_of_entry_and_issues() {
        let finding = classify(&keyed_report(), "tar", Some("4.4.1")).expect("tar finding");
        assert_eq!(finding.severity, Severity::Moderate);
        assert_eq!(finding.highest_severity, Severity::High);
        assert_eq!(finding.version.as_deref(), Some("4.4.1"));
        assert_eq!(finding.issues.len(), 2);
        assert_eq!(finding.issues[1].describe(), "via fstream");
    }

    #[test]
    fn unknown_severity_defaults_to_low() {
        let finding = classify(&keyed_report(), "left-pad", None).expect("finding");
        assert_eq!(finding.highest_severity, Severity::Low);
    }

    #[test]
    fn missing_package_has_no_finding() {
        assert!(classify(&keyed_report(), "react", Some("18.2.0")).is_none());
        assert!(classify(&AuditReport::default(), "react", None).is_none());
    }

    #[test]
    fn flat_report_filters_by_name_and_version() {
        let report = AuditReport::from_json(
            r#"{"vulnerabilities": [
                {"name": "lodash", "version": "4.17.20", "severity": "critical", "title": "Prototype Pollution"},
                {"name": "lodash", "version": "4.17.21", "severity": "low", "title": "Other"},
                {"name": "lodash", "severity": "moderate", "title": "Any version"},
                {"name": "underscore", "version": "1.0.0", "severity": "high"}
            ]}"#,
        )
        .expect("valid report");

        let finding = classify(&report, "lodash", Some("4.17.21")).expect("finding");
        assert_eq!(finding.highest_severity, Severity::Moderate);
        assert_eq!(finding.issues.len(), 2);

        let finding = classify(&report, "lodash", Some("4.17.20")).expect("finding");
        assert_eq!(finding.highest_severity, Severity::Critical);
        assert_eq!(finding.issues[0].describe(), "Prototype Pollution");

        assert!(classify(&report, "underscore", Some("2.0.0")).is_none());
    }

    #[test]
    fn action_table_for_block_mode() {
        let critical = finding(Severity::Critical);
        let moderate = finding(Severity::Moderate);
        assert_eq!(
            decide(Mode::Block, Some(&critical)),
            Decision { action: Action::Block, report: true }
        );
        assert_eq!(
            decide(Mode::Block, Some(&finding(Severity::High))).action,
            Action::Block
        );
        assert_eq!(
            decide(Mode::Block, Some(&moderate)),
            Decision { action: Action::Allow, report: true }
        );
    }

    #[test]
    fn action_table_for_warn_mode() {
        assert_eq!(
            decide(Mode::Warn, Some(&finding(Severity::Critical))),
            Decision { action: Action::Warn, report: true }
        );
        assert_eq!(
            decide(Mode::Warn, Some(&finding(Severity::Low))),
            Decision { action: Action::Allow, report: true }
        );
    }

    #[test]
    fn action_table_for_off_mode_is_silent() {
        for severity in [Severity::Low, Severity::Critical] {
            assert_eq!(
                decide(Mode::Off, Some(&finding(severity))),
                Decision { action: Action::Allow, report: false }
            );
        }
    }

    #[test]
    fn no_finding_always_allows() {
        for mode in [Mode::Block, Mode::Warn, Mode::Off] {
            assert_eq!(
                decide(mode, None),
                Decision { action: Action::Allow, report: false }
            );
        }
    }

    #[test]
    fn summarize_orders_by_severity_then_name() {
        let findings = summarize(&keyed_report());
        let order = findings
            .iter()
            .map(|finding| finding.package.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["tar", "semver", "left-pad"]);
    }
}
