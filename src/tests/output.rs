use super::*;
use age_guard_audit::{AuditIssue, Decision};
use age_guard_resolver::ResolvedVersion;
use chrono::{TimeZone, Utc};

use crate::types::{ClassifiedFinding, FailureStage};

fn resolved(version: &str, latest: &str) -> ResolvedVersion {
    ResolvedVersion {
        name: "demo".to_string(),
        version: version.to_string(),
        age_days: 40,
        published: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        latest: Some(latest.to_string()),
    }
}

fn finding(severity: Severity) -> VulnerabilityFinding {
    VulnerabilityFinding {
        package: "demo".to_string(),
        version: Some("1.0.0".to_string()),
        severity,
        highest_severity: severity,
        issues: vec![AuditIssue {
            title: Some("Prototype Pollution".to_string()),
            url: Some("https://example.test/advisory".to_string()),
            severity: Some(severity),
            via: None,
        }],
    }
}

#[test]
fn batch_lists_each_outcome_and_summary() {
    let report = BatchReport {
        outcomes: vec![
            PackageOutcome::Installed {
                resolved: resolved("1.0.0", "1.1.0"),
                decision: Decision {
                    action: Action::Allow,
                    report: false,
                },
                audited: true,
                finding: None,
            },
            PackageOutcome::Failed {
                spec: "fresh".to_string(),
                stage: FailureStage::Resolve,
                reason: "no version of 'fresh' is at least 30 day(s) old".to_string(),
            },
            PackageOutcome::Skipped {
                spec: "later".to_string(),
            },
        ],
    };

    let rendered = render_batch(&report, false);
    assert!(rendered.contains("ok    demo@1.0.0 (40 day(s) old, latest is 1.1.0)"));
    assert!(rendered.contains("fail  fresh (resolve failed: no version of 'fresh'"));
    assert!(rendered.contains("skip  later"));
    assert!(rendered.ends_with("2 of 3 package(s) succeeded"));
    assert!(!rendered.contains("\x1b["));
}

#[test]
fn blocked_outcome_lists_advisories() {
    let report = BatchReport {
        outcomes: vec![PackageOutcome::Blocked {
            resolved: resolved("1.0.0", "1.0.0"),
            finding: finding(Severity::Critical),
            uninstalled: false,
        }],
    };

    let rendered = render_batch(&report, false);
    assert!(rendered.contains("block demo@1.0.0 (critical severity vulnerabilities; uninstall failed"));
    assert!(rendered.contains("[critical] Prototype Pollution (https://example.test/advisory)"));
    assert!(rendered.ends_with("0 of 1 package(s) succeeded"));
}

#[test]
fn audit_summary_marks_blocking_packages() {
    let summary = AuditSummary {
        available: true,
        findings: vec![ClassifiedFinding {
            finding: finding(Severity::High),
            decision: Decision {
                action: Action::Block,
                report: true,
            },
        }],
    };

    let rendered = render_audit(&summary, false);
    assert!(rendered.contains("block demo@1.0.0 [high]"));
    assert!(rendered.contains("Prototype Pollution"));
    assert!(rendered.ends_with("1 vulnerable package(s), 1 blocking"));
}

#[test]
fn off_mode_audit_does_not_list_packages() {
    let summary = AuditSummary {
        available: true,
        findings: vec![ClassifiedFinding {
            finding: finding(Severity::Critical),
            decision: Decision {
                action: Action::Allow,
                report: false,
            },
        }],
    };

    let rendered = render_audit(&summary, false);
    assert_eq!(
        rendered,
        "1 vulnerable package(s) found; details are not reported in the current mode"
    );
    assert!(!rendered.contains("demo"));
    assert!(!rendered.contains("critical"));
}

#[test]
fn unaudited_install_is_marked() {
    let report = BatchReport {
        outcomes: vec![PackageOutcome::Installed {
            resolved: resolved("1.0.0", "1.0.0"),
            decision: Decision {
                action: Action::Allow,
                report: false,
            },
            audited: false,
            finding: None,
        }],
    };

    assert!(render_batch(&report, false).contains("not audited"));
}

#[test]
fn audit_summary_edge_states() {
    assert_eq!(
        render_audit(
            &AuditSummary {
                available: true,
                findings: Vec::new()
            },
            false
        ),
        "no known vulnerabilities"
    );
    assert!(render_audit(&AuditSummary::default(), false).starts_with("audit unavailable"));
}

#[test]
fn color_output_includes_ansi_codes() {
    let summary = AuditSummary {
        available: true,
        findings: Vec::new(),
    };
    assert!(render_audit(&summary, true).contains("\x1b["));
}
