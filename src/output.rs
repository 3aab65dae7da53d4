//! Terminal renderer for batch and audit results.

use age_guard_audit::{Action, VulnerabilityFinding};
use age_guard_core::Severity;

use crate::types::{AuditSummary, BatchReport, PackageOutcome};

/// Renders one line per requested package plus a summary line.
pub fn render_batch(report: &BatchReport, use_color: bool) -> String {
    let mut lines = report
        .outcomes
        .iter()
        .flat_map(|outcome| render_outcome(outcome, use_color))
        .collect::<Vec<_>>();

    let total = report.outcomes.len();
    let failed = report.failed();
    let summary = format!("{} of {total} package(s) succeeded", total - failed);
    lines.push(String::new());
    lines.push(if failed == 0 {
        style(&summary, "1;32", use_color)
    } else {
        style(&summary, "1;31", use_color)
    });
    lines.join("\n")
}

fn render_outcome(outcome: &PackageOutcome, use_color: bool) -> Vec<String> {
    match outcome {
        PackageOutcome::Excluded { spec, installed } => {
            let verb = if *installed { "installed" } else { "would install" };
            vec![format!(
                "{} {spec} (excluded, {verb} without checks)",
                style("skip ", "36", use_color)
            )]
        }
        PackageOutcome::Resolved { resolved } => vec![format!(
            "{} {}@{} ({} day(s) old{})",
            style("plan ", "36", use_color),
            resolved.name,
            resolved.version,
            resolved.age_days,
            latest_suffix(resolved.latest.as_deref(), &resolved.version),
        )],
        PackageOutcome::Installed {
            resolved,
            decision,
            audited,
            finding,
        } => {
            let label = match decision.action {
                Action::Warn => style("warn ", "33", use_color),
                Action::Allow | Action::Block => style("ok   ", "32", use_color),
            };
            let unaudited = if *audited { "" } else { ", not audited" };
            let mut lines = vec![format!(
                "{label} {}@{} ({} day(s) old{}{unaudited})",
                resolved.name,
                resolved.version,
                resolved.age_days,
                latest_suffix(resolved.latest.as_deref(), &resolved.version),
            )];
            if let Some(finding) = finding {
                lines.extend(render_finding_details(finding, use_color));
            }
            lines
        }
        PackageOutcome::Blocked {
            resolved,
            finding,
            uninstalled,
        } => {
            let removal = if *uninstalled {
                "uninstalled"
            } else {
                "uninstall failed, remove it manually"
            };
            let mut lines = vec![format!(
                "{} {}@{} ({} severity vulnerabilities; {removal})",
                style("block", "1;31", use_color),
                resolved.name,
                resolved.version,
                finding.highest_severity,
            )];
            lines.extend(render_finding_details(finding, use_color));
            lines
        }
        PackageOutcome::Failed {
            spec,
            stage,
            reason,
        } => vec![format!(
            "{} {spec} ({} failed: {reason})",
            style("fail ", "31", use_color),
            stage.as_str(),
        )],
        PackageOutcome::Skipped { spec } => vec![format!(
            "{} {spec} (not attempted after an earlier failure)",
            style("skip ", "2", use_color)
        )],
    }
}

/// Renders the whole-project audit, most severe package first.
pub fn render_audit(summary: &AuditSummary, use_color: bool) -> String {
    if !summary.available {
        return style("audit unavailable: npm audit produced no usable report", "33", use_color);
    }
    if summary.findings.is_empty() {
        return style("no known vulnerabilities", "32", use_color);
    }

    let reported = summary
        .findings
        .iter()
        .filter(|item| item.decision.report)
        .collect::<Vec<_>>();
    if reported.is_empty() {
        return format!(
            "{} vulnerable package(s) found; details are not reported in the current mode",
            summary.findings.len()
        );
    }

    let mut lines = Vec::new();
    for item in reported {
        let finding = &item.finding;
        let action = match item.decision.action {
            Action::Block => style("block", "1;31", use_color),
            Action::Warn => style("warn ", "33", use_color),
            Action::Allow => style("info ", "2", use_color),
        };
        let version = finding
            .version
            .as_deref()
            .map(|version| format!("@{version}"))
            .unwrap_or_default();
        lines.push(format!(
            "{action} {}{version} [{}]",
            finding.package,
            severity_label(finding.highest_severity, use_color)
        ));
        lines.extend(render_finding_details(finding, use_color));
    }

    let blocking = summary
        .findings
        .iter()
        .filter(|item| item.decision.action == Action::Block)
        .count();
    lines.push(String::new());
    lines.push(format!(
        "{} vulnerable package(s), {blocking} blocking",
        summary.findings.len()
    ));
    lines.join("\n")
}

fn render_finding_details(finding: &VulnerabilityFinding, use_color: bool) -> Vec<String> {
    finding
        .issues
        .iter()
        .map(|issue| match issue.severity {
            Some(severity) => format!(
                "      - [{}] {}",
                severity_label(severity, use_color),
                issue.describe()
            ),
            None => format!("      - {}", issue.describe()),
        })
        .collect()
}

fn latest_suffix(latest: Option<&str>, version: &str) -> String {
    match latest {
        Some(latest) if latest != version => format!(", latest is {latest}"),
        _ => String::new(),
    }
}

fn severity_label(severity: Severity, use_color: bool) -> String {
    let code = match severity {
        Severity::Critical => "1;31",
        Severity::High => "31",
        Severity::Moderate => "33",
        Severity::Low => "2",
    };
    style(severity.as_str(), code, use_color)
}

fn style(value: &str, ansi_code: &str, use_color: bool) -> String {
    if use_color {
        return format!("\x1b[{ansi_code}m{value}\x1b[0m");
    }

    value.to_string()
}

#[cfg(test)]
#[path = "tests/output.rs"]
mod tests;
