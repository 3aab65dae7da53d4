//! npm range syntax on top of `semver::VersionReq`.
//!
//! `VersionReq` understands comma-separated comparators with Cargo defaults,
//! so npm ranges are rewritten first: `||` becomes a list of requirements,
//! whitespace-separated comparators are joined with commas, hyphen ranges
//! become `>=lo, <=hi`, wildcard components are dropped and operator-less
//! versions become `=` (exact for full versions, `x`-ranges for partial ones).

use semver::{Version, VersionReq};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeError {
    pub range: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct NpmRange {
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    pub fn parse(raw: &str) -> Result<Self, RangeError> {
        let alternatives = raw
            .split("||")
            .map(|alternative| parse_alternative(alternative.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| RangeError {
                range: raw.to_string(),
                message,
            })?;
        Ok(Self { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

fn parse_alternative(alternative: &str) -> Result<VersionReq, String> {
    let comparators = if let Some((low, high)) = alternative.split_once(" - ") {
        let mut comparators = Vec::new();
        comparators.extend(normalize_comparator(">=", low.trim()));
        comparators.extend(normalize_comparator("<=", high.trim()));
        comparators
    } else {
        join_operator_tokens(alternative)
            .into_iter()
            .filter_map(|token| {
                let (op, version) = split_operator(&token);
                normalize_comparator(op, version)
            })
            .collect()
    };

    if comparators.is_empty() {
        return Ok(VersionReq::STAR);
    }

    let joined = comparators.join(", ");
    VersionReq::parse(&joined).map_err(|err| format!("{err} (from '{joined}')"))
}

/// Re-attaches operators written with a space before the version (`>= 1.2.0`).
fn join_operator_tokens(alternative: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in alternative.split_whitespace() {
        if is_bare_operator(token) {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{op}{token}")),
            None => tokens.push(token.to_string()),
        }
    }
    if let Some(op) = pending_op {
        tokens.push(op.to_string());
    }
    tokens
}

fn is_bare_operator(token: &str) -> bool {
    matches!(token, ">=" | "<=" | ">" | "<" | "=" | "^" | "~" | "~>")
}

fn split_operator(token: &str) -> (&str, &str) {
    for op in ["~>", ">=", "<=", ">", "<", "=", "^", "~"] {
        if let Some(rest) = token.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("", token)
}

/// Returns `None` when the comparator matches every version.
fn normalize_comparator(op: &str, version: &str) -> Option<String> {
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    let version = strip_wildcards(version);

    if version.is_empty() {
        return None;
    }

    let op = match op {
        "" => "=",
        "~>" => "~",
        other => other,
    };
    Some(format!("{op}{version}"))
}

/// Drops `x`, `X` and `*` components (and anything after them).
fn strip_wildcards(version: &str) -> String {
    let (core, suffix) = match version.find(['-', '+']) {
        Some(index) => version.split_at(index),
        None => (version, ""),
    };

    let mut parts = Vec::new();
    for part in core.split('.') {
        if matches!(part, "x" | "X" | "*" | "") {
            return parts.join(".");
        }
        parts.push(part);
    }

    format!("{}{}", parts.join("."), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(range: &str, version: &str) -> bool {
        NpmRange::parse(range)
            .expect("valid range")
            .matches(&Version::parse(version).expect("valid version"))
    }

    #[test]
    fn caret_and_tilde_follow_npm_semantics() {
        assert!(matches("^1.1.0", "1.9.0"));
        assert!(!matches("^1.1.0", "2.0.0"));
        assert!(!matches("^1.1.0", "1.0.0"));
        assert!(matches("~1.2.0", "1.2.9"));
        assert!(!matches("~1.2.0", "1.3.0"));
        assert!(matches("^0.2.3", "0.2.9"));
        assert!(!matches("^0.2.3", "0.3.0"));
    }

    #[test]
    fn bare_full_version_is_exact() {
        assert!(matches("1.2.3", "1.2.3"));
        assert!(!matches("1.2.3", "1.2.4"));
        assert!(matches("v1.2.3", "1.2.3"));
    }

    #[test]
    fn bare_partial_versions_are_x_ranges() {
        assert!(matches("2", "2.5.1"));
        assert!(!matches("2", "3.0.0"));
        assert!(matches("1.2", "1.2.7"));
        assert!(!matches("1.2", "1.3.0"));
        assert!(matches("1.x", "1.8.0"));
        assert!(matches("1.2.*", "1.2.0"));
    }

    #[test]
    fn wildcards_and_empty_match_everything() {
        for range in ["*", "x", "X", ""] {
            assert!(matches(range, "0.0.1"), "{range}");
            assert!(matches(range, "99.1.0"), "{range}");
        }
    }

    #[test]
    fn whitespace_separated_comparators_are_intersected() {
        assert!(matches(">=1.2.0 <2.0.0", "1.5.0"));
        assert!(!matches(">=1.2.0 <2.0.0", "2.0.0"));
        assert!(matches(">= 1.2.0 < 2", "1.9.9"));
    }

    #[test]
    fn alternatives_are_unioned() {
        assert!(matches("^1.0.0 || ^3.0.0", "3.1.0"));
        assert!(matches("^1.0.0 || ^3.0.0", "1.4.0"));
        assert!(!matches("^1.0.0 || ^3.0.0", "2.0.0"));
    }

    #[test]
    fn hyphen_ranges_are_inclusive() {
        assert!(matches("1.2.3 - 2.3.4", "1.2.3"));
        assert!(matches("1.2.3 - 2.3.4", "2.3.4"));
        assert!(!matches("1.2.3 - 2.3.4", "2.3.5"));
        assert!(matches("1.2 - 2.3", "2.3.9"));
    }

    #[test]
    fn prereleases_only_match_same_tuple() {
        assert!(matches(">=1.0.0-beta.1", "1.0.0-beta.2"));
        assert!(!matches(">=1.0.0-beta.1", "1.1.0-beta.1"));
        assert!(!matches("^1.0.0", "1.2.0-rc.1"));
    }

    #[test]
    fn rejects_garbage() {
        let err = NpmRange::parse("not-a-range").expect_err("invalid range");
        assert_eq!(err.range, "not-a-range");
        assert!(!err.message.is_empty());
    }
}
