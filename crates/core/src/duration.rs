//! Minimum-age thresholds and the duration syntax used to express them.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default threshold applied when neither config nor flags set one.
pub const DEFAULT_MIN_AGE_DAYS: f64 = 7.0;

const DAYS_PER_WEEK: f64 = 7.0;
const DAYS_PER_MONTH: f64 = 30.0;
const HOURS_PER_DAY: f64 = 24.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration '{input}' (expected a number optionally followed by d, w, m, h or hs)")]
    InvalidFormat { input: String },
    #[error("invalid day count {value} (expected a finite, non-negative number)")]
    InvalidDays { value: String },
}

/// Canonical minimum publication age, in (possibly fractional) days.
///
/// Values only come from [`MinAge::parse`] or [`MinAge::from_days`], so a
/// `MinAge` is always normalized and never needs to be parsed again.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct MinAge(f64);

impl MinAge {
    pub const ZERO: MinAge = MinAge(0.0);

    /// Parses `30`, `30d`, `2w`, `3m`, `24h` or `24hs` (case-insensitive).
    ///
    /// Months are a flat 30 days; hours convert to fractional days.
    pub fn parse(input: &str) -> Result<Self, DurationError> {
        let invalid = || DurationError::InvalidFormat {
            input: input.to_string(),
        };

        let trimmed = input.trim();
        let digits_end = trimmed
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(trimmed.len());
        if digits_end == 0 {
            return Err(invalid());
        }

        let (digits, unit) = trimmed.split_at(digits_end);
        let value = digits.parse::<u64>().map_err(|_| invalid())? as f64;

        let days = match unit.to_ascii_lowercase().as_str() {
            "" | "d" => value,
            "w" => value * DAYS_PER_WEEK,
            "m" => value * DAYS_PER_MONTH,
            "h" | "hs" => value / HOURS_PER_DAY,
            _ => return Err(invalid()),
        };

        Ok(Self(days))
    }

    /// Accepts a day count that is already canonical.
    pub fn from_days(days: f64) -> Result<Self, DurationError> {
        if days.is_finite() && days >= 0.0 {
            Ok(Self(days))
        } else {
            Err(DurationError::InvalidDays {
                value: days.to_string(),
            })
        }
    }

    pub fn days(self) -> f64 {
        self.0
    }

    /// Whether a version of the given whole-day age satisfies this threshold.
    pub fn admits(self, age_days: i64) -> bool {
        age_days as f64 >= self.0
    }
}

impl Default for MinAge {
    fn default() -> Self {
        Self(DEFAULT_MIN_AGE_DAYS)
    }
}

impl FromStr for MinAge {
    type Err = DurationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Display for MinAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{} day(s)", self.0 as u64)
        } else {
            write!(f, "{:.2} day(s)", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(input: &str) -> f64 {
        MinAge::parse(input).expect("valid duration").days()
    }

    #[test]
    fn bare_numbers_and_day_suffix_are_days() {
        assert_eq!(days("30"), 30.0);
        assert_eq!(days("30d"), 30.0);
        assert_eq!(days("0"), 0.0);
    }

    #[test]
    fn weeks_and_months_scale_to_days() {
        assert_eq!(days("2w"), 14.0);
        assert_eq!(days("3m"), 90.0);
    }

    #[test]
    fn hours_become_fractional_days() {
        assert_eq!(days("24h"), 1.0);
        assert_eq!(days("24hs"), 1.0);
        assert_eq!(days("12h"), 0.5);
    }

    #[test]
    fn units_are_case_insensitive() {
        assert_eq!(days("2W"), 14.0);
        assert_eq!(days("48HS"), 2.0);
        assert_eq!(days(" 5D "), 5.0);
    }

    #[test]
    fn rejects_unknown_units_and_non_numeric_input() {
        for input in ["", "abc", "1y", "w", "-3", "1.5d", "3 d", "2ww", "d7"] {
            let err = MinAge::parse(input).expect_err(input);
            assert!(matches!(err, DurationError::InvalidFormat { .. }), "{input}");
        }
    }

    #[test]
    fn from_days_keeps_canonical_values_unchanged() {
        let parsed = MinAge::parse("36h").expect("valid duration");
        let renormalized = MinAge::from_days(parsed.days()).expect("canonical");
        assert_eq!(parsed, renormalized);
    }

    #[test]
    fn from_days_rejects_negative_and_non_finite() {
        assert!(MinAge::from_days(-1.0).is_err());
        assert!(MinAge::from_days(f64::NAN).is_err());
        assert!(MinAge::from_days(f64::INFINITY).is_err());
    }

    #[test]
    fn admits_compares_whole_day_age_against_threshold() {
        let threshold = MinAge::parse("36h").expect("valid duration");
        assert!(!threshold.admits(1));
        assert!(threshold.admits(2));
        assert!(MinAge::ZERO.admits(0));
    }

    #[test]
    fn display_rounds_fractional_days() {
        assert_eq!(MinAge::parse("2w").unwrap().to_string(), "14 day(s)");
        assert_eq!(MinAge::parse("12h").unwrap().to_string(), "0.50 day(s)");
    }
}
