use serde::Deserialize;

use age_guard_core::{DurationError, MinAge};

/// One config file as written on disk; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct ConfigOverlay {
    pub min_age: Option<RawMinAge>,
    pub mode: Option<String>,
    pub exclude: Option<Vec<String>>,
    pub exact_install: Option<bool>,
    pub on_error: Option<String>,
}

/// `minAge` as written: a number of days, or a duration string such as `"2w"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(super) enum RawMinAge {
    Days(f64),
    Duration(String),
}

impl RawMinAge {
    pub fn normalize(&self) -> Result<MinAge, DurationError> {
        match self {
            Self::Days(days) => MinAge::from_days(*days),
            Self::Duration(raw) => MinAge::parse(raw),
        }
    }
}
