//! Configuration loading and merge logic for `age-guard`.
//!
//! Global config and project-local config are merged with project values taking
//! precedence; command-line flags override both when the [`Policy`] is built.

mod overlay;

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use age_guard_core::{BatchErrorPolicy, MinAge, Mode, Policy, PolicyError};

use self::overlay::ConfigOverlay;

/// Default vulnerability mode.
pub const DEFAULT_MODE: Mode = Mode::Block;
/// File name of the project-local config.
pub const PROJECT_CONFIG_FILE: &str = ".age-guard.json";

const DEFAULT_CONFIG_TEMPLATE: &str = r#"{
  "minAge": "7d",
  "mode": "block",
  "exclude": [],
  "exactInstall": false,
  "onError": "continue"
}
"#;

/// Merged file configuration, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct AgeGuardConfig {
    /// Minimum publication age for installable versions.
    pub min_age: MinAge,
    pub mode: Mode,
    /// Package names installed as requested, without any checks.
    pub exclude: Vec<String>,
    pub exact_install: bool,
    pub on_error: BatchErrorPolicy,
}

/// Values taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct PolicyOverrides {
    pub min_age: Option<String>,
    pub mode: Option<String>,
    pub exact: bool,
    pub fail_fast: bool,
}

impl Default for AgeGuardConfig {
    fn default() -> Self {
        Self {
            min_age: MinAge::default(),
            mode: DEFAULT_MODE,
            exclude: Vec::new(),
            exact_install: false,
            on_error: BatchErrorPolicy::default(),
        }
    }
}

impl AgeGuardConfig {
    /// Loads and merges global + project configuration from default paths.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be read, is not valid JSON, or
    /// holds an invalid duration, mode or error policy.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with_paths(global_config_path(), project_config_path())
    }

    pub(crate) fn load_with_paths(
        global: Option<PathBuf>,
        project: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(path) = global {
            config.merge_from_path(&path)?;
        }
        if let Some(path) = project {
            config.merge_from_path(&path)?;
        }
        Ok(config)
    }

    fn merge_from_path(&mut self, path: &Path) -> anyhow::Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let overlay: ConfigOverlay = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;
        self.apply_overlay(overlay)
            .with_context(|| format!("invalid config file at {}", path.display()))?;
        tracing::debug!(path = %path.display(), "merged config file");
        Ok(())
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) -> Result<(), PolicyError> {
        if let Some(value) = overlay.min_age {
            self.min_age = value.normalize()?;
        }
        if let Some(value) = overlay.mode {
            self.mode = value.parse()?;
        }
        if let Some(value) = overlay.exclude {
            append_unique(&mut self.exclude, value);
        }
        if let Some(value) = overlay.exact_install {
            self.exact_install = value;
        }
        if let Some(value) = overlay.on_error {
            self.on_error = value.parse()?;
        }
        Ok(())
    }

    /// Applies command-line overrides and freezes the result.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] for an invalid `--min-age` or `--mode` value.
    pub fn into_policy(self, overrides: &PolicyOverrides) -> Result<Policy, PolicyError> {
        let min_age = match overrides.min_age.as_deref() {
            Some(raw) => MinAge::parse(raw)?,
            None => self.min_age,
        };
        let mode = match overrides.mode.as_deref() {
            Some(raw) => raw.parse()?,
            None => self.mode,
        };
        let on_error = if overrides.fail_fast {
            BatchErrorPolicy::Abort
        } else {
            self.on_error
        };

        Ok(Policy {
            min_age,
            mode,
            excluded: self
                .exclude
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect::<BTreeSet<_>>(),
            exact_install: self.exact_install || overrides.exact,
            on_error,
        })
    }
}

/// Writes a starter project config.
///
/// # Errors
///
/// Fails when the file exists and `force` is not set, or when it cannot be written.
pub fn write_default_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write config file at {}", path.display()))
}

pub fn global_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("AGE_GUARD_CONFIG_GLOBAL_PATH") {
        return Some(PathBuf::from(explicit));
    }

    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)?;

    Some(home.join(".config").join("age-guard").join("config.json"))
}

pub fn project_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("AGE_GUARD_CONFIG_PROJECT_PATH") {
        return Some(PathBuf::from(explicit));
    }

    let cwd = env::current_dir().ok()?;
    Some(cwd.join(PROJECT_CONFIG_FILE))
}

fn append_unique(target: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        if !target.iter().any(|existing| existing == &value) {
            target.push(value);
        }
    }
}

#[cfg(test)]
#[path = "../tests/config.rs"]
mod tests;
