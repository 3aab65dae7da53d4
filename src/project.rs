//! Declared dependencies of the project in the working directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use age_guard_core::PackageSpec;

pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectManifest {
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
}

/// One dependency to re-resolve during `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub spec: PackageSpec,
    pub dev: bool,
}

impl ProjectManifest {
    /// Reads `package.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing or not valid JSON.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Registry dependencies to update, optionally restricted to `only`.
    ///
    /// Dependencies declared through a protocol (`file:`, `git+…`, `npm:` aliases,
    /// `workspace:`) or as a `user/repo` shorthand are not registry ranges and
    /// are left alone.
    pub fn update_requests(&self, only: &[String]) -> Vec<UpdateRequest> {
        let runtime = self.dependencies.iter().map(|entry| (entry, false));
        let dev = self.dev_dependencies.iter().map(|entry| (entry, true));

        runtime
            .chain(dev)
            .filter(|((name, _), _)| only.is_empty() || only.iter().any(|wanted| wanted == *name))
            .filter_map(|((name, range), dev)| {
                if !is_registry_range(range) {
                    tracing::info!("skipping {name}: '{range}' is not a registry version range");
                    return None;
                }
                let range = range.trim();
                let range = (!range.is_empty()).then_some(range);
                Some(UpdateRequest {
                    spec: PackageSpec::with_range(name, range),
                    dev,
                })
            })
            .collect()
    }

    /// Names in `only` that are declared in neither dependency section.
    pub fn undeclared(&self, only: &[String]) -> Vec<String> {
        only.iter()
            .filter(|name| {
                !self.dependencies.contains_key(name.as_str())
                    && !self.dev_dependencies.contains_key(name.as_str())
            })
            .cloned()
            .collect()
    }
}

fn is_registry_range(range: &str) -> bool {
    !range.contains(':') && !range.contains('/')
}

#[cfg(test)]
#[path = "tests/project.rs"]
mod tests;
