//! Policy orchestration: resolve, install, audit and enforce, one package at a time.

use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;

use age_guard_audit::{Action, VulnerabilityFinding, classify, decide, summarize};
use age_guard_core::{BatchErrorPolicy, PackageSpec, Policy, RegistryClient, RegistryError};
use age_guard_resolver::{Resolution, ResolveError, ResolvedVersion, resolve};

use crate::package_manager::{InstallRequest, NpmCli, PackageManager, PackageManagerError};
use crate::project::{MANIFEST_FILE, ProjectManifest, UpdateRequest};
use crate::types::{AuditSummary, BatchReport, ClassifiedFinding, FailureStage, PackageOutcome};

/// Per-invocation install options that are not part of the policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallFlags {
    pub dev: bool,
    pub exact: bool,
    /// Resolve only; never touch the project.
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("failed to fetch registry metadata for '{package}': {source}")]
    RegistryFetchFailed {
        package: String,
        #[source]
        source: RegistryError,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to install {target}: {source}")]
    Install {
        target: String,
        #[source]
        source: PackageManagerError,
    },
}

impl PackageError {
    fn stage(&self) -> FailureStage {
        match self {
            Self::RegistryFetchFailed { .. } => FailureStage::Fetch,
            Self::Resolve(_) => FailureStage::Resolve,
            Self::Install { .. } => FailureStage::Install,
        }
    }
}

/// Core runtime service that applies one immutable [`Policy`] to package requests.
#[derive(Clone)]
pub struct GuardService {
    policy: Arc<Policy>,
    registry: Arc<dyn RegistryClient>,
    package_manager: Arc<dyn PackageManager>,
}

impl GuardService {
    /// Creates a service backed by the public npm registry and the `npm` CLI.
    pub fn new(policy: Policy) -> Self {
        Self::with_collaborators(
            policy,
            age_guard_npm::create_client(),
            Arc::new(NpmCli::new()),
        )
    }

    pub fn with_collaborators(
        policy: Policy,
        registry: Arc<dyn RegistryClient>,
        package_manager: Arc<dyn PackageManager>,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            registry,
            package_manager,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Processes `specs` strictly in order.
    ///
    /// A failed package stops the batch only when the policy says `abort`; the
    /// remaining packages are then reported as skipped.
    pub async fn install_batch(&self, specs: &[PackageSpec], flags: InstallFlags) -> BatchReport {
        let requests = specs
            .iter()
            .cloned()
            .map(|spec| UpdateRequest {
                spec,
                dev: flags.dev,
            })
            .collect::<Vec<_>>();
        self.run_batch(&requests, flags).await
    }

    /// Re-resolves declared project dependencies through the same pipeline.
    ///
    /// Names in `only` that the manifest does not declare are reported as
    /// failures instead of being dropped.
    pub async fn update_project(
        &self,
        manifest: &ProjectManifest,
        only: &[String],
        flags: InstallFlags,
    ) -> BatchReport {
        let mut outcomes = manifest
            .undeclared(only)
            .into_iter()
            .map(|name| {
                let reason = format!("'{name}' is not declared in {MANIFEST_FILE}");
                tracing::error!("{reason}");
                PackageOutcome::Failed {
                    spec: name,
                    stage: FailureStage::Manifest,
                    reason,
                }
            })
            .collect::<Vec<_>>();
        let requests = manifest.update_requests(only);

        if !outcomes.is_empty() && self.policy.on_error == BatchErrorPolicy::Abort {
            tracing::warn!("aborting update after undeclared package names");
            outcomes.extend(requests.into_iter().map(|request| PackageOutcome::Skipped {
                spec: request.spec.raw,
            }));
            return BatchReport { outcomes };
        }

        if requests.is_empty() && outcomes.is_empty() {
            tracing::info!("nothing to update");
        }
        outcomes.extend(self.run_batch(&requests, flags).await.outcomes);
        BatchReport { outcomes }
    }

    async fn run_batch(&self, requests: &[UpdateRequest], flags: InstallFlags) -> BatchReport {
        tracing::info!(
            packages = requests.len(),
            min_age = %self.policy.min_age,
            mode = %self.policy.mode,
            "processing batch"
        );

        let mut report = BatchReport::default();
        let mut aborted = false;
        for request in requests {
            if aborted {
                report.outcomes.push(PackageOutcome::Skipped {
                    spec: request.spec.raw.clone(),
                });
                continue;
            }

            let outcome = self
                .process_one(
                    &request.spec,
                    InstallFlags {
                        dev: request.dev,
                        ..flags
                    },
                )
                .await;
            if matches!(outcome, PackageOutcome::Failed { .. })
                && self.policy.on_error == BatchErrorPolicy::Abort
            {
                tracing::warn!("aborting batch after failure of {}", request.spec);
                aborted = true;
            }
            report.outcomes.push(outcome);
        }
        report
    }

    /// Runs one specifier through split, exclusion, resolution, install and audit.
    pub async fn process_one(&self, spec: &PackageSpec, flags: InstallFlags) -> PackageOutcome {
        let exact = flags.exact || self.policy.exact_install;

        if self.policy.is_excluded(&spec.name) {
            tracing::info!("{} is excluded from policy checks; installing as requested", spec.name);
            if flags.dry_run {
                return PackageOutcome::Excluded {
                    spec: spec.raw.clone(),
                    installed: false,
                };
            }
            return match self.install(&spec.raw, flags.dev, exact).await {
                Ok(()) => PackageOutcome::Excluded {
                    spec: spec.raw.clone(),
                    installed: true,
                },
                Err(err) => failed(spec, err),
            };
        }

        let resolved = match self.resolve_spec(spec).await {
            Ok(Resolution::Resolved(resolved)) => resolved,
            Ok(Resolution::Excluded) => {
                return PackageOutcome::Excluded {
                    spec: spec.raw.clone(),
                    installed: false,
                };
            }
            Err(err) => return failed(spec, err),
        };

        tracing::info!(
            "resolved {} to {}@{} ({} day(s) old)",
            spec,
            resolved.name,
            resolved.version,
            resolved.age_days
        );

        if flags.dry_run {
            return PackageOutcome::Resolved { resolved };
        }

        let target = format!("{}@{}", resolved.name, resolved.version);
        if let Err(err) = self.install(&target, flags.dev, exact).await {
            return failed(spec, err);
        }

        self.enforce(resolved).await
    }

    /// Fetches metadata and resolves `spec` under the policy, without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError`] when the registry fetch or the resolution fails.
    pub async fn resolve_spec(&self, spec: &PackageSpec) -> Result<Resolution, PackageError> {
        if self.policy.is_excluded(&spec.name) {
            return Ok(Resolution::Excluded);
        }

        let metadata = self
            .registry
            .fetch_package(&spec.name)
            .await
            .map_err(|source| PackageError::RegistryFetchFailed {
                package: spec.name.clone(),
                source,
            })?;

        Ok(resolve(
            &spec.name,
            spec.range.as_deref(),
            &self.policy,
            &metadata,
        )?)
    }

    /// Resolves `spec` and runs the chosen version through `npx`.
    ///
    /// # Errors
    ///
    /// Returns an error when resolution fails or the runner cannot be started.
    pub async fn execute(&self, spec: &PackageSpec, args: &[String]) -> anyhow::Result<i32> {
        let target = match self.resolve_spec(spec).await? {
            Resolution::Excluded => {
                tracing::info!("{} is excluded from policy checks; running as requested", spec.name);
                spec.raw.clone()
            }
            Resolution::Resolved(resolved) => {
                tracing::info!(
                    "running {}@{} ({} day(s) old)",
                    resolved.name,
                    resolved.version,
                    resolved.age_days
                );
                format!("{}@{}", resolved.name, resolved.version)
            }
        };

        self.package_manager
            .exec(&target, args)
            .await
            .with_context(|| format!("failed to run {target}"))
    }

    /// Audits the whole project and classifies every reported package.
    pub async fn audit_project(&self) -> AuditSummary {
        let Some(report) = self.package_manager.audit().await else {
            return AuditSummary::default();
        };

        let findings = summarize(&report)
            .into_iter()
            .map(|finding| {
                let decision = decide(self.policy.mode, Some(&finding));
                ClassifiedFinding { finding, decision }
            })
            .collect::<Vec<_>>();
        if findings.is_empty() {
            tracing::info!("no known vulnerabilities reported");
        }

        AuditSummary {
            available: true,
            findings,
        }
    }

    async fn install(&self, target: &str, dev: bool, exact: bool) -> Result<(), PackageError> {
        let request = InstallRequest {
            target: target.to_string(),
            dev,
            exact,
        };
        self.package_manager
            .install(&request)
            .await
            .map_err(|source| PackageError::Install {
                target: target.to_string(),
                source,
            })
    }

    /// Audits the freshly installed version and applies the mode's action.
    async fn enforce(&self, resolved: ResolvedVersion) -> PackageOutcome {
        let Some(report) = self.package_manager.audit().await else {
            tracing::warn!(
                "audit unavailable; {}@{} was installed without a vulnerability check",
                resolved.name,
                resolved.version
            );
            return PackageOutcome::Installed {
                resolved,
                decision: decide(self.policy.mode, None),
                audited: false,
                finding: None,
            };
        };

        let finding = classify(&report, &resolved.name, Some(&resolved.version));
        let decision = decide(self.policy.mode, finding.as_ref());
        let Some(finding) = finding else {
            tracing::info!(
                "no known vulnerabilities in {}@{}",
                resolved.name,
                resolved.version
            );
            return PackageOutcome::Installed {
                resolved,
                decision,
                audited: true,
                finding: None,
            };
        };

        if decision.report {
            log_finding(&finding);
        }

        if decision.action != Action::Block {
            return PackageOutcome::Installed {
                resolved,
                decision,
                audited: true,
                finding: decision.report.then_some(finding),
            };
        }

        tracing::warn!(
            "blocking {}@{}: {} severity vulnerabilities; uninstalling",
            resolved.name,
            resolved.version,
            finding.highest_severity
        );
        let uninstalled = match self.package_manager.uninstall(&resolved.name).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("failed to uninstall {}: {err}", resolved.name);
                false
            }
        };

        PackageOutcome::Blocked {
            resolved,
            finding,
            uninstalled,
        }
    }
}

fn failed(spec: &PackageSpec, err: PackageError) -> PackageOutcome {
    tracing::error!("{spec}: {err}");
    PackageOutcome::Failed {
        spec: spec.raw.clone(),
        stage: err.stage(),
        reason: err.to_string(),
    }
}

fn log_finding(finding: &VulnerabilityFinding) {
    tracing::warn!(
        "{} has {} severity vulnerabilities",
        finding.package,
        finding.highest_severity
    );
    for issue in &finding.issues {
        tracing::warn!("  - {}", issue.describe());
    }
}

#[cfg(test)]
#[path = "tests/service.rs"]
mod tests;
