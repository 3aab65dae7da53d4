//! Side effects on the project: npm install, uninstall, audit and npx.

use std::env;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use age_guard_audit::AuditReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// `name@version`, or the raw specifier for excluded packages.
    pub target: String,
    pub dev: bool,
    pub exact: bool,
}

impl InstallRequest {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["install".to_string(), self.target.clone()];
        if self.dev {
            args.push("--save-dev".to_string());
        }
        if self.exact {
            args.push("--save-exact".to_string());
        }
        args
    }
}

#[derive(Debug, Error)]
pub enum PackageManagerError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },
}

#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn install(&self, request: &InstallRequest) -> Result<(), PackageManagerError>;
    async fn uninstall(&self, package: &str) -> Result<(), PackageManagerError>;
    /// Runs an audit of the project; `None` when no usable report was produced.
    async fn audit(&self) -> Option<AuditReport>;
    /// Runs a package binary and returns its exit code.
    async fn exec(&self, target: &str, args: &[String]) -> Result<i32, PackageManagerError>;
}

/// Drives the `npm` and `npx` executables with argument vectors.
#[derive(Debug, Clone)]
pub struct NpmCli {
    npm: String,
    npx: String,
}

impl Default for NpmCli {
    fn default() -> Self {
        Self::new()
    }
}

impl NpmCli {
    pub fn new() -> Self {
        let (npm, npx) = if cfg!(target_os = "windows") {
            ("npm.cmd", "npx.cmd")
        } else {
            ("npm", "npx")
        };
        Self {
            npm: env::var("AGE_GUARD_NPM_BIN").unwrap_or_else(|_| npm.to_string()),
            npx: env::var("AGE_GUARD_NPX_BIN").unwrap_or_else(|_| npx.to_string()),
        }
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        let mut command = Command::new(program);
        command.args(args);
        command
    }

    async fn run(&self, program: &str, args: Vec<String>) -> Result<(), PackageManagerError> {
        let shown = display_command(program, &args);
        tracing::debug!(command = %shown, "running");
        let status = self
            .command(program, &args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| PackageManagerError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(PackageManagerError::Failed {
                command: shown,
                status: status.to_string(),
            })
        }
    }
}

#[async_trait]
impl PackageManager for NpmCli {
    async fn install(&self, request: &InstallRequest) -> Result<(), PackageManagerError> {
        self.run(&self.npm, request.args()).await
    }

    async fn uninstall(&self, package: &str) -> Result<(), PackageManagerError> {
        self.run(&self.npm, vec!["uninstall".to_string(), package.to_string()])
            .await
    }

    async fn audit(&self) -> Option<AuditReport> {
        let args = vec!["audit".to_string(), "--json".to_string()];
        let output = match self
            .command(&self.npm, &args)
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!("unable to run {}: {err}", display_command(&self.npm, &args));
                return None;
            }
        };

        // npm audit exits non-zero whenever it finds something; the report is still on stdout.
        if !output.status.success() {
            tracing::debug!(status = %output.status, "npm audit exited unsuccessfully");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match AuditReport::from_json(&stdout) {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!("could not read npm audit output: {err}");
                None
            }
        }
    }

    async fn exec(&self, target: &str, args: &[String]) -> Result<i32, PackageManagerError> {
        let mut full_args = vec!["--yes".to_string(), target.to_string()];
        full_args.extend(args.iter().cloned());
        tracing::debug!(command = %display_command(&self.npx, &full_args), "running");

        let status = self
            .command(&self.npx, &full_args)
            .status()
            .await
            .map_err(|source| PackageManagerError::Spawn {
                program: self.npx.clone(),
                source,
            })?;
        Ok(status.code().unwrap_or(1))
    }
}

fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
