//! CLI entrypoint: policy-checked `npm install`, `update`, `audit` and `npx`.

mod config;
mod output;
mod package_manager;
mod project;
mod service;
mod types;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use age_guard_core::PackageSpec;
use config::{AgeGuardConfig, PROJECT_CONFIG_FILE, PolicyOverrides};
use project::ProjectManifest;
use service::{GuardService, InstallFlags};

#[derive(Parser)]
#[command(
    name = "age-guard",
    version,
    about = "Install npm packages only once they are old enough, and keep vulnerable ones out"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct GlobalArgs {
    /// Minimum age of an installable version, e.g. `14`, `2w`, `1m`, `36h`
    #[arg(long, short = 'm', global = true, value_name = "DURATION")]
    min_age: Option<String>,
    /// What to do with vulnerabilities: block, warn or off
    #[arg(long, global = true)]
    mode: Option<String>,
    /// Save as a dev dependency
    #[arg(long, short = 'D', global = true)]
    dev: bool,
    /// Save the exact version instead of a range
    #[arg(long, global = true)]
    exact: bool,
    /// Stop the batch at the first failed package
    #[arg(long, global = true)]
    fail_fast: bool,
    /// Print the machine-readable report on stdout
    #[arg(long, global = true)]
    json: bool,
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve and install packages under the age policy
    #[command(visible_alias = "i")]
    Install {
        /// Package specifiers, e.g. `react`, `lodash@^4`, `@scope/pkg@latest`
        #[arg(required = true)]
        packages: Vec<String>,
        /// Resolve only; print what would be installed
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-resolve the dependencies declared in package.json
    Update {
        /// Restrict the update to these dependency names
        packages: Vec<String>,
        /// Resolve only; print what would be installed
        #[arg(long)]
        dry_run: bool,
    },
    /// Audit the installed dependency tree
    Audit,
    /// Run a package binary at the newest version old enough
    Use {
        package: String,
        /// Arguments passed through to the package binary
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Write a starter .age-guard.json in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl GlobalArgs {
    fn overrides(&self) -> PolicyOverrides {
        PolicyOverrides {
            min_age: self.min_age.clone(),
            mode: self.mode.clone(),
            exact: self.exact,
            fail_fast: self.fail_fast,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_max_level(level)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let global = cli.global;

    if let Commands::Init { force } = cli.command {
        let path = config::project_config_path()
            .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
        config::write_default_config(&path, force)?;
        println!("wrote {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let policy = AgeGuardConfig::load()?
        .into_policy(&global.overrides())
        .context("invalid policy")?;
    let service = GuardService::new(policy);
    tracing::debug!(policy = ?service.policy(), "effective policy");
    let use_color = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();

    match cli.command {
        Commands::Install { packages, dry_run } => {
            let specs = packages
                .iter()
                .map(|raw| PackageSpec::parse(raw))
                .collect::<Vec<_>>();
            let flags = InstallFlags {
                dev: global.dev,
                exact: global.exact,
                dry_run,
            };
            let report = service.install_batch(&specs, flags).await;
            print_batch(&report, global.json, use_color)?;
            Ok(exit_code(report.succeeded()))
        }
        Commands::Update { packages, dry_run } => {
            let cwd = std::env::current_dir().context("failed to read working directory")?;
            let manifest = ProjectManifest::load(&cwd)?;
            let flags = InstallFlags {
                dev: global.dev,
                exact: global.exact,
                dry_run,
            };
            let report = service.update_project(&manifest, &packages, flags).await;
            print_batch(&report, global.json, use_color)?;
            Ok(exit_code(report.succeeded()))
        }
        Commands::Audit => {
            let summary = service.audit_project().await;
            if global.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", output::render_audit(&summary, use_color));
            }
            Ok(exit_code(!summary.blocked()))
        }
        Commands::Use { package, args } => {
            let code = service.execute(&PackageSpec::parse(&package), &args).await?;
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        Commands::Init { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn print_batch(report: &types::BatchReport, json: bool, use_color: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", output::render_batch(report, use_color));
    }
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
