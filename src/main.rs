// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use moodle_hooks::{
    hooks::RelocationOutcome,
    path::working_dir,
    scaffold::write_config_template,
    theme::{relink, THEME_SOURCE_DIR},
    InstallTarget, Manifest, Operation, Orchestrator, Package, SystemRunner,
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  moodle-hooks [options] <trigger>\n  moodle-hooks [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Root directory to run from instead of the current directory.
    #[arg(short = 'C', long, global = true, value_name = "path")]
    pub working_dir: Option<PathBuf>,

    /// Host manifest to read, relative to root directory.
    #[arg(
        short,
        long,
        global = true,
        value_name = "path",
        default_value = "composer.json"
    )]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let root = match &self.working_dir {
            Some(path) => working_dir()?.join(path),
            None => working_dir()?,
        };
        let manifest = Manifest::load(root.join(&self.manifest))?;
        let target = InstallTarget::resolve(root, &manifest.extra);
        let hooks = Orchestrator::new(target, manifest, SystemRunner);

        match self.command {
            Command::PreInstall => run_pre_install(&hooks),
            Command::PostInstall => run_post_install(&hooks),
            Command::PreUpdate => run_pre_update(&hooks),
            Command::PostUpdate => run_post_update(&hooks),
            Command::PrePackageUpdate(opts) => run_pre_package_update(&hooks, opts),
            Command::PostPackage(opts) => run_post_package(&hooks, opts),
            Command::LinkThemes => run_link_themes(&hooks),
            Command::ClearCache => run_clear_cache(&hooks),
            Command::Maintenance(opts) => run_maintenance(&hooks, opts),
            Command::ScaffoldConfig(opts) => run_scaffold_config(&hooks, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Refuse to install over a completed Moodle install.
    PreInstall,

    /// Move vendored Moodle into install directory.
    PostInstall,

    /// Save install directory config.php back into root directory.
    PreUpdate,

    /// Reinstall Moodle on upgrade, then refresh config.php and caches.
    PostUpdate,

    /// Announce package about to be updated.
    #[command(override_usage = "moodle-hooks pre-package-update <operation> [options]")]
    PrePackageUpdate(PackageOptions),

    /// Move plugin package into install directory.
    #[command(override_usage = "moodle-hooks post-package <operation> [options]")]
    PostPackage(PackageOptions),

    /// Symlink custom themes into install directory.
    LinkThemes,

    /// Purge Moodle caches.
    ClearCache,

    /// Turn Moodle maintenance mode on or off.
    #[command(override_usage = "moodle-hooks maintenance <mode>")]
    Maintenance(MaintenanceOptions),

    /// Write environment driven config.php into root directory.
    ScaffoldConfig(ScaffoldOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PackageOptions {
    #[command(subcommand)]
    pub operation: OperationCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum OperationCommand {
    /// Package was installed.
    Install(PackageArgs),

    /// Package was updated.
    Update(UpdateArgs),

    /// Package was removed.
    Uninstall(PackageArgs),
}

impl OperationCommand {
    fn into_operation(self) -> Operation {
        match self {
            Self::Install(args) => Operation::Install(args.into_package()),
            Self::Update(args) => {
                let to = args.target.into_package();
                let from_name = args.from.unwrap_or_else(|| to.name.clone());
                let from = Package::new(from_name, to.kind.clone(), to.install_path.clone());
                Operation::Update { from, to }
            }
            Self::Uninstall(args) => Operation::Uninstall(args.into_package()),
        }
    }
}

#[derive(Parser, Clone, Debug)]
struct PackageArgs {
    /// Full name of package.
    #[arg(required = true, value_name = "vendor/name")]
    pub name: String,

    /// Declared type of package.
    #[arg(short = 't', long = "type", value_name = "type", default_value = "library")]
    pub kind: String,

    /// Install path of package, relative to root directory.
    #[arg(short, long, value_name = "path")]
    pub path: PathBuf,
}

impl PackageArgs {
    fn into_package(self) -> Package {
        Package::new(self.name, self.kind, self.path)
    }
}

#[derive(Parser, Clone, Debug)]
struct UpdateArgs {
    #[command(flatten)]
    pub target: PackageArgs,

    /// Package name before the update, if it changed.
    #[arg(long, value_name = "vendor/name")]
    pub from: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MaintenanceOptions {
    /// Whether maintenance mode should be on or off.
    #[arg(value_enum, value_name = "mode")]
    pub mode: MaintenanceMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MaintenanceMode {
    Enable,
    Disable,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ScaffoldOptions {
    /// Overwrite existing config.php.
    #[arg(short, long)]
    pub force: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_pre_install(hooks: &Orchestrator) -> Result<()> {
    hooks.pre_install()?;
    Ok(())
}

fn run_post_install(hooks: &Orchestrator) -> Result<()> {
    hooks.post_install()?;
    Ok(())
}

fn run_pre_update(hooks: &Orchestrator) -> Result<()> {
    hooks.pre_update();
    Ok(())
}

fn run_post_update(hooks: &Orchestrator) -> Result<()> {
    let report = hooks.post_update()?;
    info!("post-update finished: {:?}", report.action);
    Ok(())
}

fn run_pre_package_update(hooks: &Orchestrator, opts: PackageOptions) -> Result<()> {
    hooks.pre_package_update(&opts.operation.into_operation());
    Ok(())
}

fn run_post_package(hooks: &Orchestrator, opts: PackageOptions) -> Result<()> {
    let report = hooks.post_package(&opts.operation.into_operation());
    if let RelocationOutcome::Relocated { relocation, .. } = report.relocation {
        info!("{} now lives in {:?}", relocation.package, relocation.new_path.display());
    }

    Ok(())
}

fn run_link_themes(hooks: &Orchestrator) -> Result<()> {
    let target = hooks.target();
    relink(target.root_dir().join(THEME_SOURCE_DIR), target.theme_dir())?;
    Ok(())
}

fn run_clear_cache(hooks: &Orchestrator) -> Result<()> {
    if let Some(status) = hooks.clear_cache()? {
        if !status.success() {
            bail!("cache purge failed with {status}");
        }
    }

    Ok(())
}

fn run_maintenance(hooks: &Orchestrator, opts: MaintenanceOptions) -> Result<()> {
    let status = hooks.set_maintenance(opts.mode == MaintenanceMode::Enable)?;
    if !status.success() {
        bail!("maintenance toggle failed with {status}");
    }

    Ok(())
}

fn run_scaffold_config(hooks: &Orchestrator, opts: ScaffoldOptions) -> Result<()> {
    write_config_template(hooks.target().root_dir(), opts.force)?;
    Ok(())
}
