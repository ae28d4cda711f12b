// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Lifecycle hook orchestration.
//!
//! The host dependency manager fires a __lifecycle trigger__ at fixed points
//! of every install or update run. Each trigger maps onto one method of
//! [`Orchestrator`]:
//!
//! | Trigger              | Method                                  |
//! |----------------------|-----------------------------------------|
//! | `pre-install`        | [`Orchestrator::pre_install`]           |
//! | `post-install`       | [`Orchestrator::post_install`]          |
//! | `pre-update`         | [`Orchestrator::pre_update`]            |
//! | `post-update`        | [`Orchestrator::post_update`]           |
//! | `pre-package-update` | [`Orchestrator::pre_package_update`]    |
//! | `post-package`       | [`Orchestrator::post_package`]          |
//!
//! # Failure Isolation
//!
//! Relocating the vendored Moodle tree, and wiping an outdated install, are
//! fatal when they fail. Relocating a single plugin package is not. Its
//! failure is logged and reported, so the remaining packages of the run are
//! still processed. Configuration sync and external commands only ever warn.
//!
//! # Upgrades
//!
//! After an update the version marker of the install directory is compared
//! with the vendored tree. When the vendored tree is newer, the install
//! directory is deleted in full and reinstalled. Plugins copied into the old
//! tree do not survive this, so they must be reinstalled by running the update
//! again.

use crate::{
    config::Manifest,
    fsops::{copy_then_remove, delete_recursive, prune_empty_ancestors, FsError},
    package::{plan_relocation, Operation, PackageRelocation, RelocationPlan, SkipReason},
    path::InstallTarget,
    runner::{CommandRunner, CommandStatus, ExternalCommand, RunnerError, SystemRunner},
    sync::{sync_to_install, sync_to_root, SyncOutcome},
    version::{assess, UpgradeState},
};

use std::path::PathBuf;
use tracing::{debug, error, info, instrument, warn};

/// Marker of a repository carrying Git submodules.
pub const SUBMODULES_FILE: &str = ".gitmodules";

/// Interpreter used for Moodle command line scripts.
pub const PHP_BINARY: &str = "php";

/// Lifecycle hook orchestrator.
///
/// Holds everything one hook invocation needs: resolved paths, the host
/// manifest, and a runner for external commands.
#[derive(Debug)]
pub struct Orchestrator<R = SystemRunner>
where
    R: CommandRunner,
{
    target: InstallTarget,
    manifest: Manifest,
    runner: R,
}

impl<R> Orchestrator<R>
where
    R: CommandRunner,
{
    /// Construct new orchestrator.
    pub fn new(target: InstallTarget, manifest: Manifest, runner: R) -> Self {
        Self {
            target,
            manifest,
            runner,
        }
    }

    pub fn target(&self) -> &InstallTarget {
        &self.target
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Refuse to install over a completed install.
    ///
    /// # Errors
    ///
    /// - Return [`HookError::AlreadyInstalled`] if the install directory
    ///   already holds a version marker.
    #[instrument(skip(self), level = "debug")]
    pub fn pre_install(&self) -> Result<()> {
        info!("------------ pre-install ------------");
        let install_path = self.target.install_path();
        if install_path.is_dir() && self.target.installed_version_file().is_file() {
            return Err(HookError::AlreadyInstalled { path: install_path });
        }

        Ok(())
    }

    /// Relocate vendored tree into install directory, then sync configuration.
    ///
    /// # Errors
    ///
    /// - Return [`HookError::Relocate`] if vendored tree cannot be relocated.
    #[instrument(skip(self), level = "debug")]
    pub fn post_install(&self) -> Result<SyncOutcome> {
        info!("------------ post-install ------------");
        self.install_app()
    }

    /// Save configuration edited inside install directory back to root.
    #[instrument(skip(self), level = "debug")]
    pub fn pre_update(&self) -> SyncOutcome {
        info!("------------ pre-update ------------");
        sync_to_root(
            self.target.install_path(),
            self.target.root_dir(),
            self.manifest.settings(),
        )
    }

    /// Reinstall on upgrade, then refresh configuration and caches.
    ///
    /// # Errors
    ///
    /// - Return [`HookError::Wipe`] if an outdated install cannot be removed.
    /// - Return [`HookError::Relocate`] if vendored tree cannot be relocated.
    #[instrument(skip(self), level = "debug")]
    pub fn post_update(&self) -> Result<UpdateReport> {
        info!("------------ post-update ------------");
        let state = assess(self.target.install_path(), self.target.app_source_path());
        debug!("upgrade state {state:?}");

        let (action, mut config_sync) = match state {
            UpgradeState::NoExistingInstall if self.target.app_source_path().is_dir() => {
                (UpdateAction::Installed, Some(self.install_app()?))
            }
            UpgradeState::NoExistingInstall => {
                warn!(
                    "nothing to install, {:?} does not exist",
                    self.target.app_source_path().display()
                );
                (UpdateAction::NothingToInstall, None)
            }
            UpgradeState::ExistingOlder => {
                self.remove_app()?;
                let synced = self.install_app()?;
                warn!("DANGER! Run the update again to reinstall plugins");
                (UpdateAction::Reinstalled, Some(synced))
            }
            UpgradeState::ExistingSameOrNewer => (UpdateAction::Unchanged, None),
        };

        let mut cache_purge = None;
        if self.target.install_config().is_file() {
            // INVARIANT: A fresh install already synced configuration once.
            if config_sync.is_none() {
                config_sync = Some(sync_to_install(
                    self.target.root_dir(),
                    self.target.install_path(),
                    self.manifest.settings(),
                ));
            }

            cache_purge = match self.clear_cache() {
                Ok(status) => status,
                Err(error) => {
                    warn!("{error}");
                    None
                }
            };
        }

        Ok(UpdateReport {
            state,
            action,
            config_sync,
            cache_purge,
        })
    }

    /// Announce package about to be updated.
    #[instrument(skip(self, operation), level = "debug")]
    pub fn pre_package_update(&self, operation: &Operation) {
        info!("------------ pre-package-update ------------");
        info!("updating package {}", operation.package().name);
    }

    /// Relocate plugin package into install directory, and fetch submodules.
    ///
    /// Never fails. Relocation failures are logged and reported through the
    /// returned report instead.
    #[instrument(skip(self, operation), level = "debug")]
    pub fn post_package(&self, operation: &Operation) -> PackageReport {
        info!("------------ post-package ------------");
        let package = operation.package();
        let relocation = match plan_relocation(operation, &self.target, &self.manifest.extra) {
            RelocationPlan::Skip(reason) => {
                debug!("leave {package} in place: {reason}");
                RelocationOutcome::Skipped(reason)
            }
            RelocationPlan::Relocate(relocation) => self.relocate_package(relocation),
        };

        // INVARIANT: Removed packages have nothing left to fetch into.
        let submodules = match (operation, &relocation) {
            (Operation::Uninstall(_), _) | (_, RelocationOutcome::Failed { .. }) => None,
            (_, RelocationOutcome::Relocated { relocation, .. }) => {
                self.update_submodules(&package.name, relocation.new_path.clone())
            }
            (_, RelocationOutcome::Skipped(_)) => self.update_submodules(
                &package.name,
                self.target.root_dir().join(&package.install_path),
            ),
        };

        PackageReport {
            relocation,
            submodules,
        }
    }

    /// Purge Moodle caches.
    ///
    /// Returns `None` if cache purging is turned off through `clear-cache`.
    ///
    /// # Errors
    ///
    /// - Return [`HookError::Runner`] if purge script cannot be started.
    #[instrument(skip(self), level = "debug")]
    pub fn clear_cache(&self) -> Result<Option<CommandStatus>> {
        if !self.manifest.settings().clear_cache {
            debug!("cache purge disabled by clear-cache");
            return Ok(None);
        }

        info!("clearing the Moodle cache");
        let command = ExternalCommand::new(PHP_BINARY)
            .arg(self.target.cli_script("purge_caches.php"))
            .current_dir(self.target.root_dir());
        let status = self.runner.run(&command)?;
        if !status.success() {
            warn!("{command} failed with {status}");
        }

        Ok(Some(status))
    }

    /// Turn Moodle maintenance mode on or off.
    ///
    /// # Errors
    ///
    /// - Return [`HookError::Runner`] if maintenance script cannot be started.
    #[instrument(skip(self), level = "debug")]
    pub fn set_maintenance(&self, enable: bool) -> Result<CommandStatus> {
        let flag = if enable {
            info!("enabling maintenance mode");
            "--enable"
        } else {
            info!("disabling maintenance mode");
            "--disable"
        };

        let command = ExternalCommand::new(PHP_BINARY)
            .arg(self.target.cli_script("maintenance.php"))
            .arg(flag)
            .current_dir(self.target.root_dir());
        let status = self.runner.run(&command)?;
        if !status.success() {
            warn!("{command} failed with {status}");
        }

        Ok(status)
    }

    fn install_app(&self) -> Result<SyncOutcome> {
        let (source, install_path) = (self.target.app_source_path(), self.target.install_path());
        info!(
            "copy {:?} to {:?}",
            source.display(),
            install_path.display()
        );
        copy_then_remove(&source, &install_path).map_err(HookError::Relocate)?;

        Ok(sync_to_install(
            self.target.root_dir(),
            &install_path,
            self.manifest.settings(),
        ))
    }

    fn remove_app(&self) -> Result<()> {
        let install_path = self.target.install_path();
        if install_path.is_dir() {
            info!("remove {:?}", install_path.display());
            delete_recursive(&install_path).map_err(HookError::Wipe)?;
        }

        Ok(())
    }

    fn relocate_package(&self, relocation: PackageRelocation) -> RelocationOutcome {
        info!(
            "move {} from {:?} to {:?}",
            relocation.package,
            relocation.current_path.display(),
            relocation.new_path.display()
        );

        let result = copy_then_remove(&relocation.current_path, &relocation.new_path)
            .and_then(|_| prune_empty_ancestors(&relocation.current_path, self.target.root_dir()));

        match result {
            Ok(pruned) => RelocationOutcome::Relocated { relocation, pruned },
            Err(err) => {
                error!("failed to relocate {}: {err}", relocation.package);
                RelocationOutcome::Failed {
                    relocation,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn update_submodules(&self, package: &str, package_dir: PathBuf) -> Option<CommandStatus> {
        if !package_dir.join(SUBMODULES_FILE).is_file() {
            return None;
        }

        info!("package {package} has Git submodules, fetching them now");
        let command = ExternalCommand::new("git")
            .args(["submodule", "update", "--init"])
            .current_dir(package_dir);

        match self.runner.run(&command) {
            Ok(status) => {
                if !status.success() {
                    warn!("{command} failed with {status}");
                }
                Some(status)
            }
            Err(error) => {
                warn!("{error}");
                None
            }
        }
    }
}

/// What post-update did with the install directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// Fresh install from vendored tree.
    Installed,

    /// Outdated install wiped, then fresh install from vendored tree.
    Reinstalled,

    /// No install, and no vendored tree to install from.
    NothingToInstall,

    /// Install left as is.
    Unchanged,
}

/// Report of a post-update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub state: UpgradeState,
    pub action: UpdateAction,
    pub config_sync: Option<SyncOutcome>,
    pub cache_purge: Option<CommandStatus>,
}

impl UpdateReport {
    /// Check if previously installed plugins were lost to a reinstall.
    pub fn requires_plugin_reinstall(&self) -> bool {
        self.action == UpdateAction::Reinstalled
    }
}

/// Result of relocating a single package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationOutcome {
    /// Package moved, with the empty directories left behind removed.
    Relocated {
        relocation: PackageRelocation,
        pruned: Vec<PathBuf>,
    },

    /// Package left in place.
    Skipped(SkipReason),

    /// Package move failed.
    Failed {
        relocation: PackageRelocation,
        reason: String,
    },
}

/// Report of a post-package run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub relocation: RelocationOutcome,
    pub submodules: Option<CommandStatus>,
}

/// Lifecycle hook error types.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Install directory already holds a completed install.
    #[error("Moodle is already installed in {:?}", path.display())]
    AlreadyInstalled { path: PathBuf },

    /// Vendored tree cannot be relocated into install directory.
    #[error("failed to relocate Moodle into install directory")]
    Relocate(#[source] FsError),

    /// Outdated install cannot be removed.
    #[error("failed to remove outdated install directory")]
    Wipe(#[source] FsError),

    /// External command cannot be started.
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Friendly result alias :3
pub type Result<T, E = HookError> = std::result::Result<T, E>;
