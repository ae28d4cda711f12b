// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the vendored Moodle tree lives, where it should be
//! installed, and where the files that get shuffled between the two are
//! expected to be. Nothing in here touches the file system beyond asking for
//! the current working directory.
//!
//! # Directory Layout
//!
//! All paths hang off of a single __root directory__, which is the directory
//! the host dependency manager runs from:
//!
//! - `<root>/vendor/moodle/moodle` is the vendored tree as downloaded.
//! - `<root>/<installerdir>` is the install directory, `public` by default.
//! - `<root>/config.php` is the root copy of the Moodle configuration file.
//! - `<root>/<installerdir>/config.php` is the install copy of that file.
//! - `<root>/<installerdir>/version.php` holds the version marker.

use crate::config::Extra;

use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Install directory used when the manifest does not override it.
pub const DEFAULT_INSTALLER_DIR: &str = "public";

/// Location of the vendored Moodle tree relative to the root directory.
pub const VENDORED_APP_DIR: &str = "vendor/moodle/moodle";

/// File holding the version marker at the top of a Moodle tree.
pub const VERSION_FILE: &str = "version.php";

/// Moodle configuration file kept in sync between root and install directory.
pub const CONFIG_FILE: &str = "config.php";

/// Resolve install directory from manifest extras.
///
/// Falls back to [`DEFAULT_INSTALLER_DIR`] when no override is present, the
/// override is blank, or the override does not stay beneath the root
/// directory. Never fails.
pub fn resolve_install_dir(extra: &Extra) -> PathBuf {
    let Some(dir) = extra
        .installer_dir
        .as_deref()
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
    else {
        return PathBuf::from(DEFAULT_INSTALLER_DIR);
    };

    let dir = PathBuf::from(dir);
    if !is_beneath_root(&dir) {
        warn!(
            "ignoring install directory {:?}, it must stay beneath the root directory",
            dir.display()
        );
        return PathBuf::from(DEFAULT_INSTALLER_DIR);
    }

    dir
}

/// Check if relative path names a directory strictly beneath its base.
///
/// Absolute paths, `..` components, and paths naming the base itself fail.
pub fn is_beneath_root(path: impl AsRef<Path>) -> bool {
    let mut named = false;
    for component in path.as_ref().components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => return false,
        }
    }

    named
}

/// Determine absolute path to current working directory.
///
/// # Errors
///
/// - Return [`NoWorkingDir`] if the working directory is gone or
///   inaccessible.
pub fn working_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|source| NoWorkingDir { source })
}

/// Resolved set of paths for one hook invocation.
///
/// Computed once from the manifest, and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    root_dir: PathBuf,
    install_dir: PathBuf,
    app_source_dir: PathBuf,
}

impl InstallTarget {
    /// Construct new install target from explicit parts.
    ///
    /// Both `install_dir` and `app_source_dir` are taken relative to
    /// `root_dir`.
    pub fn new(
        root_dir: impl Into<PathBuf>,
        install_dir: impl Into<PathBuf>,
        app_source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            install_dir: install_dir.into(),
            app_source_dir: app_source_dir.into(),
        }
    }

    /// Resolve install target for root directory from manifest extras.
    pub fn resolve(root_dir: impl Into<PathBuf>, extra: &Extra) -> Self {
        Self::new(root_dir, resolve_install_dir(extra), VENDORED_APP_DIR)
    }

    pub fn root_dir(&self) -> &Path {
        self.root_dir.as_path()
    }

    /// Install directory relative to root directory.
    pub fn install_dir(&self) -> &Path {
        self.install_dir.as_path()
    }

    /// Absolute path to install directory.
    pub fn install_path(&self) -> PathBuf {
        self.root_dir.join(&self.install_dir)
    }

    /// Absolute path to vendored Moodle tree.
    pub fn app_source_path(&self) -> PathBuf {
        self.root_dir.join(&self.app_source_dir)
    }

    /// Version marker file of the installed tree.
    pub fn installed_version_file(&self) -> PathBuf {
        self.install_path().join(VERSION_FILE)
    }

    pub fn root_config(&self) -> PathBuf {
        self.root_dir.join(CONFIG_FILE)
    }

    pub fn install_config(&self) -> PathBuf {
        self.install_path().join(CONFIG_FILE)
    }

    /// Moodle command line script inside install directory.
    pub fn cli_script(&self, script: impl AsRef<Path>) -> PathBuf {
        self.install_path().join("admin").join("cli").join(script)
    }

    /// Theme directory of the installed tree.
    pub fn theme_dir(&self) -> PathBuf {
        self.install_path().join("theme")
    }
}

/// Current working directory cannot be determined.
#[derive(Debug, thiserror::Error)]
#[error("cannot determine current working directory")]
pub struct NoWorkingDir {
    #[source]
    source: std::io::Error,
}

/// Friendly result alias :3
pub type Result<T, E = NoWorkingDir> = std::result::Result<T, E>;
