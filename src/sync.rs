// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration file synchronization.
//!
//! The Moodle `config.php` may be edited in the root directory or directly in
//! the install directory. Both copies are kept in line through explicit
//! one-shot copies, in whichever direction the current hook needs. Contents
//! are never merged.
//!
//! Synchronization is best-effort. A failed copy is reported and logged, but
//! never raised, since rerunning the hook recovers from it.

use crate::{config::ToolSettings, path::CONFIG_FILE};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Result of a synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Synchronization is turned off through `copy-config`.
    Disabled,

    /// Nothing to copy from.
    MissingSource(PathBuf),

    /// Configuration file was copied.
    Copied { from: PathBuf, to: PathBuf },

    /// Copy was attempted but failed.
    Failed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
}

impl SyncOutcome {
    pub fn is_copied(&self) -> bool {
        matches!(self, Self::Copied { .. })
    }
}

/// Copy root configuration file into install directory.
pub fn sync_to_install(
    root_dir: impl AsRef<Path>,
    install_dir: impl AsRef<Path>,
    settings: &ToolSettings,
) -> SyncOutcome {
    copy_config(
        root_dir.as_ref().join(CONFIG_FILE),
        install_dir.as_ref().join(CONFIG_FILE),
        settings,
    )
}

/// Copy install configuration file back into root directory.
pub fn sync_to_root(
    install_dir: impl AsRef<Path>,
    root_dir: impl AsRef<Path>,
    settings: &ToolSettings,
) -> SyncOutcome {
    copy_config(
        install_dir.as_ref().join(CONFIG_FILE),
        root_dir.as_ref().join(CONFIG_FILE),
        settings,
    )
}

fn copy_config(from: PathBuf, to: PathBuf, settings: &ToolSettings) -> SyncOutcome {
    if !settings.copy_config {
        debug!("configuration sync disabled by copy-config");
        return SyncOutcome::Disabled;
    }

    if !from.is_file() {
        info!("file {:?} not found, skipping sync", from.display());
        return SyncOutcome::MissingSource(from);
    }

    info!("copy {:?} to {:?}", from.display(), to.display());
    match fs::copy(&from, &to) {
        Ok(_) => SyncOutcome::Copied { from, to },
        Err(error) => {
            warn!(
                "failed to copy {:?} to {:?}: {error}",
                from.display(),
                to.display()
            );
            SyncOutcome::Failed {
                from,
                to,
                reason: error.to_string(),
            }
        }
    }
}
