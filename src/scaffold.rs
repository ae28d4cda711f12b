// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration file scaffolding.
//!
//! Write a starter `config.php` into the root directory. The template reads
//! database credentials, site URL, and data root from `MOODLE_*` environment
//! variables, so the same file works across deployments. Paths inside of it
//! are relative to the install directory, which is where it ends up after
//! being synchronized.

use crate::path::CONFIG_FILE;

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

/// Environment driven Moodle configuration template.
pub const CONFIG_TEMPLATE: &str = include_str!("../templates/config.php");

/// Write configuration template into root directory.
///
/// Returns path of written file.
///
/// # Errors
///
/// - Return [`ScaffoldError::Exists`] if configuration file exists, and
///   `force` is not set.
/// - Return [`ScaffoldError::Write`] if configuration file cannot be written.
pub fn write_config_template(root_dir: impl AsRef<Path>, force: bool) -> Result<PathBuf> {
    let path = root_dir.as_ref().join(CONFIG_FILE);
    if path.exists() && !force {
        return Err(ScaffoldError::Exists { path });
    }

    fs::write(&path, CONFIG_TEMPLATE).map_err(|source| ScaffoldError::Write {
        source,
        path: path.clone(),
    })?;
    info!("wrote configuration template to {:?}", path.display());

    Ok(path)
}

/// Scaffolding error types.
#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    /// Configuration file already exists.
    #[error("{:?} already exists, use --force to overwrite it", path.display())]
    Exists { path: PathBuf },

    /// Configuration file cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ScaffoldError> = std::result::Result<T, E>;
