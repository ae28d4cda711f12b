// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Theme linking.
//!
//! Custom themes are developed under `app/Themes`, outside of the Moodle
//! tree, which gets replaced wholesale on upgrades. Each theme is exposed to
//! Moodle through a symlink in the theme directory of the install directory.
//! One symlink per top-level theme, nothing nested.
//!
//! Linking is idempotent. Stale symlinks are replaced, but a real file or
//! directory sitting where a symlink should go is never touched.

use crate::fsops::symlink;

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Theme source directory relative to root directory.
pub const THEME_SOURCE_DIR: &str = "app/Themes";

/// Theme mapping from source directory into target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeMapping {
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// List theme mappings for every entry of `source_dir`.
///
/// Sorted by theme name.
///
/// # Errors
///
/// - Return [`ThemeError::ReadSource`] if `source_dir` cannot be listed.
pub fn theme_mappings(
    source_dir: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
) -> Result<Vec<ThemeMapping>> {
    let (source_dir, target_dir) = (source_dir.as_ref(), target_dir.as_ref());
    let read_error = |source| ThemeError::ReadSource {
        source,
        path: source_dir.to_path_buf(),
    };

    let mut mappings = Vec::new();
    for entry in fs::read_dir(source_dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        mappings.push(ThemeMapping {
            source: source_dir.join(&name),
            target: target_dir.join(&name),
            name,
        });
    }
    mappings.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(mappings)
}

/// Recreate symlinks in `target_dir` for every theme in `source_dir`.
///
/// Creates `target_dir` if needed. A missing `source_dir` links nothing.
/// Links always point at absolute paths, so a relative `source_dir` is
/// resolved against the current working directory first.
///
/// # Errors
///
/// - Return [`ThemeError::Occupied`] if a theme's target path exists and is
///   not a symlink.
/// - Return [`ThemeError::Unlink`] if a stale symlink cannot be removed.
/// - Return [`ThemeError::Link`] if a symlink cannot be created.
#[instrument(skip(source_dir, target_dir), level = "debug")]
pub fn relink(
    source_dir: impl AsRef<Path>,
    target_dir: impl AsRef<Path>,
) -> Result<Vec<ThemeMapping>> {
    let (source_dir, target_dir) = (source_dir.as_ref(), target_dir.as_ref());
    if !source_dir.is_dir() {
        warn!("no themes linked, {:?} is not a directory", source_dir.display());
        return Ok(Vec::new());
    }

    let source_dir = std::path::absolute(source_dir).map_err(|source| ThemeError::ReadSource {
        source,
        path: source_dir.to_path_buf(),
    })?;
    let mappings = theme_mappings(&source_dir, target_dir)?;
    if mappings.is_empty() {
        info!("no themes linked");
        return Ok(mappings);
    }

    fs::create_dir_all(target_dir).map_err(|source| ThemeError::CreateTarget {
        source,
        path: target_dir.to_path_buf(),
    })?;

    for mapping in &mappings {
        link_theme(mapping)?;
        info!("linked theme: {}", mapping.name);
    }

    Ok(mappings)
}

fn link_theme(mapping: &ThemeMapping) -> Result<()> {
    if let Ok(metadata) = fs::symlink_metadata(&mapping.target) {
        if !metadata.file_type().is_symlink() {
            return Err(ThemeError::Occupied {
                path: mapping.target.clone(),
            });
        }

        debug!("unlink stale theme link {:?}", mapping.target.display());
        fs::remove_file(&mapping.target)
            .or_else(|error| {
                if cfg!(windows) {
                    fs::remove_dir(&mapping.target)
                } else {
                    Err(error)
                }
            })
            .map_err(|source| ThemeError::Unlink {
                source,
                path: mapping.target.clone(),
            })?;
    }

    symlink(&mapping.source, &mapping.target).map_err(|source| ThemeError::Link {
        source,
        original: mapping.source.clone(),
        link: mapping.target.clone(),
    })
}

/// Theme linking error types.
#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    /// Theme source directory cannot be listed.
    #[error("failed to read theme directory {:?}", path.display())]
    ReadSource {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Theme target directory cannot be created.
    #[error("failed to create theme directory {:?}", path.display())]
    CreateTarget {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Real file or directory sits where a theme link should go.
    #[error("refusing to replace {:?}, it is not a symlink", path.display())]
    Occupied { path: PathBuf },

    /// Stale theme link cannot be removed.
    #[error("failed to remove stale theme link {:?}", path.display())]
    Unlink {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Theme link cannot be created.
    #[error("failed to link {:?} to {:?}", link.display(), original.display())]
    Link {
        #[source]
        source: std::io::Error,
        original: PathBuf,
        link: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ThemeError> = std::result::Result<T, E>;
