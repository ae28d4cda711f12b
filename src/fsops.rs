// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Primitive file system operations.
//!
//! Relocating a tree is done by copying it, and only then removing the
//! source. The source and destination may sit under install roots that are
//! configured independently, so a plain rename cannot be relied upon. If the
//! copy fails the source is left untouched.
//!
//! Symbolic links are always treated as leaves. They are recreated when
//! copied, unlinked when deleted, and never traversed.

use ignore::WalkBuilder;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Copy entire tree at `src` into `dst`, then remove `src`.
///
/// Existing content at `dst` is merged with, and overwritten by, the content
/// of `src`.
///
/// # Errors
///
/// - Return [`FsError::MissingSource`] if `src` does not exist.
/// - Return [`FsError::CreateDir`] if a destination directory cannot be made.
/// - Return [`FsError::Copy`] or [`FsError::Symlink`] if an entry cannot be
///   copied.
/// - Return [`FsError::Remove`] if `src` cannot be removed after copying.
#[instrument(skip(src, dst), level = "debug")]
pub fn copy_then_remove(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    let copied = copy_tree(src, dst)?;
    debug!(
        "copied {copied} files from {:?} to {:?}",
        src.display(),
        dst.display()
    );

    delete_recursive(src)
}

/// Copy entire tree at `src` into `dst`.
///
/// Returns number of regular files copied.
///
/// # Errors
///
/// - Return [`FsError::MissingSource`] if `src` does not exist.
/// - Return [`FsError::Walk`] if `src` cannot be traversed.
/// - Return [`FsError::CreateDir`], [`FsError::Copy`], or
///   [`FsError::Symlink`] if an entry cannot be written to `dst`.
pub fn copy_tree(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<u64> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    if fs::symlink_metadata(src).is_err() {
        return Err(FsError::MissingSource {
            path: src.to_path_buf(),
        });
    }

    let walker = WalkBuilder::new(src)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut copied = 0;
    for entry in walker {
        let entry = entry?;
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };

        // INVARIANT: Root entry maps onto destination itself.
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            let target = dst.join(relative);
            unlink_symlink(&target)?;
            target
        };

        if file_type.is_dir() {
            make_dir(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            if let Some(parent) = target.parent() {
                make_dir(parent)?;
            }
            fs::copy(entry.path(), &target).map_err(|source| FsError::Copy {
                source,
                from: entry.path().to_path_buf(),
                to: target.clone(),
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Remove file, symlink, or directory tree at `path`.
///
/// Works depth-first. Every entry is attempted even if a sibling fails, but
/// the call only succeeds if every nested removal succeeded.
///
/// # Errors
///
/// - Return [`FsError::Remove`] with the first failure encountered.
/// - Return [`FsError::ReadDir`] if a directory cannot be listed.
pub fn delete_recursive(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let metadata = fs::symlink_metadata(path).map_err(|source| FsError::Remove {
        source,
        path: path.to_path_buf(),
    })?;

    // INVARIANT: Symlinks are leaves, never follow them.
    if !metadata.is_dir() {
        return remove_leaf(path);
    }

    let entries = fs::read_dir(path).map_err(|source| FsError::ReadDir {
        source,
        path: path.to_path_buf(),
    })?;

    let mut failure = None;
    for entry in entries {
        let result = entry
            .map_err(|source| FsError::ReadDir {
                source,
                path: path.to_path_buf(),
            })
            .and_then(|entry| delete_recursive(entry.path()));

        if let Err(error) = result {
            warn!("{error}");
            failure.get_or_insert(error);
        }
    }

    if let Some(error) = failure {
        return Err(error);
    }

    fs::remove_dir(path).map_err(|source| FsError::Remove {
        source,
        path: path.to_path_buf(),
    })
}

/// Remove directories left empty from `path` up towards `stop_at`.
///
/// Starts at `path` itself, and walks through its ancestors. Stops at the
/// first directory that still has content, and never removes `stop_at`. Paths
/// that are not beneath `stop_at` are left alone. Returns the directories
/// removed in the order they were removed.
///
/// # Errors
///
/// - Return [`FsError::ReadDir`] if a directory cannot be listed.
/// - Return [`FsError::Remove`] if an empty directory cannot be removed.
pub fn prune_empty_ancestors(
    path: impl AsRef<Path>,
    stop_at: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let stop_at = stop_at.as_ref();
    let mut removed = Vec::new();
    let mut current = Some(path.as_ref());

    while let Some(dir) = current {
        if dir == stop_at || !dir.starts_with(stop_at) {
            break;
        }

        match fs::symlink_metadata(dir) {
            Ok(metadata) if metadata.is_dir() => {
                if !is_empty_dir(dir)? {
                    break;
                }

                fs::remove_dir(dir).map_err(|source| FsError::Remove {
                    source,
                    path: dir.to_path_buf(),
                })?;
                debug!("pruned empty directory {:?}", dir.display());
                removed.push(dir.to_path_buf());
            }
            Ok(_) => break,
            // INVARIANT: Already gone, so keep climbing.
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(FsError::ReadDir {
                    source,
                    path: dir.to_path_buf(),
                })
            }
        }

        current = dir.parent();
    }

    Ok(removed)
}

/// Create symbolic link at `link` pointing to `original`.
pub(crate) fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(original, link)
    }

    #[cfg(windows)]
    {
        if original.is_dir() {
            std::os::windows::fs::symlink_dir(original, link)
        } else {
            std::os::windows::fs::symlink_file(original, link)
        }
    }
}

fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let original = fs::read_link(from).map_err(|source| FsError::Symlink {
        source,
        original: from.to_path_buf(),
        link: to.to_path_buf(),
    })?;

    if let Ok(metadata) = fs::symlink_metadata(to) {
        if !metadata.is_dir() {
            remove_leaf(to)?;
        }
    }

    if let Some(parent) = to.parent() {
        make_dir(parent)?;
    }

    symlink(&original, to).map_err(|source| FsError::Symlink {
        source,
        original,
        link: to.to_path_buf(),
    })
}

// INVARIANT: Copies never write through a symlink sitting at the destination.
fn unlink_symlink(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            debug!("unlink {:?} before overwriting it", path.display());
            remove_leaf(path)
        }
        _ => Ok(()),
    }
}

fn make_dir(path: &Path) -> Result<()> {
    if let Some(created) = mkdirp::mkdirp(path).map_err(|source| FsError::CreateDir {
        source,
        path: path.to_path_buf(),
    })? {
        debug!("created directory {:?}", created.display());
    }

    Ok(())
}

fn remove_leaf(path: &Path) -> Result<()> {
    fs::remove_file(path)
        .or_else(|error| {
            // Directory symlinks on Windows need rmdir instead.
            if cfg!(windows) {
                fs::remove_dir(path)
            } else {
                Err(error)
            }
        })
        .map_err(|source| FsError::Remove {
            source,
            path: path.to_path_buf(),
        })
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .map_err(|source| FsError::ReadDir {
            source,
            path: path.to_path_buf(),
        })
}

/// File system operation error types.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Source of a copy does not exist.
    #[error("source path {:?} does not exist", path.display())]
    MissingSource { path: PathBuf },

    /// Destination directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be copied.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Symbolic link cannot be read or created.
    #[error("failed to link {:?} to {:?}", link.display(), original.display())]
    Symlink {
        #[source]
        source: std::io::Error,
        original: PathBuf,
        link: PathBuf,
    },

    /// Directory cannot be listed.
    #[error("failed to read directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File, symlink, or directory cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Tree cannot be traversed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = FsError> = std::result::Result<T, E>;
