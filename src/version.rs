// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version gate.
//!
//! Moodle declares its version at the top-level of its tree in `version.php`
//! through a plain assignment:
//!
//! ```php
//! $version  = 2024100700.01;          // YYYYMMDD      = weekly release date of this DEV branch.
//! ```
//!
//! The file is never executed. The assignment is picked out as text, and its
//! integer part plus its decimal fraction form the __version marker__. The
//! fraction compares as a decimal, so `.1` is newer than `.05`, and `.1`
//! equals `.10`.
//!
//! Markers decide whether an existing install gets wiped and replaced, so the
//! gate is conservative. Anything missing, unreadable, or unparsable means
//! "not newer".

use crate::path::VERSION_FILE;

use regex::Regex;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
};
use tracing::{debug, info, warn};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\$version[ \t]*=[ \t]*([0-9]+)(?:\.([0-9]+))?[ \t]*;")
        .expect("valid version regex")
});

/// Version marker of a Moodle tree.
///
/// Ordered by integer part, then by fraction.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionMarker {
    /// Integer part of declared version.
    pub value: u64,

    // INVARIANT: ASCII digits without trailing zeros, so byte order is
    // decimal order.
    fraction: String,
}

impl VersionMarker {
    pub fn new(value: u64) -> Self {
        Self {
            value,
            fraction: String::new(),
        }
    }

    /// Construct marker from integer part and the digits after the point.
    pub fn with_fraction(value: u64, digits: &str) -> Self {
        Self {
            value,
            fraction: digits.trim_end_matches('0').to_string(),
        }
    }

    /// Digits after the decimal point, without trailing zeros.
    pub fn fraction(&self) -> &str {
        self.fraction.as_str()
    }
}

impl FromStr for VersionMarker {
    type Err = VersionError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let captures = VERSION_RE
            .captures(content)
            .ok_or(VersionError::NoAssignment)?;

        let value = captures[1].parse()?;
        let digits = captures.get(2).map_or("", |digits| digits.as_str());

        Ok(Self::with_fraction(value, digits))
    }
}

impl Display for VersionMarker {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}.{:0<2}", self.value, self.fraction)
    }
}

/// Read version marker at top-level of tree.
///
/// Returns `None` if the tree has no version file.
///
/// # Errors
///
/// - Return [`VersionError::Read`] if version file cannot be read.
/// - Return [`VersionError::NoAssignment`] if version file declares nothing.
/// - Return [`VersionError::OutOfRange`] if declared version is too large.
pub fn read_marker(tree_root: impl AsRef<Path>) -> Result<Option<VersionMarker>> {
    let path = tree_root.as_ref().join(VERSION_FILE);
    if !path.is_file() {
        return Ok(None);
    }

    read_to_string(&path)
        .map_err(|source| VersionError::Read {
            source,
            path: path.clone(),
        })?
        .parse()
        .map(Some)
}

/// Check if tree at `new_tree` carries a newer version than `old_tree`.
///
/// Returns false if either marker is missing or cannot be parsed.
pub fn is_newer(old_tree: impl AsRef<Path>, new_tree: impl AsRef<Path>) -> bool {
    let Some(old) = marker_or_none(old_tree.as_ref()) else {
        return false;
    };
    let Some(new) = marker_or_none(new_tree.as_ref()) else {
        return false;
    };

    debug!("installed version {old}, candidate version {new}");
    if new > old {
        info!("new Moodle version detected: {old} -> {new}");
        return true;
    }

    false
}

fn marker_or_none(tree: &Path) -> Option<VersionMarker> {
    match read_marker(tree) {
        Ok(Some(marker)) => Some(marker),
        Ok(None) => {
            debug!("no version marker in {:?}", tree.display());
            None
        }
        Err(error) => {
            warn!("ignoring version marker of {:?}: {error}", tree.display());
            None
        }
    }
}

/// Upgrade state of install directory relative to a candidate tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// Install directory holds no completed install.
    NoExistingInstall,

    /// Candidate tree is newer than the existing install.
    ExistingOlder,

    /// Existing install is as new as the candidate, or no decision is possible.
    ExistingSameOrNewer,
}

/// Assess upgrade state of `installed_tree` against `candidate_tree`.
pub fn assess(installed_tree: impl AsRef<Path>, candidate_tree: impl AsRef<Path>) -> UpgradeState {
    let installed_tree = installed_tree.as_ref();
    if !installed_tree.join(VERSION_FILE).is_file() {
        return UpgradeState::NoExistingInstall;
    }

    if is_newer(installed_tree, candidate_tree) {
        UpgradeState::ExistingOlder
    } else {
        UpgradeState::ExistingSameOrNewer
    }
}

/// Version marker error types.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    /// Version file cannot be read.
    #[error("failed to read version file {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Version file has no `$version` assignment.
    #[error("no version assignment found")]
    NoAssignment,

    /// Declared version does not fit.
    #[error(transparent)]
    OutOfRange(#[from] std::num::ParseIntError),
}

/// Friendly result alias :3
type Result<T, E = VersionError> = std::result::Result<T, E>;
