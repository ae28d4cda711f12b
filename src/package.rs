// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Packages, package operations, and plugin relocation planning.
//!
//! The host dependency manager reports every package it installs, updates,
//! or removes as an [`Operation`]. Packages whose type is `moodle-<plugin>`
//! are Moodle plugins. The host installs those relative to the root
//! directory, but Moodle only discovers plugins beneath its own tree. So
//! plugins get relocated into the install directory. The host already picks
//! the plugin's location relative to a Moodle tree, including any custom
//! `installer-name`, so that relative path is kept as is beneath the install
//! directory. Only plugin types Moodle knows are relocated.

use crate::{config::Extra, path::InstallTarget};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};
use tracing::debug;

/// Prefix marking a package type as a Moodle plugin.
pub const PLUGIN_TYPE_PREFIX: &str = "moodle-";

/// Name of the package providing Moodle itself.
pub const PRIMARY_PACKAGE: &str = "moodle/moodle";

/// Plugin type to plugin location inside a Moodle tree.
const PLUGIN_LOCATIONS: &[(&str, &str)] = &[
    ("mod", "mod/{$name}/"),
    ("admin_report", "admin/report/{$name}/"),
    ("atto", "lib/editor/atto/plugins/{$name}/"),
    ("tool", "admin/tool/{$name}/"),
    ("assignment", "mod/assignment/type/{$name}/"),
    ("assignsubmission", "mod/assign/submission/{$name}/"),
    ("assignfeedback", "mod/assign/feedback/{$name}/"),
    ("antivirus", "lib/antivirus/{$name}/"),
    ("auth", "auth/{$name}/"),
    ("availability", "availability/condition/{$name}/"),
    ("block", "blocks/{$name}/"),
    ("booktool", "mod/book/tool/{$name}/"),
    ("cachestore", "cache/stores/{$name}/"),
    ("cachelock", "cache/locks/{$name}/"),
    ("calendartype", "calendar/type/{$name}/"),
    ("communication", "communication/provider/{$name}/"),
    ("customfield", "customfield/field/{$name}/"),
    ("fileconverter", "files/converter/{$name}/"),
    ("format", "course/format/{$name}/"),
    ("coursereport", "course/report/{$name}/"),
    ("contenttype", "contentbank/contenttype/{$name}/"),
    ("customcertelement", "mod/customcert/element/{$name}/"),
    ("datafield", "mod/data/field/{$name}/"),
    ("dataformat", "dataformat/{$name}/"),
    ("datapreset", "mod/data/preset/{$name}/"),
    ("editor", "lib/editor/{$name}/"),
    ("enrol", "enrol/{$name}/"),
    ("filter", "filter/{$name}/"),
    ("forumreport", "mod/forum/report/{$name}/"),
    ("gradeexport", "grade/export/{$name}/"),
    ("gradeimport", "grade/import/{$name}/"),
    ("gradereport", "grade/report/{$name}/"),
    ("gradingform", "grade/grading/form/{$name}/"),
    ("h5plib", "h5p/h5plib/{$name}/"),
    ("local", "local/{$name}/"),
    ("logstore", "admin/tool/log/store/{$name}/"),
    ("ltisource", "mod/lti/source/{$name}/"),
    ("ltiservice", "mod/lti/service/{$name}/"),
    ("media", "media/player/{$name}/"),
    ("message", "message/output/{$name}/"),
    ("mlbackend", "lib/mlbackend/{$name}/"),
    ("mnetservice", "mnet/service/{$name}/"),
    ("paygw", "payment/gateway/{$name}/"),
    ("plagiarism", "plagiarism/{$name}/"),
    ("portfolio", "portfolio/{$name}/"),
    ("profilefield", "user/profile/field/{$name}/"),
    ("qbank", "question/bank/{$name}/"),
    ("qbehaviour", "question/behaviour/{$name}/"),
    ("qformat", "question/format/{$name}/"),
    ("qtype", "question/type/{$name}/"),
    ("quizaccess", "mod/quiz/accessrule/{$name}/"),
    ("quiz", "mod/quiz/report/{$name}/"),
    ("report", "report/{$name}/"),
    ("repository", "repository/{$name}/"),
    ("scormreport", "mod/scorm/report/{$name}/"),
    ("search", "search/engine/{$name}/"),
    ("theme", "theme/{$name}/"),
    ("tiny", "lib/editor/tiny/plugins/{$name}/"),
    ("tinymce", "lib/editor/tinymce/plugins/{$name}/"),
    ("webservice", "webservice/{$name}/"),
    ("workshopallocation", "mod/workshop/allocation/{$name}/"),
    ("workshopeval", "mod/workshop/eval/{$name}/"),
    ("workshopform", "mod/workshop/form/{$name}/"),
];

/// Location template of a plugin type, if Moodle knows it.
pub fn plugin_location(plugin_type: &str) -> Option<&'static str> {
    PLUGIN_LOCATIONS
        .iter()
        .find(|(kind, _)| *kind == plugin_type)
        .map(|(_, location)| *location)
}

/// Package resolved by the host dependency manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Full `vendor/name` package name.
    pub name: String,

    /// Declared package type.
    pub kind: String,

    /// Install path chosen by the host, relative to root directory.
    pub install_path: PathBuf,
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        install_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            install_path: install_path.into(),
        }
    }

    /// Moodle plugin type, if package type follows the plugin convention.
    pub fn plugin_type(&self) -> Option<&str> {
        self.kind
            .strip_prefix(PLUGIN_TYPE_PREFIX)
            .filter(|kind| !kind.is_empty())
    }

    /// Check if package is Moodle itself.
    pub fn is_primary(&self) -> bool {
        self.name == PRIMARY_PACKAGE
    }
}

impl Display for Package {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} ({})", self.name, self.kind)
    }
}

/// Package operation performed by the host dependency manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Install(Package),
    Update { from: Package, to: Package },
    Uninstall(Package),
}

impl Operation {
    /// Package the operation leaves behind, i.e., the target of an update.
    pub fn package(&self) -> &Package {
        match self {
            Self::Install(package) | Self::Uninstall(package) => package,
            Self::Update { to, .. } => to,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Install(package) => write!(fmt, "install {package}"),
            Self::Update { from, to } => write!(fmt, "update {from} -> {to}"),
            Self::Uninstall(package) => write!(fmt, "uninstall {package}"),
        }
    }
}

/// Move of a single plugin package into the install directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRelocation {
    pub package: String,
    pub current_path: PathBuf,
    pub new_path: PathBuf,
}

/// Why a package is left where the host put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Package was removed, so there is nothing to move.
    Uninstalled,

    /// Package is Moodle itself.
    PrimaryApplication,

    /// Package type is not `moodle-<plugin>`.
    NotPlugin,

    /// Manifest already places this package type.
    Overridden(String),

    /// Plugin type has no known location.
    UnknownPluginType(String),

    /// Install path leaves the root directory.
    OutsideRoot(PathBuf),
}

impl Display for SkipReason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Uninstalled => fmt.write_str("package was uninstalled"),
            Self::PrimaryApplication => fmt.write_str("package is Moodle itself"),
            Self::NotPlugin => fmt.write_str("package is not a Moodle plugin"),
            Self::Overridden(kind) => write!(fmt, "installer-paths already places {kind}"),
            Self::UnknownPluginType(kind) => {
                write!(fmt, "no known location for plugin type {kind}")
            }
            Self::OutsideRoot(path) => {
                write!(fmt, "install path {:?} is outside root directory", path.display())
            }
        }
    }
}

/// Relocation plan for a package operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationPlan {
    Relocate(PackageRelocation),
    Skip(SkipReason),
}

/// Plan where a package should end up.
///
/// Plugins are moved from `<root>/<path>` into `<install dir>/<path>`, where
/// `<path>` is the install path the host chose, unless the manifest already
/// provides an install path for their type. Install paths that resolve
/// outside the root directory are never touched.
pub fn plan_relocation(
    operation: &Operation,
    target: &InstallTarget,
    extra: &Extra,
) -> RelocationPlan {
    if let Operation::Uninstall(_) = operation {
        return RelocationPlan::Skip(SkipReason::Uninstalled);
    }

    let package = operation.package();
    if package.is_primary() {
        return RelocationPlan::Skip(SkipReason::PrimaryApplication);
    }

    let Some(plugin_type) = package.plugin_type() else {
        return RelocationPlan::Skip(SkipReason::NotPlugin);
    };

    if extra.has_installer_path(&package.kind) {
        return RelocationPlan::Skip(SkipReason::Overridden(package.kind.clone()));
    }

    let Some(location) = plugin_location(plugin_type) else {
        return RelocationPlan::Skip(SkipReason::UnknownPluginType(plugin_type.into()));
    };

    let Some(relative) = relative_to_root(&package.install_path, target.root_dir()) else {
        return RelocationPlan::Skip(SkipReason::OutsideRoot(package.install_path.clone()));
    };
    debug!("plugin type {plugin_type} belongs in {location}");

    RelocationPlan::Relocate(PackageRelocation {
        package: package.name.clone(),
        current_path: target.root_dir().join(relative),
        new_path: target.install_path().join(relative),
    })
}

// INVARIANT: Result is relative, and never climbs out through `..`.
fn relative_to_root<'a>(path: &'a Path, root: &Path) -> Option<&'a Path> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };

    let inside = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    (inside && relative.components().next().is_some()).then_some(relative)
}
