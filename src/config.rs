// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the subset of the host manifest that the hooks care about. The host
//! dependency manager keeps everything in one JSON manifest, usually
//! `composer.json`. Only two blocks of it matter here:
//!
//! ```json
//! {
//!   "extra": {
//!     "installerdir": "public",
//!     "installer-paths": { "public/mod/{$name}/": ["type:moodle-mod"] }
//!   },
//!   "config": {
//!     "moodle-composer": { "copy-config": true, "clear-cache": true }
//!   }
//! }
//! ```
//!
//! Every other key is ignored during deserialization.

use crate::path::is_beneath_root;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Host manifest layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Installer extras.
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,

    /// Host configuration block.
    #[serde(default)]
    pub config: HostConfig,
}

impl Manifest {
    /// Load manifest from file.
    ///
    /// A missing manifest is not an error. All defaults apply instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if manifest exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if manifest is malformed.
    /// - Return [`ConfigError::ShellExpansion`] if install directory override
    ///   references an unset variable.
    /// - Return [`ConfigError::InstallDirOutsideRoot`] if install directory
    ///   override does not stay beneath the root directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no manifest at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        read_to_string(path)
            .map_err(|source| ConfigError::Read {
                source,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Settings specific to the hooks.
    pub fn settings(&self) -> &ToolSettings {
        &self.config.settings
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: Manifest = serde_json::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on install directory override.
        if let Some(dir) = manifest.extra.installer_dir.take() {
            let dir = shellexpand::full(dir.as_str())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();

            // INVARIANT: Install directory never leaves the root directory.
            let trimmed = dir.trim();
            if !trimmed.is_empty() && !is_beneath_root(trimmed) {
                return Err(ConfigError::InstallDirOutsideRoot { path: dir.into() });
            }
            manifest.extra.installer_dir = Some(dir);
        }

        Ok(manifest)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            serde_json::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Installer extras.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Extra {
    /// Install directory override relative to root directory.
    #[serde(
        rename = "installerdir",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub installer_dir: Option<String>,

    /// Custom install paths mapped to package selectors.
    #[serde(
        rename = "installer-paths",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub installer_paths: BTreeMap<String, Vec<String>>,
}

impl Extra {
    fn is_empty(&self) -> bool {
        self.installer_dir.is_none() && self.installer_paths.is_empty()
    }

    /// Check if an install path override exists for a package type.
    ///
    /// Recognizes both a key named after the package type itself, and the
    /// usual `type:<package type>` selector listed under any path.
    pub fn has_installer_path(&self, package_type: &str) -> bool {
        if self.installer_paths.contains_key(package_type) {
            return true;
        }

        let selector = format!("type:{package_type}");
        self.installer_paths
            .values()
            .flatten()
            .any(|entry| entry == &selector)
    }
}

/// Host configuration block.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Settings for the hooks themselves.
    #[serde(rename = "moodle-composer", default)]
    pub settings: ToolSettings,
}

/// Feature flags of the hooks.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ToolSettings {
    /// Keep `config.php` in sync between root and install directory.
    #[serde(rename = "copy-config", default = "enabled")]
    pub copy_config: bool,

    /// Purge Moodle caches after an update.
    #[serde(rename = "clear-cache", default = "enabled")]
    pub clear_cache: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            copy_config: true,
            clear_cache: true,
        }
    }
}

fn enabled() -> bool {
    true
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read manifest file.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize manifest.
    #[error(transparent)]
    Deserialize(serde_json::Error),

    /// Failed to serialize manifest.
    #[error(transparent)]
    Serialize(serde_json::Error),

    /// Failed to perform shell expansion on manifest.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Install directory override escapes the root directory.
    #[error("install directory {:?} must be relative, and stay beneath root", path.display())]
    InstallDirOutsideRoot { path: PathBuf },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("MOODLE_DIR", "web/moodle")])]
    fn deserialize_manifest() -> anyhow::Result<()> {
        let result: Manifest = r#"
            {
                "name": "acme/campus",
                "require": { "moodle/moodle": "4.5.*" },
                "extra": {
                    "installerdir": "$MOODLE_DIR",
                    "installer-paths": {
                        "custom/{$name}/": ["type:moodle-local"]
                    }
                },
                "config": {
                    "sort-packages": true,
                    "moodle-composer": { "copy-config": false }
                }
            }
        "#
        .parse()?;

        let expect = Manifest {
            extra: Extra {
                installer_dir: Some("web/moodle".into()),
                installer_paths: BTreeMap::from([(
                    "custom/{$name}/".into(),
                    vec!["type:moodle-local".into()],
                )]),
            },
            config: HostConfig {
                settings: ToolSettings {
                    copy_config: false,
                    clear_cache: true,
                },
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_empty_manifest_uses_defaults() -> anyhow::Result<()> {
        let result: Manifest = "{}".parse()?;
        assert_eq!(result, Manifest::default());
        assert!(result.settings().copy_config);
        assert!(result.settings().clear_cache);

        Ok(())
    }

    #[sealed_test(env = [("MOODLE_DIR", "/srv/moodle")])]
    fn deserialize_rejects_install_dir_outside_root() {
        for dir in ["$MOODLE_DIR", "/var/www/moodle", "../moodle", "."] {
            let data = format!(r#"{{ "extra": {{ "installerdir": "{dir}" }} }}"#);
            let result = data.parse::<Manifest>();
            assert!(
                matches!(result, Err(ConfigError::InstallDirOutsideRoot { .. })),
                "{dir}"
            );
        }
    }

    #[test]
    fn deserialize_malformed_manifest() {
        let result = "{ \"extra\": ".parse::<Manifest>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn serialize_manifest() {
        let result = Manifest {
            extra: Extra {
                installer_dir: Some("moodle".into()),
                installer_paths: BTreeMap::from([(
                    "public/mod/{$name}/".into(),
                    vec!["type:moodle-mod".into()],
                )]),
            },
            config: HostConfig {
                settings: ToolSettings {
                    copy_config: false,
                    clear_cache: true,
                },
            },
        }
        .to_string();

        let expect = indoc! {r#"
            {
              "extra": {
                "installerdir": "moodle",
                "installer-paths": {
                  "public/mod/{$name}/": [
                    "type:moodle-mod"
                  ]
                }
              },
              "config": {
                "moodle-composer": {
                  "copy-config": false,
                  "clear-cache": true
                }
              }
            }
        "#};

        assert_eq!(result, expect.trim_end());
    }

    #[test]
    fn installer_path_override_lookup() {
        let extra = Extra {
            installer_dir: None,
            installer_paths: BTreeMap::from([
                ("moodle-block".into(), vec![]),
                ("custom/{$name}/".into(), vec!["type:moodle-local".into()]),
            ]),
        };

        assert!(extra.has_installer_path("moodle-block"));
        assert!(extra.has_installer_path("moodle-local"));
        assert!(!extra.has_installer_path("moodle-quiz"));
    }

    #[sealed_test]
    fn load_missing_manifest_uses_defaults() -> anyhow::Result<()> {
        let result = Manifest::load("composer.json")?;
        assert_eq!(result, Manifest::default());

        Ok(())
    }

    #[sealed_test]
    fn load_manifest_from_file() -> anyhow::Result<()> {
        std::fs::write(
            "composer.json",
            r#"{ "extra": { "installerdir": "moodle" } }"#,
        )?;
        let result = Manifest::load("composer.json")?;
        assert_eq!(result.extra.installer_dir.as_deref(), Some("moodle"));

        Ok(())
    }
}
