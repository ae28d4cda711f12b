// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Lifecycle hooks for installing Moodle through a dependency manager.
//!
//! The dependency manager downloads Moodle into `vendor/moodle/moodle`, and
//! its plugins wherever its installer decides. Neither is where a web server
//! expects a runnable Moodle to be. These hooks run at the manager's lifecycle
//! triggers to fix that:
//!
//! - The vendored tree is relocated into the __install directory__.
//! - `config.php` is kept in sync between root and install directory.
//! - Upgrades are detected through version markers, and reinstall the tree.
//! - Plugin packages are relocated into the install directory.
//! - Custom themes are symlinked into the install directory.
//!
//! Everything runs synchronously from a single process. There is no locking,
//! so two hooks must never run against the same root directory at once.
//!
//! # See Also
//!
//! 1. [`hooks`] for the lifecycle triggers.
//! 2. [`config`] for the manifest keys that are honored.

pub mod config;
pub mod fsops;
pub mod hooks;
pub mod package;
pub mod path;
pub mod runner;
pub mod scaffold;
pub mod sync;
pub mod theme;
pub mod version;

pub use config::{Manifest, ToolSettings};
pub use hooks::{HookError, Orchestrator};
pub use package::{Operation, Package};
pub use path::InstallTarget;
pub use runner::{CommandRunner, ExternalCommand, SystemRunner};
