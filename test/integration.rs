// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::TreeFixture;

use anyhow::Result;
use moodle_hooks::{
    config::{Extra, ToolSettings},
    hooks::{HookError, RelocationOutcome, UpdateAction},
    package::{Package, SkipReason},
    sync::SyncOutcome,
    theme::{relink, THEME_SOURCE_DIR},
    version::UpgradeState,
    Manifest, Operation,
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{fs, path::PathBuf};

#[sealed_test]
fn post_install_relocates_vendored_moodle() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .moodle_tree("vendor/moodle/moodle", 2024100100)?
        .file("config.php", "<?php // root")?;
    let hooks = fixture.orchestrator(Manifest::default());

    let outcome = hooks.post_install()?;

    assert!(outcome.is_copied());
    assert!(!fixture.path("vendor/moodle/moodle").exists());
    assert!(fixture.path("public/theme/boost").is_dir());
    assert_eq!(
        fixture.snapshot("public")?.into_keys().collect::<Vec<_>>(),
        vec![
            PathBuf::from("config.php"),
            PathBuf::from("index.php"),
            PathBuf::from("lib/setup.php"),
            PathBuf::from("version.php"),
        ]
    );
    assert_eq!(
        fs::read_to_string(fixture.path("public/config.php"))?,
        "<?php // root"
    );

    Ok(())
}

#[sealed_test]
fn post_install_honors_custom_installer_dir() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture.moodle_tree("vendor/moodle/moodle", 2024100100)?;
    let manifest = Manifest {
        extra: Extra {
            installer_dir: Some("web".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    let hooks = fixture.orchestrator(manifest);

    let outcome = hooks.post_install()?;

    assert_eq!(
        outcome,
        SyncOutcome::MissingSource(fixture.path("config.php"))
    );
    assert!(fixture.path("web/version.php").is_file());
    assert!(!fixture.path("public").exists());

    Ok(())
}

#[sealed_test]
fn pre_install_then_post_install_refuses_second_run() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture.moodle_tree("vendor/moodle/moodle", 2024100100)?;
    let hooks = fixture.orchestrator(Manifest::default());

    hooks.pre_install()?;
    hooks.post_install()?;
    let result = hooks.pre_install();

    assert!(matches!(result, Err(HookError::AlreadyInstalled { .. })));

    Ok(())
}

#[sealed_test]
fn post_install_fails_without_vendored_moodle() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture.file("config.php", "<?php // root")?;
    let hooks = fixture.orchestrator(Manifest::default());

    let result = hooks.post_install();

    assert!(matches!(result, Err(HookError::Relocate(_))));
    assert!(!fixture.path("public").exists());

    Ok(())
}

#[sealed_test]
fn post_update_reinstalls_outdated_moodle() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .moodle_tree("public", 2023100100)?
        .file("public/mod/quiz/report/grades/index.php", "<?php // plugin")?
        .file("public/config.php", "<?php // installed")?
        .file("config.php", "<?php // root")?
        .moodle_tree("vendor/moodle/moodle", 2024100100)?;
    let hooks = fixture.orchestrator(Manifest::default());

    let report = hooks.post_update()?;

    assert_eq!(report.state, UpgradeState::ExistingOlder);
    assert_eq!(report.action, UpdateAction::Reinstalled);
    assert!(report.requires_plugin_reinstall());
    assert!(!fixture.path("public/mod").exists());
    assert!(!fixture.path("vendor/moodle/moodle").exists());
    assert_eq!(
        fs::read_to_string(fixture.path("public/index.php"))?,
        "<?php // 2024100100"
    );
    assert_eq!(
        fs::read_to_string(fixture.path("public/config.php"))?,
        "<?php // root"
    );
    assert!(report.config_sync.is_some_and(|outcome| outcome.is_copied()));
    assert!(report.cache_purge.is_some_and(|status| status.success()));

    let script = fixture.path("public/admin/cli/purge_caches.php");
    assert_eq!(
        hooks.runner().commands(),
        vec![format!("php {}", script.display())]
    );
    assert_eq!(
        hooks.runner().dirs(),
        vec![Some(fixture.root().to_path_buf())]
    );

    Ok(())
}

#[sealed_test]
fn post_update_keeps_current_moodle() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .moodle_tree("public", 2024100100)?
        .file("public/mod/quiz/report/grades/index.php", "<?php // plugin")?
        .moodle_tree("vendor/moodle/moodle", 2024100100)?;
    let hooks = fixture.orchestrator(Manifest::default());

    let report = hooks.post_update()?;

    assert_eq!(report.state, UpgradeState::ExistingSameOrNewer);
    assert_eq!(report.action, UpdateAction::Unchanged);
    assert!(!report.requires_plugin_reinstall());
    assert!(fixture.path("public/mod/quiz/report/grades/index.php").is_file());
    assert_eq!(report.config_sync, None);
    assert_eq!(report.cache_purge, None);
    assert!(hooks.runner().commands().is_empty());

    Ok(())
}

#[sealed_test]
fn post_update_skips_sync_and_purge_when_disabled() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .moodle_tree("public", 2024100100)?
        .file("public/config.php", "<?php // installed")?
        .file("config.php", "<?php // root")?;
    let mut manifest = Manifest::default();
    manifest.config.settings = ToolSettings {
        copy_config: false,
        clear_cache: false,
    };
    let hooks = fixture.orchestrator(manifest);

    let report = hooks.post_update()?;

    assert_eq!(report.config_sync, Some(SyncOutcome::Disabled));
    assert_eq!(report.cache_purge, None);
    assert_eq!(
        fs::read_to_string(fixture.path("public/config.php"))?,
        "<?php // installed"
    );
    assert!(hooks.runner().commands().is_empty());

    Ok(())
}

#[sealed_test]
fn post_update_installs_missing_moodle() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .moodle_tree("vendor/moodle/moodle", 2024100100)?
        .file("config.php", "<?php // root")?;
    let hooks = fixture.orchestrator(Manifest::default());

    let report = hooks.post_update()?;

    assert_eq!(report.state, UpgradeState::NoExistingInstall);
    assert_eq!(report.action, UpdateAction::Installed);
    assert!(!report.requires_plugin_reinstall());
    assert!(fixture.path("public/version.php").is_file());
    assert!(!fixture.path("vendor/moodle/moodle").exists());
    assert_eq!(
        report.config_sync,
        Some(SyncOutcome::Copied {
            from: fixture.path("config.php"),
            to: fixture.path("public/config.php"),
        })
    );
    assert!(report.cache_purge.is_some_and(|status| status.success()));
    assert_eq!(hooks.runner().commands().len(), 1);

    Ok(())
}

#[sealed_test]
fn post_update_without_vendored_moodle_installs_nothing() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture.file("config.php", "<?php // root")?;
    let hooks = fixture.orchestrator(Manifest::default());

    let report = hooks.post_update()?;

    assert_eq!(report.state, UpgradeState::NoExistingInstall);
    assert_eq!(report.action, UpdateAction::NothingToInstall);
    assert_eq!(report.config_sync, None);
    assert_eq!(report.cache_purge, None);
    assert!(!fixture.path("public").exists());
    assert!(hooks.runner().commands().is_empty());

    Ok(())
}

#[cfg(unix)]
#[sealed_test]
fn post_update_fails_when_outdated_moodle_cannot_be_removed() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let fixture = TreeFixture::here()?;
    fixture
        .moodle_tree("public", 2023100100)?
        .file("public/locked/data.php", "<?php // pinned")?
        .moodle_tree("vendor/moodle/moodle", 2024100100)?;
    let locked = fixture.path("public/locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555))?;

    // INVARIANT: Permission bits only bind unprivileged users.
    if fs::write(locked.join("writable"), "").is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;
        return Ok(());
    }

    let hooks = fixture.orchestrator(Manifest::default());
    let result = hooks.post_update();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

    assert!(matches!(result, Err(HookError::Wipe(_))));
    assert!(fixture.path("public/locked/data.php").is_file());
    assert!(fixture.path("vendor/moodle/moodle/version.php").is_file());
    assert!(hooks.runner().commands().is_empty());

    Ok(())
}

#[sealed_test]
fn pre_update_then_post_update_preserves_config_edits() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .moodle_tree("public", 2023100100)?
        .file("public/config.php", "<?php // edited in place")?
        .file("config.php", "<?php // stale")?
        .moodle_tree("vendor/moodle/moodle", 2024100100)?;
    let hooks = fixture.orchestrator(Manifest::default());

    hooks.pre_update();
    hooks.post_update()?;

    assert_eq!(
        fs::read_to_string(fixture.path("public/config.php"))?,
        "<?php // edited in place"
    );

    Ok(())
}

#[sealed_test]
fn post_package_relocates_plugin_and_prunes_leftovers() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .dir("public")?
        .file("mod/quiz/report/grades/version.php", "<?php $plugin->version = 1;")?
        .file("mod/quiz/report/grades/.gitmodules", "[submodule \"lib\"]")?;
    let hooks = fixture.orchestrator(Manifest::default());
    let operation = Operation::Install(Package::new(
        "acme/grades",
        "moodle-quiz",
        "mod/quiz/report/grades",
    ));

    let report = hooks.post_package(&operation);

    let new_path = fixture.path("public/mod/quiz/report/grades");
    let (relocation, pruned) = match report.relocation {
        RelocationOutcome::Relocated { relocation, pruned } => (relocation, pruned),
        outcome => panic!("expected relocation, got {outcome:?}"),
    };
    assert_eq!(relocation.new_path, new_path);
    assert_eq!(
        pruned,
        vec![
            fixture.path("mod/quiz/report"),
            fixture.path("mod/quiz"),
            fixture.path("mod"),
        ]
    );
    assert!(new_path.join("version.php").is_file());
    assert!(!fixture.path("mod").exists());
    assert!(report.submodules.is_some_and(|status| status.success()));
    assert_eq!(
        hooks.runner().commands(),
        vec!["git submodule update --init".to_string()]
    );
    assert_eq!(hooks.runner().dirs(), vec![Some(new_path)]);

    Ok(())
}

#[sealed_test]
fn post_package_leaves_siblings_in_place() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .file("local/alpha/version.php", "<?php // alpha")?
        .file("local/beta/version.php", "<?php // beta")?;
    let hooks = fixture.orchestrator(Manifest::default());
    let operation = Operation::Install(Package::new("acme/alpha", "moodle-local", "local/alpha"));

    let report = hooks.post_package(&operation);

    assert!(matches!(
        report.relocation,
        RelocationOutcome::Relocated { ref pruned, .. } if pruned.is_empty()
    ));
    assert!(fixture.path("public/local/alpha/version.php").is_file());
    assert!(fixture.path("local/beta/version.php").is_file());
    assert!(!fixture.path("local/alpha").exists());

    Ok(())
}

#[sealed_test]
fn post_package_keeps_install_path_chosen_by_host() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture.file("local/codechecker/version.php", "<?php // codechecker")?;
    let hooks = fixture.orchestrator(Manifest::default());
    let operation = Operation::Install(Package::new(
        "moodlehq/moodle-local_codechecker",
        "moodle-local",
        "local/codechecker",
    ));

    let report = hooks.post_package(&operation);

    assert!(matches!(report.relocation, RelocationOutcome::Relocated { .. }));
    assert!(fixture
        .path("public/local/codechecker/version.php")
        .is_file());
    assert!(!fixture.path("public/local/moodle-local_codechecker").exists());
    assert!(!fixture.path("local").exists());

    Ok(())
}

#[sealed_test]
fn post_package_leaves_overridden_and_primary_packages() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture.file("custom/alpha/version.php", "<?php // alpha")?;
    let mut manifest = Manifest::default();
    manifest
        .extra
        .installer_paths
        .insert("custom/{$name}/".into(), vec!["type:moodle-local".into()]);
    let hooks = fixture.orchestrator(manifest);

    let local = hooks.post_package(&Operation::Install(Package::new(
        "acme/alpha",
        "moodle-local",
        "custom/alpha",
    )));
    let primary = hooks.post_package(&Operation::Install(Package::new(
        "moodle/moodle",
        "project",
        "vendor/moodle/moodle",
    )));

    assert_eq!(
        local.relocation,
        RelocationOutcome::Skipped(SkipReason::Overridden("moodle-local".into()))
    );
    assert_eq!(
        primary.relocation,
        RelocationOutcome::Skipped(SkipReason::PrimaryApplication)
    );
    assert!(fixture.path("custom/alpha/version.php").is_file());

    Ok(())
}

#[sealed_test]
fn post_package_ignores_uninstall() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture.file("local/alpha/.gitmodules", "[submodule \"lib\"]")?;
    let hooks = fixture.orchestrator(Manifest::default());
    let operation = Operation::Uninstall(Package::new("acme/alpha", "moodle-local", "local/alpha"));

    hooks.pre_package_update(&operation);
    let report = hooks.post_package(&operation);

    assert_eq!(
        report.relocation,
        RelocationOutcome::Skipped(SkipReason::Uninstalled)
    );
    assert_eq!(report.submodules, None);
    assert!(hooks.runner().commands().is_empty());
    assert!(fixture.path("local/alpha").is_dir());

    Ok(())
}

#[cfg(unix)]
#[sealed_test]
fn link_themes_into_install_dir_is_idempotent() -> Result<()> {
    let fixture = TreeFixture::here()?;
    fixture
        .dir("public")?
        .file(PathBuf::from(THEME_SOURCE_DIR).join("lime/config.php"), "<?php")?
        .file(PathBuf::from(THEME_SOURCE_DIR).join("coral/config.php"), "<?php")?;
    let hooks = fixture.orchestrator(Manifest::default());
    let target = hooks.target();
    let source = target.root_dir().join(THEME_SOURCE_DIR);

    let first = relink(&source, target.theme_dir())?;
    let second = relink(&source, target.theme_dir())?;

    assert_eq!(first, second);
    assert_eq!(
        first.iter().map(|mapping| mapping.name.as_str()).collect::<Vec<_>>(),
        vec!["coral", "lime"]
    );
    for name in ["coral", "lime"] {
        let link = fixture.path("public/theme").join(name);
        assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());
        assert_eq!(fs::read_link(&link)?, source.join(name));
    }

    Ok(())
}
