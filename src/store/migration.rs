//! One-time import of the legacy flat preference file.
//!
//! Earlier builds kept blocking state in a flat key-value file. The import
//! runs once, gated by a separate marker file so it can never re-run after
//! success; failures are logged and swallowed (the app starts with
//! whatever state the structured store already has, which for a fresh
//! install is "no prior state").

use std::{fs, path::Path};

use anyhow::{Context, Result};
use log::{error, info};
use serde::Deserialize;

use super::BlockingStateStore;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LegacyPrefs {
    blocked_apps: Vec<String>,
    blocking_active: bool,
}

/// Import `legacy_path` into `store` exactly once.
///
/// The marker at `marker_path` records completion; while the marker is
/// absent a failed import will be retried on the next startup.
pub fn migrate_legacy_prefs(store: &BlockingStateStore, legacy_path: &Path, marker_path: &Path) {
    if marker_path.exists() {
        return;
    }

    match import_legacy(store, legacy_path) {
        Ok(imported) => {
            if let Err(err) = fs::write(marker_path, b"1") {
                error!("Failed to write migration marker: {err:#}");
                return;
            }
            if imported {
                info!("Migrated legacy blocking preferences from {}", legacy_path.display());
            }
        }
        Err(err) => {
            error!("Legacy preference migration failed: {err:#}");
        }
    }
}

/// Returns true if anything was actually carried over.
fn import_legacy(store: &BlockingStateStore, legacy_path: &Path) -> Result<bool> {
    if !legacy_path.exists() {
        return Ok(false);
    }

    let contents = fs::read_to_string(legacy_path)
        .with_context(|| format!("failed to read legacy prefs at {}", legacy_path.display()))?;
    let legacy: LegacyPrefs =
        serde_json::from_str(&contents).context("failed to parse legacy prefs")?;

    let mut imported = false;

    if !legacy.blocked_apps.is_empty() {
        let apps = legacy.blocked_apps.iter().cloned().collect();
        store.save_blocked_apps(&apps)?;
        info!("Migrated {} blocked apps", legacy.blocked_apps.len());
        imported = true;
    }

    if legacy.blocking_active {
        store
            .set_blocking_active(true)
            .context("legacy state was active but could not be restored")?;
        imported = true;
    }

    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: BlockingStateStore,
        legacy: std::path::PathBuf,
        marker: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = BlockingStateStore::open(dir.path().join("blocking.json")).unwrap();
        let legacy = dir.path().join("legacy_prefs.json");
        let marker = dir.path().join("migration.done");
        Fixture {
            _dir: dir,
            store,
            legacy,
            marker,
        }
    }

    #[test]
    fn imports_apps_and_active_flag() {
        let fx = fixture();
        fs::write(
            &fx.legacy,
            r#"{"blocked_apps": ["com.example.a", "com.example.b"], "blocking_active": true}"#,
        )
        .unwrap();

        migrate_legacy_prefs(&fx.store, &fx.legacy, &fx.marker);

        let expected: BTreeSet<String> =
            ["com.example.a", "com.example.b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(fx.store.blocked_apps(), expected);
        assert!(fx.store.is_blocking_active());
        assert!(fx.marker.exists());
    }

    #[test]
    fn never_runs_twice() {
        let fx = fixture();
        fs::write(&fx.legacy, r#"{"blocked_apps": ["com.example.a"]}"#).unwrap();
        migrate_legacy_prefs(&fx.store, &fx.legacy, &fx.marker);

        // A second legacy file appearing later must be ignored.
        fs::write(&fx.legacy, r#"{"blocked_apps": ["com.example.other"]}"#).unwrap();
        migrate_legacy_prefs(&fx.store, &fx.legacy, &fx.marker);

        let expected: BTreeSet<String> = ["com.example.a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(fx.store.blocked_apps(), expected);
    }

    #[test]
    fn missing_legacy_file_marks_complete() {
        let fx = fixture();
        migrate_legacy_prefs(&fx.store, &fx.legacy, &fx.marker);
        assert!(fx.marker.exists());
        assert!(fx.store.blocked_apps().is_empty());
    }

    #[test]
    fn corrupt_legacy_file_is_swallowed_and_retried() {
        let fx = fixture();
        fs::write(&fx.legacy, "not json at all").unwrap();

        migrate_legacy_prefs(&fx.store, &fx.legacy, &fx.marker);
        assert!(fx.store.blocked_apps().is_empty());
        // No marker: the import will be attempted again next startup.
        assert!(!fx.marker.exists());
    }

    #[test]
    fn active_with_empty_set_fails_without_marking() {
        let fx = fixture();
        fs::write(&fx.legacy, r#"{"blocked_apps": [], "blocking_active": true}"#).unwrap();

        migrate_legacy_prefs(&fx.store, &fx.legacy, &fx.marker);
        assert!(!fx.store.is_blocking_active());
        assert!(!fx.marker.exists());
    }
}
