//! Durable blocking state: the blocked-app set and the active flag.
//!
//! The store is the single writer for this state. Everything else holds a
//! cheap clone of the handle and reads per-operation; the only push-based
//! signal it offers is a watch channel over the active flag for reactive
//! consumers (the monitor loop deliberately polls instead, since it wakes
//! every cycle anyway).

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

mod migration;

pub use migration::migrate_legacy_prefs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct BlockingState {
    blocked_apps: BTreeSet<String>,
    blocking_active: bool,
    emergency_unlock_enabled: bool,
    last_emergency_date: Option<NaiveDate>,
}

struct StoreInner {
    path: PathBuf,
    data: RwLock<BlockingState>,
    active_tx: watch::Sender<bool>,
}

/// Handle to the persisted blocking state. Clones share the same state.
#[derive(Clone)]
pub struct BlockingStateStore {
    inner: Arc<StoreInner>,
}

impl BlockingStateStore {
    /// Open the store at `path`, creating default state if the file does
    /// not exist. An unreadable file fails safe to defaults rather than
    /// refusing to start.
    pub fn open(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read blocking state from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            BlockingState::default()
        };

        let (active_tx, _) = watch::channel(data.blocking_active);

        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                data: RwLock::new(data),
                active_tx,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn blocked_apps(&self) -> BTreeSet<String> {
        self.inner.data.read().unwrap().blocked_apps.clone()
    }

    /// Replace the blocked-app set.
    ///
    /// Emptying the set while blocking is active would leave an active
    /// monitor with nothing to enforce; that transition is an error, not a
    /// silent no-op.
    pub fn save_blocked_apps(&self, apps: &BTreeSet<String>) -> Result<()> {
        let mut guard = self.inner.data.write().unwrap();
        if guard.blocking_active && apps.is_empty() {
            bail!("cannot clear the blocked-app set while blocking is active");
        }
        guard.blocked_apps = apps.clone();
        self.persist(&guard)
    }

    pub fn is_blocking_active(&self) -> bool {
        self.inner.data.read().unwrap().blocking_active
    }

    /// Flip the active flag and notify subscribers.
    ///
    /// Engaging blocking with an empty set is refused; the invariant is
    /// "active implies non-empty".
    pub fn set_blocking_active(&self, active: bool) -> Result<()> {
        {
            let mut guard = self.inner.data.write().unwrap();
            if active && guard.blocked_apps.is_empty() {
                bail!("cannot activate blocking with an empty blocked-app set");
            }
            guard.blocking_active = active;
            self.persist(&guard)?;
        }
        let _ = self.inner.active_tx.send(active);
        Ok(())
    }

    /// Continuous subscription to the active flag for reactive consumers.
    pub fn subscribe_active(&self) -> watch::Receiver<bool> {
        self.inner.active_tx.subscribe()
    }

    pub fn emergency_unlock_enabled(&self) -> bool {
        self.inner.data.read().unwrap().emergency_unlock_enabled
    }

    pub fn set_emergency_unlock_enabled(&self, enabled: bool) -> Result<()> {
        let mut guard = self.inner.data.write().unwrap();
        guard.emergency_unlock_enabled = enabled;
        self.persist(&guard)
    }

    pub fn last_emergency_date(&self) -> Option<NaiveDate> {
        self.inner.data.read().unwrap().last_emergency_date
    }

    pub fn set_last_emergency_date(&self, date: NaiveDate) -> Result<()> {
        let mut guard = self.inner.data.write().unwrap();
        guard.last_emergency_date = Some(date);
        self.persist(&guard)
    }

    fn persist(&self, data: &BlockingState) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.inner.path, serialized).with_context(|| {
            format!(
                "failed to write blocking state to {}",
                self.inner.path.display()
            )
        })?;
        info!(
            "Persisted blocking state: {} apps, active={}",
            data.blocked_apps.len(),
            data.blocking_active
        );
        Ok(())
    }
}
