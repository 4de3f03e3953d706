//! Façade over the enforcement machinery.
//!
//! The orchestrator is the only component that starts or stops the
//! monitor loop. Activation persists state first, so a process death
//! right after still restarts enforcement on the next boot broadcast.

use std::{collections::BTreeSet, sync::Arc};

use anyhow::Result;
use log::{info, warn};
use tokio::sync::Mutex;

use crate::{
    error::ActivationError,
    monitor::{MonitorConfig, MonitorController},
    overlay::OverlayController,
    platform::UsageEventSource,
    store::BlockingStateStore,
};

#[derive(Clone)]
pub struct BlockingOrchestrator {
    store: BlockingStateStore,
    overlay: OverlayController,
    events: Arc<dyn UsageEventSource>,
    config: MonitorConfig,
    monitor: Arc<Mutex<MonitorController>>,
}

impl BlockingOrchestrator {
    pub fn new(
        store: BlockingStateStore,
        overlay: OverlayController,
        events: Arc<dyn UsageEventSource>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            overlay,
            events,
            config,
            monitor: Arc::new(Mutex::new(MonitorController::new())),
        }
    }

    /// Persist the blocked set, raise the active flag, and (re)start the
    /// monitor loop. Rejects an empty set before touching stored state.
    /// Idempotent: a second call replaces the running loop rather than
    /// doubling it.
    pub async fn start_blocking(&self, apps: &BTreeSet<String>) -> Result<(), ActivationError> {
        if apps.is_empty() {
            return Err(ActivationError::NoAppsToBlock);
        }

        self.store.save_blocked_apps(apps)?;
        self.store.set_blocking_active(true)?;

        self.start_monitor(apps.clone()).await?;
        info!("Started blocking {} apps", apps.len());
        Ok(())
    }

    /// Persist the inactive flag and stop the loop. The flag flip alone
    /// would stop the loop within one cycle; stopping explicitly makes
    /// teardown prompt and dismisses any visible overlay.
    pub async fn stop_blocking(&self) -> Result<()> {
        self.store.set_blocking_active(false)?;
        self.monitor.lock().await.stop().await?;
        self.overlay.dismiss();
        info!("Stopped blocking");
        Ok(())
    }

    /// Boot-completed / package-replaced collaborator: re-read persisted
    /// state and bring the monitor back if blocking was engaged.
    pub async fn handle_restart(&self) -> Result<()> {
        if !self.store.is_blocking_active() {
            info!("Blocking not active - ignoring restart broadcast");
            return Ok(());
        }

        let apps = self.store.blocked_apps();
        if apps.is_empty() {
            warn!("Blocking active but no apps configured");
            return Ok(());
        }

        info!("Restarting monitor loop after reboot/upgrade");
        self.start_monitor(apps).await?;
        Ok(())
    }

    pub async fn is_monitoring(&self) -> bool {
        self.monitor.lock().await.is_running()
    }

    async fn start_monitor(&self, apps: BTreeSet<String>) -> Result<()> {
        self.monitor
            .lock()
            .await
            .start(
                apps,
                self.config.clone(),
                self.store.clone(),
                Arc::clone(&self.events),
                self.overlay.clone(),
            )
            .await
    }
}
