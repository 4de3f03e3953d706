use std::{collections::BTreeSet, sync::Arc};

use anyhow::{Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{overlay::OverlayController, platform::UsageEventSource, store::BlockingStateStore};

use super::{loop_worker::monitor_loop, MonitorConfig};

/// Owns the single monitor-loop task.
///
/// `start` is cancel-then-replace: whatever loop may still be running is
/// cancelled before the new one spawns, so at most one instance of
/// [`monitor_loop`] is ever live. Cancellation is cooperative and lands
/// within one poll period.
pub struct MonitorController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl MonitorController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub async fn start(
        &mut self,
        blocked_apps: BTreeSet<String>,
        config: MonitorConfig,
        store: BlockingStateStore,
        events: Arc<dyn UsageEventSource>,
        overlay: OverlayController,
    ) -> Result<()> {
        self.stop().await?;

        info!("Starting monitor loop for {} apps", blocked_apps.len());

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(monitor_loop(
            blocked_apps,
            config,
            store,
            events,
            overlay,
            token_clone,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("monitor loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Default for MonitorController {
    fn default() -> Self {
        Self::new()
    }
}
