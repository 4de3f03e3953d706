//! The enforcement loop: sample the foreground app, decide, intercept.

use std::{collections::BTreeSet, sync::Arc};

use anyhow::Result;
use chrono::Utc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    overlay::OverlayController,
    platform::{UsageEvent, UsageEventKind, UsageEventSource},
    store::BlockingStateStore,
};

use super::MonitorConfig;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Last-intercept memory for the running loop instance.
///
/// Lives and dies with one loop; never persisted, never shared. Cleared
/// whenever the foreground app leaves the blocked set so the next entry
/// into a blocked app intercepts immediately.
#[derive(Debug, Default)]
pub(crate) struct CooldownState {
    last_blocked_app: Option<String>,
    last_block_time: Option<Instant>,
}

impl CooldownState {
    /// A repeat detection of the same app inside the cooldown window does
    /// not re-trigger; anything else does.
    pub(crate) fn should_intercept(&self, app: &str, now: Instant, cooldown: Duration) -> bool {
        if self.last_blocked_app.as_deref() != Some(app) {
            return true;
        }
        match self.last_block_time {
            Some(last) => now.duration_since(last) > cooldown,
            None => true,
        }
    }

    pub(crate) fn record_intercept(&mut self, app: &str, now: Instant) {
        self.last_blocked_app = Some(app.to_string());
        self.last_block_time = Some(now);
    }

    pub(crate) fn clear(&mut self) {
        self.last_blocked_app = None;
        self.last_block_time = None;
    }
}

/// Within the sample window, later foreground transitions override
/// earlier ones; the app in front now is whoever moved to the foreground
/// last.
pub(crate) fn latest_foreground(events: &[UsageEvent]) -> Option<&str> {
    let mut foreground = None;
    for event in events {
        if event.kind == UsageEventKind::MovedToForeground {
            foreground = Some(event.package.as_str());
        }
    }
    foreground
}

pub async fn monitor_loop(
    blocked_apps: BTreeSet<String>,
    config: MonitorConfig,
    store: BlockingStateStore,
    events: Arc<dyn UsageEventSource>,
    overlay: OverlayController,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut cooldown = CooldownState::default();

    log_info!(
        "Monitor loop started for {} apps (host={})",
        blocked_apps.len(),
        config.host_package
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Deactivation propagates here: the loop owns its own
                // exit instead of being called back.
                if !store.is_blocking_active() {
                    log_info!("Blocking no longer active; monitor loop stopping");
                    break;
                }

                if let Err(err) = run_cycle(
                    &blocked_apps,
                    &config,
                    events.as_ref(),
                    &overlay,
                    &mut cooldown,
                ) {
                    // One bad sample (permission revoked mid-flight,
                    // transient query failure) skips the cycle, nothing
                    // more.
                    log_error!("Foreground sample failed: {err:#}");
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("Monitor loop shutting down");
                break;
            }
        }
    }

    // Teardown must not leave an overlay up, even if cancellation raced
    // an in-flight show.
    overlay.dismiss();
}

fn run_cycle(
    blocked_apps: &BTreeSet<String>,
    config: &MonitorConfig,
    events: &dyn UsageEventSource,
    overlay: &OverlayController,
    cooldown: &mut CooldownState,
) -> Result<()> {
    let now = Utc::now();
    let lookback = chrono::Duration::from_std(config.event_window)
        .unwrap_or_else(|_| chrono::Duration::seconds(1));

    let window = events.query_events(now - lookback, now)?;
    let Some(app) = latest_foreground(&window) else {
        return Ok(());
    };

    if blocked_apps.contains(app) && app != config.host_package {
        let sampled_at = Instant::now();
        if cooldown.should_intercept(app, sampled_at, config.block_cooldown) {
            cooldown.record_intercept(app, sampled_at);
            log_info!("Blocked app in foreground: {app}; requesting overlay");
            overlay.show(app);
        } else {
            log_info!("Blocked app {app} detected but cooldown active");
        }
    } else if !blocked_apps.contains(app) {
        overlay.dismiss();
        cooldown.clear();
    }

    Ok(())
}
