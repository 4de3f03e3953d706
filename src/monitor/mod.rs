pub mod controller;
pub mod loop_worker;

use std::time::Duration;

pub use controller::MonitorController;

/// Tuning for the enforcement loop.
///
/// The defaults mirror the sampling trade-off the whole design leans on:
/// a 200 ms poll over a trailing 1 s event window catches ordinary app
/// switches, and the 2 s cooldown stops the overlay from flickering when
/// the same blocked app keeps re-surfacing between samples.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Package identifier of the blocking app itself, which is never
    /// intercepted.
    pub host_package: String,
    pub poll_interval: Duration,
    pub event_window: Duration,
    pub block_cooldown: Duration,
}

impl MonitorConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
    pub const DEFAULT_EVENT_WINDOW: Duration = Duration::from_millis(1000);
    pub const DEFAULT_BLOCK_COOLDOWN: Duration = Duration::from_millis(2000);

    pub fn new(host_package: impl Into<String>) -> Self {
        Self {
            host_package: host_package.into(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            event_window: Self::DEFAULT_EVENT_WINDOW,
            block_cooldown: Self::DEFAULT_BLOCK_COOLDOWN,
        }
    }
}
