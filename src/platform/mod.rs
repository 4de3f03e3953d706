//! Seams to the host operating system.
//!
//! The enforcement core never talks to OS APIs directly; everything it
//! needs from the platform comes through these traits. Production builds
//! wire in real implementations (usage-stats queries, an overlay window,
//! settings-backed permission checks); the test suite wires in fakes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a foreground-transition event reported by the OS usage tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageEventKind {
    MovedToForeground,
    MovedToBackground,
    /// Any event type the monitor does not care about.
    Other,
}

/// A single usage event inside a query window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub package: String,
    pub kind: UsageEventKind,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn foreground(package: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            package: package.into(),
            kind: UsageEventKind::MovedToForeground,
            timestamp,
        }
    }
}

/// Pull-based, time-windowed access to the OS foreground-event stream.
///
/// There is no push subscription for "what app is in front" available to
/// unprivileged code, so the monitor loop polls this at a short interval.
/// Implementations should return events in chronological order.
pub trait UsageEventSource: Send + Sync {
    fn query_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<UsageEvent>>;
}

/// Checks for the two permissions that gate activation.
///
/// Both are checked independently so the caller can route the user to the
/// specific settings screen that is missing.
pub trait PermissionGate: Send + Sync {
    /// Usage-access permission, required to query foreground events.
    fn has_usage_access(&self) -> bool;
    /// Display-over-other-apps permission, required for the overlay.
    fn has_overlay_permission(&self) -> bool;
}

/// The always-on-top surface the intercept overlay draws.
///
/// Attached surfaces cover the full screen, do not take keyboard focus
/// (the blocked app keeps running underneath, visually obscured), and
/// ignore outside touches; the only affordance they host is an explicit
/// "go to home screen" action, which the embedder wires back to
/// [`crate::overlay::OverlayController::dismiss`].
///
/// The surface is created on, and never leaves, the overlay controller's
/// UI worker thread, so implementations do not need to be `Send`.
pub trait OverlaySurface {
    fn attach(&mut self, blocked_package: &str) -> Result<()>;
    fn detach(&mut self) -> Result<()>;
}
