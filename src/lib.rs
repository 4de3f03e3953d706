//! App-blocking engine for tag-gated digital wellbeing.
//!
//! The crate enforces a user-chosen blocked-app set: a polling monitor
//! loop watches foreground-app transitions, an always-on-top overlay
//! intercepts blocked apps, and the whole thing toggles only when a
//! physical tag carrying the secret phrase is scanned. State persists
//! across restarts, and enforcement sessions are recorded for history
//! and streaks.
//!
//! Platform surfaces (usage events, permissions, the overlay view) live
//! behind the traits in [`platform`]; everything above them is portable
//! and test-friendly.

pub mod db;
pub mod error;
pub mod models;
pub mod monitor;
pub mod ndef;
pub mod orchestrator;
pub mod overlay;
pub mod platform;
pub mod sessions;
pub mod store;
pub mod toggle;
mod utils;

pub use db::Database;
pub use error::ActivationError;
pub use models::EnforcementSession;
pub use monitor::{MonitorConfig, MonitorController};
pub use orchestrator::BlockingOrchestrator;
pub use overlay::OverlayController;
pub use platform::{OverlaySurface, PermissionGate, UsageEvent, UsageEventKind, UsageEventSource};
pub use sessions::SessionTracker;
pub use store::{migrate_legacy_prefs, BlockingStateStore};
pub use toggle::{OverrideOutcome, ScanOutcome, TagToggle, SECRET_PHRASE};
