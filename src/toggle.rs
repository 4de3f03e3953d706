//! Tag-gated toggle protocol.
//!
//! Blocking flips only when a physical tag carrying the secret phrase is
//! scanned. The secret is matched case-insensitively as a substring of
//! the tag's text payload, so a tag written as "KillSwitch-living-room"
//! still toggles. The phrase is an authorization friction device, not a
//! cryptographic credential.
//!
//! The emergency override is the one escape hatch that works without the
//! tag, rate-limited to once per local calendar day.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use log::{info, warn};

use crate::{
    error::ActivationError, ndef::extract_text, orchestrator::BlockingOrchestrator,
    platform::PermissionGate, sessions::SessionTracker, store::BlockingStateStore,
};

pub const SECRET_PHRASE: &str = "KillSwitch";

/// Result of presenting a tag to [`TagToggle::handle_scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Blocking was engaged for this many apps.
    Activated { app_count: u32 },
    /// Blocking was disengaged.
    Deactivated,
    /// The tag was readable but did not carry the secret phrase, or was
    /// not readable at all. Nothing changed.
    WrongTag,
}

/// Result of requesting the emergency override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideOutcome {
    /// Blocking was disengaged without the tag.
    Deactivated,
    /// The override was already spent today; try again tomorrow.
    AlreadyUsedToday,
    /// The user opted out of the override entirely.
    Disabled,
    /// Blocking was not active; there is nothing to escape.
    NotActive,
}

#[derive(Clone)]
pub struct TagToggle {
    store: BlockingStateStore,
    orchestrator: BlockingOrchestrator,
    sessions: SessionTracker,
    permissions: Arc<dyn PermissionGate>,
}

impl TagToggle {
    pub fn new(
        store: BlockingStateStore,
        orchestrator: BlockingOrchestrator,
        sessions: SessionTracker,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            sessions,
            permissions,
        }
    }

    /// Decode a scanned tag and toggle blocking if it carries the secret
    /// phrase. A wrong or unreadable tag changes nothing.
    pub async fn handle_scan(&self, raw_message: &[u8]) -> Result<ScanOutcome, ActivationError> {
        let Some(text) = extract_text(raw_message) else {
            info!("Scanned tag carried no readable text");
            return Ok(ScanOutcome::WrongTag);
        };

        if !contains_secret(&text) {
            info!("Scanned tag text does not match the toggle phrase");
            return Ok(ScanOutcome::WrongTag);
        }

        if self.store.is_blocking_active() {
            self.deactivate().await?;
            Ok(ScanOutcome::Deactivated)
        } else {
            let app_count = self.activate().await?;
            Ok(ScanOutcome::Activated { app_count })
        }
    }

    /// Disengage blocking without the tag, at most once per local
    /// calendar day, and only when the user left the override enabled.
    pub async fn emergency_override(&self) -> Result<OverrideOutcome> {
        self.override_on(Local::now().date_naive()).await
    }

    async fn activate(&self) -> Result<u32, ActivationError> {
        let apps = self.store.blocked_apps();
        if apps.is_empty() {
            return Err(ActivationError::NoAppsToBlock);
        }
        if !self.permissions.has_usage_access() {
            return Err(ActivationError::UsageAccessRequired);
        }
        if !self.permissions.has_overlay_permission() {
            return Err(ActivationError::OverlayPermissionRequired);
        }

        self.orchestrator.start_blocking(&apps).await?;
        let app_count = apps.len() as u32;
        self.sessions
            .open_session(app_count)
            .await
            .map_err(ActivationError::Internal)?;
        Ok(app_count)
    }

    async fn deactivate(&self) -> Result<(), ActivationError> {
        self.orchestrator
            .stop_blocking()
            .await
            .map_err(ActivationError::Internal)?;
        self.sessions
            .end_current_session()
            .await
            .map_err(ActivationError::Internal)?;
        Ok(())
    }

    async fn override_on(&self, today: NaiveDate) -> Result<OverrideOutcome> {
        if !self.store.emergency_unlock_enabled() {
            return Ok(OverrideOutcome::Disabled);
        }
        if !self.store.is_blocking_active() {
            return Ok(OverrideOutcome::NotActive);
        }
        if self.store.last_emergency_date() == Some(today) {
            info!("Emergency override already used on {today}");
            return Ok(OverrideOutcome::AlreadyUsedToday);
        }

        warn!("Emergency override invoked; disengaging blocking");
        self.deactivate().await?;
        self.store.set_last_emergency_date(today)?;
        Ok(OverrideOutcome::Deactivated)
    }
}

fn contains_secret(text: &str) -> bool {
    text.to_lowercase().contains(&SECRET_PHRASE.to_lowercase())
}
