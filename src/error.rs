use thiserror::Error;

/// Why an attempt to engage blocking was refused.
///
/// The permission variants are deliberately distinct so the caller can
/// deep-link the user to the settings screen that is actually missing
/// instead of showing a generic failure.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// Usage-access permission is not granted; foreground events cannot
    /// be queried without it.
    #[error("usage access permission required")]
    UsageAccessRequired,

    /// Display-over-other-apps permission is not granted; the intercept
    /// overlay cannot be shown without it.
    #[error("overlay permission required")]
    OverlayPermissionRequired,

    /// The blocked-app set is empty at the moment of intent to block.
    #[error("no apps selected for blocking")]
    NoAppsToBlock,

    /// Persistence or orchestration plumbing failed.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ActivationError {
    /// True for the precondition/permission refusals that leave stored
    /// state untouched (as opposed to plumbing failures).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ActivationError::UsageAccessRequired
                | ActivationError::OverlayPermissionRequired
                | ActivationError::NoAppsToBlock
        )
    }
}
