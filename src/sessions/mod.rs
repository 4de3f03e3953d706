//! Enforcement-session bookkeeping.
//!
//! The toggle protocol calls in at session boundaries; statistics screens
//! read the history and the streak. A session opens when blocking is
//! activated and closes when it is deactivated (tag scan or emergency
//! override); closed records are immutable.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use log::warn;
use uuid::Uuid;

use crate::{db::Database, models::EnforcementSession};

#[derive(Clone)]
pub struct SessionTracker {
    db: Database,
}

impl SessionTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a new session recording how many apps were blocked at start.
    pub async fn open_session(&self, blocked_app_count: u32) -> Result<EnforcementSession> {
        let session = EnforcementSession {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: 0,
            blocked_app_count,
        };
        self.db.insert_session(&session).await?;
        Ok(session)
    }

    /// Close the currently open session, computing its duration. Returns
    /// the closed record, or `None` when no session was open (already
    /// closed, or activation never opened one).
    pub async fn end_current_session(&self) -> Result<Option<EnforcementSession>> {
        let Some(mut session) = self.db.get_open_session().await? else {
            return Ok(None);
        };

        let ended_at = Utc::now();
        let duration_ms = (ended_at - session.started_at).num_milliseconds().max(0) as u64;
        self.db
            .close_session(&session.id, ended_at, duration_ms)
            .await?;

        session.ended_at = Some(ended_at);
        session.duration_ms = duration_ms;
        Ok(Some(session))
    }

    /// Close any session left open by an earlier process death. Called on
    /// startup when persisted state says blocking is not active.
    pub async fn recover_dangling_session(&self) -> Result<()> {
        if let Some(session) = self.end_current_session().await? {
            warn!(
                "Recovered dangling enforcement session {}; closed with duration {}ms",
                session.id, session.duration_ms
            );
        }
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<EnforcementSession>> {
        self.db.list_sessions().await
    }

    /// Consecutive calendar days (UTC) with at least one session, counted
    /// back from `today`. A streak that ended yesterday still counts; one
    /// that ended earlier is over.
    pub async fn current_streak(&self, today: NaiveDate) -> Result<u32> {
        let sessions = self.db.list_sessions().await?;
        let days: HashSet<NaiveDate> = sessions
            .iter()
            .map(|session| session.started_at.date_naive())
            .collect();

        let mut cursor = if days.contains(&today) {
            today
        } else if days.contains(&(today - Duration::days(1))) {
            today - Duration::days(1)
        } else {
            return Ok(0);
        };

        let mut streak = 0u32;
        while days.contains(&cursor) {
            streak += 1;
            cursor -= Duration::days(1);
        }
        Ok(streak)
    }
}
