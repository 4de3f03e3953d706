//! SQLite persistence for enforcement-session records.
//!
//! A single worker thread owns the connection; callers submit closures
//! over an mpsc channel and await the reply on a oneshot. This serializes
//! all database access without holding any lock across an await.

use std::{
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;

use crate::models::EnforcementSession;
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("value {value} is negative"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn session_from_row(row: &rusqlite::Row<'_>) -> Result<EnforcementSession> {
    Ok(EnforcementSession {
        id: row.get::<_, String>(0)?,
        started_at: parse_datetime(&row.get::<_, String>(1)?)?,
        ended_at: row
            .get::<_, Option<String>>(2)?
            .map(|s| parse_datetime(&s))
            .transpose()?,
        duration_ms: to_u64(row.get::<_, i64>(3)?)?,
        blocked_app_count: u32::try_from(row.get::<_, i64>(4)?)
            .map_err(|_| anyhow!("blocked_app_count out of range"))?,
    })
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("appfence-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn insert_session(&self, session: &EnforcementSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO enforcement_sessions (id, started_at, ended_at, duration_ms, blocked_app_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    to_i64(record.duration_ms)?,
                    i64::from(record.blocked_app_count),
                ],
            )
            .with_context(|| "failed to insert enforcement session")?;
            Ok(())
        })
        .await
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE enforcement_sessions
                 SET ended_at = ?1,
                     duration_ms = ?2
                 WHERE id = ?3 AND ended_at IS NULL",
                params![ended_at.to_rfc3339(), to_i64(duration_ms)?, session_id],
            )
            .with_context(|| "failed to close enforcement session")?;
            Ok(())
        })
        .await
    }

    /// Most recent session that has not been closed yet, if any.
    pub async fn get_open_session(&self) -> Result<Option<EnforcementSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, started_at, ended_at, duration_ms, blocked_app_count
                 FROM enforcement_sessions
                 WHERE ended_at IS NULL
                 ORDER BY started_at DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query([])?;
            match rows.next()? {
                Some(row) => Ok(Some(session_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// All sessions, newest first, for downstream statistics.
    pub async fn list_sessions(&self) -> Result<Vec<EnforcementSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, started_at, ended_at, duration_ms, blocked_app_count
                 FROM enforcement_sessions
                 ORDER BY started_at DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(session_from_row(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(id: &str, started_at: &str, count: u32) -> EnforcementSession {
        EnforcementSession {
            id: id.to_string(),
            started_at: parse_datetime(started_at).unwrap(),
            ended_at: None,
            duration_ms: 0,
            blocked_app_count: count,
        }
    }

    #[tokio::test]
    async fn insert_close_and_list() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("appfence.sqlite3")).unwrap();

        db.insert_session(&session("s1", "2026-08-28T09:00:00Z", 2))
            .await
            .unwrap();
        db.insert_session(&session("s2", "2026-08-29T09:00:00Z", 4))
            .await
            .unwrap();

        let open = db.get_open_session().await.unwrap().unwrap();
        assert_eq!(open.id, "s2");

        let ended_at = parse_datetime("2026-08-29T10:30:00Z").unwrap();
        db.close_session("s2", ended_at, 5_400_000).await.unwrap();

        let open = db.get_open_session().await.unwrap().unwrap();
        assert_eq!(open.id, "s1");

        let sessions = db.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "s2");
        assert_eq!(sessions[0].ended_at, Some(ended_at));
        assert_eq!(sessions[0].duration_ms, 5_400_000);
        assert!(sessions[1].is_open());
    }

    #[tokio::test]
    async fn closing_a_closed_session_does_not_mutate_it() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("appfence.sqlite3")).unwrap();

        db.insert_session(&session("s1", "2026-08-29T09:00:00Z", 1))
            .await
            .unwrap();
        let first_end = parse_datetime("2026-08-29T09:30:00Z").unwrap();
        db.close_session("s1", first_end, 1_800_000).await.unwrap();

        let later = parse_datetime("2026-08-29T11:00:00Z").unwrap();
        db.close_session("s1", later, 7_200_000).await.unwrap();

        let sessions = db.list_sessions().await.unwrap();
        assert_eq!(sessions[0].ended_at, Some(first_end));
        assert_eq!(sessions[0].duration_ms, 1_800_000);
    }
}
