//! SQLite settings store
//!
//! Persists settings, last known status and history in a local SQLite file.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Background writes do not block foreground reads
//! - **Migrations**: Automatic schema versioning with sqlx
//! - **Atomic history appends**: insert and prune run in one transaction

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::ServerStatus;
use crate::config::ResourceSettings;

use super::backend::SettingsStore;
use super::error::{StorageError, StorageResult};
use super::history::{self, HistoryEvent, MAX_EVENTS, Severity};

/// SQLite settings store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (and create if missing) the database and run migrations
    ///
    /// ```no_run
    /// # use vps_watch::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./vps-watch.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref().to_string_lossy().to_string();

        info!("opening SQLite settings store at: {}", db_path);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn settings(&self, server_id: &str) -> StorageResult<ResourceSettings> {
        let row = sqlx::query("SELECT settings FROM resource_settings WHERE server_id = ?")
            .bind(server_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.try_get("settings")?;
                Ok(serde_json::from_str(&json)?)
            }
            None => Ok(ResourceSettings::default()),
        }
    }

    #[instrument(skip(self, settings))]
    async fn save_settings(
        &self,
        server_id: &str,
        settings: &ResourceSettings,
    ) -> StorageResult<()> {
        if *settings == ResourceSettings::default() {
            debug!("settings back to defaults, removing record");
            sqlx::query("DELETE FROM resource_settings WHERE server_id = ?")
                .bind(server_id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }

        let json = serde_json::to_string(settings)?;
        sqlx::query(
            r#"
            INSERT INTO resource_settings (server_id, settings, monitored, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (server_id) DO UPDATE SET
                settings = excluded.settings,
                monitored = excluded.monitored,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(server_id)
        .bind(json)
        .bind(settings.is_monitored())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn monitored_ids(&self) -> StorageResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT server_id FROM resource_settings WHERE monitored = 1 ORDER BY server_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("server_id").map_err(StorageError::from))
            .collect()
    }

    async fn last_status(&self, server_id: &str) -> StorageResult<Option<ServerStatus>> {
        let row = sqlx::query("SELECT status FROM last_status WHERE server_id = ?")
            .bind(server_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        Ok(status.parse().ok())
    }

    async fn set_last_status(&self, server_id: &str, status: ServerStatus) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO last_status (server_id, status, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (server_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(server_id)
        .bind(status.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, event), fields(severity = %event.severity))]
    async fn append_history(&self, server_id: &str, event: HistoryEvent) -> StorageResult<()> {
        let cutoff = history::cutoff(Utc::now()).timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO history (server_id, timestamp, message, severity) VALUES (?, ?, ?, ?)",
        )
        .bind(server_id)
        .bind(event.timestamp.timestamp_millis())
        .bind(&event.message)
        .bind(event.severity.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM history WHERE server_id = ? AND timestamp <= ?")
            .bind(server_id)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM history
            WHERE server_id = ?
              AND id NOT IN (
                  SELECT id FROM history WHERE server_id = ? ORDER BY id DESC LIMIT ?
              )
            "#,
        )
        .bind(server_id)
        .bind(server_id)
        .bind(MAX_EVENTS as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn history(&self, server_id: &str) -> StorageResult<Vec<HistoryEvent>> {
        let cutoff = history::cutoff(Utc::now()).timestamp_millis();
        let rows = sqlx::query(
            r#"
            SELECT timestamp, message, severity
            FROM history
            WHERE server_id = ? AND timestamp > ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(server_id)
        .bind(cutoff)
        .bind(MAX_EVENTS as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let severity: String = row.try_get("severity")?;
            let severity = match severity.parse::<Severity>() {
                Ok(severity) => severity,
                Err(e) => {
                    warn!("{server_id}: {e}, treating as info");
                    Severity::Info
                }
            };
            events.push(HistoryEvent {
                timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
                message: row.try_get("message")?,
                severity,
            });
        }
        Ok(events)
    }

    async fn clear_history(&self, server_id: &str) -> StorageResult<()> {
        let deleted = sqlx::query("DELETE FROM history WHERE server_id = ?")
            .bind(server_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        debug!("{server_id}: cleared {deleted} history events");
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
