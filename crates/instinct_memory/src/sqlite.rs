use crate::events::{EventRecord, InstinctEvent, Snapshot};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use instinct_core::EmotionalState;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

/// SQLite backing for the per-context event log, its snapshots and the
/// emotional state row.
#[derive(Clone)]
pub struct SqliteInstinctLog {
    pool: Pool<Sqlite>,
}

impl SqliteInstinctLog {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let pool = if path.as_os_str() == ":memory:" {
            // Every connection to :memory: is a separate database, so keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .context("Failed to open in-memory SQLite database")?
        } else {
            let db_url = format!("sqlite://{}?mode=rwc", path.display());
            SqlitePoolOptions::new()
                .connect(&db_url)
                .await
                .context("Failed to connect to SQLite database")?
        };

        let log = Self { pool };
        log.migrate().await?;
        Ok(log)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instinct_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                event_json TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create instinct_events table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_instinct_events_context ON instinct_events(context_id, seq)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create instinct_events context index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instinct_snapshots (
                context_id TEXT PRIMARY KEY,
                last_seq INTEGER NOT NULL,
                snapshot_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create instinct_snapshots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emotional_states (
                context_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                entered_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create emotional_states table")?;

        Ok(())
    }

    // =========================================================================
    // Event log
    // =========================================================================

    /// Append events atomically. Returns the assigned sequence numbers in order.
    pub async fn append(
        &self,
        context_id: &str,
        events: &[InstinctEvent],
        recorded_at: DateTime<Utc>,
    ) -> Result<Vec<i64>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin event append transaction")?;

        let mut seqs = Vec::with_capacity(events.len());
        for event in events {
            let json = serde_json::to_string(event).context("Failed to serialize instinct event")?;
            let result = sqlx::query(
                "INSERT INTO instinct_events (context_id, event_type, event_json, recorded_at) VALUES (?, ?, ?, ?)",
            )
            .bind(context_id)
            .bind(event.event_type())
            .bind(&json)
            .bind(recorded_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to append {} event", event.event_type()))?;
            seqs.push(result.last_insert_rowid());
        }

        tx.commit().await.context("Failed to commit event append")?;
        Ok(seqs)
    }

    /// Events of a context with `seq > after`, in sequence order.
    pub async fn events_after(&self, context_id: &str, after: i64) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query(
            "SELECT seq, event_json, recorded_at FROM instinct_events WHERE context_id = ? AND seq > ? ORDER BY seq ASC",
        )
        .bind(context_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query instinct_events")?;

        rows.into_iter()
            .map(|row| {
                let seq: i64 = row.get("seq");
                let json: String = row.get("event_json");
                let event: InstinctEvent = serde_json::from_str(&json)
                    .with_context(|| format!("Failed to deserialize event seq {}", seq))?;
                Ok(EventRecord {
                    seq,
                    context_id: context_id.to_string(),
                    event,
                    recorded_at: millis_to_utc(row.get("recorded_at")),
                })
            })
            .collect()
    }

    pub async fn events(&self, context_id: &str) -> Result<Vec<EventRecord>> {
        self.events_after(context_id, 0).await
    }

    /// Every context that has at least one event.
    pub async fn contexts(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT context_id FROM instinct_events ORDER BY context_id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list contexts")?;
        Ok(rows.into_iter().map(|r| r.get("context_id")).collect())
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Load the compacted snapshot, or None if the context was never snapshotted.
    /// A row that fails to deserialize is an error; callers fall back to replay.
    pub async fn load_snapshot(&self, context_id: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query("SELECT snapshot_json FROM instinct_snapshots WHERE context_id = ?")
            .bind(context_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query instinct_snapshots")?;

        if let Some(row) = row {
            let json: String = row.get("snapshot_json");
            let snapshot: Snapshot =
                serde_json::from_str(&json).context("Failed to deserialize instinct snapshot")?;
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }

    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot).context("Failed to serialize instinct snapshot")?;
        let now = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO instinct_snapshots (context_id, last_seq, snapshot_json, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(context_id) DO UPDATE SET last_seq = excluded.last_seq, snapshot_json = excluded.snapshot_json, updated_at = excluded.updated_at",
        )
        .bind(&snapshot.context_id)
        .bind(snapshot.last_seq)
        .bind(&json)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save instinct snapshot")?;

        tracing::debug!(
            "Snapshot saved for '{}' at seq {} ({} instincts)",
            snapshot.context_id,
            snapshot.last_seq,
            snapshot.len()
        );
        Ok(())
    }

    // =========================================================================
    // Emotional state
    // =========================================================================

    pub async fn load_emotional_state(
        &self,
        context_id: &str,
    ) -> Result<Option<(EmotionalState, DateTime<Utc>)>> {
        let row = sqlx::query("SELECT state, entered_at FROM emotional_states WHERE context_id = ?")
            .bind(context_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query emotional_states")?;

        match row {
            Some(row) => {
                let raw: String = row.get("state");
                let state: EmotionalState = raw
                    .parse()
                    .with_context(|| format!("Stored emotional state '{}' is invalid", raw))?;
                Ok(Some((state, millis_to_utc(row.get("entered_at")))))
            }
            None => Ok(None),
        }
    }

    pub async fn save_emotional_state(
        &self,
        context_id: &str,
        state: EmotionalState,
        entered_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO emotional_states (context_id, state, entered_at) VALUES (?, ?, ?)
             ON CONFLICT(context_id) DO UPDATE SET state = excluded.state, entered_at = excluded.entered_at",
        )
        .bind(context_id)
        .bind(state.as_str())
        .bind(entered_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save emotional state")?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
