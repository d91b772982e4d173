//! Durable seeding state in SQLite.
//!
//! One row per (record id, provisional id). Provisional ids repeat between
//! generated records, so every handle is scoped to one record with
//! [`SeedStore::for_record`]. Every transition is a single autocommitted
//! statement, so progress survives a crash at any point. `claim` is the
//! only way into `in_flight` and is atomic, so two workers can never both
//! submit the same entity.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::plan::SeedPlan;
use crate::error::StoreError;
use crate::model::{EntityKind, PlatformId, ProvisionalId};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS seed_state (
    record_id       TEXT    NOT NULL,
    id              TEXT    NOT NULL,
    kind            TEXT    NOT NULL,
    status          TEXT    NOT NULL DEFAULT 'pending',
    platform_id     TEXT,
    error           TEXT,
    attempts        INTEGER NOT NULL DEFAULT 0,
    run_id          TEXT,
    created_at      TEXT    NOT NULL DEFAULT (datetime('now')),
    updated_at      TEXT    NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (record_id, id)
);

CREATE INDEX IF NOT EXISTS idx_seed_state_status ON seed_state(status);
"#;

/// State of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    InFlight,
    Created(PlatformId),
    Failed(String),
    /// Accepted by the platform without a readable id. Never claimed again;
    /// needs manual reconciliation.
    Unresolved(String),
}

impl EntryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::InFlight => "in_flight",
            EntryStatus::Created(_) => "created",
            EntryStatus::Failed(_) => "failed",
            EntryStatus::Unresolved(_) => "unresolved",
        }
    }

    pub fn platform_id(&self) -> Option<&PlatformId> {
        match self {
            EntryStatus::Created(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub id: ProvisionalId,
    pub kind: EntityKind,
    pub status: EntryStatus,
    pub attempts: u32,
}

/// Number of entries per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub pending: u64,
    pub in_flight: u64,
    pub created: u64,
    pub failed: u64,
    pub unresolved: u64,
}

impl StateCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.in_flight + self.created + self.failed + self.unresolved
    }
}

/// Handle on the state database. Each handle tags the entries it claims
/// with its own run id; entry operations see only the handle's record.
#[derive(Clone)]
pub struct SeedStore {
    pool: SqlitePool,
    run_id: Uuid,
    record_id: String,
}

impl std::fmt::Debug for SeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedStore")
            .field("run_id", &self.run_id)
            .field("record_id", &self.record_id)
            .finish_non_exhaustive()
    }
}

impl SeedStore {
    /// Open (or create) the store and recover entries a crashed run left
    /// `in_flight`: they go back to `pending`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        let recovered = sqlx::query(
            "UPDATE seed_state SET status = 'pending', updated_at = datetime('now')
             WHERE status = 'in_flight'",
        )
        .execute(&pool)
        .await?
        .rows_affected();

        if recovered > 0 {
            tracing::warn!(
                recovered,
                "Reset entries left in flight by an interrupted run"
            );
        }
        let run_id = Uuid::new_v4();
        tracing::info!(path = %path.display(), run_id = %run_id, "Seeding state opened");
        Ok(Self {
            pool,
            run_id,
            record_id: String::new(),
        })
    }

    /// Handle on the same database scoped to the entries of `record_id`.
    pub fn for_record(&self, record_id: &str) -> Self {
        Self {
            record_id: record_id.to_string(),
            ..self.clone()
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Record every plan entity as `pending` unless it is already known.
    pub async fn register(&self, plan: &SeedPlan) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for node in plan.nodes() {
            sqlx::query(
                "INSERT OR IGNORE INTO seed_state (record_id, id, kind) VALUES (?1, ?2, ?3)",
            )
            .bind(&self.record_id)
            .bind(node.id.as_str())
            .bind(node.kind.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Atomically move an entity from pending, failed or absent to
    /// `in_flight`. Returns false when it is created, unresolved or already
    /// claimed.
    pub async fn claim(&self, id: &ProvisionalId, kind: EntityKind) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO seed_state (record_id, id, kind, status, attempts, run_id)
            VALUES (?4, ?1, ?2, 'in_flight', 1, ?3)
            ON CONFLICT(record_id, id) DO UPDATE SET
                status = 'in_flight',
                error = NULL,
                attempts = seed_state.attempts + 1,
                run_id = excluded.run_id,
                updated_at = datetime('now')
            WHERE seed_state.status IN ('pending', 'failed')
            "#,
        )
        .bind(id.as_str())
        .bind(kind.as_str())
        .bind(self.run_id.to_string())
        .bind(&self.record_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_created(
        &self,
        id: &ProvisionalId,
        platform_id: &PlatformId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE seed_state SET status = 'created', platform_id = ?2, error = NULL,
             updated_at = datetime('now') WHERE record_id = ?3 AND id = ?1",
        )
        .bind(id.as_str())
        .bind(platform_id.as_str())
        .bind(&self.record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: &ProvisionalId, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE seed_state SET status = 'failed', error = ?2,
             updated_at = datetime('now') WHERE record_id = ?3 AND id = ?1",
        )
        .bind(id.as_str())
        .bind(error)
        .bind(&self.record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Park an entity the platform accepted without a readable id.
    pub async fn mark_unresolved(
        &self,
        id: &ProvisionalId,
        detail: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE seed_state SET status = 'unresolved', error = ?2,
             updated_at = datetime('now') WHERE record_id = ?3 AND id = ?1",
        )
        .bind(id.as_str())
        .bind(detail)
        .bind(&self.record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Give a claim back without an outcome.
    pub async fn release(&self, id: &ProvisionalId) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE seed_state SET status = 'pending', updated_at = datetime('now')
             WHERE record_id = ?2 AND id = ?1 AND status = 'in_flight'",
        )
        .bind(id.as_str())
        .bind(&self.record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn status(&self, id: &ProvisionalId) -> Result<Option<EntryStatus>, StoreError> {
        let row = sqlx::query("SELECT * FROM seed_state WHERE record_id = ?2 AND id = ?1")
            .bind(id.as_str())
            .bind(&self.record_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| decode_entry(&r).map(|e| e.status)).transpose()
    }

    pub async fn snapshot(&self) -> Result<HashMap<ProvisionalId, SeedEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM seed_state WHERE record_id = ?1")
            .bind(&self.record_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| decode_entry(r).map(|e| (e.id.clone(), e)))
            .collect()
    }

    /// Entry counts across every record in the database.
    pub async fn counts(&self) -> Result<StateCounts, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM seed_state GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StateCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let n = row.get::<i64, _>("n") as u64;
            match status.as_str() {
                "pending" => counts.pending = n,
                "in_flight" => counts.in_flight = n,
                "created" => counts.created = n,
                "failed" => counts.failed = n,
                "unresolved" => counts.unresolved = n,
                other => {
                    return Err(StoreError::Corrupt {
                        id: "*".to_string(),
                        reason: format!("unknown status '{other}'"),
                    })
                }
            }
        }
        Ok(counts)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_entry(row: &sqlx::sqlite::SqliteRow) -> Result<SeedEntry, StoreError> {
    let id: String = row.get("id");
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let platform_id: Option<String> = row.get("platform_id");
    let error: Option<String> = row.get("error");

    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };

    let kind = EntityKind::parse(&kind).ok_or_else(|| corrupt(format!("unknown kind '{kind}'")))?;
    let status = match status.as_str() {
        "pending" => EntryStatus::Pending,
        "in_flight" => EntryStatus::InFlight,
        "created" => EntryStatus::Created(PlatformId(
            platform_id.ok_or_else(|| corrupt("created without platform id".to_string()))?,
        )),
        "failed" => EntryStatus::Failed(error.unwrap_or_default()),
        "unresolved" => EntryStatus::Unresolved(error.unwrap_or_default()),
        other => return Err(corrupt(format!("unknown status '{other}'"))),
    };

    Ok(SeedEntry {
        id: ProvisionalId(id),
        kind,
        status,
        attempts: row.get::<i64, _>("attempts") as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::sample_record;

    async fn open_temp() -> (tempfile::TempDir, SeedStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SeedStore::open(dir.path().join("state.db")).await.unwrap();
        (dir, store)
    }

    fn id(s: &str) -> ProvisionalId {
        ProvisionalId::new(s)
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let (_dir, store) = open_temp().await;

        assert!(store.claim(&id("ws"), EntityKind::Workspace).await.unwrap());
        assert!(!store.claim(&id("ws"), EntityKind::Workspace).await.unwrap());
        assert_eq!(
            store.status(&id("ws")).await.unwrap(),
            Some(EntryStatus::InFlight)
        );
    }

    #[tokio::test]
    async fn test_created_entries_cannot_be_claimed() {
        let (_dir, store) = open_temp().await;
        let ws = id("ws");

        store.claim(&ws, EntityKind::Workspace).await.unwrap();
        store
            .mark_created(&ws, &PlatformId("p1".to_string()))
            .await
            .unwrap();

        assert!(!store.claim(&ws, EntityKind::Workspace).await.unwrap());
        let status = store.status(&ws).await.unwrap().unwrap();
        assert_eq!(status.platform_id().unwrap().as_str(), "p1");
    }

    #[tokio::test]
    async fn test_failed_entries_are_reclaimable() {
        let (_dir, store) = open_temp().await;
        let ws = id("ws");

        store.claim(&ws, EntityKind::Workspace).await.unwrap();
        store.mark_failed(&ws, "API error (400): bad").await.unwrap();
        assert_eq!(
            store.status(&ws).await.unwrap(),
            Some(EntryStatus::Failed("API error (400): bad".to_string()))
        );

        assert!(store.claim(&ws, EntityKind::Workspace).await.unwrap());
        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot[&ws].attempts, 2);
    }

    #[tokio::test]
    async fn test_unresolved_entries_are_never_reclaimed() {
        let (_dir, store) = open_temp().await;
        let ws = id("ws");

        store.claim(&ws, EntityKind::Workspace).await.unwrap();
        store.mark_unresolved(&ws, "201 without id").await.unwrap();

        assert!(!store.claim(&ws, EntityKind::Workspace).await.unwrap());
        assert_eq!(
            store.status(&ws).await.unwrap(),
            Some(EntryStatus::Unresolved("201 without id".to_string()))
        );
        assert_eq!(store.counts().await.unwrap().unresolved, 1);
    }

    #[tokio::test]
    async fn test_records_do_not_share_entries() {
        let (_dir, store) = open_temp().await;
        let first = store.for_record("rec-a");
        let second = store.for_record("rec-b");
        let ws = id("ws");

        first.claim(&ws, EntityKind::Workspace).await.unwrap();
        first
            .mark_created(&ws, &PlatformId("p1".to_string()))
            .await
            .unwrap();

        assert_eq!(second.status(&ws).await.unwrap(), None);
        assert!(second.claim(&ws, EntityKind::Workspace).await.unwrap());
        assert!(second.snapshot().await.unwrap()[&ws].status == EntryStatus::InFlight);
        assert!(matches!(
            first.status(&ws).await.unwrap(),
            Some(EntryStatus::Created(_))
        ));
        assert_eq!(store.counts().await.unwrap().total(), 2);
    }

    #[tokio::test]
    async fn test_release_returns_to_pending() {
        let (_dir, store) = open_temp().await;
        let ws = id("ws");

        store.claim(&ws, EntityKind::Workspace).await.unwrap();
        store.release(&ws).await.unwrap();
        assert_eq!(store.status(&ws).await.unwrap(), Some(EntryStatus::Pending));
    }

    #[tokio::test]
    async fn test_state_survives_reopen_and_in_flight_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = SeedStore::open(&path).await.unwrap();
            store.claim(&id("ws"), EntityKind::Workspace).await.unwrap();
            store
                .mark_created(&id("ws"), &PlatformId("p1".to_string()))
                .await
                .unwrap();
            store
                .claim(&id("ws/survey-0"), EntityKind::Survey)
                .await
                .unwrap();
            store.close().await;
        }

        let store = SeedStore::open(&path).await.unwrap();
        assert!(matches!(
            store.status(&id("ws")).await.unwrap(),
            Some(EntryStatus::Created(_))
        ));
        assert_eq!(
            store.status(&id("ws/survey-0")).await.unwrap(),
            Some(EntryStatus::Pending)
        );
    }

    #[tokio::test]
    async fn test_register_and_counts() {
        let (_dir, store) = open_temp().await;
        let plan = SeedPlan::from_record(&sample_record());

        store.register(&plan).await.unwrap();
        store.claim(&id("ws"), EntityKind::Workspace).await.unwrap();
        store
            .mark_created(&id("ws"), &PlatformId("p1".to_string()))
            .await
            .unwrap();
        store.register(&plan).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.total(), plan.len() as u64);
        assert_eq!(counts.created, 1);
        assert_eq!(counts.pending, plan.len() as u64 - 1);
        assert_eq!(store.status(&id("nope")).await.unwrap(), None);
    }
}
