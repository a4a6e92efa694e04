//! C4: durable services + snapshot history + approval status.
//!
//! Grounded on `original_source/mcp_guardian/app/db.py` and `models.py` for
//! table shape, and on `sl224-casparianflow`'s `crates/casparian_backtest`/
//! `crates/casparian_schema` for genuine `sqlx` + `sqlite` usage in the
//! retrieved pack (the teacher SDK itself has no persistence layer). Every
//! compound mutation spec.md §4.4 names runs inside one `sqlx::Transaction`.

pub mod models;

use std::str::FromStr;

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::core::error::{GuardianError, GuardianResult};
use models::{ApprovalStatus, Service, ServicePatch, SnapshotRow, SnapshotRowRaw};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS services (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    upstream_url TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 0,
    check_frequency_minutes INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_id INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    snapshot_json TEXT NOT NULL,
    snapshot_hash TEXT NOT NULL,
    approved_status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_service_id ON snapshots(service_id);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    details_json TEXT
);
"#;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> GuardianResult<Self> {
        // `create_if_missing` so a fresh install's configured path doesn't
        // need a `?mode=rwc` suffix to come up; `foreign_keys` is set on the
        // connect options (not a one-shot PRAGMA) because it's a
        // per-connection setting and the pool recycles connections under it.
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            // Single-writer assumption (spec.md §1 Non-goals, §5): one
            // connection avoids `SQLITE_BUSY` under concurrent writers
            // without needing WAL-mode tuning.
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> GuardianResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn service_from_row(row: &sqlx::sqlite::SqliteRow) -> GuardianResult<Service> {
        Ok(Service {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            upstream_url: row.try_get("upstream_url")?,
            enabled: row.try_get::<i64, _>("enabled")? != 0,
            check_frequency_minutes: row.try_get("check_frequency_minutes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// `create_service(cfg, initial_snapshot)`: insert service + one snapshot
    /// marked `USER_APPROVED`, atomically. Fails with `Conflict` if the name
    /// collides.
    pub async fn create_service(
        &self,
        name: &str,
        upstream_url: &str,
        check_frequency_minutes: i64,
        snapshot_json: &str,
        snapshot_hash: &str,
    ) -> GuardianResult<Service> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM services WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(GuardianError::conflict(format!(
                "service {name:?} already exists"
            )));
        }

        let service_id: i64 = sqlx::query_scalar(
            "INSERT INTO services (name, upstream_url, enabled, check_frequency_minutes, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?4, ?4) RETURNING id",
        )
        .bind(name)
        .bind(upstream_url)
        .bind(check_frequency_minutes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO snapshots (service_id, snapshot_json, snapshot_hash, approved_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(service_id)
        .bind(snapshot_json)
        .bind(snapshot_hash)
        .bind(ApprovalStatus::UserApproved.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT * FROM services WHERE id = ?1")
            .bind(service_id)
            .fetch_one(&mut *tx)
            .await?;
        let service = Self::service_from_row(&row)?;

        tx.commit().await?;
        Ok(service)
    }

    pub async fn get_service(&self, name: &str) -> GuardianResult<Service> {
        let row = sqlx::query("SELECT * FROM services WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| GuardianError::not_found(format!("service {name:?}")))?;
        Self::service_from_row(&row)
    }

    pub async fn list_services(&self) -> GuardianResult<Vec<Service>> {
        let rows = sqlx::query("SELECT * FROM services ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::service_from_row).collect()
    }

    /// Services eligible for a scheduler tick: enabled and
    /// `check_frequency_minutes > 0` (spec.md §4.6 step 1).
    pub async fn list_checkable_services(&self) -> GuardianResult<Vec<Service>> {
        let rows = sqlx::query(
            "SELECT * FROM services WHERE enabled = 1 AND check_frequency_minutes > 0 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::service_from_row).collect()
    }

    /// `update_service(name, patch)`. If `fresh_snapshot` is `Some`, the
    /// caller has already detected an `upstream_url` change and taken a new
    /// snapshot *before* calling this (network I/O never happens inside this
    /// transaction, per spec.md §5) — it is persisted as `UNAPPROVED` and
    /// `enabled` is forced to `false` in the same transaction as the URL
    /// update, regardless of what `patch.enabled` asked for.
    pub async fn update_service(
        &self,
        name: &str,
        patch: ServicePatch,
        fresh_snapshot: Option<(String, String)>,
    ) -> GuardianResult<Service> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let service_id: i64 = sqlx::query_scalar("SELECT id FROM services WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| GuardianError::not_found(format!("service {name:?}")))?;

        if let Some(url) = &patch.upstream_url {
            sqlx::query("UPDATE services SET upstream_url = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(url)
                .bind(now)
                .bind(service_id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(minutes) = patch.check_frequency_minutes {
            sqlx::query(
                "UPDATE services SET check_frequency_minutes = ?1, updated_at = ?2 WHERE id = ?3",
            )
            .bind(minutes)
            .bind(now)
            .bind(service_id)
            .execute(&mut *tx)
            .await?;
        }

        if let Some((snapshot_json, snapshot_hash)) = fresh_snapshot {
            sqlx::query(
                "INSERT INTO snapshots (service_id, snapshot_json, snapshot_hash, approved_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(service_id)
            .bind(snapshot_json)
            .bind(snapshot_hash)
            .bind(ApprovalStatus::Unapproved.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE services SET enabled = 0, updated_at = ?1 WHERE id = ?2")
                .bind(now)
                .bind(service_id)
                .execute(&mut *tx)
                .await?;
        } else if let Some(enabled) = patch.enabled {
            sqlx::query("UPDATE services SET enabled = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(enabled)
                .bind(now)
                .bind(service_id)
                .execute(&mut *tx)
                .await?;
        }

        let row = sqlx::query("SELECT * FROM services WHERE id = ?1")
            .bind(service_id)
            .fetch_one(&mut *tx)
            .await?;
        let service = Self::service_from_row(&row)?;

        tx.commit().await?;
        Ok(service)
    }

    pub async fn delete_service(&self, name: &str) -> GuardianResult<()> {
        let result = sqlx::query("DELETE FROM services WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(GuardianError::not_found(format!("service {name:?}")));
        }
        Ok(())
    }

    fn raw_to_snapshot(raw: SnapshotRowRaw) -> GuardianResult<SnapshotRow> {
        raw.try_into()
    }

    pub async fn latest_snapshot(&self, service_id: i64) -> GuardianResult<Option<SnapshotRow>> {
        let raw: Option<SnapshotRowRaw> = sqlx::query_as(
            "SELECT id, service_id, snapshot_json, snapshot_hash, approved_status, created_at
             FROM snapshots WHERE service_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;
        raw.map(Self::raw_to_snapshot).transpose()
    }

    /// Latest row whose status is in `{USER_APPROVED, SYSTEM_APPROVED}`.
    pub async fn latest_approved_snapshot(
        &self,
        service_id: i64,
    ) -> GuardianResult<Option<SnapshotRow>> {
        let raw: Option<SnapshotRowRaw> = sqlx::query_as(
            "SELECT id, service_id, snapshot_json, snapshot_hash, approved_status, created_at
             FROM snapshots
             WHERE service_id = ?1 AND approved_status IN ('user_approved', 'system_approved')
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;
        raw.map(Self::raw_to_snapshot).transpose()
    }

    pub async fn list_snapshots(&self, service_id: i64) -> GuardianResult<Vec<SnapshotRow>> {
        let raws: Vec<SnapshotRowRaw> = sqlx::query_as(
            "SELECT id, service_id, snapshot_json, snapshot_hash, approved_status, created_at
             FROM snapshots WHERE service_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;
        raws.into_iter().map(Self::raw_to_snapshot).collect()
    }

    pub async fn get_snapshot(&self, service_id: i64, snapshot_id: i64) -> GuardianResult<SnapshotRow> {
        let raw: SnapshotRowRaw = sqlx::query_as(
            "SELECT id, service_id, snapshot_json, snapshot_hash, approved_status, created_at
             FROM snapshots WHERE id = ?1 AND service_id = ?2",
        )
        .bind(snapshot_id)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| GuardianError::not_found(format!("snapshot {snapshot_id}")))?;
        Self::raw_to_snapshot(raw)
    }

    /// Monotonic insert: history is never elided (spec.md §4.6), even when a
    /// check finds no change.
    pub async fn append_snapshot(
        &self,
        service_id: i64,
        snapshot_json: &str,
        snapshot_hash: &str,
        status: ApprovalStatus,
    ) -> GuardianResult<SnapshotRow> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO snapshots (service_id, snapshot_json, snapshot_hash, approved_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
        )
        .bind(service_id)
        .bind(snapshot_json)
        .bind(snapshot_hash)
        .bind(status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(SnapshotRow {
            id,
            service_id,
            snapshot_json: snapshot_json.to_string(),
            snapshot_hash: snapshot_hash.to_string(),
            approved_status: status,
            created_at: now,
        })
    }

    /// C6's atomic write: persist the fresh snapshot at `status` and apply
    /// `enabled` to the owning service, in one transaction (spec.md §4.6
    /// step 3 and the approval-decision table).
    pub async fn apply_check_result(
        &self,
        service_id: i64,
        snapshot_json: &str,
        snapshot_hash: &str,
        status: ApprovalStatus,
        enabled: bool,
    ) -> GuardianResult<SnapshotRow> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO snapshots (service_id, snapshot_json, snapshot_hash, approved_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
        )
        .bind(service_id)
        .bind(snapshot_json)
        .bind(snapshot_hash)
        .bind(status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE services SET enabled = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(enabled)
            .bind(now)
            .bind(service_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(SnapshotRow {
            id,
            service_id,
            snapshot_json: snapshot_json.to_string(),
            snapshot_hash: snapshot_hash.to_string(),
            approved_status: status,
            created_at: now,
        })
    }

    /// `approve_latest(name)`: promote the latest snapshot to
    /// `USER_APPROVED` and set `enabled = true`, atomically. Idempotent if
    /// the latest snapshot is already `USER_APPROVED`.
    pub async fn approve_latest(&self, name: &str) -> GuardianResult<Service> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let service_id: i64 = sqlx::query_scalar("SELECT id FROM services WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| GuardianError::not_found(format!("service {name:?}")))?;

        let latest_id: i64 = sqlx::query_scalar(
            "SELECT id FROM snapshots WHERE service_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(service_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| GuardianError::not_found(format!("no snapshots for service {name:?}")))?;

        sqlx::query("UPDATE snapshots SET approved_status = ?1 WHERE id = ?2")
            .bind(ApprovalStatus::UserApproved.as_str())
            .bind(latest_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE services SET enabled = 1, updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(service_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT * FROM services WHERE id = ?1")
            .bind(service_id)
            .fetch_one(&mut *tx)
            .await?;
        let service = Self::service_from_row(&row)?;

        tx.commit().await?;
        Ok(service)
    }

    /// Best-effort, non-blocking audit trail (spec.md §6's optional
    /// `audit_log`). Failures are logged and swallowed — no invariant reads
    /// this table back, so it must never fail the caller's primary mutation.
    pub async fn insert_audit_log(&self, actor: &str, action: &str, details: &Value) {
        let details_json = details.to_string();
        let result = sqlx::query(
            "INSERT INTO audit_log (timestamp, actor, action, details_json) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(Utc::now())
        .bind(actor)
        .bind(action)
        .bind(details_json)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            tracing::warn!(target: "mcp_guardian::store", error = %err, "audit log insert failed (non-blocking)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_service_persists_a_user_approved_first_snapshot() {
        let store = test_store().await;
        let service = store
            .create_service("fs", "http://upstream/fs", 5, "{}", "deadbeef")
            .await
            .unwrap();
        assert!(service.enabled);

        let latest = store.latest_snapshot(service.id).await.unwrap().unwrap();
        assert_eq!(latest.approved_status, ApprovalStatus::UserApproved);
        assert_eq!(latest.snapshot_hash, "deadbeef");
    }

    #[tokio::test]
    async fn duplicate_service_name_conflicts() {
        let store = test_store().await;
        store
            .create_service("fs", "http://upstream/fs", 5, "{}", "h0")
            .await
            .unwrap();
        let err = store
            .create_service("fs", "http://upstream/other", 5, "{}", "h1")
            .await
            .unwrap_err();
        assert!(matches!(err, GuardianError::Conflict(_)));
    }

    #[tokio::test]
    async fn url_change_forces_disable_and_unapproved_snapshot() {
        let store = test_store().await;
        let service = store
            .create_service("fs", "http://u1", 5, "{}", "h0")
            .await
            .unwrap();

        let patch = ServicePatch {
            upstream_url: Some("http://u2".to_string()),
            ..Default::default()
        };
        let updated = store
            .update_service("fs", patch, Some(("{}".to_string(), "h0".to_string())))
            .await
            .unwrap();

        assert!(!updated.enabled);
        assert_eq!(updated.upstream_url, "http://u2");

        let latest = store.latest_snapshot(service.id).await.unwrap().unwrap();
        assert_eq!(latest.approved_status, ApprovalStatus::Unapproved);
    }

    #[tokio::test]
    async fn approve_latest_promotes_and_enables() {
        let store = test_store().await;
        store
            .create_service("fs", "http://u1", 5, "{}", "h0")
            .await
            .unwrap();
        store
            .update_service(
                "fs",
                ServicePatch::default(),
                Some(("{}".to_string(), "h1".to_string())),
            )
            .await
            .unwrap();

        let service = store.approve_latest("fs").await.unwrap();
        assert!(service.enabled);

        let latest = store.latest_snapshot(service.id).await.unwrap().unwrap();
        assert_eq!(latest.approved_status, ApprovalStatus::UserApproved);
    }

    #[tokio::test]
    async fn delete_service_cascades_snapshots() {
        let store = test_store().await;
        let service = store
            .create_service("fs", "http://u1", 5, "{}", "h0")
            .await
            .unwrap();
        store.delete_service("fs").await.unwrap();

        let snapshots = store.list_snapshots(service.id).await.unwrap();
        assert!(snapshots.is_empty());
        assert!(store.get_service("fs").await.is_err());
    }

    #[tokio::test]
    async fn audit_log_failure_does_not_propagate() {
        let store = test_store().await;
        // No service row required for this to succeed; it's a fire-and-forget insert.
        store
            .insert_audit_log("system", "service_created", &json!({"name": "fs"}))
            .await;
    }
}
