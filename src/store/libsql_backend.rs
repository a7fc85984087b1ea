//! libSQL backend — async `Database` and `RoleDirectory` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::model::{ProgressRow, Role, RoleAssignment, RoleCategory};
use crate::store::migrations;
use crate::store::traits::{Database, RoleDirectory, StaleCursor};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ndt.and_utc());
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(ndt.and_utc());
    }
    Err(DatabaseError::Serialization(format!("invalid timestamp: {s}")))
}

/// Map a libsql error, flagging lock/busy conditions as transient.
fn query_error(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("database is locked") || lower.contains("busy") {
        DatabaseError::Unavailable(format!("{op}: {msg}"))
    } else if lower.contains("constraint") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("invalid uuid {s}: {e}")))
}

const PROGRESS_COLUMNS: &str =
    "user_id, flow_kind, stage, current_step, total_steps, completed_steps, status, last_activity";

/// Map a libsql Row to a ProgressRow.
///
/// Column order matches PROGRESS_COLUMNS.
fn row_to_progress(row: &libsql::Row) -> Result<ProgressRow, DatabaseError> {
    let get_err = |e: libsql::Error| DatabaseError::Query(format!("progress row parse: {e}"));

    let completed_json: String = row.get(5).map_err(get_err)?;
    let completed_steps: Vec<String> = serde_json::from_str(&completed_json)
        .map_err(|e| DatabaseError::Serialization(format!("completed_steps: {e}")))?;
    let last_activity: String = row.get(7).map_err(get_err)?;

    Ok(ProgressRow {
        user_id: row.get(0).map_err(get_err)?,
        flow_kind: row.get(1).map_err(get_err)?,
        stage: row.get(2).map_err(get_err)?,
        current_step: row.get(3).map_err(get_err)?,
        total_steps: row.get(4).map_err(get_err)?,
        completed_steps,
        status: row.get(6).map_err(get_err)?,
        last_activity: parse_datetime(&last_activity)?,
    })
}

fn completed_steps_json(row: &ProgressRow) -> Result<String, DatabaseError> {
    serde_json::to_string(&row.completed_steps)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn get_progress(&self, user_id: &str) -> Result<Option<ProgressRow>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {PROGRESS_COLUMNS} FROM onboarding_progress WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| query_error("get_progress", e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_progress(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(query_error("get_progress", e)),
        }
    }

    async fn insert_progress_if_absent(
        &self,
        row: &ProgressRow,
    ) -> Result<ProgressRow, DatabaseError> {
        let conn = self.conn();
        let now = format_datetime(&Utc::now());
        let inserted = conn
            .execute(
                "INSERT INTO onboarding_progress (user_id, flow_kind, stage, current_step, total_steps, completed_steps, status, last_activity, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT (user_id) DO NOTHING",
                params![
                    row.user_id.as_str(),
                    row.flow_kind.as_str(),
                    row.stage.as_str(),
                    row.current_step,
                    row.total_steps,
                    completed_steps_json(row)?,
                    row.status.as_str(),
                    format_datetime(&row.last_activity),
                    now,
                ],
            )
            .await
            .map_err(|e| query_error("insert_progress_if_absent", e))?;

        if inserted > 0 {
            debug!(user_id = %row.user_id, flow_kind = %row.flow_kind, "Progress row created");
        }

        self.get_progress(&row.user_id).await?.ok_or_else(|| {
            DatabaseError::Query(format!(
                "insert_progress_if_absent: row for {} missing after insert",
                row.user_id
            ))
        })
    }

    async fn update_progress_if_current(&self, row: &ProgressRow) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let now = format_datetime(&Utc::now());
        let count = conn
            .execute(
                "UPDATE onboarding_progress
                 SET stage = ?3, current_step = ?4, total_steps = ?5, completed_steps = ?6,
                     status = ?7, last_activity = ?8, updated_at = ?9
                 WHERE user_id = ?1 AND flow_kind = ?2 AND current_step <= ?4",
                params![
                    row.user_id.as_str(),
                    row.flow_kind.as_str(),
                    row.stage.as_str(),
                    row.current_step,
                    row.total_steps,
                    completed_steps_json(row)?,
                    row.status.as_str(),
                    format_datetime(&row.last_activity),
                    now,
                ],
            )
            .await
            .map_err(|e| query_error("update_progress_if_current", e))?;

        debug!(
            user_id = %row.user_id,
            stage = %row.stage,
            step = row.current_step,
            applied = count > 0,
            "Progress update"
        );
        Ok(count > 0)
    }

    async fn list_stale_progress(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<&StaleCursor>,
        limit: usize,
    ) -> Result<Vec<ProgressRow>, DatabaseError> {
        let conn = self.conn();
        // Empty strings sort before every stored value, so no cursor means from the start.
        let (after_activity, after_user) = match after {
            Some(cursor) => (format_datetime(&cursor.last_activity), cursor.user_id.clone()),
            None => (String::new(), String::new()),
        };
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PROGRESS_COLUMNS} FROM onboarding_progress
                     WHERE status = 'in_progress' AND last_activity < ?1
                       AND (last_activity > ?2 OR (last_activity = ?2 AND user_id > ?3))
                     ORDER BY last_activity ASC, user_id ASC LIMIT ?4"
                ),
                params![format_datetime(&cutoff), after_activity, after_user, limit as i64],
            )
            .await
            .map_err(|e| query_error("list_stale_progress", e))?;

        let mut result = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| query_error("list_stale_progress", e))?
        {
            result.push(row_to_progress(&row)?);
        }
        Ok(result)
    }
}

#[async_trait]
impl RoleDirectory for LibSqlBackend {
    async fn role_assignment(
        &self,
        user_id: &str,
    ) -> Result<Option<RoleAssignment>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT r.id, r.name, c.id, c.role_id, c.name
                 FROM role_assignments a
                 JOIN roles r ON r.id = a.role_id
                 JOIN role_categories c ON c.id = a.category_id
                 WHERE a.user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| query_error("role_assignment", e))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(query_error("role_assignment", e)),
        };

        let get_err = |e: libsql::Error| DatabaseError::Query(format!("role row parse: {e}"));
        let role_id: String = row.get(0).map_err(get_err)?;
        let role_name: String = row.get(1).map_err(get_err)?;
        let category_id: String = row.get(2).map_err(get_err)?;
        let category_role_id: String = row.get(3).map_err(get_err)?;
        let category_name: String = row.get(4).map_err(get_err)?;

        Ok(Some(RoleAssignment {
            user_id: user_id.to_string(),
            role: Role {
                id: parse_uuid(&role_id)?,
                name: role_name,
            },
            category: RoleCategory {
                id: parse_uuid(&category_id)?,
                role_id: parse_uuid(&category_role_id)?,
                name: category_name,
            },
        }))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_row(user_id: &str, stage: &str, step: i64) -> ProgressRow {
        ProgressRow {
            user_id: user_id.to_string(),
            flow_kind: "organization-flow".to_string(),
            stage: stage.to_string(),
            current_step: step,
            total_steps: 4,
            completed_steps: Vec::new(),
            status: "in_progress".to_string(),
            last_activity: crate::onboarding::model::timestamp_now(),
        }
    }

    async fn seed_assignment(db: &LibSqlBackend, user_id: &str, role: &str, category: &str) {
        let role_id = Uuid::new_v4().to_string();
        let category_id = Uuid::new_v4().to_string();
        db.conn()
            .execute(
                "INSERT INTO roles (id, name) VALUES (?1, ?2)",
                params![role_id.as_str(), role],
            )
            .await
            .unwrap();
        db.conn()
            .execute(
                "INSERT INTO role_categories (id, role_id, name) VALUES (?1, ?2, ?3)",
                params![category_id.as_str(), role_id.as_str(), category],
            )
            .await
            .unwrap();
        db.conn()
            .execute(
                "INSERT INTO role_assignments (user_id, role_id, category_id) VALUES (?1, ?2, ?3)",
                params![user_id, role_id.as_str(), category_id.as_str()],
            )
            .await
            .unwrap();
    }

    // ── Progress tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn get_progress_not_found() {
        let db = test_db().await;
        assert!(db.get_progress("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_and_get() {
        let db = test_db().await;
        let row = ProgressRow {
            completed_steps: vec!["organization_details".to_string()],
            ..make_row("u1", "team_invites", 2)
        };

        let stored = db.insert_progress_if_absent(&row).await.unwrap();
        assert_eq!(stored, row);

        let fetched = db.get_progress("u1").await.unwrap().unwrap();
        assert_eq!(fetched, row);
    }

    #[tokio::test]
    async fn insert_if_absent_keeps_first_row() {
        let db = test_db().await;
        let first = make_row("u1", "team_invites", 2);
        let second = make_row("u1", "organization_details", 1);

        db.insert_progress_if_absent(&first).await.unwrap();
        let stored = db.insert_progress_if_absent(&second).await.unwrap();

        assert_eq!(stored.stage, "team_invites");
        assert_eq!(stored.current_step, 2);

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM onboarding_progress WHERE user_id = 'u1'", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn update_applies_forward_and_equal_steps() {
        let db = test_db().await;
        db.insert_progress_if_absent(&make_row("u1", "organization_details", 1))
            .await
            .unwrap();

        assert!(db.update_progress_if_current(&make_row("u1", "team_invites", 2)).await.unwrap());
        assert!(db.update_progress_if_current(&make_row("u1", "team_invites", 2)).await.unwrap());

        let fetched = db.get_progress("u1").await.unwrap().unwrap();
        assert_eq!(fetched.current_step, 2);
    }

    #[tokio::test]
    async fn update_rejects_regression() {
        let db = test_db().await;
        db.insert_progress_if_absent(&make_row("u1", "billing", 3))
            .await
            .unwrap();

        let applied = db
            .update_progress_if_current(&make_row("u1", "team_invites", 2))
            .await
            .unwrap();
        assert!(!applied);

        let fetched = db.get_progress("u1").await.unwrap().unwrap();
        assert_eq!(fetched.stage, "billing");
        assert_eq!(fetched.current_step, 3);
    }

    #[tokio::test]
    async fn update_rejects_flow_change() {
        let db = test_db().await;
        db.insert_progress_if_absent(&make_row("u1", "organization_details", 1))
            .await
            .unwrap();
        let row = ProgressRow {
            flow_kind: "agency-flow".to_string(),
            ..make_row("u1", "client_organizations", 2)
        };
        assert!(!db.update_progress_if_current(&row).await.unwrap());
    }

    #[tokio::test]
    async fn update_missing_row_is_not_applied() {
        let db = test_db().await;
        assert!(!db.update_progress_if_current(&make_row("ghost", "billing", 3)).await.unwrap());
    }

    #[tokio::test]
    async fn list_stale_only_returns_old_in_progress_rows() {
        let db = test_db().await;
        let old = Utc::now() - Duration::days(40);

        db.insert_progress_if_absent(&ProgressRow {
            last_activity: old,
            ..make_row("stale", "team_invites", 2)
        })
        .await
        .unwrap();
        db.insert_progress_if_absent(&make_row("fresh", "team_invites", 2))
            .await
            .unwrap();
        db.insert_progress_if_absent(&ProgressRow {
            last_activity: old,
            status: "completed".to_string(),
            ..make_row("done", "complete", 4)
        })
        .await
        .unwrap();

        let stale = db
            .list_stale_progress(Utc::now() - Duration::days(30), None, 10)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].user_id, "stale");
    }

    #[tokio::test]
    async fn list_stale_respects_limit() {
        let db = test_db().await;
        for i in 0..3 {
            db.insert_progress_if_absent(&ProgressRow {
                last_activity: Utc::now() - Duration::days(60 + i),
                ..make_row(&format!("u{i}"), "team_invites", 2)
            })
            .await
            .unwrap();
        }
        let stale = db.list_stale_progress(Utc::now(), None, 2).await.unwrap();
        assert_eq!(stale.len(), 2);
        // Oldest first
        assert_eq!(stale[0].user_id, "u2");
    }

    #[tokio::test]
    async fn list_stale_pages_with_cursor() {
        let db = test_db().await;
        let old = Utc::now() - Duration::days(60);
        // Same timestamp for all, so ordering falls back to user id
        for id in ["a", "b", "c"] {
            db.insert_progress_if_absent(&ProgressRow {
                last_activity: old,
                ..make_row(id, "team_invites", 2)
            })
            .await
            .unwrap();
        }

        let first = db.list_stale_progress(Utc::now(), None, 2).await.unwrap();
        let ids: Vec<_> = first.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let cursor = StaleCursor::from(&first[1]);
        let second = db
            .list_stale_progress(Utc::now(), Some(&cursor), 2)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].user_id, "c");

        let cursor = StaleCursor::from(&second[0]);
        assert!(db
            .list_stale_progress(Utc::now(), Some(&cursor), 2)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn corrupt_completed_steps_is_serialization_error() {
        let db = test_db().await;
        db.insert_progress_if_absent(&make_row("u1", "team_invites", 2))
            .await
            .unwrap();
        db.conn()
            .execute(
                "UPDATE onboarding_progress SET completed_steps = 'not json' WHERE user_id = 'u1'",
                (),
            )
            .await
            .unwrap();
        assert!(matches!(
            db.get_progress("u1").await,
            Err(DatabaseError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn on_disk_database_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("progress.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_progress_if_absent(&make_row("u1", "billing", 3))
                .await
                .unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let fetched = db.get_progress("u1").await.unwrap().unwrap();
        assert_eq!(fetched.current_step, 3);
    }

    // ── Role directory tests ────────────────────────────────────────

    #[tokio::test]
    async fn role_assignment_joins_catalog() {
        let db = test_db().await;
        seed_assignment(&db, "u1", "organization-owner", "founder").await;

        let assignment = db.role_assignment("u1").await.unwrap().unwrap();
        assert_eq!(assignment.user_id, "u1");
        assert_eq!(assignment.role.name, "organization-owner");
        assert_eq!(assignment.category.name, "founder");
        assert_eq!(assignment.category.role_id, assignment.role.id);
    }

    #[tokio::test]
    async fn role_assignment_missing() {
        let db = test_db().await;
        assert!(db.role_assignment("u1").await.unwrap().is_none());
    }

    // ── Helpers ─────────────────────────────────────────────────────

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = Utc::now();
        let b = a + Duration::milliseconds(1);
        assert!(format_datetime(&a) < format_datetime(&b));
        assert_eq!(parse_datetime(&format_datetime(&a)).unwrap().timestamp_micros(), a.timestamp_micros());
    }

    #[test]
    fn parse_sqlite_datetime() {
        let dt = parse_datetime("2026-01-02 03:04:05").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn lock_errors_are_transient() {
        let err = query_error("save", libsql::Error::ConnectionFailed("database is locked".into()));
        assert!(err.is_transient());
        let err = query_error("save", libsql::Error::ConnectionFailed("no such table".into()));
        assert!(!err.is_transient());
    }
}
