//! Storage traits — async interfaces for onboarding persistence and the
//! read-only role catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::onboarding::model::{ProgressRow, RoleAssignment};

/// Backend-agnostic persistence for onboarding progress rows.
///
/// Rows are keyed by `user_id`; backends must enforce that key as unique.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Get the progress row for a user.
    async fn get_progress(&self, user_id: &str) -> Result<Option<ProgressRow>, DatabaseError>;

    /// Insert `row` unless the user already has one, as a single atomic
    /// statement. Returns whichever row is stored afterwards.
    async fn insert_progress_if_absent(&self, row: &ProgressRow)
    -> Result<ProgressRow, DatabaseError>;

    /// Overwrite the user's row only if the stored step index is not ahead of
    /// `row.current_step` and the flow kind matches. Returns whether the write
    /// was applied.
    async fn update_progress_if_current(&self, row: &ProgressRow) -> Result<bool, DatabaseError>;

    /// In-progress rows whose last activity is older than `cutoff`, ordered
    /// by (last activity, user id), up to `limit`. With `after`, only rows
    /// ordered after that position are returned.
    async fn list_stale_progress(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<&StaleCursor>,
        limit: usize,
    ) -> Result<Vec<ProgressRow>, DatabaseError>;
}

/// Position of the last row of a `list_stale_progress` page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleCursor {
    pub last_activity: DateTime<Utc>,
    pub user_id: String,
}

impl From<&ProgressRow> for StaleCursor {
    fn from(row: &ProgressRow) -> Self {
        Self {
            last_activity: row.last_activity,
            user_id: row.user_id.clone(),
        }
    }
}

/// Read access to the externally owned role catalog.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// The user's role assignment, if they have completed role selection.
    async fn role_assignment(&self, user_id: &str)
    -> Result<Option<RoleAssignment>, DatabaseError>;
}
