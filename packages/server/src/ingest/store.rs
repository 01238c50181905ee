//! Persistence of upload sessions and their per-row log.
//!
//! A session is written only by the runner that owns it. Readers (the status
//! endpoint and any number of progress streams) see each row's log entry and
//! the matching counter bump together, because [`SessionStore::record_row`]
//! applies both in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{RowStatus, UploadStatus};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::entity::{upload_log, upload_session};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("upload session '{0}' not found")]
    SessionNotFound(String),
    /// The session is no longer `processing`, or was purged underneath the runner.
    #[error("upload session {0} is not accepting rows")]
    SessionClosed(i32),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Fields supplied when a session is opened.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub upload_id: String,
    pub owner_id: i32,
    pub file_name: String,
    pub total: i32,
}

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub id: i32,
    pub upload_id: String,
    pub owner_id: i32,
    pub file_name: String,
    pub status: UploadStatus,
    pub total: i32,
    pub processed: i32,
    pub success_count: i32,
    pub error_count: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<upload_session::Model> for SessionSnapshot {
    fn from(m: upload_session::Model) -> Self {
        Self {
            id: m.id,
            upload_id: m.upload_id,
            owner_id: m.owner_id,
            file_name: m.file_name,
            status: m.status,
            total: m.total,
            processed: m.processed,
            success_count: m.success_count,
            error_count: m.error_count,
            error_message: m.error_message,
            started_at: m.started_at,
            completed_at: m.completed_at,
        }
    }
}

/// Who is asking to see a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Viewer {
    /// Holder of `upload:view_all`.
    Any,
    Owner(i32),
}

impl Viewer {
    pub fn may_see(&self, session: &SessionSnapshot) -> bool {
        match self {
            Viewer::Any => true,
            Viewer::Owner(user_id) => session.owner_id == *user_id,
        }
    }

    /// Owner restriction for listings.
    pub fn owner_filter(&self) -> Option<i32> {
        match self {
            Viewer::Any => None,
            Viewer::Owner(user_id) => Some(*user_id),
        }
    }
}

/// Outcome of one row, as handed to the store by the runner.
#[derive(Clone, Debug, PartialEq)]
pub struct NewLogEntry {
    pub row_number: i32,
    pub student_name: String,
    pub reference: String,
    pub status: RowStatus,
    pub message: String,
    pub student_id: Option<i32>,
    pub parent_id: Option<i32>,
    pub student_action: Option<String>,
    pub parent_action: Option<String>,
    pub link_action: Option<String>,
    pub processing_ms: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub row_number: i32,
    pub student_name: String,
    pub reference: String,
    pub status: RowStatus,
    pub message: String,
    pub student_id: Option<i32>,
    pub parent_id: Option<i32>,
    pub student_action: Option<String>,
    pub parent_action: Option<String>,
    pub link_action: Option<String>,
    pub processing_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn from_new(entry: NewLogEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            row_number: entry.row_number,
            student_name: entry.student_name,
            reference: entry.reference,
            status: entry.status,
            message: entry.message,
            student_id: entry.student_id,
            parent_id: entry.parent_id,
            student_action: entry.student_action,
            parent_action: entry.parent_action,
            link_action: entry.link_action,
            processing_ms: entry.processing_ms,
            created_at,
        }
    }
}

impl From<upload_log::Model> for LogEntry {
    fn from(m: upload_log::Model) -> Self {
        Self {
            row_number: m.row_number,
            student_name: m.student_name,
            reference: m.reference,
            status: m.status,
            message: m.message,
            student_id: m.student_id,
            parent_id: m.parent_id,
            student_action: m.student_action,
            parent_action: m.parent_action,
            link_action: m.link_action,
            processing_ms: m.processing_ms,
            created_at: m.created_at,
        }
    }
}

/// Listing filter. `owner_id = None` lists every owner's sessions.
#[derive(Clone, Debug, Default)]
pub struct SessionFilter {
    pub owner_id: Option<i32>,
    pub status: Option<UploadStatus>,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SessionPage {
    pub sessions: Vec<SessionSnapshot>,
    pub total: u64,
}

/// Counter deltas for a row outcome: `(processed, success, error)`.
pub(crate) fn counter_deltas(status: RowStatus) -> (i32, i32, i32) {
    match status {
        RowStatus::Success => (1, 1, 0),
        RowStatus::Error => (1, 0, 1),
        RowStatus::Skipped => (0, 0, 0),
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, new: NewSession) -> Result<SessionSnapshot, StoreError>;

    async fn find(&self, upload_id: &str) -> Result<Option<SessionSnapshot>, StoreError>;

    /// Append one log entry and bump the session counters atomically.
    ///
    /// Fails with [`StoreError::SessionClosed`] once the session has left
    /// `processing`.
    async fn record_row(&self, session_id: i32, entry: NewLogEntry) -> Result<(), StoreError>;

    /// Move the session to a terminal status and stamp `completed_at`.
    async fn finish(
        &self,
        session_id: i32,
        status: UploadStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError>;

    /// The newest `limit` entries, newest first.
    async fn recent_entries(&self, session_id: i32, limit: u64)
    -> Result<Vec<LogEntry>, StoreError>;

    /// Every entry ordered by row number.
    async fn entries(&self, session_id: i32) -> Result<Vec<LogEntry>, StoreError>;

    /// Sessions newest first.
    async fn list(&self, filter: SessionFilter) -> Result<SessionPage, StoreError>;

    /// Delete sessions started before `cutoff` together with their logs.
    /// Returns the number of sessions removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn get(&self, upload_id: &str) -> Result<SessionSnapshot, StoreError> {
        self.find(upload_id)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(upload_id.to_string()))
    }
}

/// [`SessionStore`] backed by the relational database.
#[derive(Clone)]
pub struct DbSessionStore {
    db: DatabaseConnection,
}

impl DbSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn create(&self, new: NewSession) -> Result<SessionSnapshot, StoreError> {
        let model = upload_session::ActiveModel {
            upload_id: Set(new.upload_id),
            owner_id: Set(new.owner_id),
            file_name: Set(new.file_name),
            status: Set(UploadStatus::Processing),
            total: Set(new.total),
            processed: Set(0),
            success_count: Set(0),
            error_count: Set(0),
            error_message: Set(None),
            started_at: Set(Utc::now()),
            completed_at: Set(None),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(model.into())
    }

    async fn find(&self, upload_id: &str) -> Result<Option<SessionSnapshot>, StoreError> {
        let model = upload_session::Entity::find()
            .filter(upload_session::Column::UploadId.eq(upload_id))
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn record_row(&self, session_id: i32, entry: NewLogEntry) -> Result<(), StoreError> {
        let (processed, success, error) = counter_deltas(entry.status);
        let txn = self.db.begin().await?;

        let bumped = upload_session::Entity::update_many()
            .col_expr(
                upload_session::Column::Processed,
                Expr::col(upload_session::Column::Processed).add(processed),
            )
            .col_expr(
                upload_session::Column::SuccessCount,
                Expr::col(upload_session::Column::SuccessCount).add(success),
            )
            .col_expr(
                upload_session::Column::ErrorCount,
                Expr::col(upload_session::Column::ErrorCount).add(error),
            )
            .filter(upload_session::Column::Id.eq(session_id))
            .filter(upload_session::Column::Status.eq(UploadStatus::Processing))
            .exec(&txn)
            .await?;

        if bumped.rows_affected == 0 {
            txn.rollback().await?;
            return Err(StoreError::SessionClosed(session_id));
        }

        upload_log::ActiveModel {
            session_id: Set(session_id),
            row_number: Set(entry.row_number),
            student_name: Set(entry.student_name),
            reference: Set(entry.reference),
            status: Set(entry.status),
            message: Set(entry.message),
            student_id: Set(entry.student_id),
            parent_id: Set(entry.parent_id),
            student_action: Set(entry.student_action),
            parent_action: Set(entry.parent_action),
            link_action: Set(entry.link_action),
            processing_ms: Set(entry.processing_ms),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn finish(
        &self,
        session_id: i32,
        status: UploadStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let result = upload_session::Entity::update_many()
            .col_expr(upload_session::Column::Status, Expr::value(status))
            .col_expr(upload_session::Column::ErrorMessage, Expr::value(error_message))
            .col_expr(upload_session::Column::CompletedAt, Expr::value(Utc::now()))
            .filter(upload_session::Column::Id.eq(session_id))
            .filter(upload_session::Column::Status.eq(UploadStatus::Processing))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::SessionClosed(session_id));
        }
        Ok(())
    }

    async fn recent_entries(
        &self,
        session_id: i32,
        limit: u64,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let rows = upload_log::Entity::find()
            .filter(upload_log::Column::SessionId.eq(session_id))
            .order_by_desc(upload_log::Column::RowNumber)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn entries(&self, session_id: i32) -> Result<Vec<LogEntry>, StoreError> {
        let rows = upload_log::Entity::find()
            .filter(upload_log::Column::SessionId.eq(session_id))
            .order_by_asc(upload_log::Column::RowNumber)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list(&self, filter: SessionFilter) -> Result<SessionPage, StoreError> {
        let mut query = upload_session::Entity::find();

        if let Some(owner_id) = filter.owner_id {
            query = query.filter(upload_session::Column::OwnerId.eq(owner_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(upload_session::Column::Status.eq(status));
        }

        let total = query.clone().count(&self.db).await?;

        let sessions = query
            .order_by_desc(upload_session::Column::StartedAt)
            .order_by_desc(upload_session::Column::Id)
            .offset(filter.page.saturating_sub(1) * filter.per_page)
            .limit(filter.per_page)
            .all(&self.db)
            .await?;

        Ok(SessionPage {
            sessions: sessions.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let txn = self.db.begin().await?;

        let expired: Vec<i32> = upload_session::Entity::find()
            .select_only()
            .column(upload_session::Column::Id)
            .filter(upload_session::Column::StartedAt.lt(cutoff))
            .into_tuple()
            .all(&txn)
            .await?;

        if expired.is_empty() {
            txn.rollback().await?;
            return Ok(0);
        }

        upload_log::Entity::delete_many()
            .filter(upload_log::Column::SessionId.is_in(expired.clone()))
            .exec(&txn)
            .await?;
        let removed = upload_session::Entity::delete_many()
            .filter(upload_session::Column::Id.is_in(expired))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(removed.rows_affected)
    }
}
