use chrono::{DateTime, Utc};
use common::{RowStatus, UploadStatus};
use serde::{Deserialize, Serialize};

use super::shared::Pagination;
use crate::ingest::store::{LogEntry, SessionSnapshot};

/// Response for an accepted upload. Processing continues in the background.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadResponse {
    pub success: bool,
    #[schema(example = "upload_5f0c2a7e9b3d4c1a8e6f0b2d4c6a8e0f")]
    pub upload_id: String,
    #[schema(example = 250)]
    pub total_rows: i32,
    /// Internal session key.
    #[schema(example = 17)]
    pub session_id: i32,
    #[schema(example = "/api/v1/uploads/upload_5f0c2a7e9b3d4c1a8e6f0b2d4c6a8e0f/stream")]
    pub stream_endpoint: String,
    #[schema(example = "/api/v1/uploads/upload_5f0c2a7e9b3d4c1a8e6f0b2d4c6a8e0f")]
    pub status_endpoint: String,
}

/// Session counters and timestamps.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub upload_id: String,
    pub session_id: i32,
    #[schema(example = "roster.csv")]
    pub file_name: String,
    pub status: UploadStatus,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub success_count: i32,
    pub error_count: i32,
    #[schema(example = 40)]
    pub percentage: u8,
    /// Present when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<SessionSnapshot> for UploadSummary {
    fn from(s: SessionSnapshot) -> Self {
        Self {
            percentage: common::progress::percentage(s.processed, s.total),
            upload_id: s.upload_id,
            session_id: s.id,
            file_name: s.file_name,
            status: s.status,
            total_rows: s.total,
            processed_rows: s.processed,
            success_count: s.success_count,
            error_count: s.error_count,
            error_message: s.error_message,
            started_at: s.started_at,
            completed_at: s.completed_at,
        }
    }
}

/// One processed row.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryResponse {
    #[schema(example = 3)]
    pub row_number: i32,
    #[schema(example = "Ada Lovelace")]
    pub student_name: String,
    /// Admission number from the file.
    #[schema(example = "A1001")]
    pub reference: String,
    pub status: RowStatus,
    #[schema(example = "Student created, parent created, linked")]
    pub message: String,
    pub student_id: Option<i32>,
    pub parent_id: Option<i32>,
    /// `created` or `updated`.
    pub student_action: Option<String>,
    pub parent_action: Option<String>,
    /// `created` or `existing`.
    pub linked: Option<String>,
    pub processing_ms: i64,
}

impl From<LogEntry> for LogEntryResponse {
    fn from(e: LogEntry) -> Self {
        Self {
            row_number: e.row_number,
            student_name: e.student_name,
            reference: e.reference,
            status: e.status,
            message: e.message,
            student_id: e.student_id,
            parent_id: e.parent_id,
            student_action: e.student_action,
            parent_action: e.parent_action,
            linked: e.link_action,
            processing_ms: e.processing_ms,
        }
    }
}

/// Full status of one session with its row-ordered log.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadDetailResponse {
    #[serde(flatten)]
    pub summary: UploadSummary,
    pub logs: Vec<LogEntryResponse>,
}

/// Query parameters for listing upload sessions.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadListQuery {
    /// Page number (default: 1).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// Sessions per page (default: 20, max: 100).
    #[param(example = 20)]
    pub limit: Option<u64>,
    /// Only sessions in this status.
    pub status: Option<UploadStatus>,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadListResponse {
    pub sessions: Vec<UploadSummary>,
    pub pagination: Pagination,
}
