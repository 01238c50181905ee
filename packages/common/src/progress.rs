//! Wire frames emitted by the upload progress stream.
//!
//! The stream is newline-delimited JSON; each line is one [`ProgressFrame`].

use serde::{Deserialize, Serialize};

use crate::UploadStatus;

/// Kind of a progress frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Started,
    Progress,
    Completed,
    Error,
}

/// Status reported inside a frame.
///
/// Mirrors [`UploadStatus`] plus the two publisher-side failure states, which
/// never appear on a stored session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Processing,
    Completed,
    Error,
    NotFound,
    PollingError,
}

impl From<UploadStatus> for StreamStatus {
    fn from(status: UploadStatus) -> Self {
        match status {
            UploadStatus::Processing => Self::Processing,
            UploadStatus::Completed => Self::Completed,
            UploadStatus::Error => Self::Error,
        }
    }
}

/// One recently processed row, formatted for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentRow {
    #[schema(example = 12)]
    pub row_number: i32,
    #[schema(example = "Ada Lovelace")]
    pub student_name: String,
    #[schema(example = "success")]
    pub status: String,
    #[schema(example = "Student created, parent updated, linked")]
    pub message: String,
    /// Human readable duration, e.g. `"42ms"`.
    #[schema(example = "42ms")]
    pub processing_time: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    pub upload_id: String,
    pub status: StreamStatus,
    pub total_students: i32,
    pub processed_students: i32,
    pub success_count: i32,
    pub error_count: i32,
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_students: Option<Vec<RecentRow>>,
    /// Failure detail for `error` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressData {
    /// Frame data with every counter zeroed, used when there is no session to sample.
    pub fn empty(upload_id: impl Into<String>, status: StreamStatus) -> Self {
        Self {
            upload_id: upload_id.into(),
            status,
            total_students: 0,
            processed_students: 0,
            success_count: 0,
            error_count: 0,
            percentage: 0,
            recent_students: None,
            message: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProgressFrame {
    #[serde(rename = "type")]
    pub kind: FrameType,
    pub data: ProgressData,
}

impl ProgressFrame {
    pub fn new(kind: FrameType, data: ProgressData) -> Self {
        Self { kind, data }
    }

    /// Whether the stream closes after this frame.
    pub fn is_final(&self) -> bool {
        matches!(self.kind, FrameType::Completed | FrameType::Error)
    }
}

/// Completion percentage, rounded to the nearest integer. Zero when `total` is zero.
pub fn percentage(processed: i32, total: i32) -> u8 {
    if total <= 0 {
        return 0;
    }
    let processed = processed.clamp(0, total) as f64;
    ((processed * 100.0) / total as f64).round() as u8
}
