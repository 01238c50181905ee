use axum::{
    Json,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::ingest::parse_roster;
use crate::ingest::publisher::ndjson_line;
use crate::ingest::store::{NewSession, SessionFilter, Viewer};
use crate::models::shared::Pagination;
use crate::models::upload::*;
use crate::state::AppState;

const CSV_CONTENT_TYPES: &[&str] = &["text/csv", "application/csv", "application/vnd.ms-excel"];

/// Multipart overhead on top of the file itself.
pub fn upload_body_limit(max_file_size: usize) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_file_size + 64 * 1024)
}

fn viewer(auth_user: &AuthUser) -> Viewer {
    if auth_user.has_permission("upload:view_all") {
        Viewer::Any
    } else {
        Viewer::Owner(auth_user.user_id)
    }
}

fn is_csv(file_name: Option<&str>, content_type: Option<&str>) -> bool {
    let by_name = file_name
        .map(|n| n.to_ascii_lowercase().ends_with(".csv"))
        .unwrap_or(false);
    let by_type = content_type
        .map(|t| CSV_CONTENT_TYPES.contains(&t.split(';').next().unwrap_or(t).trim()))
        .unwrap_or(false);
    by_name || by_type
}

#[utoipa::path(
    post,
    path = "",
    tag = "Uploads",
    operation_id = "startUpload",
    summary = "Start a roster upload",
    description = "Accepts a CSV roster in the multipart `file` field and starts processing it in the background. \
        Responds as soon as the session exists; follow progress on `streamEndpoint`. \
        Requires `upload:create` permission.",
    request_body(content_type = "multipart/form-data", description = "CSV roster file"),
    responses(
        (status = 202, description = "Upload accepted", body = StartUploadResponse),
        (status = 400, description = "Missing, non-CSV, malformed or empty file (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn start_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("upload:create")?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        if !is_csv(field.file_name(), field.content_type()) {
            return Err(AppError::Validation("Only CSV files are accepted".into()));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
        upload = Some((file_name, data.to_vec()));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    let max = state.config.upload.max_file_size;
    if bytes.len() > max {
        return Err(AppError::Validation(format!(
            "File exceeds the {max} byte limit"
        )));
    }

    let rows = parse_roster(&bytes).map_err(|e| AppError::Validation(e.to_string()))?;

    let session = state
        .sessions
        .create(NewSession {
            upload_id: format!("upload_{}", Uuid::new_v4().simple()),
            owner_id: auth_user.user_id,
            file_name,
            total: rows.len() as i32,
        })
        .await?;

    info!(
        upload_id = %session.upload_id,
        total = session.total,
        "Upload accepted"
    );

    let _ = state.runner.spawn(session.clone(), rows);

    let base = format!("/api/v1/uploads/{}", session.upload_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(StartUploadResponse {
            success: true,
            upload_id: session.upload_id,
            total_rows: session.total,
            session_id: session.id,
            stream_endpoint: format!("{base}/stream"),
            status_endpoint: base,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "",
    tag = "Uploads",
    operation_id = "listUploads",
    summary = "List upload sessions",
    description = "Newest first. Users see their own sessions; users with `upload:view_all` see every session.",
    params(UploadListQuery),
    responses(
        (status = 200, description = "Upload sessions", body = UploadListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_uploads(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<UploadListQuery>,
) -> Result<Json<UploadListResponse>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.limit.unwrap_or(20).clamp(1, 100);

    let result = state
        .sessions
        .list(SessionFilter {
            owner_id: viewer(&auth_user).owner_filter(),
            status: query.status,
            page,
            per_page,
        })
        .await?;

    Ok(Json(UploadListResponse {
        sessions: result.sessions.into_iter().map(Into::into).collect(),
        pagination: Pagination::new(page, per_page, result.total),
    }))
}

#[utoipa::path(
    get,
    path = "/{upload_id}",
    tag = "Uploads",
    operation_id = "getUpload",
    summary = "Get upload status",
    description = "Counters, status and the full row-ordered log of one session.",
    params(("upload_id" = String, Path, description = "Upload ID")),
    responses(
        (status = 200, description = "Upload session", body = UploadDetailResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Upload not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadDetailResponse>, AppError> {
    let session = state.sessions.get(&upload_id).await?;
    if !viewer(&auth_user).may_see(&session) {
        return Err(AppError::NotFound(format!(
            "Upload session '{upload_id}' not found"
        )));
    }

    let logs = state.sessions.entries(session.id).await?;

    Ok(Json(UploadDetailResponse {
        summary: session.into(),
        logs: logs.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/{upload_id}/stream",
    tag = "Uploads",
    operation_id = "streamUpload",
    summary = "Stream upload progress",
    description = "Newline-delimited JSON, one `ProgressFrame` per line: `started`, then `progress` every poll interval, \
        then a final `completed` or `error` frame. Unknown sessions get a single `error` frame with status `not_found`.",
    params(("upload_id" = String, Path, description = "Upload ID")),
    responses(
        (status = 200, description = "Progress frames", body = common::ProgressFrame, content_type = "application/x-ndjson"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn stream_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Response {
    let frames = state
        .publisher
        .stream(upload_id, viewer(&auth_user))
        .map(|frame| ndjson_line(&frame));

    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
