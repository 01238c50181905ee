//! Live progress for one upload, as a stream of [`ProgressFrame`]s.
//!
//! Each connected client gets its own publisher stream with its own interval.
//! The stream only reads the session store, so dropping it (client gone) has
//! no effect on the runner.

use std::sync::Arc;
use std::time::Duration;

use common::progress::percentage;
use common::{FrameType, ProgressData, ProgressFrame, RecentRow, StreamStatus, UploadStatus};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::warn;

use super::store::{LogEntry, SessionSnapshot, SessionStore, StoreError, Viewer};

#[derive(Clone)]
pub struct ProgressPublisher {
    store: Arc<dyn SessionStore>,
    poll_interval: Duration,
    recent_window: u64,
}

impl ProgressPublisher {
    pub fn new(store: Arc<dyn SessionStore>, poll_interval: Duration, recent_window: u64) -> Self {
        Self {
            store,
            poll_interval,
            recent_window,
        }
    }

    /// Frames for `upload_id` until the session is terminal.
    ///
    /// Sessions that do not exist and sessions `viewer` may not see both
    /// produce a single `not_found` error frame.
    pub fn stream(&self, upload_id: String, viewer: Viewer) -> BoxStream<'static, ProgressFrame> {
        let state = StreamState {
            store: Arc::clone(&self.store),
            upload_id,
            viewer,
            poll_interval: self.poll_interval,
            recent_window: self.recent_window,
            phase: Phase::Connect,
        };
        stream::unfold(state, |mut state| async move {
            let frame = state.next_frame().await?;
            Some((frame, state))
        })
        .boxed()
    }
}

enum Phase {
    Connect,
    Polling { interval: Interval },
    Closed,
}

struct StreamState {
    store: Arc<dyn SessionStore>,
    upload_id: String,
    viewer: Viewer,
    poll_interval: Duration,
    recent_window: u64,
    phase: Phase,
}

impl StreamState {
    async fn next_frame(&mut self) -> Option<ProgressFrame> {
        let frame = match &mut self.phase {
            Phase::Closed => return None,
            Phase::Connect => self.connect().await,
            Phase::Polling { interval } => {
                interval.tick().await;
                self.sample().await
            }
        };

        if frame.is_final() {
            self.phase = Phase::Closed;
        } else if matches!(self.phase, Phase::Connect) {
            // First tick completes immediately.
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.phase = Phase::Polling { interval };
        }
        Some(frame)
    }

    async fn connect(&self) -> ProgressFrame {
        match self.store.find(&self.upload_id).await {
            Ok(Some(session)) if self.viewer.may_see(&session) => ProgressFrame::new(
                FrameType::Started,
                ProgressData {
                    message: Some("Upload processing started".into()),
                    ..counters(&session)
                },
            ),
            Ok(_) => self.not_found(),
            Err(e) => self.polling_error(e),
        }
    }

    async fn sample(&self) -> ProgressFrame {
        let session = match self.store.find(&self.upload_id).await {
            Ok(Some(session)) => session,
            // Purged while we were watching.
            Ok(None) => return self.not_found(),
            Err(e) => return self.polling_error(e),
        };
        let recent = match self
            .store
            .recent_entries(session.id, self.recent_window)
            .await
        {
            Ok(entries) => entries.into_iter().map(recent_row).collect(),
            Err(e) => return self.polling_error(e),
        };

        let data = ProgressData {
            recent_students: Some(recent),
            ..counters(&session)
        };
        if !session.status.is_terminal() {
            return ProgressFrame::new(FrameType::Progress, data);
        }
        if session.status == UploadStatus::Completed {
            ProgressFrame::new(
                FrameType::Completed,
                ProgressData {
                    percentage: 100,
                    message: Some(format!(
                        "Upload completed: {} succeeded, {} failed",
                        session.success_count, session.error_count
                    )),
                    ..data
                },
            )
        } else {
            ProgressFrame::new(
                FrameType::Error,
                ProgressData {
                    message: Some(
                        session
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "Upload processing failed".into()),
                    ),
                    ..data
                },
            )
        }
    }

    fn not_found(&self) -> ProgressFrame {
        ProgressFrame::new(
            FrameType::Error,
            ProgressData {
                message: Some("Upload session not found".into()),
                ..ProgressData::empty(self.upload_id.clone(), StreamStatus::NotFound)
            },
        )
    }

    fn polling_error(&self, err: StoreError) -> ProgressFrame {
        warn!(upload_id = %self.upload_id, error = %err, "Progress sampling failed");
        ProgressFrame::new(
            FrameType::Error,
            ProgressData {
                message: Some("Failed to read upload progress".into()),
                ..ProgressData::empty(self.upload_id.clone(), StreamStatus::PollingError)
            },
        )
    }
}

fn counters(session: &SessionSnapshot) -> ProgressData {
    ProgressData {
        upload_id: session.upload_id.clone(),
        status: session.status.into(),
        total_students: session.total,
        processed_students: session.processed,
        success_count: session.success_count,
        error_count: session.error_count,
        percentage: percentage(session.processed, session.total),
        recent_students: None,
        message: None,
    }
}

fn recent_row(entry: LogEntry) -> RecentRow {
    RecentRow {
        row_number: entry.row_number,
        student_name: entry.student_name,
        status: entry.status.as_str().to_string(),
        message: entry.message,
        processing_time: format!("{}ms", entry.processing_ms),
    }
}

/// Serialize a frame as one NDJSON line.
pub fn ndjson_line(frame: &ProgressFrame) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}
