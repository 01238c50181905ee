//! Background execution of one upload session.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{RowStatus, UploadStatus};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::parse::RosterRow;
use super::processor::RowProcessor;
use super::store::{NewLogEntry, SessionSnapshot, SessionStore, StoreError};

/// Drives the row processor over every row of a session, strictly in order.
///
/// Row failures are logged and counted; the batch carries on. A store failure
/// or a panic stops the batch and moves the session to `error`.
pub struct UploadRunner {
    store: Arc<dyn SessionStore>,
    processor: RowProcessor,
    row_delay: Duration,
}

impl UploadRunner {
    pub fn new(store: Arc<dyn SessionStore>, processor: RowProcessor, row_delay: Duration) -> Self {
        Self {
            store,
            processor,
            row_delay,
        }
    }

    /// Run the session on its own task. Callers normally drop the handle.
    pub fn spawn(
        self: &Arc<Self>,
        session: SessionSnapshot,
        rows: Vec<RosterRow>,
    ) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run(session, rows).await;
        })
    }

    /// Process every row and finalize the session. Returns the terminal status.
    pub async fn run(&self, session: SessionSnapshot, rows: Vec<RosterRow>) -> UploadStatus {
        info!(
            upload_id = %session.upload_id,
            total = rows.len(),
            "Starting upload processing"
        );

        let outcome = AssertUnwindSafe(self.process_rows(&session, &rows))
            .catch_unwind()
            .await;

        let (status, message) = match outcome {
            Ok(Ok(())) => (UploadStatus::Completed, None),
            Ok(Err(e)) => {
                error!(upload_id = %session.upload_id, error = %e, "Upload aborted");
                (UploadStatus::Error, Some(e.to_string()))
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(upload_id = %session.upload_id, panic = %detail, "Upload runner panicked");
                (
                    UploadStatus::Error,
                    Some(format!("Processing panicked: {detail}")),
                )
            }
        };

        match self.store.finish(session.id, status, message).await {
            Ok(()) => info!(upload_id = %session.upload_id, %status, "Upload finished"),
            Err(e) => error!(
                upload_id = %session.upload_id,
                error = %e,
                "Failed to finalize upload session"
            ),
        }
        status
    }

    async fn process_rows(
        &self,
        session: &SessionSnapshot,
        rows: &[RosterRow],
    ) -> Result<(), StoreError> {
        for (idx, row) in rows.iter().enumerate() {
            if idx > 0 && !self.row_delay.is_zero() {
                tokio::time::sleep(self.row_delay).await;
            }

            let row_number = idx as i32 + 1;
            let started = Instant::now();
            let outcome = self.processor.process(row).await;
            let processing_ms = started.elapsed().as_millis() as i64;

            let entry = match outcome {
                Ok(imported) => NewLogEntry {
                    row_number,
                    student_name: row.display_name(),
                    reference: row.admission_no.clone(),
                    status: RowStatus::Success,
                    message: imported.summary(),
                    student_id: Some(imported.student_id),
                    parent_id: Some(imported.parent_id),
                    student_action: Some(imported.student_action.as_str().to_string()),
                    parent_action: Some(imported.parent_action.as_str().to_string()),
                    link_action: Some(imported.link.as_str().to_string()),
                    processing_ms,
                },
                Err(e) => {
                    warn!(
                        upload_id = %session.upload_id,
                        row_number,
                        reference = %row.admission_no,
                        error = %e,
                        "Row failed"
                    );
                    NewLogEntry {
                        row_number,
                        student_name: row.display_name(),
                        reference: row.admission_no.clone(),
                        status: RowStatus::Error,
                        message: e.to_string(),
                        student_id: None,
                        parent_id: None,
                        student_action: None,
                        parent_action: None,
                        link_action: None,
                        processing_ms,
                    }
                }
            };

            self.store.record_row(session.id, entry).await?;
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
