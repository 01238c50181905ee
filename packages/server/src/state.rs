use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::ingest::{
    DbDirectory, DbIdentityProvider, DbSessionStore, ProgressPublisher, RowProcessor,
    SessionStore, UploadRunner,
};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub sessions: Arc<dyn SessionStore>,
    pub runner: Arc<UploadRunner>,
    pub publisher: ProgressPublisher,
}

impl AppState {
    /// Wire the ingestion pipeline onto a database connection.
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        let sessions: Arc<dyn SessionStore> = Arc::new(DbSessionStore::new(db.clone()));
        let processor = RowProcessor::new(
            Arc::new(DbDirectory::new(db.clone())),
            Arc::new(DbIdentityProvider::new(db.clone())),
        );
        let runner = Arc::new(UploadRunner::new(
            Arc::clone(&sessions),
            processor,
            config.upload.row_delay(),
        ));
        let publisher = ProgressPublisher::new(
            Arc::clone(&sessions),
            config.upload.poll_interval(),
            config.upload.recent_window,
        );

        Self {
            db,
            config: Arc::new(config),
            sessions,
            runner,
            publisher,
        }
    }
}
