use common::UploadStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "upload_session")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Opaque identifier exposed in URLs.
    #[sea_orm(unique)]
    pub upload_id: String,

    pub owner_id: i32,
    #[sea_orm(belongs_to, from = "owner_id", to = "id")]
    pub owner: HasOne<super::user::Entity>,

    pub file_name: String,
    pub status: UploadStatus,

    pub total: i32,
    pub processed: i32,
    pub success_count: i32,
    pub error_count: i32,

    /// Set when the runner aborted the batch.
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    #[sea_orm(has_many)]
    pub logs: HasMany<super::upload_log::Entity>,

    pub started_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
