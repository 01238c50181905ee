use common::RowStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of one processed row. Rows are inserted once and never updated.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "upload_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "session_row")]
    pub session_id: i32,
    #[sea_orm(belongs_to, from = "session_id", to = "id")]
    pub session: HasOne<super::upload_session::Entity>,

    /// 1-based position among the counted rows of the file.
    #[sea_orm(unique_key = "session_row")]
    pub row_number: i32,

    pub student_name: String,
    pub reference: String,
    pub status: RowStatus,
    #[sea_orm(column_type = "Text")]
    pub message: String,

    pub student_id: Option<i32>,
    pub parent_id: Option<i32>,
    pub student_action: Option<String>,
    pub parent_action: Option<String>,
    pub link_action: Option<String>,

    pub processing_ms: i64,
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
