use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A login account. Staff register themselves; student and parent accounts
/// are provisioned by roster imports.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,
    pub password: String,
    pub email: Option<String>,

    pub role: String,
    #[sea_orm(belongs_to, from = "role", to = "name")]
    pub role_ref: Option<super::role::Entity>,

    #[sea_orm(has_many)]
    pub upload_sessions: HasMany<super::upload_session::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
