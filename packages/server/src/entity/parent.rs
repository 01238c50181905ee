use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parent")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Normalized (lower-case) contact email. Deduplication key for imports.
    #[sea_orm(unique)]
    pub email: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,

    /// Login identity (`user.id`) provisioned for this parent.
    pub user_id: i32,

    #[sea_orm(has_many, via = "student_parent")]
    pub students: HasMany<super::student::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
