use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "student")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// External admission / reference code. Deduplication key for imports.
    #[sea_orm(unique)]
    pub admission_no: String,

    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<Date>,

    /// Login identity (`user.id`) provisioned for this student.
    pub user_id: i32,
    pub username: String,

    pub year_group_id: i32,
    #[sea_orm(belongs_to, from = "year_group_id", to = "id")]
    pub year_group: HasOne<super::year_group::Entity>,

    pub class_group_id: i32,
    #[sea_orm(belongs_to, from = "class_group_id", to = "id")]
    pub class_group: HasOne<super::class_group::Entity>,

    #[sea_orm(has_many, via = "student_parent")]
    pub parents: HasMany<super::parent::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
