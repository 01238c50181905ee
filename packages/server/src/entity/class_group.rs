use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A registration group (form class) within a year group.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "class_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    pub year_group_id: i32,
    #[sea_orm(belongs_to, from = "year_group_id", to = "id")]
    pub year_group: HasOne<super::year_group::Entity>,

    #[sea_orm(has_many)]
    pub students: HasMany<super::student::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
