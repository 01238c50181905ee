use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "year_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Label as it appears in roster files, e.g. "Year 7".
    #[sea_orm(unique)]
    pub name: String,

    #[sea_orm(has_many)]
    pub class_groups: HasMany<super::class_group::Entity>,

    #[sea_orm(has_many)]
    pub students: HasMany<super::student::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
