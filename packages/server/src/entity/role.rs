use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The role assigned to self-registered users. Holds no permissions until an
/// administrator promotes the account.
pub const DEFAULT_ROLE: &str = "guest";

/// Role given to login identities provisioned for imported students.
pub const STUDENT_ROLE: &str = "student";

/// Role given to login identities provisioned for imported parents.
pub const PARENT_ROLE: &str = "parent";

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "role")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,

    #[sea_orm(has_many)]
    pub users: HasMany<super::user::Entity>,

    #[sea_orm(has_many)]
    pub permissions: HasMany<super::role_permission::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
