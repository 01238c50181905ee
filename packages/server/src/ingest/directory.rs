//! Directory operations used by the row processor: reference entities, person
//! records, their links, and the login identities behind them.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TryInsertResult,
};
use serde::Serialize;

use crate::entity::{class_group, parent, student, student_parent, user, year_group};
use crate::utils::hash::{hash_password, random_password};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// A unique key is already held by a different record.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{0}")]
    Internal(String),
}

/// Whether a student/parent link was made by this call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOutcome {
    Created,
    Existing,
}

impl LinkOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Existing => "existing",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewStudent {
    pub admission_no: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub user_id: i32,
    pub username: String,
    pub year_group_id: i32,
    pub class_group_id: i32,
}

/// Fields a re-import may overwrite on an existing student.
#[derive(Clone, Debug, PartialEq)]
pub struct StudentUpdate {
    pub first_name: String,
    pub last_name: String,
    /// `None` keeps the stored date.
    pub date_of_birth: Option<NaiveDate>,
    pub year_group_id: i32,
    pub class_group_id: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewParent {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub user_id: i32,
}

/// Optional parent fields; `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParentUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_or_create_year_group(&self, name: &str) -> Result<i32, DirectoryError>;

    /// Class names are unique school-wide; an existing class keeps its year group.
    async fn find_or_create_class(
        &self,
        name: &str,
        year_group_id: i32,
    ) -> Result<i32, DirectoryError>;

    async fn find_student(&self, admission_no: &str) -> Result<Option<i32>, DirectoryError>;
    async fn create_student(&self, new: NewStudent) -> Result<i32, DirectoryError>;
    async fn update_student(&self, id: i32, update: StudentUpdate) -> Result<(), DirectoryError>;
    async fn delete_student(&self, id: i32) -> Result<(), DirectoryError>;

    async fn find_parent(&self, email: &str) -> Result<Option<i32>, DirectoryError>;
    async fn create_parent(&self, new: NewParent) -> Result<i32, DirectoryError>;
    async fn update_parent(&self, id: i32, update: ParentUpdate) -> Result<(), DirectoryError>;
    async fn delete_parent(&self, id: i32) -> Result<(), DirectoryError>;

    /// Idempotent: linking an already linked pair reports [`LinkOutcome::Existing`].
    async fn link(&self, student_id: i32, parent_id: i32) -> Result<LinkOutcome, DirectoryError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewIdentity {
    pub username: String,
    pub email: Option<String>,
    pub role: &'static str,
}

/// Creates and removes login accounts for imported people.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_identity(&self, new: NewIdentity) -> Result<i32, DirectoryError>;
    async fn delete_identity(&self, user_id: i32) -> Result<(), DirectoryError>;
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Clone)]
pub struct DbDirectory {
    db: DatabaseConnection,
}

impl DbDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Directory for DbDirectory {
    async fn find_or_create_year_group(&self, name: &str) -> Result<i32, DirectoryError> {
        let find = || {
            year_group::Entity::find()
                .filter(year_group::Column::Name.eq(name))
                .one(&self.db)
        };
        if let Some(existing) = find().await? {
            return Ok(existing.id);
        }

        let model = year_group::ActiveModel {
            name: Set(name.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        match model.insert(&self.db).await {
            Ok(inserted) => Ok(inserted.id),
            // Another upload created it between our find and insert.
            Err(e) if is_unique_violation(&e) => find()
                .await?
                .map(|m| m.id)
                .ok_or_else(|| DirectoryError::Internal(format!("year group '{name}' vanished"))),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_or_create_class(
        &self,
        name: &str,
        year_group_id: i32,
    ) -> Result<i32, DirectoryError> {
        let find = || {
            class_group::Entity::find()
                .filter(class_group::Column::Name.eq(name))
                .one(&self.db)
        };
        if let Some(existing) = find().await? {
            return Ok(existing.id);
        }

        let model = class_group::ActiveModel {
            name: Set(name.to_string()),
            year_group_id: Set(year_group_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        match model.insert(&self.db).await {
            Ok(inserted) => Ok(inserted.id),
            Err(e) if is_unique_violation(&e) => find()
                .await?
                .map(|m| m.id)
                .ok_or_else(|| DirectoryError::Internal(format!("class '{name}' vanished"))),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_student(&self, admission_no: &str) -> Result<Option<i32>, DirectoryError> {
        let found = student::Entity::find()
            .filter(student::Column::AdmissionNo.eq(admission_no))
            .one(&self.db)
            .await?;
        Ok(found.map(|s| s.id))
    }

    async fn create_student(&self, new: NewStudent) -> Result<i32, DirectoryError> {
        let now = Utc::now();
        let admission_no = new.admission_no.clone();
        let model = student::ActiveModel {
            admission_no: Set(new.admission_no),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            date_of_birth: Set(new.date_of_birth),
            user_id: Set(new.user_id),
            username: Set(new.username),
            year_group_id: Set(new.year_group_id),
            class_group_id: Set(new.class_group_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        match model.insert(&self.db).await {
            Ok(inserted) => Ok(inserted.id),
            Err(e) if is_unique_violation(&e) => Err(DirectoryError::Conflict(format!(
                "Student with admission number '{admission_no}' was created concurrently"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_student(&self, id: i32, update: StudentUpdate) -> Result<(), DirectoryError> {
        let mut model = student::ActiveModel {
            id: Set(id),
            first_name: Set(update.first_name),
            last_name: Set(update.last_name),
            year_group_id: Set(update.year_group_id),
            class_group_id: Set(update.class_group_id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(dob) = update.date_of_birth {
            model.date_of_birth = Set(Some(dob));
        }
        model.update(&self.db).await?;
        Ok(())
    }

    async fn delete_student(&self, id: i32) -> Result<(), DirectoryError> {
        student_parent::Entity::delete_many()
            .filter(student_parent::Column::StudentId.eq(id))
            .exec(&self.db)
            .await?;
        student::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    async fn find_parent(&self, email: &str) -> Result<Option<i32>, DirectoryError> {
        let found = parent::Entity::find()
            .filter(parent::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        Ok(found.map(|p| p.id))
    }

    async fn create_parent(&self, new: NewParent) -> Result<i32, DirectoryError> {
        let now = Utc::now();
        let email = new.email.clone();
        let model = parent::ActiveModel {
            email: Set(new.email),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            phone: Set(new.phone),
            user_id: Set(new.user_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        match model.insert(&self.db).await {
            Ok(inserted) => Ok(inserted.id),
            Err(e) if is_unique_violation(&e) => Err(DirectoryError::Conflict(format!(
                "Parent with email '{email}' was created concurrently"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_parent(&self, id: i32, update: ParentUpdate) -> Result<(), DirectoryError> {
        let mut model = parent::ActiveModel {
            id: Set(id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(first_name) = update.first_name {
            model.first_name = Set(Some(first_name));
        }
        if let Some(last_name) = update.last_name {
            model.last_name = Set(Some(last_name));
        }
        if let Some(phone) = update.phone {
            model.phone = Set(Some(phone));
        }
        model.update(&self.db).await?;
        Ok(())
    }

    async fn delete_parent(&self, id: i32) -> Result<(), DirectoryError> {
        student_parent::Entity::delete_many()
            .filter(student_parent::Column::ParentId.eq(id))
            .exec(&self.db)
            .await?;
        parent::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    async fn link(&self, student_id: i32, parent_id: i32) -> Result<LinkOutcome, DirectoryError> {
        let model = student_parent::ActiveModel {
            student_id: Set(student_id),
            parent_id: Set(parent_id),
            created_at: Set(Utc::now()),
        };
        let result = student_parent::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    student_parent::Column::StudentId,
                    student_parent::Column::ParentId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .do_nothing()
            .exec_without_returning(&self.db)
            .await?;

        Ok(match result {
            TryInsertResult::Inserted(n) if n > 0 => LinkOutcome::Created,
            _ => LinkOutcome::Existing,
        })
    }
}

/// Hash a random password for an imported account on the blocking pool.
///
/// Imported accounts get an unusable password until a reset flow hands out
/// real credentials.
async fn provisional_password_hash() -> Result<String, DirectoryError> {
    tokio::task::spawn_blocking(|| hash_password(&random_password()))
        .await
        .map_err(|e| DirectoryError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| DirectoryError::Internal(format!("password hashing failed: {e}")))
}

#[derive(Clone)]
pub struct DbIdentityProvider {
    db: DatabaseConnection,
}

impl DbIdentityProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for DbIdentityProvider {
    async fn create_identity(&self, new: NewIdentity) -> Result<i32, DirectoryError> {
        let hash = provisional_password_hash().await?;
        let username = new.username.clone();

        let model = user::ActiveModel {
            username: Set(new.username),
            password: Set(hash),
            email: Set(new.email),
            role: Set(new.role.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        match model.insert(&self.db).await {
            Ok(inserted) => Ok(inserted.id),
            Err(e) if is_unique_violation(&e) => Err(DirectoryError::Conflict(format!(
                "Username '{username}' is already taken"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_identity(&self, user_id: i32) -> Result<(), DirectoryError> {
        user::Entity::delete_by_id(user_id).exec(&self.db).await?;
        Ok(())
    }
}
