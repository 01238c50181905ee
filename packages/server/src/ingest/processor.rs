//! Per-row import: validate, find-or-create the people, link them.
//!
//! Every identity and record created while importing a row is registered on a
//! [`Compensation`] list. If a later step of the same row fails or panics, the
//! list is unwound in reverse before the error or panic propagates, so a failed
//! row leaves no half-provisioned accounts behind. Year groups and classes are
//! shared between rows and are never unwound.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::FutureExt;
use serde::Serialize;
use tracing::warn;

use super::directory::{
    Directory, DirectoryError, IdentityProvider, LinkOutcome, NewIdentity, NewParent, NewStudent,
    ParentUpdate, StudentUpdate,
};
use super::parse::RosterRow;
use crate::entity::role::{PARENT_ROLE, STUDENT_ROLE};
use crate::utils::username;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityAction {
    Created,
    Updated,
}

impl EntityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

/// A successfully imported row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedRow {
    pub student_id: i32,
    pub parent_id: i32,
    pub student_action: EntityAction,
    pub parent_action: EntityAction,
    pub link: LinkOutcome,
}

impl ImportedRow {
    /// One-line description for the upload log, e.g.
    /// `"Student created, parent updated, linked"`.
    pub fn summary(&self) -> String {
        let link = match self.link {
            LinkOutcome::Created => "linked",
            LinkOutcome::Existing => "already linked",
        };
        format!(
            "Student {}, parent {}, {}",
            self.student_action.as_str(),
            self.parent_action.as_str(),
            link
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DirectoryError> for RowError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Conflict(msg) => RowError::Conflict(msg),
            other => RowError::Storage(other.to_string()),
        }
    }
}

/// A row that passed validation, with derived fields filled in.
#[derive(Clone, Debug, PartialEq)]
struct ValidRow {
    admission_no: String,
    first_name: String,
    last_name: String,
    class: String,
    year_group: String,
    email: String,
    date_of_birth: Option<NaiveDate>,
    parent_first_name: Option<String>,
    parent_last_name: Option<String>,
    parent_phone: Option<String>,
    student_username: String,
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

fn validate(row: &RosterRow) -> Result<ValidRow, RowError> {
    let missing: Vec<&str> = [
        ("admission_no", &row.admission_no),
        ("first_name", &row.first_name),
        ("last_name", &row.last_name),
        ("class", &row.class),
        ("year_group", &row.year_group),
        ("parent_email", &row.parent_email),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        return Err(RowError::Invalid(format!(
            "Missing required field(s): {}",
            missing.join(", ")
        )));
    }

    let email = username::from_email(&row.parent_email);
    if !is_valid_email(&email) {
        return Err(RowError::Invalid(format!(
            "Invalid email address '{}'",
            row.parent_email.trim()
        )));
    }

    let date_of_birth = match row.date_of_birth.as_deref() {
        Some(raw) => Some(parse_date(raw).ok_or_else(|| {
            RowError::Invalid(format!(
                "Invalid date of birth '{raw}' (expected YYYY-MM-DD, DD/MM/YYYY or DD-MM-YYYY)"
            ))
        })?),
        None => None,
    };

    let student_username = username::from_names(&row.first_name, &row.last_name);
    if !student_username.contains('.') {
        return Err(RowError::Invalid(format!(
            "Cannot derive a username from '{} {}'",
            row.first_name.trim(),
            row.last_name.trim()
        )));
    }

    Ok(ValidRow {
        admission_no: row.admission_no.trim().to_string(),
        first_name: row.first_name.trim().to_string(),
        last_name: row.last_name.trim().to_string(),
        class: row.class.trim().to_string(),
        year_group: row.year_group.trim().to_string(),
        email,
        date_of_birth,
        parent_first_name: row.parent_first_name.clone(),
        parent_last_name: row.parent_last_name.clone(),
        parent_phone: row.parent_phone.clone(),
        student_username,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Undo {
    Identity(i32),
    Student(i32),
    Parent(i32),
}

/// Things created by the current row, undone in reverse on failure.
#[derive(Debug, Default)]
struct Compensation {
    steps: Vec<Undo>,
}

impl Compensation {
    fn push(&mut self, step: Undo) {
        self.steps.push(step);
    }

    /// The row succeeded; keep everything.
    fn disarm(mut self) {
        self.steps.clear();
    }

    async fn unwind(self, directory: &dyn Directory, identities: &dyn IdentityProvider) {
        for step in self.steps.into_iter().rev() {
            let result = match step {
                Undo::Student(id) => directory.delete_student(id).await,
                Undo::Parent(id) => directory.delete_parent(id).await,
                Undo::Identity(id) => identities.delete_identity(id).await,
            };
            if let Err(e) = result {
                warn!(?step, error = %e, "Failed to undo partial row import");
            }
        }
    }
}

/// Imports one roster row into the directory.
#[derive(Clone)]
pub struct RowProcessor {
    directory: Arc<dyn Directory>,
    identities: Arc<dyn IdentityProvider>,
}

impl RowProcessor {
    pub fn new(directory: Arc<dyn Directory>, identities: Arc<dyn IdentityProvider>) -> Self {
        Self {
            directory,
            identities,
        }
    }

    pub async fn process(&self, row: &RosterRow) -> Result<ImportedRow, RowError> {
        let row = validate(row)?;

        let year_group_id = self
            .directory
            .find_or_create_year_group(&row.year_group)
            .await?;
        let class_group_id = self
            .directory
            .find_or_create_class(&row.class, year_group_id)
            .await?;

        let mut undo = Compensation::default();
        let outcome =
            AssertUnwindSafe(self.import(&row, year_group_id, class_group_id, &mut undo))
                .catch_unwind()
                .await;

        match outcome {
            Ok(Ok(imported)) => {
                undo.disarm();
                Ok(imported)
            }
            Ok(Err(e)) => {
                undo.unwind(self.directory.as_ref(), self.identities.as_ref())
                    .await;
                Err(e)
            }
            Err(payload) => {
                undo.unwind(self.directory.as_ref(), self.identities.as_ref())
                    .await;
                panic::resume_unwind(payload)
            }
        }
    }

    async fn import(
        &self,
        row: &ValidRow,
        year_group_id: i32,
        class_group_id: i32,
        undo: &mut Compensation,
    ) -> Result<ImportedRow, RowError> {
        let (student_id, student_action) = self
            .upsert_student(row, year_group_id, class_group_id, undo)
            .await?;
        let (parent_id, parent_action) = self.upsert_parent(row, undo).await?;
        let link = self.directory.link(student_id, parent_id).await?;

        Ok(ImportedRow {
            student_id,
            parent_id,
            student_action,
            parent_action,
            link,
        })
    }

    async fn upsert_student(
        &self,
        row: &ValidRow,
        year_group_id: i32,
        class_group_id: i32,
        undo: &mut Compensation,
    ) -> Result<(i32, EntityAction), RowError> {
        if let Some(id) = self.directory.find_student(&row.admission_no).await? {
            self.directory
                .update_student(
                    id,
                    StudentUpdate {
                        first_name: row.first_name.clone(),
                        last_name: row.last_name.clone(),
                        date_of_birth: row.date_of_birth,
                        year_group_id,
                        class_group_id,
                    },
                )
                .await?;
            return Ok((id, EntityAction::Updated));
        }

        let user_id = self
            .identities
            .create_identity(NewIdentity {
                username: row.student_username.clone(),
                email: None,
                role: STUDENT_ROLE,
            })
            .await?;
        undo.push(Undo::Identity(user_id));

        let id = self
            .directory
            .create_student(NewStudent {
                admission_no: row.admission_no.clone(),
                first_name: row.first_name.clone(),
                last_name: row.last_name.clone(),
                date_of_birth: row.date_of_birth,
                user_id,
                username: row.student_username.clone(),
                year_group_id,
                class_group_id,
            })
            .await?;
        undo.push(Undo::Student(id));

        Ok((id, EntityAction::Created))
    }

    async fn upsert_parent(
        &self,
        row: &ValidRow,
        undo: &mut Compensation,
    ) -> Result<(i32, EntityAction), RowError> {
        if let Some(id) = self.directory.find_parent(&row.email).await? {
            self.directory
                .update_parent(
                    id,
                    ParentUpdate {
                        first_name: row.parent_first_name.clone(),
                        last_name: row.parent_last_name.clone(),
                        phone: row.parent_phone.clone(),
                    },
                )
                .await?;
            return Ok((id, EntityAction::Updated));
        }

        let user_id = self
            .identities
            .create_identity(NewIdentity {
                username: row.email.clone(),
                email: Some(row.email.clone()),
                role: PARENT_ROLE,
            })
            .await?;
        undo.push(Undo::Identity(user_id));

        let id = self
            .directory
            .create_parent(NewParent {
                email: row.email.clone(),
                first_name: row.parent_first_name.clone(),
                last_name: row.parent_last_name.clone(),
                phone: row.parent_phone.clone(),
                user_id,
            })
            .await?;
        undo.push(Undo::Parent(id));

        Ok((id, EntityAction::Created))
    }
}
