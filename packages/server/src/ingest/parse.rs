//! Roster CSV parsing.
//!
//! Turns an uploaded file into clean [`RosterRow`]s. Header names are matched
//! case- and space-insensitively against a small alias table, values are
//! trimmed, and rows with no content at all are dropped before counting.

use csv::{ReaderBuilder, StringRecord, Trim};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed CSV: {0}")]
    Malformed(#[from] csv::Error),
    #[error("CSV is missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
    #[error("CSV file contains no data rows")]
    Empty,
}

/// One data row of a roster file. Required fields may still be empty here;
/// the row processor rejects those per row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RosterRow {
    pub admission_no: String,
    pub first_name: String,
    pub last_name: String,
    pub class: String,
    pub year_group: String,
    pub parent_email: String,
    pub date_of_birth: Option<String>,
    pub parent_first_name: Option<String>,
    pub parent_last_name: Option<String>,
    pub parent_phone: Option<String>,
}

impl RosterRow {
    /// Label used in logs and progress frames.
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            "(unnamed)".to_string()
        } else {
            name.to_string()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    AdmissionNo,
    FirstName,
    LastName,
    Class,
    YearGroup,
    ParentEmail,
    DateOfBirth,
    ParentFirstName,
    ParentLastName,
    ParentPhone,
}

const REQUIRED: [(Field, &str); 6] = [
    (Field::AdmissionNo, "admission_no"),
    (Field::FirstName, "first_name"),
    (Field::LastName, "last_name"),
    (Field::Class, "class"),
    (Field::YearGroup, "year_group"),
    (Field::ParentEmail, "parent_email"),
];

fn field_for(header: &str) -> Option<Field> {
    let field = match header {
        "admission_no" | "admission_number" | "reference" | "upn" => Field::AdmissionNo,
        "first_name" | "forename" | "given_name" => Field::FirstName,
        "last_name" | "surname" | "family_name" => Field::LastName,
        "class" | "form" | "registration_group" => Field::Class,
        "year_group" | "year" => Field::YearGroup,
        "parent_email" | "contact_email" | "email" => Field::ParentEmail,
        "date_of_birth" | "dob" => Field::DateOfBirth,
        "parent_first_name" => Field::ParentFirstName,
        "parent_last_name" => Field::ParentLastName,
        "parent_phone" => Field::ParentPhone,
        _ => return None,
    };
    Some(field)
}

/// `" Parent Email "` -> `"parent_email"`.
fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

struct ColumnMap {
    columns: Vec<(Field, usize)>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, ParseError> {
        let mut columns: Vec<(Field, usize)> = Vec::new();
        for (idx, raw) in headers.iter().enumerate() {
            if let Some(field) = field_for(&normalize_header(raw))
                && !columns.iter().any(|(f, _)| *f == field)
            {
                columns.push((field, idx));
            }
        }

        let missing: Vec<&'static str> = REQUIRED
            .iter()
            .filter(|(field, _)| !columns.iter().any(|(f, _)| f == field))
            .map(|(_, name)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::MissingColumns(missing));
        }

        Ok(Self { columns })
    }

    fn get(&self, record: &StringRecord, field: Field) -> String {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, idx)| record.get(*idx))
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    fn optional(&self, record: &StringRecord, field: Field) -> Option<String> {
        Some(self.get(record, field)).filter(|v| !v.is_empty())
    }

    fn row(&self, record: &StringRecord) -> RosterRow {
        RosterRow {
            admission_no: self.get(record, Field::AdmissionNo),
            first_name: self.get(record, Field::FirstName),
            last_name: self.get(record, Field::LastName),
            class: self.get(record, Field::Class),
            year_group: self.get(record, Field::YearGroup),
            parent_email: self.get(record, Field::ParentEmail),
            date_of_birth: self.optional(record, Field::DateOfBirth),
            parent_first_name: self.optional(record, Field::ParentFirstName),
            parent_last_name: self.optional(record, Field::ParentLastName),
            parent_phone: self.optional(record, Field::ParentPhone),
        }
    }
}

/// Parse a roster file. Fails when the file is not valid CSV, lacks a required
/// column, or has no non-blank data rows.
pub fn parse_roster(bytes: &[u8]) -> Result<Vec<RosterRow>, ParseError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(columns.row(&record));
    }

    if rows.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(rows)
}
