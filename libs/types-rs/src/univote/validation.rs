use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Faculty, ItemKind, Role, Scope, ScopeType, Status};

const UNIVERSITY_ID_PATTERN: &str = "^[A-Za-z0-9]{3,}$";
lazy_static! {
    static ref UNIVERSITY_ID_REGEX: Regex = Regex::new(UNIVERSITY_ID_PATTERN).unwrap();
}

const MIN_PASSWORD_LENGTH: usize = 8;
const MIN_NAME_LENGTH: usize = 2;
const MIN_POLL_OPTIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// One or more problems with administrator or registration input. Nothing is
/// written when these are returned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, thiserror::Error)]
#[error("{}", .0.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "))]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// Administrator input for creating or updating an election or poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotItemInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope_type: Option<ScopeType>,
    #[serde(default)]
    pub faculties: Vec<Faculty>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    #[serde(default)]
    pub status: Status,
    /// Initial options, only used when creating a poll.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl BallotItemInput {
    /// Checks the fields shared by create and update and returns the
    /// normalized scope.
    pub fn validate(&self) -> Result<Scope, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let scope = self.check_common(&mut errors);
        errors.into_result(scope)
    }

    /// Like [`Self::validate`], additionally requiring at least two non-empty
    /// options when creating a poll. Returns the scope and the trimmed
    /// options.
    pub fn validate_new(&self, kind: ItemKind) -> Result<(Scope, Vec<String>), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let scope = self.check_common(&mut errors);

        let options = self
            .options
            .iter()
            .map(|option| option.trim())
            .filter(|option| !option.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();

        match kind {
            ItemKind::Poll if options.len() < MIN_POLL_OPTIONS => {
                errors.push(
                    "options",
                    format!("A poll needs at least {MIN_POLL_OPTIONS} non-empty options"),
                );
            }
            ItemKind::Election if !options.is_empty() => {
                errors.push("options", "Candidates are added separately to an election");
            }
            _ => {}
        }

        errors.into_result((scope, options))
    }

    fn check_common(&self, errors: &mut ValidationErrors) -> Scope {
        if self.title.trim().is_empty() {
            errors.push("title", "Title is required");
        }

        if self.end_time <= self.start_time {
            errors.push("endTime", "End time must be after start time");
        }

        match self.scope_type {
            None => {
                errors.push("scopeType", "Scope type is required");
                Scope::default()
            }
            Some(ScopeType::AllFaculties) => Scope::all_faculties(),
            Some(ScopeType::SingleFaculty) => {
                if self.faculties.len() != 1 {
                    errors.push("faculties", "Select exactly one faculty");
                }
                Scope {
                    scope_type: Some(ScopeType::SingleFaculty),
                    faculties: self.faculties.clone(),
                }
            }
            Some(ScopeType::MultiFaculty) => {
                if self.faculties.is_empty() {
                    errors.push("faculties", "Select at least one faculty");
                }
                let mut faculties: Vec<Faculty> = Vec::with_capacity(self.faculties.len());
                for faculty in &self.faculties {
                    if !faculties.contains(faculty) {
                        faculties.push(faculty.clone());
                    }
                }
                Scope::multi(faculties)
            }
        }
    }
}

/// Administrator input for a candidate or a poll option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionInput {
    pub name: String,
    #[serde(default)]
    pub faculty: Option<Faculty>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub order: Option<i32>,
}

impl SelectionInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            faculty: None,
            bio: None,
            photo_url: None,
            order: None,
        }
    }

    /// Returns the trimmed name.
    pub fn validate(&self, kind: ItemKind) -> Result<String, ValidationErrors> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationErrors::new(
                "name",
                format!("The {} needs a name", kind.selection_noun()),
            ));
        }
        Ok(name.to_owned())
    }
}

/// Registration input for a voter or administrator account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterInput {
    pub university_id: String,
    pub name: String,
    #[serde(default)]
    pub faculty: Option<Faculty>,
    pub password: String,
}

impl VoterInput {
    pub fn validate(&self, role: Role) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if !UNIVERSITY_ID_REGEX.is_match(self.university_id.trim()) {
            errors.push(
                "universityId",
                "University ID must be at least 3 letters or digits",
            );
        }

        check_name(&self.name, &mut errors);

        if !is_strong_password(&self.password) {
            errors.push(
                "password",
                format!(
                    "Password must be at least {MIN_PASSWORD_LENGTH} characters and contain an upper-case letter, a lower-case letter and a digit"
                ),
            );
        }

        check_faculty(self.faculty.as_ref(), role, &mut errors);

        errors.into_result(())
    }
}

/// Administrator changes to an existing account. The university ID and
/// password cannot be changed this way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterUpdate {
    pub name: String,
    #[serde(default)]
    pub faculty: Option<Faculty>,
    pub role: Role,
}

impl VoterUpdate {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_name(&self.name, &mut errors);
        check_faculty(self.faculty.as_ref(), self.role, &mut errors);
        errors.into_result(())
    }
}

/// University IDs are case-insensitive; accounts store and look them up in
/// upper case.
pub fn normalize_university_id(university_id: &str) -> String {
    university_id.trim().to_ascii_uppercase()
}

fn check_name(name: &str, errors: &mut ValidationErrors) {
    if name.trim().chars().count() < MIN_NAME_LENGTH {
        errors.push(
            "name",
            format!("Name must be at least {MIN_NAME_LENGTH} characters"),
        );
    }
}

fn check_faculty(faculty: Option<&Faculty>, role: Role, errors: &mut ValidationErrors) {
    if role == Role::Voter && faculty.is_none() {
        errors.push("faculty", "Faculty is required");
    }
}

fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}
