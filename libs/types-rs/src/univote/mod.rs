use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod eligibility;
mod listing;
mod status;
mod tally;
mod validation;

pub use eligibility::{is_eligible, DefaultEligibility};
pub use listing::{display_order, visible_items, ItemWithStatus};
pub use status::{effective_status, resolve};
pub use tally::{tabulate, Tally, TallyEntry};
pub use validation::{
    normalize_university_id, BallotItemInput, FieldError, SelectionInput, ValidationErrors,
    VoterInput, VoterUpdate,
};

/// A faculty name, e.g. `Engineering`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Faculty(String);

impl Faculty {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Placeholder faculties that carry no scope information. Voters holding
    /// one of these are treated as having no faculty at all.
    pub fn is_unspecified(&self) -> bool {
        matches!(self.0.as_str(), "All" | "Unknown")
    }
}

impl TryFrom<String> for Faculty {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

impl TryFrom<&str> for Faculty {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.is_empty() {
            Err("Faculty cannot be empty".to_owned())
        } else {
            Ok(Self(value.to_owned()))
        }
    }
}

impl From<Faculty> for String {
    fn from(faculty: Faculty) -> Self {
        faculty.0
    }
}

impl FromStr for Faculty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.try_into()
    }
}

impl Display for Faculty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Elections and polls behave identically but live in separate collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Election,
    Poll,
}

impl ItemKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Election => "election",
            Self::Poll => "poll",
        }
    }

    /// Path segment of this kind's collection, e.g. `/api/polls`.
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Election => "elections",
            Self::Poll => "polls",
        }
    }

    /// What a selection of this kind of item is called.
    pub const fn selection_noun(self) -> &'static str {
        match self {
            Self::Election => "candidate",
            Self::Poll => "option",
        }
    }
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "election" | "elections" => Ok(Self::Election),
            "poll" | "polls" => Ok(Self::Poll),
            _ => Err(format!("unknown item kind: {s}")),
        }
    }
}

/// Lifecycle status of a ballot item.
///
/// The stored status of an item may be any of these. The computed status is
/// never [`Status::Draft`]; see [`resolve`] and [`effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Draft,
    Scheduled,
    Active,
    Closed,
}

impl Status {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("unknown status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeType {
    AllFaculties,
    SingleFaculty,
    MultiFaculty,
}

impl ScopeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllFaculties => "ALL_FACULTIES",
            Self::SingleFaculty => "SINGLE_FACULTY",
            Self::MultiFaculty => "MULTI_FACULTY",
        }
    }
}

impl Display for ScopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALL_FACULTIES" => Ok(Self::AllFaculties),
            "SINGLE_FACULTY" => Ok(Self::SingleFaculty),
            "MULTI_FACULTY" => Ok(Self::MultiFaculty),
            _ => Err(format!("unknown scope type: {s}")),
        }
    }
}

/// Faculty restriction attached to a ballot item. Legacy records may carry
/// neither a type nor a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_type: Option<ScopeType>,
    #[serde(default)]
    pub faculties: Vec<Faculty>,
}

impl Scope {
    pub const fn all_faculties() -> Self {
        Self {
            scope_type: Some(ScopeType::AllFaculties),
            faculties: Vec::new(),
        }
    }

    pub fn single(faculty: Faculty) -> Self {
        Self {
            scope_type: Some(ScopeType::SingleFaculty),
            faculties: vec![faculty],
        }
    }

    pub fn multi(faculties: impl IntoIterator<Item = Faculty>) -> Self {
        Self {
            scope_type: Some(ScopeType::MultiFaculty),
            faculties: faculties.into_iter().collect(),
        }
    }

    /// Neither a scope type nor any faculties.
    pub fn is_missing(&self) -> bool {
        self.scope_type.is_none() && self.faculties.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Voter,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Voter => "voter",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voter" => Ok(Self::Voter),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub id: Uuid,
    /// Login identifier, e.g. `ENG001`.
    pub university_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<Faculty>,
    pub role: Role,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl Voter {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// An election or a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotItem {
    pub id: Uuid,
    pub kind: ItemKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: time::OffsetDateTime,
    /// Stored, administrator-set status. Advisory only.
    pub status: Status,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl BallotItem {
    /// Status as seen by voters at `now`. See [`effective_status`].
    pub fn effective_status(&self, now: time::OffsetDateTime) -> Status {
        effective_status(self.status, self.start_time, self.end_time, now)
    }
}

/// A candidate (for elections) or an option (for polls).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub id: Uuid,
    pub item_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<Faculty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

/// An immutable vote. At most one exists per (voter, item); the
/// deterministic [`BallotRecord::key`] is its primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotRecord {
    pub key: String,
    pub kind: ItemKind,
    pub voter_id: Uuid,
    pub item_id: Uuid,
    pub selection_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_faculty: Option<Faculty>,
    #[serde(with = "time::serde::rfc3339")]
    pub cast_at: time::OffsetDateTime,
}

impl BallotRecord {
    pub fn new(
        kind: ItemKind,
        voter: &Voter,
        item_id: Uuid,
        selection_id: Uuid,
        cast_at: time::OffsetDateTime,
    ) -> Self {
        Self {
            key: Self::key(kind, voter.id, item_id),
            kind,
            voter_id: voter.id,
            item_id,
            selection_id,
            voter_faculty: voter.faculty.clone(),
            cast_at,
        }
    }

    /// Hex-encoded SHA-256 of `kind:voter_id:item_id`. Two casts by the same
    /// voter for the same item always collide on this key.
    pub fn key(kind: ItemKind, voter_id: Uuid, item_id: Uuid) -> String {
        let input = format!("{kind}:{voter_id}:{item_id}");
        hex::encode(hmac_sha256::Hash::hash(input.as_bytes()))
    }
}

/// Aggregate numbers shown on the administrator dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub active_elections: u64,
    pub active_polls: u64,
    pub total_ballots: u64,
    pub distinct_voters: u64,
}

/// Machine-readable rejection category, shared by the server and its clients
/// so that a duplicate vote is never mistaken for a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Unauthorized,
    Forbidden,
    NotEligible,
    NotFound,
    AlreadyVoted,
    NotActive,
    ResultsUnavailable,
    Transient,
    /// Stored data the server cannot read. Retrying does not help.
    Internal,
}

impl ErrorCode {
    /// Whether retrying the same request may succeed.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Error body returned by the server for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: ErrorCode,
}
