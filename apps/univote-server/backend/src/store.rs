//! The persistence seam. Handlers and the voting core only talk to a
//! [`Store`]; [`PgStore`][crate::db::PgStore] and
//! [`MemoryStore`][crate::memory::MemoryStore] implement it.

use async_trait::async_trait;
use types_rs::univote::{BallotItem, BallotRecord, ItemKind, Selection, Voter};
use uuid::Uuid;

use crate::auth::Credential;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// A backend failure. Every variant is potentially transient from the
/// caller's point of view and never means "already voted" or "not active".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of the conditional ballot insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A ballot with the same key already exists; nothing was written.
    AlreadyExists,
    /// The selection does not exist or belongs to another item; nothing was
    /// written.
    UnknownSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Ballots reference the record, so it was kept.
    InUse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BallotStats {
    pub total_ballots: u64,
    pub distinct_voters: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns `false` without writing anything if the university ID is taken.
    async fn create_voter(&self, voter: &Voter, credential: &Credential) -> Result<bool>;

    async fn get_voter(&self, id: Uuid) -> Result<Option<Voter>>;

    async fn find_credentials(&self, university_id: &str) -> Result<Option<(Voter, Credential)>>;

    async fn list_voters(&self) -> Result<Vec<Voter>>;

    /// Replaces the name, faculty and role of an existing account. Returns
    /// `false` if there is no such voter.
    async fn update_voter(&self, voter: &Voter) -> Result<bool>;

    /// Returns `false` if there is no such voter.
    async fn set_voter_active(&self, id: Uuid, is_active: bool) -> Result<bool>;

    /// Writes the item and its initial selections together.
    async fn create_item(&self, item: &BallotItem, selections: &[Selection]) -> Result<()>;

    async fn get_item(&self, kind: ItemKind, id: Uuid) -> Result<Option<BallotItem>>;

    async fn list_items(&self, kind: ItemKind) -> Result<Vec<BallotItem>>;

    /// Replaces the mutable fields of an existing item. Returns `false` if
    /// there is no such item.
    async fn update_item(&self, item: &BallotItem) -> Result<bool>;

    /// Deletes the item with its selections and ballots. Returns `false` if
    /// there is no such item.
    async fn delete_item(&self, kind: ItemKind, id: Uuid) -> Result<bool>;

    /// Returns `false` if the selection's item does not exist.
    async fn create_selection(&self, selection: &Selection) -> Result<bool>;

    /// Selections of an item in creation order.
    async fn list_selections(&self, item_id: Uuid) -> Result<Vec<Selection>>;

    async fn delete_selection(&self, id: Uuid) -> Result<DeleteOutcome>;

    /// Writes `ballot` only if no ballot with the same key exists and its
    /// selection belongs to its item, as one atomic step.
    async fn insert_ballot_if_absent(&self, ballot: &BallotRecord) -> Result<InsertOutcome>;

    async fn get_ballot(
        &self,
        kind: ItemKind,
        voter_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<BallotRecord>>;

    async fn list_ballots(&self, item_id: Uuid) -> Result<Vec<BallotRecord>>;

    async fn ballot_stats(&self) -> Result<BallotStats>;
}
