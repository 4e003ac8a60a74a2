//! Database access for the application.
//!
//! All direct use of [SQLx][`sqlx`] queries should be in this module. Queries
//! are checked at runtime rather than with the `query!` macros, so building
//! does not need a database or prepared query metadata.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{self, postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use tracing::Level;
use types_rs::univote::{
    BallotItem, BallotRecord, Faculty, ItemKind, Scope, Selection, Voter,
};
use uuid::Uuid;

use crate::{
    auth::Credential,
    store::{BallotStats, DeleteOutcome, InsertOutcome, Result, Store, StoreError},
};

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Sets up the database pool and runs any pending migrations, returning the
/// pool to be used by the app.
pub async fn setup(database_url: &str) -> color_eyre::Result<PgPool> {
    let _entered = tracing::span!(Level::DEBUG, "Setting up database").entered();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;
    sqlx::migrate!("db/migrations").run(&pool).await?;
    Ok(pool)
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(e) if e.code().as_deref() == Some(FOREIGN_KEY_VIOLATION)
    )
}

fn parse_column<T: FromStr<Err = String>>(column: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn parse_faculty(column: &str, value: Option<String>) -> Result<Option<Faculty>> {
    value
        .map(Faculty::try_from)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

#[derive(Debug, sqlx::FromRow)]
struct VoterRow {
    id: Uuid,
    university_id: String,
    name: String,
    faculty: Option<String>,
    role: String,
    is_active: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<VoterRow> for Voter {
    type Error = StoreError;

    fn try_from(row: VoterRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            university_id: row.university_id,
            name: row.name,
            faculty: parse_faculty("voters.faculty", row.faculty)?,
            role: parse_column("voters.role", &row.role)?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    voter: VoterRow,
    password_salt: String,
    password_hash: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    kind: String,
    title: String,
    description: String,
    scope_type: Option<String>,
    scope_faculties: Vec<String>,
    start_time: OffsetDateTime,
    end_time: OffsetDateTime,
    status: String,
    created_at: OffsetDateTime,
}

impl TryFrom<ItemRow> for BallotItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self> {
        let scope_type = row
            .scope_type
            .as_deref()
            .map(|value| parse_column("ballot_items.scope_type", value))
            .transpose()?;
        let faculties = row
            .scope_faculties
            .into_iter()
            .map(|value| parse_column("ballot_items.scope_faculties", &value))
            .collect::<Result<Vec<Faculty>>>()?;

        Ok(Self {
            id: row.id,
            kind: parse_column("ballot_items.kind", &row.kind)?,
            title: row.title,
            description: row.description,
            scope: Scope {
                scope_type,
                faculties,
            },
            start_time: row.start_time,
            end_time: row.end_time,
            status: parse_column("ballot_items.status", &row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SelectionRow {
    id: Uuid,
    item_id: Uuid,
    name: String,
    faculty: Option<String>,
    bio: Option<String>,
    photo_url: Option<String>,
    display_order: Option<i32>,
    created_at: OffsetDateTime,
}

impl TryFrom<SelectionRow> for Selection {
    type Error = StoreError;

    fn try_from(row: SelectionRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            item_id: row.item_id,
            name: row.name,
            faculty: parse_faculty("selections.faculty", row.faculty)?,
            bio: row.bio,
            photo_url: row.photo_url,
            order: row.display_order,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BallotRow {
    ballot_key: String,
    kind: String,
    voter_id: Uuid,
    item_id: Uuid,
    selection_id: Uuid,
    voter_faculty: Option<String>,
    cast_at: OffsetDateTime,
}

impl TryFrom<BallotRow> for BallotRecord {
    type Error = StoreError;

    fn try_from(row: BallotRow) -> Result<Self> {
        Ok(Self {
            key: row.ballot_key,
            kind: parse_column("ballot_records.kind", &row.kind)?,
            voter_id: row.voter_id,
            item_id: row.item_id,
            selection_id: row.selection_id,
            voter_faculty: parse_faculty("ballot_records.voter_faculty", row.voter_faculty)?,
            cast_at: row.cast_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const VOTER_COLUMNS: &str = "id, university_id, name, faculty, role, is_active, created_at";
const ITEM_COLUMNS: &str = "id, kind, title, description, scope_type, scope_faculties, \
                            start_time, end_time, status, created_at";
const SELECTION_COLUMNS: &str =
    "id, item_id, name, faculty, bio, photo_url, display_order, created_at";
const BALLOT_COLUMNS: &str =
    "ballot_key, kind, voter_id, item_id, selection_id, voter_faculty, cast_at";

/// [`Store`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_selection(
        connection: &mut sqlx::PgConnection,
        selection: &Selection,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO selections (id, item_id, name, faculty, bio, photo_url, display_order, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(selection.id)
        .bind(selection.item_id)
        .bind(&selection.name)
        .bind(selection.faculty.as_ref().map(Faculty::as_str))
        .bind(selection.bio.as_deref())
        .bind(selection.photo_url.as_deref())
        .bind(selection.order)
        .bind(selection.created_at)
        .execute(connection)
        .await?;
        Ok(())
    }
}

fn faculty_names(scope: &Scope) -> Vec<String> {
    scope
        .faculties
        .iter()
        .map(|faculty| faculty.as_str().to_owned())
        .collect()
}

#[async_trait]
impl Store for PgStore {
    async fn create_voter(&self, voter: &Voter, credential: &Credential) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO voters (id, university_id, name, faculty, role, is_active, password_salt, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (university_id) DO NOTHING
            "#,
        )
        .bind(voter.id)
        .bind(&voter.university_id)
        .bind(&voter.name)
        .bind(voter.faculty.as_ref().map(Faculty::as_str))
        .bind(voter.role.as_str())
        .bind(voter.is_active)
        .bind(&credential.salt)
        .bind(&credential.hash)
        .bind(voter.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_voter(&self, id: Uuid) -> Result<Option<Voter>> {
        sqlx::query_as::<_, VoterRow>(&format!(
            "SELECT {VOTER_COLUMNS} FROM voters WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Voter::try_from)
        .transpose()
    }

    async fn find_credentials(&self, university_id: &str) -> Result<Option<(Voter, Credential)>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {VOTER_COLUMNS}, password_salt, password_hash FROM voters WHERE university_id = $1"
        ))
        .bind(university_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let credential = Credential {
                salt: row.password_salt,
                hash: row.password_hash,
            };
            Ok((Voter::try_from(row.voter)?, credential))
        })
        .transpose()
    }

    async fn list_voters(&self) -> Result<Vec<Voter>> {
        let rows = sqlx::query_as::<_, VoterRow>(&format!(
            "SELECT {VOTER_COLUMNS} FROM voters ORDER BY created_at, university_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn update_voter(&self, voter: &Voter) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE voters
            SET name = $2, faculty = $3, role = $4
            WHERE id = $1
            "#,
        )
        .bind(voter.id)
        .bind(&voter.name)
        .bind(voter.faculty.as_ref().map(Faculty::as_str))
        .bind(voter.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_voter_active(&self, id: Uuid, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE voters SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_item(&self, item: &BallotItem, selections: &[Selection]) -> Result<()> {
        let mut txn = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO ballot_items (id, kind, title, description, scope_type, scope_faculties, start_time, end_time, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.scope.scope_type.map(|scope_type| scope_type.as_str()))
        .bind(faculty_names(&item.scope))
        .bind(item.start_time)
        .bind(item.end_time)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .execute(&mut *txn)
        .await?;

        for selection in selections {
            Self::insert_selection(&mut *txn, selection).await?;
        }

        txn.commit().await?;
        tracing::debug!(
            "Created {} {} with {} selections",
            item.kind,
            item.id,
            selections.len()
        );
        Ok(())
    }

    async fn get_item(&self, kind: ItemKind, id: Uuid) -> Result<Option<BallotItem>> {
        sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM ballot_items WHERE id = $1 AND kind = $2"
        ))
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(BallotItem::try_from)
        .transpose()
    }

    async fn list_items(&self, kind: ItemKind) -> Result<Vec<BallotItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM ballot_items WHERE kind = $1 ORDER BY created_at"
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn update_item(&self, item: &BallotItem) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ballot_items
            SET title = $3,
                description = $4,
                scope_type = $5,
                scope_faculties = $6,
                start_time = $7,
                end_time = $8,
                status = $9
            WHERE id = $1 AND kind = $2
            "#,
        )
        .bind(item.id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.scope.scope_type.map(|scope_type| scope_type.as_str()))
        .bind(faculty_names(&item.scope))
        .bind(item.start_time)
        .bind(item.end_time)
        .bind(item.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_item(&self, kind: ItemKind, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ballot_items WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_selection(&self, selection: &Selection) -> Result<bool> {
        let mut connection = self.pool.acquire().await?;
        match Self::insert_selection(&mut *connection, selection).await {
            Ok(()) => Ok(true),
            Err(e) if is_foreign_key_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_selections(&self, item_id: Uuid) -> Result<Vec<Selection>> {
        let rows = sqlx::query_as::<_, SelectionRow>(&format!(
            "SELECT {SELECTION_COLUMNS} FROM selections WHERE item_id = $1 ORDER BY seq"
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn delete_selection(&self, id: Uuid) -> Result<DeleteOutcome> {
        match sqlx::query("DELETE FROM selections WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(result) if result.rows_affected() == 0 => Ok(DeleteOutcome::NotFound),
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if is_foreign_key_violation(&e) => Ok(DeleteOutcome::InUse),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_ballot_if_absent(&self, ballot: &BallotRecord) -> Result<InsertOutcome> {
        let mut txn = self.pool.begin().await?;

        // keeps the selection from being deleted before the ballot lands
        let selection = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM selections WHERE id = $1 AND item_id = $2 FOR SHARE",
        )
        .bind(ballot.selection_id)
        .bind(ballot.item_id)
        .fetch_optional(&mut *txn)
        .await?;

        if selection.is_none() {
            txn.rollback().await?;
            return Ok(InsertOutcome::UnknownSelection);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO ballot_records (ballot_key, kind, voter_id, item_id, selection_id, voter_faculty, cast_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&ballot.key)
        .bind(ballot.kind.as_str())
        .bind(ballot.voter_id)
        .bind(ballot.item_id)
        .bind(ballot.selection_id)
        .bind(ballot.voter_faculty.as_ref().map(Faculty::as_str))
        .bind(ballot.cast_at)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    async fn get_ballot(
        &self,
        kind: ItemKind,
        voter_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<BallotRecord>> {
        sqlx::query_as::<_, BallotRow>(&format!(
            "SELECT {BALLOT_COLUMNS} FROM ballot_records WHERE ballot_key = $1"
        ))
        .bind(BallotRecord::key(kind, voter_id, item_id))
        .fetch_optional(&self.pool)
        .await?
        .map(BallotRecord::try_from)
        .transpose()
    }

    async fn list_ballots(&self, item_id: Uuid) -> Result<Vec<BallotRecord>> {
        let rows = sqlx::query_as::<_, BallotRow>(&format!(
            "SELECT {BALLOT_COLUMNS} FROM ballot_records WHERE item_id = $1 ORDER BY cast_at"
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn ballot_stats(&self) -> Result<BallotStats> {
        let (total_ballots, distinct_voters) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(DISTINCT voter_id) FROM ballot_records",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(BallotStats {
            total_ballots: u64::try_from(total_ballots)
                .map_err(|e| StoreError::Corrupt(format!("ballot count: {e}")))?,
            distinct_voters: u64::try_from(distinct_voters)
                .map_err(|e| StoreError::Corrupt(format!("voter count: {e}")))?,
        })
    }
}
