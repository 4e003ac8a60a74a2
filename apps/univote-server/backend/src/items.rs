//! Voter-facing routes for elections and polls. The same routes serve both
//! kinds; the [`ItemKind`] comes from an [`Extension`] set where the router is
//! nested.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use time::OffsetDateTime;
use types_rs::univote::{
    display_order, is_eligible, visible_items, Faculty, ItemKind, ItemWithStatus, Status, Voter,
};
use univote_server_client::{CastVoteRequest, HasVotedResponse};
use uuid::Uuid;

use crate::{
    error::Error, results::ResultAggregator, session::CurrentVoter, state::AppState,
    vote::VoteGuard,
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items))
        .route("/:item_id", get(get_item))
        .route("/:item_id/selections", get(list_selections))
        .route("/:item_id/vote", get(has_voted).post(cast_vote))
        .route("/:item_id/results", get(get_results))
}

/// Loads an item the voter is allowed to see: published and in scope.
async fn visible_item(
    state: &AppState,
    voter: &Voter,
    kind: ItemKind,
    item_id: Uuid,
    now: OffsetDateTime,
) -> Result<ItemWithStatus, Error> {
    let item = state
        .store
        .get_item(kind, item_id)
        .await?
        .ok_or_else(|| Error::item_not_found(kind))?;

    let entry = ItemWithStatus::new(item, now);
    if entry.computed_status == Status::Draft
        || !is_eligible(
            voter.faculty.as_ref(),
            &entry.item.scope,
            state.default_eligibility,
        )
    {
        return Err(Error::item_not_found(kind));
    }

    Ok(entry)
}

async fn list_items(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    CurrentVoter(voter): CurrentVoter,
) -> Result<impl IntoResponse, Error> {
    let items = state.store.list_items(kind).await?;
    Ok(Json(visible_items(
        items,
        voter.faculty.as_ref(),
        OffsetDateTime::now_utc(),
        state.default_eligibility,
    )))
}

async fn get_item(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    CurrentVoter(voter): CurrentVoter,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let entry = visible_item(&state, &voter, kind, item_id, OffsetDateTime::now_utc()).await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
struct SelectionFilter {
    faculty: Option<Faculty>,
}

async fn list_selections(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    CurrentVoter(voter): CurrentVoter,
    Path(item_id): Path<Uuid>,
    Query(SelectionFilter { faculty }): Query<SelectionFilter>,
) -> Result<impl IntoResponse, Error> {
    visible_item(&state, &voter, kind, item_id, OffsetDateTime::now_utc()).await?;

    let mut selections = state.store.list_selections(item_id).await?;
    if let Some(faculty) = faculty {
        selections.retain(|selection| selection.faculty.as_ref() == Some(&faculty));
    }

    Ok(Json(display_order(selections)))
}

async fn cast_vote(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    CurrentVoter(voter): CurrentVoter,
    Path(item_id): Path<Uuid>,
    Json(CastVoteRequest { selection_id }): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, Error> {
    let ballot = VoteGuard::new(state.store.as_ref(), state.default_eligibility)
        .cast_vote(
            &voter,
            kind,
            item_id,
            selection_id,
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ballot)))
}

async fn has_voted(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    CurrentVoter(voter): CurrentVoter,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    visible_item(&state, &voter, kind, item_id, OffsetDateTime::now_utc()).await?;

    let has_voted = VoteGuard::new(state.store.as_ref(), state.default_eligibility)
        .has_voted(kind, voter.id, item_id)
        .await?;
    Ok(Json(HasVotedResponse { has_voted }))
}

async fn get_results(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    CurrentVoter(voter): CurrentVoter,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let tally = ResultAggregator::new(state.store.as_ref())
        .voter_results(
            &voter,
            kind,
            item_id,
            state.default_eligibility,
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok(Json(tally))
}
