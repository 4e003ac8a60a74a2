//! Administrator routes: managing items, selections and voter accounts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use time::OffsetDateTime;
use types_rs::univote::{
    BallotItem, BallotItemInput, ItemKind, ItemWithStatus, Role, Scope, Selection,
    SelectionInput, Stats, Status, ValidationErrors, Voter, VoterUpdate,
};
use univote_server_client::{CreateVoterRequest, SetActiveRequest};
use uuid::Uuid;

use crate::{
    auth,
    error::Error,
    results::ResultAggregator,
    session::Admin,
    state::AppState,
    store::{DeleteOutcome, Store},
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .nest(
            "/elections",
            item_routes().layer(Extension(ItemKind::Election)),
        )
        .nest("/polls", item_routes().layer(Extension(ItemKind::Poll)))
        .route("/selections/:selection_id", delete(delete_selection))
        .route("/voters", get(list_voters).post(create_voter))
        .route("/voters/:voter_id", put(update_voter))
        .route("/voters/:voter_id/active", put(set_voter_active))
        .route("/stats", get(get_stats))
}

fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/:item_id", put(update_item).delete(delete_item))
        .route("/:item_id/selections", post(add_selection))
        .route("/:item_id/results", get(get_results))
}

fn build_item(
    id: Uuid,
    kind: ItemKind,
    input: BallotItemInput,
    scope: Scope,
    created_at: OffsetDateTime,
) -> BallotItem {
    BallotItem {
        id,
        kind,
        title: input.title.trim().to_owned(),
        description: input.description.trim().to_owned(),
        scope,
        start_time: input.start_time,
        end_time: input.end_time,
        status: input.status,
        created_at,
    }
}

/// Every item of the kind, drafts included.
async fn list_items(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    Admin(_): Admin,
) -> Result<impl IntoResponse, Error> {
    let now = OffsetDateTime::now_utc();
    let items = state
        .store
        .list_items(kind)
        .await?
        .into_iter()
        .map(|item| ItemWithStatus::new(item, now))
        .collect::<Vec<_>>();
    Ok(Json(items))
}

async fn create_item(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    Admin(admin): Admin,
    Json(input): Json<BallotItemInput>,
) -> Result<impl IntoResponse, Error> {
    let (scope, options) = input.validate_new(kind)?;
    let now = OffsetDateTime::now_utc();
    let item = build_item(Uuid::new_v4(), kind, input, scope, now);

    let selections = options
        .into_iter()
        .zip(0..)
        .map(|(name, order)| Selection {
            id: Uuid::new_v4(),
            item_id: item.id,
            name,
            faculty: None,
            bio: None,
            photo_url: None,
            order: Some(order),
            created_at: now,
        })
        .collect::<Vec<_>>();

    state.store.create_item(&item, &selections).await?;
    tracing::info!(item_id = %item.id, admin_id = %admin.id, "created {kind}");
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    Admin(admin): Admin,
    Path(item_id): Path<Uuid>,
    Json(input): Json<BallotItemInput>,
) -> Result<impl IntoResponse, Error> {
    let scope = input.validate()?;
    let existing = state
        .store
        .get_item(kind, item_id)
        .await?
        .ok_or_else(|| Error::item_not_found(kind))?;

    let item = build_item(item_id, kind, input, scope, existing.created_at);
    if !state.store.update_item(&item).await? {
        return Err(Error::item_not_found(kind));
    }

    tracing::info!(item_id = %item.id, admin_id = %admin.id, "updated {kind}");
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    Admin(admin): Admin,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    if !state.store.delete_item(kind, item_id).await? {
        return Err(Error::item_not_found(kind));
    }

    tracing::info!(item_id = %item_id, admin_id = %admin.id, "deleted {kind}");
    Ok(StatusCode::NO_CONTENT)
}

async fn add_selection(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    Admin(_): Admin,
    Path(item_id): Path<Uuid>,
    Json(input): Json<SelectionInput>,
) -> Result<impl IntoResponse, Error> {
    let name = input.validate(kind)?;
    if state.store.get_item(kind, item_id).await?.is_none() {
        return Err(Error::item_not_found(kind));
    }

    let selection = Selection {
        id: Uuid::new_v4(),
        item_id,
        name,
        faculty: input.faculty,
        bio: input.bio.filter(|bio| !bio.trim().is_empty()),
        photo_url: input.photo_url.filter(|url| !url.trim().is_empty()),
        order: input.order,
        created_at: OffsetDateTime::now_utc(),
    };

    if !state.store.create_selection(&selection).await? {
        return Err(Error::item_not_found(kind));
    }

    Ok((StatusCode::CREATED, Json(selection)))
}

async fn delete_selection(
    State(state): State<AppState>,
    Admin(_): Admin,
    Path(selection_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    match state.store.delete_selection(selection_id).await? {
        DeleteOutcome::Deleted => Ok(StatusCode::NO_CONTENT),
        DeleteOutcome::NotFound => Err(Error::NotFound("No such selection".to_owned())),
        DeleteOutcome::InUse => Err(ValidationErrors::new(
            "selectionId",
            "This selection has already received votes and cannot be deleted",
        )
        .into()),
    }
}

/// Live results, whatever the item's status.
async fn get_results(
    State(state): State<AppState>,
    Extension(kind): Extension<ItemKind>,
    Admin(_): Admin,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    let tally = ResultAggregator::new(state.store.as_ref())
        .aggregate(kind, item_id)
        .await?;
    Ok(Json(tally))
}

async fn list_voters(
    State(state): State<AppState>,
    Admin(_): Admin,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.store.list_voters().await?))
}

async fn create_voter(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Json(CreateVoterRequest { input, role }): Json<CreateVoterRequest>,
) -> Result<impl IntoResponse, Error> {
    let voter = auth::register(
        state.store.as_ref(),
        input,
        role,
        OffsetDateTime::now_utc(),
    )
    .await?;
    tracing::info!(voter_id = %voter.id, admin_id = %admin.id, "created account");
    Ok((StatusCode::CREATED, Json(voter)))
}

async fn update_voter(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Path(voter_id): Path<Uuid>,
    Json(update): Json<VoterUpdate>,
) -> Result<impl IntoResponse, Error> {
    update.validate()?;
    if voter_id == admin.id && update.role != Role::Admin {
        return Err(
            ValidationErrors::new("role", "You cannot remove your own admin role").into(),
        );
    }

    let existing = state
        .store
        .get_voter(voter_id)
        .await?
        .ok_or_else(|| Error::NotFound("No such voter".to_owned()))?;

    let voter = Voter {
        name: update.name.trim().to_owned(),
        faculty: update.faculty,
        role: update.role,
        ..existing
    };
    if !state.store.update_voter(&voter).await? {
        return Err(Error::NotFound("No such voter".to_owned()));
    }

    tracing::info!(
        voter_id = %voter.id,
        admin_id = %admin.id,
        role = voter.role.as_str(),
        "updated account"
    );
    Ok(Json(voter))
}

async fn set_voter_active(
    State(state): State<AppState>,
    Admin(admin): Admin,
    Path(voter_id): Path<Uuid>,
    Json(SetActiveRequest { is_active }): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, Error> {
    if voter_id == admin.id && !is_active {
        return Err(
            ValidationErrors::new("isActive", "You cannot deactivate your own account").into(),
        );
    }

    if !state.store.set_voter_active(voter_id, is_active).await? {
        return Err(Error::NotFound("No such voter".to_owned()));
    }

    let voter = state
        .store
        .get_voter(voter_id)
        .await?
        .ok_or_else(|| Error::NotFound("No such voter".to_owned()))?;

    tracing::info!(
        voter_id = %voter.id,
        admin_id = %admin.id,
        is_active,
        "changed account status"
    );
    Ok(Json(voter))
}

async fn count_active(
    store: &dyn Store,
    kind: ItemKind,
    now: OffsetDateTime,
) -> Result<u64, Error> {
    Ok(store
        .list_items(kind)
        .await?
        .iter()
        .filter(|item| item.effective_status(now) == Status::Active)
        .count() as u64)
}

async fn get_stats(
    State(state): State<AppState>,
    Admin(_): Admin,
) -> Result<impl IntoResponse, Error> {
    let now = OffsetDateTime::now_utc();
    let store = state.store.as_ref();
    let ballots = store.ballot_stats().await?;

    Ok(Json(Stats {
        active_elections: count_active(store, ItemKind::Election, now).await?,
        active_polls: count_active(store, ItemKind::Poll, now).await?,
        total_ballots: ballots.total_ballots,
        distinct_voters: ballots.distinct_voters,
    }))
}
