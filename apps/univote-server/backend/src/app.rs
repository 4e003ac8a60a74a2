//! Application definition, including the account and session route handlers.
//!
//! Route handlers are bundled via [`setup`] into an [`axum::Router`], which can then be run
//! using [`run`] at the configured port (see [`config`][`super::config`]). Item routes live
//! in [`items`][`super::items`] and [`admin`][`super::admin`].

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::Level;
use types_rs::univote::{DefaultEligibility, ItemKind, Role, VoterInput};
use univote_server_client::{CreateSessionRequest, CreateSessionResponse};

use crate::{
    admin, auth,
    config::{Config, MAX_REQUEST_SIZE},
    error::Error,
    items,
    session::{CurrentVoter, SessionManager, Token},
    state::AppState,
    store::Store,
};

/// Prepares the application to be run within an HTTP server.
///
/// Requires a [`Store`], either [`PgStore`][crate::db::PgStore] from
/// [`db::setup`][crate::db::setup] or [`MemoryStore`][crate::memory::MemoryStore].
/// Run the application with [`run`] with the result of this function.
pub async fn setup(
    store: Arc<dyn Store>,
    default_eligibility: DefaultEligibility,
    session_duration: time::Duration,
) -> Router {
    let _entered = tracing::span!(Level::DEBUG, "Setting up application").entered();
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/sessions", post(create_session).delete(delete_session))
        .route("/api/voters", post(register_voter))
        .route("/api/me", get(get_me))
        .nest(
            "/api/elections",
            items::routes().layer(Extension(ItemKind::Election)),
        )
        .nest("/api/polls", items::routes().layer(Extension(ItemKind::Poll)))
        .nest("/api/admin", admin::routes())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            store,
            sessions: Arc::new(Mutex::new(SessionManager::new(session_duration))),
            default_eligibility,
        })
}

/// Create and run an HTTP server using the provided application at the port
/// from [`config`][`super::config`].
pub async fn run(app: Router, config: &Config) -> color_eyre::Result<()> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
    tracing::info!("Server listening at http://{addr}/");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Always responds with a successful status. Used to check whether the server
/// is running.
async fn get_status() -> impl IntoResponse {
    StatusCode::OK
}

async fn create_session(
    State(AppState {
        store, sessions, ..
    }): State<AppState>,
    Json(CreateSessionRequest {
        university_id,
        password,
    }): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, Error> {
    let voter = auth::authenticate(store.as_ref(), &university_id, &password).await?;

    let session = sessions
        .lock()
        .await
        .create(voter.id, OffsetDateTime::now_utc());
    tracing::debug!("Created session for voter {}", voter.id);

    Ok(Json(CreateSessionResponse {
        bearer_token: session.token().to_string(),
        expires_at: session.expiration(),
        voter,
    }))
}

async fn delete_session(
    State(AppState { sessions, .. }): State<AppState>,
    Token(token): Token,
) -> Result<impl IntoResponse, Error> {
    if !sessions.lock().await.remove(token) {
        return Err(Error::Unauthorized("Please log in".to_owned()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Self-registration always creates a voter. Administrators are created with
/// the `create-voter` tool.
async fn register_voter(
    State(AppState { store, .. }): State<AppState>,
    Json(input): Json<VoterInput>,
) -> Result<impl IntoResponse, Error> {
    let voter = auth::register(
        store.as_ref(),
        input,
        Role::Voter,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(voter)))
}

async fn get_me(CurrentVoter(voter): CurrentVoter) -> impl IntoResponse {
    Json(voter)
}
