use std::sync::Arc;

use tokio::sync::Mutex;
use types_rs::univote::DefaultEligibility;

use crate::{session::SessionManager, store::Store};

/// Contains the application state, used by request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Backing store, PostgreSQL or in-memory.
    pub store: Arc<dyn Store>,

    /// In-memory session manager.
    pub sessions: Arc<Mutex<SessionManager>>,

    /// Eligibility when a voter's faculty or an item's scope is unknown.
    pub default_eligibility: DefaultEligibility,
}
