use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use types_rs::univote::{
    ApiError, BallotItem, BallotItemInput, BallotRecord, Faculty, ItemKind, ItemWithStatus, Role,
    Selection, SelectionInput, Stats, Tally, Voter, VoterInput, VoterUpdate,
};
use uuid::Uuid;

use crate::{
    result::{Error, Result},
    CastVoteRequest, CreateSessionRequest, CreateSessionResponse, CreateVoterRequest,
    HasVotedResponse, SetActiveRequest,
};

/// A client for the univote server.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,

    /// The bearer token for the current session.
    bearer_token: Option<String>,
}

impl Client {
    /// Create a new client with the given base URL.
    ///
    /// # Example
    ///
    /// ```
    /// # use univote_server_client::Client;
    /// let base_url = "http://localhost:8000".parse().unwrap();
    /// let client = Client::new(base_url);
    /// ```
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
            bearer_token: None,
        }
    }

    /// Create a new client to connect to the server running on localhost.
    pub fn localhost() -> Self {
        Self::new(
            "http://localhost:8000"
                .parse()
                .expect("hardcoded URL is valid"),
        )
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// Reuse a token from an earlier [`Client::login`].
    pub fn set_bearer_token(&mut self, bearer_token: impl Into<String>) {
        self.bearer_token = Some(bearer_token.into());
    }

    /// Check that the server is responding.
    pub async fn check_status(&self) -> Result<()> {
        let response = self.request(Method::GET, "/api/status")?.send().await?;
        Self::expect_success(response).await
    }

    /// Register a voter account.
    pub async fn register(&self, input: &VoterInput) -> Result<Voter> {
        let response = self
            .request(Method::POST, "/api/voters")?
            .json(input)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Log in and keep the bearer token for later requests.
    pub async fn login(&mut self, university_id: &str, password: &str) -> Result<Voter> {
        let request = CreateSessionRequest {
            university_id: university_id.to_owned(),
            password: password.to_owned(),
        };
        let response = self
            .request(Method::POST, "/api/sessions")?
            .json(&request)
            .send()
            .await?;
        let response: CreateSessionResponse = Self::parse(response).await?;
        self.bearer_token = Some(response.bearer_token);
        Ok(response.voter)
    }

    /// End the current session.
    pub async fn logout(&mut self) -> Result<()> {
        let response = self.authorized(Method::DELETE, "/api/sessions")?.send().await?;
        Self::expect_success(response).await?;
        self.bearer_token = None;
        Ok(())
    }

    /// The logged-in account.
    pub async fn me(&self) -> Result<Voter> {
        let response = self.authorized(Method::GET, "/api/me")?.send().await?;
        Self::parse(response).await
    }

    /// Items of the given kind that the logged-in voter may see, most
    /// relevant first.
    pub async fn list_items(&self, kind: ItemKind) -> Result<Vec<ItemWithStatus>> {
        let path = format!("/api/{}", kind.collection());
        let response = self.authorized(Method::GET, &path)?.send().await?;
        Self::parse(response).await
    }

    pub async fn get_item(&self, kind: ItemKind, item_id: Uuid) -> Result<ItemWithStatus> {
        let path = format!("/api/{}/{item_id}", kind.collection());
        let response = self.authorized(Method::GET, &path)?.send().await?;
        Self::parse(response).await
    }

    /// Candidates or options of an item, optionally only those of one
    /// faculty.
    pub async fn list_selections(
        &self,
        kind: ItemKind,
        item_id: Uuid,
        faculty: Option<&Faculty>,
    ) -> Result<Vec<Selection>> {
        let path = format!("/api/{}/{item_id}/selections", kind.collection());
        let mut request = self.authorized(Method::GET, &path)?;
        if let Some(faculty) = faculty {
            request = request.query(&[("faculty", faculty.as_str())]);
        }
        Self::parse(request.send().await?).await
    }

    /// Cast a vote. A second vote for the same item is rejected with
    /// [`ErrorCode::AlreadyVoted`][types_rs::univote::ErrorCode::AlreadyVoted].
    pub async fn cast_vote(
        &self,
        kind: ItemKind,
        item_id: Uuid,
        selection_id: Uuid,
    ) -> Result<BallotRecord> {
        let path = format!("/api/{}/{item_id}/vote", kind.collection());
        let response = self
            .authorized(Method::POST, &path)?
            .json(&CastVoteRequest { selection_id })
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn has_voted(&self, kind: ItemKind, item_id: Uuid) -> Result<bool> {
        let path = format!("/api/{}/{item_id}/vote", kind.collection());
        let response = self.authorized(Method::GET, &path)?.send().await?;
        let response: HasVotedResponse = Self::parse(response).await?;
        Ok(response.has_voted)
    }

    /// Final results of a closed item.
    pub async fn results(&self, kind: ItemKind, item_id: Uuid) -> Result<Tally> {
        let path = format!("/api/{}/{item_id}/results", kind.collection());
        let response = self.authorized(Method::GET, &path)?.send().await?;
        Self::parse(response).await
    }

    /// Every item of the given kind, drafts included. Requires the admin
    /// role, as do the other `admin_*` methods.
    pub async fn admin_list_items(&self, kind: ItemKind) -> Result<Vec<ItemWithStatus>> {
        let path = format!("/api/admin/{}", kind.collection());
        let response = self.authorized(Method::GET, &path)?.send().await?;
        Self::parse(response).await
    }

    pub async fn admin_create_item(
        &self,
        kind: ItemKind,
        input: &BallotItemInput,
    ) -> Result<BallotItem> {
        let path = format!("/api/admin/{}", kind.collection());
        let response = self
            .authorized(Method::POST, &path)?
            .json(input)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn admin_update_item(
        &self,
        kind: ItemKind,
        item_id: Uuid,
        input: &BallotItemInput,
    ) -> Result<BallotItem> {
        let path = format!("/api/admin/{}/{item_id}", kind.collection());
        let response = self
            .authorized(Method::PUT, &path)?
            .json(input)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn admin_delete_item(&self, kind: ItemKind, item_id: Uuid) -> Result<()> {
        let path = format!("/api/admin/{}/{item_id}", kind.collection());
        let response = self.authorized(Method::DELETE, &path)?.send().await?;
        Self::expect_success(response).await
    }

    pub async fn admin_add_selection(
        &self,
        kind: ItemKind,
        item_id: Uuid,
        input: &SelectionInput,
    ) -> Result<Selection> {
        let path = format!("/api/admin/{}/{item_id}/selections", kind.collection());
        let response = self
            .authorized(Method::POST, &path)?
            .json(input)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn admin_delete_selection(&self, selection_id: Uuid) -> Result<()> {
        let path = format!("/api/admin/selections/{selection_id}");
        let response = self.authorized(Method::DELETE, &path)?.send().await?;
        Self::expect_success(response).await
    }

    /// Live results, available before the item closes.
    pub async fn admin_results(&self, kind: ItemKind, item_id: Uuid) -> Result<Tally> {
        let path = format!("/api/admin/{}/{item_id}/results", kind.collection());
        let response = self.authorized(Method::GET, &path)?.send().await?;
        Self::parse(response).await
    }

    pub async fn admin_list_voters(&self) -> Result<Vec<Voter>> {
        let response = self
            .authorized(Method::GET, "/api/admin/voters")?
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Create an account with the given role.
    pub async fn admin_create_voter(&self, input: &VoterInput, role: Role) -> Result<Voter> {
        let request = CreateVoterRequest {
            input: input.clone(),
            role,
        };
        let response = self
            .authorized(Method::POST, "/api/admin/voters")?
            .json(&request)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Change an account's name, faculty or role.
    pub async fn admin_update_voter(&self, voter_id: Uuid, update: &VoterUpdate) -> Result<Voter> {
        let path = format!("/api/admin/voters/{voter_id}");
        let response = self
            .authorized(Method::PUT, &path)?
            .json(update)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn admin_set_voter_active(&self, voter_id: Uuid, is_active: bool) -> Result<Voter> {
        let path = format!("/api/admin/voters/{voter_id}/active");
        let response = self
            .authorized(Method::PUT, &path)?
            .json(&SetActiveRequest { is_active })
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn admin_stats(&self) -> Result<Stats> {
        let response = self
            .authorized(Method::GET, "/api/admin/stats")?
            .send()
            .await?;
        Self::parse(response).await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path)?;
        Ok(self.http.request(method, url))
    }

    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let bearer_token = self.bearer_token.as_ref().ok_or(Error::NotLoggedIn)?;
        Ok(self.request(method, path)?.bearer_auth(bearer_token))
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status_code = response.status();
        let text = response.text().await?;

        if !status_code.is_success() {
            return Err(Self::rejection(status_code, text));
        }

        Ok(serde_json::from_str(&text)?)
    }

    async fn expect_success(response: Response) -> Result<()> {
        let status_code = response.status();
        if status_code.is_success() {
            return Ok(());
        }

        let text = response.text().await?;
        Err(Self::rejection(status_code, text))
    }

    fn rejection(status_code: reqwest::StatusCode, text: String) -> Error {
        match serde_json::from_str::<ApiError>(&text) {
            Ok(ApiError { error, code }) => Error::Rejected {
                status_code,
                code,
                message: error,
            },
            Err(_) => Error::Http { status_code, text },
        }
    }
}
