//! Client side of the competition HTTP API.
//!
//! [`CompetitionApi`] is what the client sessions talk to. The production
//! implementation, [`HttpCompetitionApi`], speaks JSON over `reqwest`.
//! Reads are retried on transport errors; writes never are, because a write
//! that reached the server before the connection dropped would otherwise be
//! applied twice.

use crate::error::ApiError;
use crate::ledger::AttemptLedgerEntry;
use crate::results::CompetitionResults;
use crate::types::{
    BoulderId, Climber, ClimberId, CompetitionId, LedgerFilter, RoundId, StartlistEntry,
    StartlistQuery,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use topout_runtime::retry::{RetryPolicy, retry_with_predicate};

/// Future returned by API operations
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Body of `POST /api/attempts`: the resulting entry after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAttemptRequest {
    /// Climber scored
    pub climber_id: ClimberId,
    /// Boulder climbed
    pub boulder_id: BoulderId,
    /// Competition the ledger belongs to
    pub competition_id: CompetitionId,
    /// Resulting zone attempts
    pub attempts_zone: u32,
    /// Resulting top attempts
    pub attempts_top: u32,
    /// Resulting zone flag
    pub zone_reached: bool,
    /// Resulting top flag
    pub top_reached: bool,
}

impl RecordAttemptRequest {
    /// Request that stores `entry` as-is
    #[must_use]
    pub const fn new(competition_id: CompetitionId, entry: &AttemptLedgerEntry) -> Self {
        Self {
            climber_id: entry.climber_id,
            boulder_id: entry.boulder_id,
            competition_id,
            attempts_zone: entry.zone_attempts,
            attempts_top: entry.top_attempts,
            zone_reached: entry.zone_reached,
            top_reached: entry.top_reached,
        }
    }

    /// The ledger entry carried by the request
    #[must_use]
    pub const fn entry(&self) -> AttemptLedgerEntry {
        AttemptLedgerEntry {
            climber_id: self.climber_id,
            boulder_id: self.boulder_id,
            zone_attempts: self.attempts_zone,
            top_attempts: self.attempts_top,
            zone_reached: self.zone_reached,
            top_reached: self.top_reached,
        }
    }
}

/// Outcome status of an advancement request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvanceStatus {
    /// Advancement completed
    Ok,
    /// Advancement failed or was partial
    Error,
}

/// Body returned by `POST /api/rounds/{id}/advance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceResponse {
    /// Overall status
    pub status: AdvanceStatus,
    /// Climbers present in the next round
    pub advanced: usize,
    /// Human-readable detail on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `POST /api/startlist/order`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOrderUpdate {
    /// Competition owning the category
    pub competition_id: CompetitionId,
    /// Category label
    pub category: String,
    /// Round label
    pub round: String,
    /// Every climber of the round with their new start order
    pub order: Vec<StartOrderSlot>,
}

/// One climber's new position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOrderSlot {
    /// Climber moved
    pub climber_id: ClimberId,
    /// New start order
    pub start_order: u32,
}

/// Body of `POST /api/startlist/registrations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Round to register for
    pub round_id: RoundId,
    /// Climber to register
    pub climber: Climber,
}

/// Error body returned by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

/// Operations the client sessions need from the competition service
pub trait CompetitionApi: Send + Sync {
    /// Ledger rows of a competition matching `filter`
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    fn fetch_ledger(
        &self,
        competition: CompetitionId,
        filter: LedgerFilter,
    ) -> ApiFuture<'_, Vec<AttemptLedgerEntry>>;

    /// Store a resulting ledger entry (absolute upsert)
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport, validation or server failure.
    fn record_attempt(&self, request: RecordAttemptRequest) -> ApiFuture<'_, AttemptLedgerEntry>;

    /// Full-competition results
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    fn fetch_results(&self, competition: CompetitionId) -> ApiFuture<'_, CompetitionResults>;

    /// Advance a round's qualifying climbers
    ///
    /// # Errors
    ///
    /// [`ApiError::Conflict`] when advancement is not possible.
    fn advance_round(&self, round: RoundId) -> ApiFuture<'_, AdvanceResponse>;

    /// Start list of a round, ordered by start order
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    fn fetch_startlist(&self, query: StartlistQuery) -> ApiFuture<'_, Vec<StartlistEntry>>;

    /// Replace the start order of a round
    ///
    /// # Errors
    ///
    /// [`ApiError::Conflict`] if the start list changed underneath.
    fn update_start_order(&self, update: StartOrderUpdate) -> ApiFuture<'_, Vec<StartlistEntry>>;

    /// Register a climber for a round
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    fn register(&self, request: RegistrationRequest) -> ApiFuture<'_, StartlistEntry>;

    /// Remove a climber from a round
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    fn unregister(&self, round: RoundId, climber: ClimberId) -> ApiFuture<'_, ()>;
}

/// [`CompetitionApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpCompetitionApi {
    client: Client,
    base_url: String,
    read_retry: RetryPolicy,
}

impl HttpCompetitionApi {
    /// Create a client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            read_retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(200))
                .max_delay(Duration::from_secs(2))
                .build(),
        })
    }

    /// Replace the retry policy used for reads
    #[must_use]
    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T, F>(&self, build: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        retry_with_predicate(
            self.read_retry.clone(),
            || async { decode(build().send().await?).await },
            ApiError::is_transient,
        )
        .await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        decode(request.send().await?).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()));
    }
    Err(status_error(status, response.text().await.unwrap_or_default()))
}

fn status_error(status: StatusCode, body: String) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(&body).map_or(body, |b| b.message);
    match status {
        StatusCode::CONFLICT => ApiError::Conflict(message),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => ApiError::Validation(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        other => ApiError::Server {
            status: other.as_u16(),
            message,
        },
    }
}

impl CompetitionApi for HttpCompetitionApi {
    fn fetch_ledger(
        &self,
        competition: CompetitionId,
        filter: LedgerFilter,
    ) -> ApiFuture<'_, Vec<AttemptLedgerEntry>> {
        Box::pin(async move {
            let url = self.url(&format!("/api/competitions/{competition}/ledger"));
            self.get_json(|| self.client.get(&url).query(&filter)).await
        })
    }

    fn record_attempt(&self, request: RecordAttemptRequest) -> ApiFuture<'_, AttemptLedgerEntry> {
        Box::pin(async move {
            let url = self.url("/api/attempts");
            self.send_json(self.client.post(url).json(&request)).await
        })
    }

    fn fetch_results(&self, competition: CompetitionId) -> ApiFuture<'_, CompetitionResults> {
        Box::pin(async move {
            let url = self.url(&format!("/api/competitions/{competition}/results"));
            self.get_json(|| self.client.get(&url)).await
        })
    }

    fn advance_round(&self, round: RoundId) -> ApiFuture<'_, AdvanceResponse> {
        Box::pin(async move {
            let url = self.url(&format!("/api/rounds/{round}/advance"));
            let response = self.client.post(url).send().await?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status == StatusCode::CONFLICT || status == StatusCode::NOT_FOUND {
                let message = serde_json::from_str::<AdvanceResponse>(&body)
                    .ok()
                    .and_then(|r| r.message)
                    .unwrap_or(body);
                return Err(if status == StatusCode::CONFLICT {
                    ApiError::Conflict(message)
                } else {
                    ApiError::NotFound(message)
                });
            }

            // Partial failures carry a regular body with the advanced count.
            serde_json::from_str::<AdvanceResponse>(&body).map_err(|_| status_error(status, body))
        })
    }

    fn fetch_startlist(&self, query: StartlistQuery) -> ApiFuture<'_, Vec<StartlistEntry>> {
        Box::pin(async move {
            let url = self.url(&format!("/api/competitions/{}/startlist", query.competition_id));
            let params = [("category", query.category.as_str()), ("round", query.round.as_str())];
            self.get_json(|| self.client.get(&url).query(&params)).await
        })
    }

    fn update_start_order(&self, update: StartOrderUpdate) -> ApiFuture<'_, Vec<StartlistEntry>> {
        Box::pin(async move {
            let url = self.url("/api/startlist/order");
            self.send_json(self.client.post(url).json(&update)).await
        })
    }

    fn register(&self, request: RegistrationRequest) -> ApiFuture<'_, StartlistEntry> {
        Box::pin(async move {
            let url = self.url("/api/startlist/registrations");
            self.send_json(self.client.post(url).json(&request)).await
        })
    }

    fn unregister(&self, round: RoundId, climber: ClimberId) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let url = self.url(&format!("/api/startlist/registrations/{round}/{climber}"));
            let response = self.client.delete(url).send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            Err(status_error(status, response.text().await.unwrap_or_default()))
        })
    }
}
