//! Write paths shared by the HTTP service and the in-process API.
//!
//! Each function validates a request, applies it to a repository and
//! records the matching metric. Publishing fresh snapshots is left to the
//! caller.

use crate::advancement::Advancement;
use crate::api::{
    AdvanceResponse, AdvanceStatus, RecordAttemptRequest, RegistrationRequest, StartOrderUpdate,
};
use crate::error::{AdvanceError, RepositoryError};
use crate::ledger::AttemptLedgerEntry;
use crate::repository::{CompetitionRepository, InsertOutcome};
use crate::types::{ClimberId, RoundId, StartlistEntry, StartlistQuery};
use topout_runtime::metrics::{LedgerMetrics, StartlistMetrics};

/// Store the resulting entry of a judge action or correction.
///
/// # Errors
///
/// [`RepositoryError::Validation`] if the entry breaks a scoring rule,
/// otherwise whatever the repository reports.
pub async fn record_attempt(
    repo: &dyn CompetitionRepository,
    request: RecordAttemptRequest,
) -> Result<AttemptLedgerEntry, RepositoryError> {
    let result = repo
        .upsert_attempt(request.competition_id, request.entry())
        .await;
    LedgerMetrics::record_write(result.is_ok());
    if let Ok(entry) = &result {
        tracing::debug!(
            competition = %request.competition_id,
            key = %entry.key(),
            zone_attempts = entry.zone_attempts,
            top_attempts = entry.top_attempts,
            "Ledger entry recorded"
        );
    }
    result
}

/// Start list addressed by labels.
///
/// # Errors
///
/// [`RepositoryError::NotFound`] if the labels do not resolve.
pub async fn fetch_startlist(
    repo: &dyn CompetitionRepository,
    query: StartlistQuery,
) -> Result<Vec<StartlistEntry>, RepositoryError> {
    let round = repo
        .find_round(query.competition_id, query.category, query.round)
        .await?;
    repo.startlist(round.id).await
}

/// Replace a round's start order.
///
/// # Errors
///
/// [`RepositoryError::Conflict`] when the order is stale,
/// [`RepositoryError::Validation`] when it is malformed.
pub async fn update_start_order(
    repo: &dyn CompetitionRepository,
    update: StartOrderUpdate,
) -> Result<(RoundId, Vec<StartlistEntry>), RepositoryError> {
    let round = repo
        .find_round(update.competition_id, update.category, update.round)
        .await?;
    let order = update
        .order
        .iter()
        .map(|slot| (slot.climber_id, slot.start_order))
        .collect();

    let result = repo.replace_start_order(round.id, order).await;
    StartlistMetrics::record_reorder(result.is_ok());
    result.map(|entries| (round.id, entries))
}

/// Register a climber at the end of a round's start list.
///
/// Registering a climber who is already in the round returns their
/// existing entry.
///
/// # Errors
///
/// Returns the repository error if the round is unknown or a write fails.
pub async fn register(
    repo: &dyn CompetitionRepository,
    request: RegistrationRequest,
) -> Result<StartlistEntry, RepositoryError> {
    let round = request.round_id;
    let climber_id = request.climber.id;
    let competition = repo.competition_of_round(round).await?;
    repo.upsert_climber(competition, request.climber).await?;

    let current = repo.startlist(round).await?;
    if let Some(existing) = current.iter().find(|e| e.climber_id == climber_id) {
        return Ok(existing.clone());
    }

    let start_order = current.iter().map(|e| e.start_order).max().unwrap_or(0) + 1;
    let entry = StartlistEntry {
        round_id: round,
        climber_id,
        start_order,
    };
    if repo.insert_startlist_entry(entry.clone()).await? == InsertOutcome::AlreadyPresent {
        tracing::debug!(round = %round, climber = %climber_id, "Climber registered concurrently");
    }
    Ok(entry)
}

/// Remove a climber from a round.
///
/// # Errors
///
/// [`RepositoryError::NotFound`] if the climber is not registered.
pub async fn unregister(
    repo: &dyn CompetitionRepository,
    round: RoundId,
    climber: ClimberId,
) -> Result<(), RepositoryError> {
    repo.remove_startlist_entry(round, climber).await
}

/// Wire body for an advancement outcome
#[must_use]
pub fn advance_response(result: &Result<Advancement, AdvanceError>) -> AdvanceResponse {
    match result {
        Ok(advancement) => AdvanceResponse {
            status: AdvanceStatus::Ok,
            advanced: advancement.advanced,
            message: None,
        },
        Err(error) => AdvanceResponse {
            status: AdvanceStatus::Error,
            advanced: error.advanced(),
            message: Some(error.to_string()),
        },
    }
}
