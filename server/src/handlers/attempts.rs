//! Attempt ledger endpoints:
//! - GET /api/competitions/:id/ledger
//! - POST /api/attempts

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
};
use topout_scoring::api::RecordAttemptRequest;
use topout_scoring::{AttemptLedgerEntry, CompetitionId, LedgerFilter, service};

/// Ledger rows of a competition.
///
/// ```bash
/// curl 'http://localhost:8080/api/competitions/{id}/ledger?round={round_id}'
/// ```
pub async fn get_ledger(
    ApiPath(competition): ApiPath<CompetitionId>,
    ApiQuery(filter): ApiQuery<LedgerFilter>,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptLedgerEntry>>, AppError> {
    let entries = state.repo.ledger(competition, filter).await?;
    Ok(Json(entries))
}

/// Store the entry a judge produced and push new results.
///
/// The body is the full resulting entry, so replaying it is harmless.
pub async fn record_attempt(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RecordAttemptRequest>,
) -> Result<Json<AttemptLedgerEntry>, AppError> {
    let entry = service::record_attempt(state.repo.as_ref(), request).await?;
    state.publish_results(request.competition_id).await;
    Ok(Json(entry))
}
