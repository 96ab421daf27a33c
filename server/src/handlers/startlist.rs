//! Start list endpoints:
//! - GET /api/competitions/:id/startlist?category=&round=
//! - POST /api/startlist/order
//! - POST /api/startlist/registrations
//! - DELETE /api/startlist/registrations/:round/:climber

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;
use topout_scoring::api::{RegistrationRequest, StartOrderUpdate};
use topout_scoring::{
    ClimberId, CompetitionId, RoundId, StartlistEntry, StartlistQuery, service,
};

/// Labels identifying a round
#[derive(Debug, Deserialize)]
pub struct RoundLabels {
    /// Category label, e.g. "Women"
    pub category: String,
    /// Round label, e.g. "Final"
    pub round: String,
}

/// Start list of a round, ordered by start order.
///
/// ```bash
/// curl 'http://localhost:8080/api/competitions/{id}/startlist?category=Women&round=Final'
/// ```
pub async fn get_startlist(
    ApiPath(competition_id): ApiPath<CompetitionId>,
    ApiQuery(labels): ApiQuery<RoundLabels>,
    State(state): State<AppState>,
) -> Result<Json<Vec<StartlistEntry>>, AppError> {
    let query = StartlistQuery {
        competition_id,
        category: labels.category,
        round: labels.round,
    };
    Ok(Json(service::fetch_startlist(state.repo.as_ref(), query).await?))
}

/// Replace a round's start order.
///
/// 409 when the submitted order does not name exactly the climbers
/// currently registered, 422 when start orders are not 1..N.
pub async fn update_order(
    State(state): State<AppState>,
    ApiJson(update): ApiJson<StartOrderUpdate>,
) -> Result<Json<Vec<StartlistEntry>>, AppError> {
    let competition = update.competition_id;
    let (round, entries) = service::update_start_order(state.repo.as_ref(), update).await?;
    tracing::info!(round = %round, climbers = entries.len(), "Start order replaced");
    state.publish_results(competition).await;
    Ok(Json(entries))
}

/// Append a climber to a round's start list.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegistrationRequest>,
) -> Result<Json<StartlistEntry>, AppError> {
    let competition = state.repo.competition_of_round(request.round_id).await?;
    let entry = service::register(state.repo.as_ref(), request).await?;
    state.publish_results(competition).await;
    Ok(Json(entry))
}

/// Remove a climber from a round and close the gap in the start order.
pub async fn unregister(
    ApiPath((round, climber)): ApiPath<(RoundId, ClimberId)>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let competition = state.repo.competition_of_round(round).await?;
    service::unregister(state.repo.as_ref(), round, climber).await?;
    state.publish_results(competition).await;
    Ok(StatusCode::NO_CONTENT)
}
