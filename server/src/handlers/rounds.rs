//! POST /api/rounds/:id/advance

use crate::error::AppError;
use crate::extract::ApiPath;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use topout_scoring::api::AdvanceResponse;
use topout_scoring::{AdvanceError, RoundId, advance_round, service};

/// Promote the top climbers of a round into the next round.
///
/// | Outcome | Status |
/// |---|---|
/// | all climbers advanced | 200 |
/// | unknown round | 404 |
/// | last round, nothing scored, or already completed | 409 |
/// | some start list writes failed | 500 |
///
/// Every outcome carries an [`AdvanceResponse`] body. Storage failures
/// before anything was written use the regular error body.
pub async fn advance(
    ApiPath(round): ApiPath<RoundId>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AdvanceResponse>), AppError> {
    let result = advance_round(state.repo.as_ref(), round).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(AdvanceError::Repository(err)) => return Err(err.clone().into()),
        Err(AdvanceError::RoundNotFound(_)) => StatusCode::NOT_FOUND,
        Err(
            AdvanceError::NoNextRound(_)
            | AdvanceError::NoResults(_)
            | AdvanceError::AlreadyCompleted(_),
        ) => StatusCode::CONFLICT,
        Err(AdvanceError::Partial { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let response = service::advance_response(&result);
    // A run that advances nobody still completes the round.
    if result.is_ok() || response.advanced > 0 {
        match state.repo.competition_of_round(round).await {
            Ok(competition) => state.publish_results(competition).await,
            Err(error) => tracing::warn!(round = %round, %error, "Cannot resolve competition"),
        }
    }
    Ok((status, Json(response)))
}
