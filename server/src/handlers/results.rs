//! GET /api/competitions/:id/results

use crate::error::AppError;
use crate::extract::ApiPath;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
};
use topout_scoring::{CompetitionId, CompetitionResults, competition_results};

/// Ranked results of every round of a competition, grouped by category.
///
/// Same payload as a live channel push.
pub async fn get_results(
    ApiPath(competition): ApiPath<CompetitionId>,
    State(state): State<AppState>,
) -> Result<Json<CompetitionResults>, AppError> {
    Ok(Json(competition_results(state.repo.as_ref(), competition).await?))
}
