//! Router configuration.

use crate::error::AppError;
use crate::handlers::{attempts, health, live, results, rounds, startlist};
use crate::middleware::track_request;
use crate::state::AppState;
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete router.
///
/// - `/api/...` JSON endpoints used by `HttpCompetitionApi`
/// - `/results/:competition_id` live result feed
/// - `/health` and `/metrics`
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/competitions/:id/ledger", get(attempts::get_ledger))
        .route("/attempts", post(attempts::record_attempt))
        .route("/competitions/:id/results", get(results::get_results))
        .route("/rounds/:id/advance", post(rounds::advance))
        .route("/competitions/:id/startlist", get(startlist::get_startlist))
        .route("/startlist/order", post(startlist::update_order))
        .route("/startlist/registrations", post(startlist::register))
        .route(
            "/startlist/registrations/:round/:climber",
            delete(startlist::unregister),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/results/:competition_id", get(live::results_feed))
        .nest("/api", api_routes)
        .fallback(|| async { AppError::not_found("no such route") })
        .layer(middleware::from_fn(track_request))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
