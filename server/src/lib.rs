//! # Topout Server
//!
//! Axum service holding the attempt ledger and start lists of running
//! competitions and pushing live results to observers.
//!
//! ```text
//! judge / organizer ──HTTP──> handlers ──service::*──> CompetitionRepository
//!                                │
//!                                └─publish──> ResultsHub ──WebSocket──> observers
//! ```
//!
//! Competition structure (categories, rounds, boulders, climbers) is seeded
//! from a JSON [`Fixture`] at startup.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use error::{AppError, ServerError};
pub use hub::ResultsHub;
pub use router::build_router;
pub use state::AppState;

use std::path::Path;
use topout_scoring::Fixture;

/// Read a competition fixture from a JSON file.
///
/// # Errors
///
/// [`ServerError::FixtureRead`] if the file cannot be read,
/// [`ServerError::FixtureFormat`] if it is not a valid fixture.
pub fn load_fixture(path: &Path) -> Result<Fixture, ServerError> {
    let text = std::fs::read_to_string(path).map_err(|source| ServerError::FixtureRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ServerError::FixtureFormat {
        path: path.to_path_buf(),
        source,
    })
}
