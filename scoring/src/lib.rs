//! # Topout Scoring
//!
//! The bouldering scoring domain: how judge input becomes ledger entries,
//! how ledger entries become rankings, how rankings promote climbers, and
//! how organizers and spectators see the result.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Sessions (reducers)                                      │
//! │  ScoringReducer · ReorderReducer · LiveReducer           │
//! ├──────────────────────────────────────────────────────────┤
//! │ Ports                                                    │
//! │  CompetitionApi (client) · CompetitionRepository (store) │
//! │  ResultTransport (live feed)                             │
//! ├──────────────────────────────────────────────────────────┤
//! │ Pure rules                                               │
//! │  ledger transitions · rank() · select_advancing()        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger is the only source of truth. Rankings are recomputed from it
//! on demand and are never stored.
//!
//! ## Example
//!
//! ```ignore
//! use topout_scoring::{AttemptLedgerEntry, JudgeAction, LedgerKey};
//!
//! let entry = AttemptLedgerEntry::fresh(LedgerKey::new(climber, boulder))
//!     .apply(JudgeAction::Zone)
//!     .apply(JudgeAction::Attempt)
//!     .apply(JudgeAction::Top);
//! assert_eq!((entry.zone_attempts, entry.top_attempts), (1, 3));
//! ```

pub mod advancement;
pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod live;
pub mod memory;
pub mod mocks;
pub mod ranking;
pub mod repository;
pub mod results;
pub mod scoring_session;
pub mod service;
pub mod startlist;
pub mod types;

pub use advancement::{Advancement, advance_round, select_advancing};
pub use api::{CompetitionApi, HttpCompetitionApi};
pub use config::ClientConfig;
pub use error::{AdvanceError, ApiError, LiveError, RepositoryError, ValidationError};
pub use ledger::{AttemptLedgerEntry, EditDraft, JudgeAction};
pub use live::{LiveEnvironment, LiveView, ResultChannel, ResultTransport, WsResultTransport};
pub use memory::{Fixture, InMemoryRepository};
pub use ranking::{RankedResult, rank};
pub use repository::CompetitionRepository;
pub use results::{CompetitionResults, competition_results};
pub use scoring_session::{ScoringAction, ScoringEnvironment, ScoringReducer, ScoringState};
pub use startlist::{ReorderAction, ReorderEnvironment, ReorderReducer, ReorderState};
pub use types::{
    Boulder, BoulderId, Category, CategoryId, Climber, ClimberId, CompetitionId, Gender,
    LedgerFilter, LedgerKey, Round, RoundId, StartlistEntry, StartlistQuery,
};
