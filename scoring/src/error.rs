//! Error types for the scoring domain.

use crate::types::{ClimberId, RoundId};
use thiserror::Error;

/// Rejections raised locally, before anything is sent upstream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A counter adjustment overflowed
    #[error("attempt counter out of range")]
    CounterOverflow,

    /// The zone flag cannot be cleared while the top stands
    #[error("zone cannot be cleared while the top is reached")]
    ZoneRequiredByTop,

    /// A ledger entry breaks a scoring rule
    #[error("invalid ledger entry: {0}")]
    InvalidEntry(&'static str),

    /// No edit session is open
    #[error("no edit in progress")]
    NoEditOpen,

    /// A reorder listed a climber twice
    #[error("climber {0} appears more than once")]
    DuplicateClimber(ClimberId),

    /// A reorder left out a registered climber
    #[error("climber {0} is missing from the new order")]
    MissingClimber(ClimberId),

    /// A reorder named a climber that is not registered
    #[error("climber {0} is not in this start list")]
    UnknownClimber(ClimberId),

    /// Start orders are not a dense 1..N permutation
    #[error("start orders must be a dense 1..N sequence")]
    StartOrderNotDense,

    /// A move referenced a position outside the list
    #[error("position {index} is outside a start list of {len}")]
    PositionOutOfRange {
        /// Requested position
        index: usize,
        /// Start list length
        len: usize,
    },

    /// A reorder, removal or registration was attempted while a reorder
    /// is still being reconciled
    #[error("start list is being reordered")]
    ReorderInProgress,
}

/// Errors from the persistence layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The requested record does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The write conflicts with the stored state
    #[error("conflict: {0}")]
    Conflict(String),

    /// The write was rejected by validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store could not be reached
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Advancement failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvanceError {
    /// Round lookup failed
    #[error("round {0} not found")]
    RoundNotFound(RoundId),

    /// The round is the last of its category
    #[error("round {0} has no next round")]
    NoNextRound(RoundId),

    /// Nobody has been scored in the round yet
    #[error("round {0} has no recorded results")]
    NoResults(RoundId),

    /// Advancement already ran for the round
    #[error("round {0} is already completed")]
    AlreadyCompleted(RoundId),

    /// Some start list writes failed; the round stays open
    #[error("advanced {advanced} of {expected} climbers")]
    Partial {
        /// Climbers now present in the next round
        advanced: usize,
        /// Climbers that should be present
        expected: usize,
    },

    /// Reading inputs failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AdvanceError {
    /// Whether this is a conflict the organizer must resolve by hand
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::NoNextRound(_) | Self::NoResults(_) | Self::AlreadyCompleted(_)
        )
    }

    /// Climbers advanced before the failure
    #[must_use]
    pub const fn advanced(&self) -> usize {
        match self {
            Self::Partial { advanced, .. } => *advanced,
            _ => 0,
        }
    }
}

/// Errors from the competition API client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never got a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The server reported a conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// The server rejected the request as invalid
    #[error("rejected: {0}")]
    Validation(String),

    /// The resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Server-provided message
        message: String,
    },

    /// The response body could not be decoded
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => Self::NotFound(what),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::Validation(err) => Self::Validation(err.to_string()),
            RepositoryError::Unavailable(message) => Self::Transport(message),
        }
    }
}

/// Live result channel failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveError {
    /// The connection could not be established
    #[error("connect failed: {0}")]
    Connect(String),

    /// An established connection failed
    #[error("transport error: {0}")]
    Transport(String),

    /// A message could not be decoded
    #[error("invalid snapshot: {0}")]
    Decode(String),

    /// The server closed the connection
    #[error("connection closed")]
    Closed,
}
