//! Persistence port.
//!
//! The attempt ledger and start lists are owned by the persistence layer;
//! everything else in this crate reads and writes them through
//! [`CompetitionRepository`]. Methods return boxed futures so the trait
//! stays object-safe and can be shared as `Arc<dyn CompetitionRepository>`.

use crate::error::RepositoryError;
use crate::ledger::AttemptLedgerEntry;
use crate::types::{
    Category, CategoryId, Climber, ClimberId, CompetitionId, LedgerFilter, Round, RoundId,
    StartlistEntry,
};
use std::future::Future;
use std::pin::Pin;

/// Future returned by repository operations
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Result of an idempotent start list insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was written
    Inserted,
    /// The climber was already registered for the round; nothing changed
    AlreadyPresent,
}

/// Storage for competition structure, the attempt ledger and start lists
pub trait CompetitionRepository: Send + Sync {
    /// Look up a category
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if it does not exist.
    fn category(&self, id: CategoryId) -> RepoFuture<'_, Category>;

    /// Categories of a competition, in display order
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn categories(&self, competition: CompetitionId) -> RepoFuture<'_, Vec<Category>>;

    /// Look up a round
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if it does not exist.
    fn round(&self, id: RoundId) -> RepoFuture<'_, Round>;

    /// Rounds of a category ordered by `Round::order`
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn rounds(&self, category: CategoryId) -> RepoFuture<'_, Vec<Round>>;

    /// Resolve a round from its category and round labels
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if either label does not match.
    fn find_round(
        &self,
        competition: CompetitionId,
        category_label: String,
        round_label: String,
    ) -> RepoFuture<'_, Round>;

    /// Climbers known to the competition
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn climbers(&self, competition: CompetitionId) -> RepoFuture<'_, Vec<Climber>>;

    /// Register a climber with the competition, replacing an earlier record
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn upsert_climber(&self, competition: CompetitionId, climber: Climber) -> RepoFuture<'_, ()>;

    /// Ledger rows of a competition matching `filter`
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn ledger(
        &self,
        competition: CompetitionId,
        filter: LedgerFilter,
    ) -> RepoFuture<'_, Vec<AttemptLedgerEntry>>;

    /// Store a ledger row, last write wins per (climber, boulder)
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is invalid or the write fails.
    fn upsert_attempt(
        &self,
        competition: CompetitionId,
        entry: AttemptLedgerEntry,
    ) -> RepoFuture<'_, AttemptLedgerEntry>;

    /// Start list of a round ordered by start order
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn startlist(&self, round: RoundId) -> RepoFuture<'_, Vec<StartlistEntry>>;

    /// Insert a start list entry unless the climber is already in the round
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Conflict`] if another climber holds the start order.
    fn insert_startlist_entry(&self, entry: StartlistEntry) -> RepoFuture<'_, InsertOutcome>;

    /// Remove a climber from a round and renumber the rest densely
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if the climber is not registered.
    fn remove_startlist_entry(&self, round: RoundId, climber: ClimberId) -> RepoFuture<'_, ()>;

    /// Replace the start order of a round with a full new order
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Conflict`] if the order does not name exactly the
    /// registered climbers, [`RepositoryError::Validation`] if the start
    /// orders are not a dense 1..N permutation.
    fn replace_start_order(
        &self,
        round: RoundId,
        order: Vec<(ClimberId, u32)>,
    ) -> RepoFuture<'_, Vec<StartlistEntry>>;

    /// Mark a round as completed
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn mark_round_completed(&self, round: RoundId) -> RepoFuture<'_, ()>;

    /// Round that follows `round` in its category, if any
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if `round` does not exist.
    fn next_round(&self, round: RoundId) -> RepoFuture<'_, Option<Round>> {
        Box::pin(async move {
            let current = self.round(round).await?;
            let rounds = self.rounds(current.category_id).await?;
            Ok(rounds.into_iter().find(|r| r.order > current.order))
        })
    }

    /// Competition a round belongs to
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if the round or its category is missing.
    fn competition_of_round(&self, round: RoundId) -> RepoFuture<'_, CompetitionId> {
        Box::pin(async move {
            let round = self.round(round).await?;
            Ok(self.category(round.category_id).await?.competition_id)
        })
    }
}
