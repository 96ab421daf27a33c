//! In-process [`CompetitionApi`] for tests and offline use.
//!
//! [`LocalCompetitionApi`] runs the same write paths as the HTTP service
//! directly against an [`InMemoryRepository`]. Failures are injected per
//! operation family and surface as [`ApiError::Transport`], which is what a
//! dropped connection looks like to a client. Call counters let tests check
//! that writes are not retried.

use crate::advancement::advance_round;
use crate::api::{
    AdvanceResponse, ApiFuture, CompetitionApi, RecordAttemptRequest, RegistrationRequest,
    StartOrderUpdate,
};
use crate::error::{AdvanceError, ApiError};
use crate::ledger::AttemptLedgerEntry;
use crate::memory::InMemoryRepository;
use crate::repository::CompetitionRepository;
use crate::results::{CompetitionResults, competition_results};
use crate::service;
use crate::types::{
    ClimberId, CompetitionId, LedgerFilter, RoundId, StartlistEntry, StartlistQuery,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Operation families that can be failed independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Ledger, results and start list reads
    Fetch,
    /// Attempt ledger writes
    Save,
    /// Start order replacements
    Reorder,
    /// Registration and removal
    Registration,
}

#[derive(Debug, Default)]
struct Switches {
    fetch: AtomicBool,
    save: AtomicBool,
    reorder: AtomicBool,
    registration: AtomicBool,
    saves: AtomicUsize,
    reorders: AtomicUsize,
    fetches: AtomicUsize,
}

impl Switches {
    const fn flag(&self, operation: Operation) -> &AtomicBool {
        match operation {
            Operation::Fetch => &self.fetch,
            Operation::Save => &self.save,
            Operation::Reorder => &self.reorder,
            Operation::Registration => &self.registration,
        }
    }

    fn check(&self, operation: Operation) -> Result<(), ApiError> {
        if self.flag(operation).load(Ordering::SeqCst) {
            return Err(ApiError::Transport(format!(
                "injected {operation:?} failure"
            )));
        }
        Ok(())
    }
}

/// [`CompetitionApi`] backed by an in-memory repository
#[derive(Debug, Clone)]
pub struct LocalCompetitionApi {
    repo: InMemoryRepository,
    switches: Arc<Switches>,
}

impl LocalCompetitionApi {
    /// Serve `repo` in-process
    #[must_use]
    pub fn new(repo: InMemoryRepository) -> Self {
        Self {
            repo,
            switches: Arc::new(Switches::default()),
        }
    }

    /// The backing repository
    #[must_use]
    pub const fn repository(&self) -> &InMemoryRepository {
        &self.repo
    }

    /// Fail (or stop failing) every call of an operation family
    pub fn fail(&self, operation: Operation, fail: bool) {
        self.switches.flag(operation).store(fail, Ordering::SeqCst);
    }

    /// Attempt writes received, including failed ones
    #[must_use]
    pub fn save_calls(&self) -> usize {
        self.switches.saves.load(Ordering::SeqCst)
    }

    /// Start order submissions received, including failed ones
    #[must_use]
    pub fn reorder_calls(&self) -> usize {
        self.switches.reorders.load(Ordering::SeqCst)
    }

    /// Reads received, including failed ones
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.switches.fetches.load(Ordering::SeqCst)
    }

    fn fetch(&self) -> Result<(), ApiError> {
        self.switches.fetches.fetch_add(1, Ordering::SeqCst);
        self.switches.check(Operation::Fetch)
    }
}

impl CompetitionApi for LocalCompetitionApi {
    fn fetch_ledger(
        &self,
        competition: CompetitionId,
        filter: LedgerFilter,
    ) -> ApiFuture<'_, Vec<AttemptLedgerEntry>> {
        Box::pin(async move {
            self.fetch()?;
            Ok(self.repo.ledger(competition, filter).await?)
        })
    }

    fn record_attempt(&self, request: RecordAttemptRequest) -> ApiFuture<'_, AttemptLedgerEntry> {
        Box::pin(async move {
            self.switches.saves.fetch_add(1, Ordering::SeqCst);
            self.switches.check(Operation::Save)?;
            Ok(service::record_attempt(&self.repo, request).await?)
        })
    }

    fn fetch_results(&self, competition: CompetitionId) -> ApiFuture<'_, CompetitionResults> {
        Box::pin(async move {
            self.fetch()?;
            Ok(competition_results(&self.repo, competition).await?)
        })
    }

    fn advance_round(&self, round: RoundId) -> ApiFuture<'_, AdvanceResponse> {
        Box::pin(async move {
            self.switches.check(Operation::Save)?;
            let result = advance_round(&self.repo, round).await;
            match &result {
                Err(err) if err.is_conflict() => Err(ApiError::Conflict(err.to_string())),
                Err(AdvanceError::RoundNotFound(_)) => Err(ApiError::NotFound(format!("round {round}"))),
                Err(AdvanceError::Repository(err)) => Err(err.clone().into()),
                _ => Ok(service::advance_response(&result)),
            }
        })
    }

    fn fetch_startlist(&self, query: StartlistQuery) -> ApiFuture<'_, Vec<StartlistEntry>> {
        Box::pin(async move {
            self.fetch()?;
            Ok(service::fetch_startlist(&self.repo, query).await?)
        })
    }

    fn update_start_order(&self, update: StartOrderUpdate) -> ApiFuture<'_, Vec<StartlistEntry>> {
        Box::pin(async move {
            self.switches.reorders.fetch_add(1, Ordering::SeqCst);
            self.switches.check(Operation::Reorder)?;
            let (_, entries) = service::update_start_order(&self.repo, update).await?;
            Ok(entries)
        })
    }

    fn register(&self, request: RegistrationRequest) -> ApiFuture<'_, StartlistEntry> {
        Box::pin(async move {
            self.switches.check(Operation::Registration)?;
            Ok(service::register(&self.repo, request).await?)
        })
    }

    fn unregister(&self, round: RoundId, climber: ClimberId) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            self.switches.check(Operation::Registration)?;
            Ok(service::unregister(&self.repo, round, climber).await?)
        })
    }
}
