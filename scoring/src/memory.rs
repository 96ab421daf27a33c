//! In-memory [`CompetitionRepository`].
//!
//! Backs the server binary (seeded from a JSON [`Fixture`], since
//! competition CRUD lives elsewhere) and the tests. Fault injection lets
//! tests fail writes on demand.

use crate::error::{RepositoryError, ValidationError};
use crate::ledger::AttemptLedgerEntry;
use crate::repository::{CompetitionRepository, InsertOutcome, RepoFuture};
use crate::types::{
    Category, CategoryId, Climber, ClimberId, CompetitionId, LedgerFilter, LedgerKey, Round,
    RoundId, StartlistEntry,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Seed data for one competition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Competition the climbers and ledger rows belong to
    pub competition_id: CompetitionId,
    /// Categories in display order
    pub categories: Vec<Category>,
    /// Rounds of those categories
    pub rounds: Vec<Round>,
    /// Registered climbers
    #[serde(default)]
    pub climbers: Vec<Climber>,
    /// Start list entries of any round
    #[serde(default)]
    pub startlist: Vec<StartlistEntry>,
    /// Recorded ledger rows
    #[serde(default)]
    pub ledger: Vec<AttemptLedgerEntry>,
}

#[derive(Debug, Default)]
struct Tables {
    categories: Vec<Category>,
    rounds: BTreeMap<RoundId, Round>,
    climbers: BTreeMap<CompetitionId, BTreeMap<ClimberId, Climber>>,
    ledger: BTreeMap<CompetitionId, BTreeMap<LedgerKey, AttemptLedgerEntry>>,
    startlists: BTreeMap<RoundId, Vec<StartlistEntry>>,
}

impl Tables {
    fn round(&self, id: RoundId) -> Result<&Round, RepositoryError> {
        self.rounds
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("round {id}")))
    }

    fn matches(&self, entry: &AttemptLedgerEntry, filter: &LedgerFilter) -> bool {
        if filter.boulder.is_some_and(|b| b != entry.boulder_id)
            || filter.climber.is_some_and(|c| c != entry.climber_id)
        {
            return false;
        }
        if filter.round.is_none() && filter.category.is_none() {
            return true;
        }
        self.rounds.values().any(|round| {
            round.has_boulder(entry.boulder_id)
                && filter.round.is_none_or(|r| r == round.id)
                && filter.category.is_none_or(|c| c == round.category_id)
        })
    }
}

#[derive(Debug)]
struct Faults {
    fail_writes: AtomicBool,
    inserts_before_failure: AtomicUsize,
}

impl Faults {
    fn check_write(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    fn check_insert(&self) -> Result<(), RepositoryError> {
        self.check_write()?;
        let allowed = self
            .inserts_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                (left != usize::MAX).then(|| left.saturating_sub(1))
            });
        match allowed {
            Ok(0) => Err(RepositoryError::Unavailable("injected insert failure".into())),
            _ => Ok(()),
        }
    }
}

/// Thread-safe in-memory repository
#[derive(Debug, Clone)]
pub struct InMemoryRepository {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::with_tables(Tables::default())
    }

    /// Create a repository seeded with `fixture`
    #[must_use]
    pub fn from_fixture(fixture: Fixture) -> Self {
        let mut tables = Tables::default();
        seed(&mut tables, fixture);
        Self::with_tables(tables)
    }

    fn with_tables(tables: Tables) -> Self {
        Self {
            tables: Arc::new(RwLock::new(tables)),
            faults: Arc::new(Faults {
                fail_writes: AtomicBool::new(false),
                inserts_before_failure: AtomicUsize::new(usize::MAX),
            }),
        }
    }

    /// Add a fixture to the repository
    pub async fn load(&self, fixture: Fixture) {
        seed(&mut *self.tables.write().await, fixture);
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Let the next `n` start list inserts succeed and fail the rest
    pub fn fail_startlist_inserts_after(&self, n: usize) {
        self.faults.inserts_before_failure.store(n, Ordering::SeqCst);
    }

    /// Clear all injected faults
    pub fn clear_faults(&self) {
        self.fail_writes(false);
        self.faults
            .inserts_before_failure
            .store(usize::MAX, Ordering::SeqCst);
    }
}

fn seed(tables: &mut Tables, fixture: Fixture) {
    let competition = fixture.competition_id;
    for category in fixture.categories {
        tables.categories.retain(|c| c.id != category.id);
        tables.categories.push(category);
    }
    for round in fixture.rounds {
        tables.rounds.insert(round.id, round);
    }
    let climbers = tables.climbers.entry(competition).or_default();
    for climber in fixture.climbers {
        climbers.insert(climber.id, climber);
    }
    for entry in fixture.startlist {
        let list = tables.startlists.entry(entry.round_id).or_default();
        list.retain(|e| e.climber_id != entry.climber_id);
        list.push(entry);
        list.sort_by_key(|e| e.start_order);
    }
    let ledger = tables.ledger.entry(competition).or_default();
    for entry in fixture.ledger {
        ledger.insert(entry.key(), entry);
    }
}

fn check_permutation(
    current: &[StartlistEntry],
    order: &[(ClimberId, u32)],
) -> Result<(), RepositoryError> {
    let registered: BTreeSet<ClimberId> = current.iter().map(|e| e.climber_id).collect();
    let mut seen = BTreeSet::new();
    for (climber, _) in order {
        if !seen.insert(*climber) {
            return Err(ValidationError::DuplicateClimber(*climber).into());
        }
        if !registered.contains(climber) {
            return Err(RepositoryError::Conflict(format!(
                "climber {climber} is not registered for the round"
            )));
        }
    }
    if let Some(missing) = registered.difference(&seen).next() {
        return Err(RepositoryError::Conflict(format!(
            "start list changed: climber {missing} is missing from the new order"
        )));
    }

    let mut positions: Vec<u32> = order.iter().map(|(_, position)| *position).collect();
    positions.sort_unstable();
    if positions.iter().zip(1..).any(|(position, expected)| *position != expected) {
        return Err(ValidationError::StartOrderNotDense.into());
    }
    Ok(())
}

impl CompetitionRepository for InMemoryRepository {
    fn category(&self, id: CategoryId) -> RepoFuture<'_, Category> {
        Box::pin(async move {
            self.tables
                .read()
                .await
                .categories
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(format!("category {id}")))
        })
    }

    fn categories(&self, competition: CompetitionId) -> RepoFuture<'_, Vec<Category>> {
        Box::pin(async move {
            Ok(self
                .tables
                .read()
                .await
                .categories
                .iter()
                .filter(|c| c.competition_id == competition)
                .cloned()
                .collect())
        })
    }

    fn round(&self, id: RoundId) -> RepoFuture<'_, Round> {
        Box::pin(async move { self.tables.read().await.round(id).cloned() })
    }

    fn rounds(&self, category: CategoryId) -> RepoFuture<'_, Vec<Round>> {
        Box::pin(async move {
            let mut rounds: Vec<Round> = self
                .tables
                .read()
                .await
                .rounds
                .values()
                .filter(|r| r.category_id == category)
                .cloned()
                .collect();
            rounds.sort_by_key(|r| r.order);
            Ok(rounds)
        })
    }

    fn find_round(
        &self,
        competition: CompetitionId,
        category_label: String,
        round_label: String,
    ) -> RepoFuture<'_, Round> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let category = tables
                .categories
                .iter()
                .find(|c| c.competition_id == competition && c.label == category_label)
                .ok_or_else(|| RepositoryError::NotFound(format!("category {category_label}")))?;
            tables
                .rounds
                .values()
                .find(|r| r.category_id == category.id && r.label == round_label)
                .cloned()
                .ok_or_else(|| {
                    RepositoryError::NotFound(format!("round {round_label} of {category_label}"))
                })
        })
    }

    fn climbers(&self, competition: CompetitionId) -> RepoFuture<'_, Vec<Climber>> {
        Box::pin(async move {
            Ok(self
                .tables
                .read()
                .await
                .climbers
                .get(&competition)
                .map(|c| c.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn upsert_climber(&self, competition: CompetitionId, climber: Climber) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            self.faults.check_write()?;
            self.tables
                .write()
                .await
                .climbers
                .entry(competition)
                .or_default()
                .insert(climber.id, climber);
            Ok(())
        })
    }

    fn ledger(
        &self,
        competition: CompetitionId,
        filter: LedgerFilter,
    ) -> RepoFuture<'_, Vec<AttemptLedgerEntry>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .ledger
                .get(&competition)
                .map(|rows| {
                    rows.values()
                        .filter(|entry| tables.matches(entry, &filter))
                        .copied()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn upsert_attempt(
        &self,
        competition: CompetitionId,
        entry: AttemptLedgerEntry,
    ) -> RepoFuture<'_, AttemptLedgerEntry> {
        Box::pin(async move {
            entry.validate()?;
            self.faults.check_write()?;

            let mut tables = self.tables.write().await;
            if !tables.rounds.values().any(|r| r.has_boulder(entry.boulder_id)) {
                return Err(RepositoryError::NotFound(format!("boulder {}", entry.boulder_id)));
            }
            tables
                .ledger
                .entry(competition)
                .or_default()
                .insert(entry.key(), entry);
            Ok(entry)
        })
    }

    fn startlist(&self, round: RoundId) -> RepoFuture<'_, Vec<StartlistEntry>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            tables.round(round)?;
            Ok(tables.startlists.get(&round).cloned().unwrap_or_default())
        })
    }

    fn insert_startlist_entry(&self, entry: StartlistEntry) -> RepoFuture<'_, InsertOutcome> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            tables.round(entry.round_id)?;

            let list = tables.startlists.entry(entry.round_id).or_default();
            if list.iter().any(|e| e.climber_id == entry.climber_id) {
                return Ok(InsertOutcome::AlreadyPresent);
            }
            self.faults.check_insert()?;
            if entry.start_order == 0 {
                return Err(ValidationError::StartOrderNotDense.into());
            }
            if let Some(holder) = list.iter().find(|e| e.start_order == entry.start_order) {
                return Err(RepositoryError::Conflict(format!(
                    "start order {} is held by climber {}",
                    entry.start_order, holder.climber_id
                )));
            }

            list.push(entry);
            list.sort_by_key(|e| e.start_order);
            Ok(InsertOutcome::Inserted)
        })
    }

    fn remove_startlist_entry(&self, round: RoundId, climber: ClimberId) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            self.faults.check_write()?;
            let mut tables = self.tables.write().await;
            let list = tables.startlists.entry(round).or_default();
            let before = list.len();
            list.retain(|e| e.climber_id != climber);
            if list.len() == before {
                return Err(RepositoryError::NotFound(format!(
                    "climber {climber} in round {round}"
                )));
            }
            for (entry, position) in list.iter_mut().zip(1..) {
                entry.start_order = position;
            }
            Ok(())
        })
    }

    fn replace_start_order(
        &self,
        round: RoundId,
        order: Vec<(ClimberId, u32)>,
    ) -> RepoFuture<'_, Vec<StartlistEntry>> {
        Box::pin(async move {
            self.faults.check_write()?;
            let mut tables = self.tables.write().await;
            tables.round(round)?;

            let list = tables.startlists.entry(round).or_default();
            check_permutation(list, &order)?;

            let mut replaced: Vec<StartlistEntry> = order
                .into_iter()
                .map(|(climber_id, start_order)| StartlistEntry {
                    round_id: round,
                    climber_id,
                    start_order,
                })
                .collect();
            replaced.sort_by_key(|e| e.start_order);
            list.clone_from(&replaced);
            Ok(replaced)
        })
    }

    fn mark_round_completed(&self, round: RoundId) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            self.faults.check_write()?;
            let mut tables = self.tables.write().await;
            tables
                .rounds
                .get_mut(&round)
                .ok_or_else(|| RepositoryError::NotFound(format!("round {round}")))?
                .completed = true;
            Ok(())
        })
    }
}
