//! Start list reorder coordinator.
//!
//! An organizer reorders a round's start list with immediate feedback. The
//! coordinator moves through three phases:
//!
//! ```text
//! Stable ──reorder──▶ Pending ──accepted──▶ Stable
//!                        │
//!                        └──rejected──▶ Reconciling ──fetched──▶ Stable
//! ```
//!
//! While a reorder is pending or being reconciled, further reorders,
//! removals and registrations are rejected locally. A rejected submission
//! restores the list as it was before the reorder and fetches the stored
//! order; local and remote orders are never merged.

use crate::api::{CompetitionApi, RegistrationRequest, StartOrderSlot, StartOrderUpdate};
use crate::error::{ApiError, ValidationError};
use crate::types::{Climber, ClimberId, RoundId, StartlistEntry, StartlistQuery};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use topout_core::effect::Effect;
use topout_core::reducer::Reducer;
use topout_core::{SmallVec, async_effect, smallvec};

/// Where the coordinator is in the reorder protocol
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReorderPhase {
    /// Displayed order matches the last known stored order
    #[default]
    Stable,
    /// A reorder was submitted and is unanswered
    Pending {
        /// List as it was before the reorder
        snapshot: Vec<StartlistEntry>,
    },
    /// A reorder was rejected; the stored order is being fetched
    Reconciling,
}

impl ReorderPhase {
    /// Whether a submission is unanswered
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Whether destructive actions are allowed
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }
}

/// Problem shown to the organizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartlistError {
    /// Rejected locally, nothing was sent
    Invalid(ValidationError),
    /// The service refused the change because the list moved underneath
    Conflict(String),
    /// A write failed in transit
    NotSaved(String),
    /// The list could not be fetched
    StaleData(String),
}

impl fmt::Display for StartlistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "{err}"),
            Self::Conflict(detail) => {
                write!(f, "The start list changed, reload and try again ({detail})")
            },
            Self::NotSaved(detail) => {
                write!(f, "Your last action may not have been saved ({detail})")
            },
            Self::StaleData(detail) => {
                write!(f, "You are viewing possibly stale data ({detail})")
            },
        }
    }
}

impl From<ApiError> for StartlistError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Conflict(detail) => Self::Conflict(detail),
            other => Self::NotSaved(other.to_string()),
        }
    }
}

/// Coordinator state for one round
#[derive(Debug, Clone)]
pub struct ReorderState {
    /// Labels addressing the start list
    pub query: StartlistQuery,
    /// Round the list belongs to
    pub round_id: RoundId,
    /// Entries in displayed order, numbered 1..N
    pub entries: Vec<StartlistEntry>,
    /// Protocol phase
    pub phase: ReorderPhase,
    /// A fetch is running
    pub loading: bool,
    /// Last error to show
    pub error: Option<StartlistError>,
}

impl ReorderState {
    /// Empty coordinator for the round addressed by `query`
    #[must_use]
    pub const fn new(query: StartlistQuery, round_id: RoundId) -> Self {
        Self {
            query,
            round_id,
            entries: Vec::new(),
            phase: ReorderPhase::Stable,
            loading: false,
            error: None,
        }
    }

    /// Climbers in displayed order
    #[must_use]
    pub fn climbers(&self) -> Vec<ClimberId> {
        self.entries.iter().map(|e| e.climber_id).collect()
    }

    fn set_sorted(&mut self, mut entries: Vec<StartlistEntry>) {
        entries.sort_by_key(|e| (e.start_order, e.climber_id));
        self.entries = entries;
    }

    fn check_stable(&self) -> Result<(), ValidationError> {
        if self.phase.is_stable() {
            Ok(())
        } else {
            Err(ValidationError::ReorderInProgress)
        }
    }

    /// Check that `order` is a permutation of the displayed climbers.
    fn check_permutation(&self, order: &[ClimberId]) -> Result<(), ValidationError> {
        let known: BTreeSet<ClimberId> = self.entries.iter().map(|e| e.climber_id).collect();
        let mut seen = BTreeSet::new();
        for climber in order {
            if !known.contains(climber) {
                return Err(ValidationError::UnknownClimber(*climber));
            }
            if !seen.insert(*climber) {
                return Err(ValidationError::DuplicateClimber(*climber));
            }
        }
        match known.difference(&seen).next() {
            Some(missing) => Err(ValidationError::MissingClimber(*missing)),
            None => Ok(()),
        }
    }
}

/// Coordinator actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderAction {
    /// Fetch the stored start list
    Load,
    /// Fetch answered
    Loaded {
        /// Stored entries
        entries: Vec<StartlistEntry>,
    },
    /// Fetch failed
    LoadFailed {
        /// Transport detail
        error: String,
    },
    /// Drag one climber from position `from` to position `to` (0-based)
    Move {
        /// Current position
        from: usize,
        /// Target position
        to: usize,
    },
    /// Replace the whole order
    Reorder {
        /// Every climber of the round, first starter first
        order: Vec<ClimberId>,
    },
    /// Submission accepted
    Submitted {
        /// Entries as stored
        entries: Vec<StartlistEntry>,
    },
    /// Submission rejected or lost
    SubmitFailed {
        /// Why
        error: ApiError,
    },
    /// Remove a climber from the round
    Remove {
        /// Climber to remove
        climber: ClimberId,
    },
    /// Removal stored
    Removed {
        /// Climber removed
        climber: ClimberId,
    },
    /// Register a climber at the end of the list
    Register {
        /// Climber to add
        climber: Climber,
    },
    /// Registration stored
    Registered {
        /// Stored entry
        entry: StartlistEntry,
    },
    /// Removal or registration failed
    ChangeFailed {
        /// Why
        error: ApiError,
    },
    /// Hide the current error
    DismissError,
}

/// Coordinator environment
#[derive(Clone)]
pub struct ReorderEnvironment {
    /// Competition service
    pub api: Arc<dyn CompetitionApi>,
}

impl ReorderEnvironment {
    /// Environment talking to `api`
    #[must_use]
    pub fn new(api: Arc<dyn CompetitionApi>) -> Self {
        Self { api }
    }
}

/// Reducer for [`ReorderState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReorderReducer;

impl ReorderReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn load(state: &mut ReorderState, env: &ReorderEnvironment) -> Effect<ReorderAction> {
        state.loading = true;
        let api = Arc::clone(&env.api);
        let query = state.query.clone();
        async_effect! {
            match api.fetch_startlist(query).await {
                Ok(entries) => Some(ReorderAction::Loaded { entries }),
                Err(error) => Some(ReorderAction::LoadFailed { error: error.to_string() }),
            }
        }
    }

    fn reorder(
        state: &mut ReorderState,
        order: Vec<ClimberId>,
        env: &ReorderEnvironment,
    ) -> Result<Effect<ReorderAction>, ValidationError> {
        state.check_stable()?;
        state.check_permutation(&order)?;

        let round_id = state.round_id;
        let renumbered: Vec<StartlistEntry> = order
            .iter()
            .zip(1..)
            .map(|(climber_id, start_order)| StartlistEntry {
                round_id,
                climber_id: *climber_id,
                start_order,
            })
            .collect();
        let update = StartOrderUpdate {
            competition_id: state.query.competition_id,
            category: state.query.category.clone(),
            round: state.query.round.clone(),
            order: renumbered
                .iter()
                .map(|e| StartOrderSlot {
                    climber_id: e.climber_id,
                    start_order: e.start_order,
                })
                .collect(),
        };

        let snapshot = std::mem::replace(&mut state.entries, renumbered);
        state.phase = ReorderPhase::Pending { snapshot };
        tracing::debug!(round = %round_id, climbers = order.len(), "Submitting start order");

        let api = Arc::clone(&env.api);
        Ok(async_effect! {
            match api.update_start_order(update).await {
                Ok(entries) => Some(ReorderAction::Submitted { entries }),
                Err(error) => Some(ReorderAction::SubmitFailed { error }),
            }
        })
    }

    fn remove(
        state: &ReorderState,
        climber: ClimberId,
        env: &ReorderEnvironment,
    ) -> Result<Effect<ReorderAction>, ValidationError> {
        state.check_stable()?;
        if !state.entries.iter().any(|e| e.climber_id == climber) {
            return Err(ValidationError::UnknownClimber(climber));
        }
        let api = Arc::clone(&env.api);
        let round = state.round_id;
        Ok(async_effect! {
            match api.unregister(round, climber).await {
                Ok(()) => Some(ReorderAction::Removed { climber }),
                Err(error) => Some(ReorderAction::ChangeFailed { error }),
            }
        })
    }

    fn register(
        state: &ReorderState,
        climber: Climber,
        env: &ReorderEnvironment,
    ) -> Result<Effect<ReorderAction>, ValidationError> {
        state.check_stable()?;
        if state.entries.iter().any(|e| e.climber_id == climber.id) {
            return Err(ValidationError::DuplicateClimber(climber.id));
        }
        let api = Arc::clone(&env.api);
        let request = RegistrationRequest {
            round_id: state.round_id,
            climber,
        };
        Ok(async_effect! {
            match api.register(request).await {
                Ok(entry) => Some(ReorderAction::Registered { entry }),
                Err(error) => Some(ReorderAction::ChangeFailed { error }),
            }
        })
    }

    fn validated(
        state: &mut ReorderState,
        result: Result<Effect<ReorderAction>, ValidationError>,
    ) -> SmallVec<[Effect<ReorderAction>; 4]> {
        match result {
            Ok(effect) => smallvec![effect],
            Err(err) => {
                state.error = Some(StartlistError::Invalid(err));
                smallvec![Effect::None]
            },
        }
    }
}

impl Reducer for ReorderReducer {
    type State = ReorderState;
    type Action = ReorderAction;
    type Environment = ReorderEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ReorderAction::Load => smallvec![Self::load(state, env)],

            ReorderAction::Loaded { entries } => {
                state.loading = false;
                // A fetch that raced a submission says nothing about it.
                if state.phase.is_pending() {
                    return smallvec![Effect::None];
                }
                state.set_sorted(entries);
                state.phase = ReorderPhase::Stable;
                if matches!(state.error, Some(StartlistError::StaleData(_))) {
                    state.error = None;
                }
                smallvec![Effect::None]
            },

            ReorderAction::LoadFailed { error } => {
                state.loading = false;
                tracing::warn!(error = %error, "Start list fetch failed");
                if !state.phase.is_pending() {
                    state.phase = ReorderPhase::Stable;
                }
                state.error = Some(StartlistError::StaleData(error));
                smallvec![Effect::None]
            },

            ReorderAction::Move { from, to } => {
                let len = state.entries.len();
                let result = match (from < len, to < len) {
                    (false, _) => Err(ValidationError::PositionOutOfRange { index: from, len }),
                    (_, false) => Err(ValidationError::PositionOutOfRange { index: to, len }),
                    (true, true) => {
                        let mut order = state.climbers();
                        let moved = order.remove(from);
                        order.insert(to, moved);
                        Self::reorder(state, order, env)
                    },
                };
                Self::validated(state, result)
            },

            ReorderAction::Reorder { order } => {
                let result = Self::reorder(state, order, env);
                Self::validated(state, result)
            },

            ReorderAction::Submitted { entries } => {
                if !state.phase.is_pending() {
                    return smallvec![Effect::None];
                }
                state.set_sorted(entries);
                state.phase = ReorderPhase::Stable;
                state.error = None;
                smallvec![Effect::None]
            },

            ReorderAction::SubmitFailed { error } => {
                let ReorderPhase::Pending { snapshot } =
                    std::mem::replace(&mut state.phase, ReorderPhase::Reconciling)
                else {
                    return smallvec![Effect::None];
                };
                tracing::warn!(round = %state.round_id, error = %error, "Start order rejected");
                state.entries = snapshot;
                state.error = Some(error.into());
                smallvec![Self::load(state, env)]
            },

            ReorderAction::Remove { climber } => {
                let result = Self::remove(state, climber, env);
                Self::validated(state, result)
            },

            ReorderAction::Removed { climber } => {
                state.entries.retain(|e| e.climber_id != climber);
                for (entry, start_order) in state.entries.iter_mut().zip(1..) {
                    entry.start_order = start_order;
                }
                smallvec![Effect::None]
            },

            ReorderAction::Register { climber } => {
                let result = Self::register(state, climber, env);
                Self::validated(state, result)
            },

            ReorderAction::Registered { entry } => {
                if !state.entries.iter().any(|e| e.climber_id == entry.climber_id) {
                    state.entries.push(entry);
                    let entries = std::mem::take(&mut state.entries);
                    state.set_sorted(entries);
                }
                smallvec![Effect::None]
            },

            ReorderAction::ChangeFailed { error } => {
                tracing::warn!(round = %state.round_id, error = %error, "Start list change failed");
                state.error = Some(error.into());
                smallvec![Self::load(state, env)]
            },

            ReorderAction::DismissError => {
                state.error = None;
                smallvec![Effect::None]
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::{Fixture, InMemoryRepository};
    use crate::mocks::{LocalCompetitionApi, Operation};
    use crate::repository::CompetitionRepository;
    use crate::types::{
        Boulder, BoulderId, Category, CategoryId, CompetitionId, Gender, Round,
    };
    use std::time::Duration;
    use topout_runtime::Store;
    use topout_testing::{ReducerTest, assertions};

    type Coordinator = Store<ReorderState, ReorderAction, ReorderEnvironment, ReorderReducer>;

    const SETTLE: Duration = Duration::from_secs(2);

    struct Harness {
        api: LocalCompetitionApi,
        env: ReorderEnvironment,
        state: ReorderState,
        climbers: Vec<ClimberId>,
    }

    fn climber(name: &str) -> Climber {
        Climber {
            id: ClimberId::new(),
            name: name.into(),
            gender: Gender::Male,
            age_group: "Open".into(),
        }
    }

    fn harness() -> Harness {
        let competition_id = CompetitionId::new();
        let category = Category {
            id: CategoryId::new(),
            competition_id,
            gender: Gender::Male,
            age_group: "Open".into(),
            label: "Open Men".into(),
        };
        let round = Round {
            id: RoundId::new(),
            category_id: category.id,
            order: 1,
            label: "Qualification".into(),
            boulders: vec![Boulder {
                id: BoulderId::new(),
                number: 1,
            }],
            advance_count: 2,
            completed: false,
        };
        let climbers: Vec<Climber> = ["Ari", "Bo", "Cy", "Dee"].map(climber).into();
        let startlist = climbers
            .iter()
            .zip(1..)
            .map(|(c, start_order)| StartlistEntry {
                round_id: round.id,
                climber_id: c.id,
                start_order,
            })
            .collect();
        let api = LocalCompetitionApi::new(InMemoryRepository::from_fixture(Fixture {
            competition_id,
            categories: vec![category],
            rounds: vec![round.clone()],
            climbers: climbers.clone(),
            startlist,
            ledger: Vec::new(),
        }));
        let query = StartlistQuery {
            competition_id,
            category: "Open Men".into(),
            round: "Qualification".into(),
        };
        Harness {
            env: ReorderEnvironment::new(Arc::new(api.clone())),
            api,
            state: ReorderState::new(query, round.id),
            climbers: climbers.iter().map(|c| c.id).collect(),
        }
    }

    fn coordinator(h: &Harness) -> Coordinator {
        Store::new(h.state.clone(), ReorderReducer::new(), h.env.clone())
    }

    /// Send `action` and wait until the coordinator reduced an outcome matching `done`.
    async fn settle(
        store: &Coordinator,
        action: ReorderAction,
        done: fn(&ReorderAction) -> bool,
    ) -> ReorderAction {
        store.send_and_wait_for(action, done, SETTLE).await.unwrap()
    }

    fn is_loaded(action: &ReorderAction) -> bool {
        matches!(action, ReorderAction::Loaded { .. })
    }

    fn is_submitted(action: &ReorderAction) -> bool {
        matches!(action, ReorderAction::Submitted { .. })
    }

    async fn loaded() -> (Harness, Coordinator) {
        let h = harness();
        let store = coordinator(&h);
        settle(&store, ReorderAction::Load, is_loaded).await;
        assert_eq!(store.state(ReorderState::climbers).await, h.climbers);
        (h, store)
    }

    fn orders(entries: &[StartlistEntry]) -> Vec<(ClimberId, u32)> {
        entries.iter().map(|e| (e.climber_id, e.start_order)).collect()
    }

    #[tokio::test]
    async fn submitted_permutation_round_trips() {
        let (h, store) = loaded().await;
        let c = h.climbers.clone();
        let permutation = vec![c[2], c[0], c[3], c[1]];

        settle(
            &store,
            ReorderAction::Reorder {
                order: permutation.clone(),
            },
            is_submitted,
        )
        .await;
        assert!(store.state(|s| s.phase.is_stable() && s.error.is_none()).await);

        let stored = h.api.fetch_startlist(h.state.query.clone()).await.unwrap();
        assert_eq!(
            orders(&stored),
            vec![(c[2], 1), (c[0], 2), (c[3], 3), (c[1], 4)]
        );
        assert_eq!(store.state(ReorderState::climbers).await, permutation);
    }

    #[tokio::test]
    async fn move_renumbers_densely() {
        let (h, store) = loaded().await;
        let c = h.climbers.clone();
        settle(&store, ReorderAction::Move { from: 3, to: 0 }, is_submitted).await;

        assert_eq!(
            store.state(|s| orders(&s.entries)).await,
            vec![(c[3], 1), (c[0], 2), (c[1], 3), (c[2], 4)]
        );
        assert_eq!(h.api.reorder_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_submission_restores_previous_order() {
        let (h, store) = loaded().await;
        let before = store.state(|s| s.entries.clone()).await;
        h.api.fail(Operation::Reorder, true);

        settle(&store, ReorderAction::Move { from: 0, to: 3 }, is_loaded).await;

        let (entries, stable, error) = store
            .state(|s| (s.entries.clone(), s.phase.is_stable(), s.error.clone()))
            .await;
        assert_eq!(entries, before);
        assert!(stable);
        assert!(matches!(error, Some(StartlistError::NotSaved(_))));
        assert_eq!(h.api.reorder_calls(), 1);

        let stored = h.api.fetch_startlist(h.state.query.clone()).await.unwrap();
        assert_eq!(stored, before);
    }

    #[tokio::test]
    async fn stale_submission_reconciles_to_stored_list() {
        let (h, store) = loaded().await;
        let late = climber("Eve");
        h.api
            .register(RegistrationRequest {
                round_id: h.state.round_id,
                climber: late.clone(),
            })
            .await
            .unwrap();

        let mut order = h.climbers.clone();
        order.reverse();
        settle(&store, ReorderAction::Reorder { order }, is_loaded).await;

        let (climbers, stable, error) = store
            .state(|s| (s.climbers(), s.phase.is_stable(), s.error.clone()))
            .await;
        assert!(matches!(error, Some(StartlistError::Conflict(_))));
        assert!(stable);
        let mut expected = h.climbers.clone();
        expected.push(late.id);
        assert_eq!(climbers, expected);
    }

    #[tokio::test]
    async fn removal_and_registration_update_the_list() {
        let (h, store) = loaded().await;
        let c = h.climbers.clone();

        settle(&store, ReorderAction::Remove { climber: c[1] }, |a| {
            matches!(a, ReorderAction::Removed { .. })
        })
        .await;
        assert_eq!(
            store.state(|s| orders(&s.entries)).await,
            vec![(c[0], 1), (c[2], 2), (c[3], 3)]
        );

        let newcomer = climber("Fen");
        let outcome = settle(
            &store,
            ReorderAction::Register {
                climber: newcomer.clone(),
            },
            |a| matches!(a, ReorderAction::Registered { .. }),
        )
        .await;
        let ReorderAction::Registered { entry } = outcome else {
            unreachable!("waited for a registration");
        };
        assert_eq!((entry.climber_id, entry.start_order), (newcomer.id, 4));

        let stored = h
            .api
            .repository()
            .startlist(h.state.round_id)
            .await
            .unwrap();
        assert_eq!(stored, store.state(|s| s.entries.clone()).await);
    }

    #[test]
    fn duplicate_climber_is_rejected_locally() {
        let h = harness();
        let c = h.climbers.clone();
        let mut state = h.state;
        state.entries = c
            .iter()
            .zip(1..)
            .map(|(id, start_order)| StartlistEntry {
                round_id: state.round_id,
                climber_id: *id,
                start_order,
            })
            .collect();

        ReducerTest::new(ReorderReducer::new())
            .with_env(h.env)
            .given_state(state)
            .when_action(ReorderAction::Reorder {
                order: vec![c[0], c[0], c[2], c[3]],
            })
            .then_state(move |state| {
                assert_eq!(
                    state.error,
                    Some(StartlistError::Invalid(ValidationError::DuplicateClimber(c[0])))
                );
                assert!(state.phase.is_stable());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn missing_and_unknown_climbers_are_rejected() {
        let h = harness();
        let c = h.climbers.clone();
        let mut state = h.state;
        state.entries = vec![
            StartlistEntry {
                round_id: state.round_id,
                climber_id: c[0],
                start_order: 1,
            },
            StartlistEntry {
                round_id: state.round_id,
                climber_id: c[1],
                start_order: 2,
            },
        ];

        assert_eq!(
            state.check_permutation(&[c[0]]),
            Err(ValidationError::MissingClimber(c[1]))
        );
        assert_eq!(
            state.check_permutation(&[c[0], c[1], c[2]]),
            Err(ValidationError::UnknownClimber(c[2]))
        );

        ReducerTest::new(ReorderReducer::new())
            .with_env(h.env)
            .given_state(state)
            .when_action(ReorderAction::Move { from: 0, to: 5 })
            .then_state(|state| {
                assert_eq!(
                    state.error,
                    Some(StartlistError::Invalid(ValidationError::PositionOutOfRange {
                        index: 5,
                        len: 2
                    }))
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn destructive_actions_wait_for_pending_reorder() {
        let h = harness();
        let c = h.climbers.clone();
        let mut state = h.state;
        state.phase = ReorderPhase::Pending {
            snapshot: Vec::new(),
        };

        ReducerTest::new(ReorderReducer::new())
            .with_env(h.env)
            .given_state(state)
            .when_actions([
                ReorderAction::Remove { climber: c[0] },
                ReorderAction::Loaded {
                    entries: Vec::new(),
                },
            ])
            .then_state(|state| {
                assert_eq!(
                    state.error,
                    Some(StartlistError::Invalid(ValidationError::ReorderInProgress))
                );
                assert!(state.phase.is_pending());
            })
            .run();
    }
}
