//! Judge scoring session.
//!
//! One judge's screen: the ledger entries they can see, the correction
//! dialog, and the writes in flight. Taps are shown immediately and sent as
//! absolute entries. The server stays authoritative:
//!
//! - a save answer for an older request than the newest one for the same
//!   entry is ignored, since the newer request already carries its effect
//! - a failed save is reported and the ledger is fetched again; it is never
//!   retried, so an attempt can't be counted twice
//! - a failed fetch is reported as possibly stale data

use crate::api::{CompetitionApi, RecordAttemptRequest};
use crate::error::ValidationError;
use crate::ledger::{AttemptLedgerEntry, EditDraft, JudgeAction};
use crate::types::{CompetitionId, LedgerFilter, LedgerKey};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use topout_core::effect::Effect;
use topout_core::reducer::Reducer;
use topout_core::{SmallVec, async_effect, smallvec};

/// Problem shown to the judge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A write failed; the entry is being reconciled
    SaveFailed {
        /// Entry whose write failed
        key: LedgerKey,
        /// Transport detail
        detail: String,
    },
    /// The ledger could not be fetched
    StaleData {
        /// Transport detail
        detail: String,
    },
    /// A correction was rejected locally
    Invalid(ValidationError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SaveFailed { detail, .. } => {
                write!(f, "Your last action may not have been saved ({detail})")
            },
            Self::StaleData { detail } => {
                write!(f, "You are viewing possibly stale data ({detail})")
            },
            Self::Invalid(err) => write!(f, "{err}"),
        }
    }
}

/// Session state
#[derive(Debug, Clone)]
pub struct ScoringState {
    /// Competition being judged
    pub competition_id: CompetitionId,
    /// Part of the ledger this session shows (round, boulder, ...)
    pub filter: LedgerFilter,
    /// Entries as displayed
    pub entries: BTreeMap<LedgerKey, AttemptLedgerEntry>,
    /// Open correction dialog
    pub draft: Option<EditDraft>,
    /// Latest write sequence number per entry with a write in flight
    pub in_flight: BTreeMap<LedgerKey, u64>,
    /// Last issued write sequence number
    pub last_seq: u64,
    /// A ledger fetch is running
    pub loading: bool,
    /// Last error to show
    pub error: Option<SessionError>,
}

impl ScoringState {
    /// Empty session for `competition`, scoped by `filter`
    #[must_use]
    pub const fn new(competition_id: CompetitionId, filter: LedgerFilter) -> Self {
        Self {
            competition_id,
            filter,
            entries: BTreeMap::new(),
            draft: None,
            in_flight: BTreeMap::new(),
            last_seq: 0,
            loading: false,
            error: None,
        }
    }

    /// Entry as displayed; unscored entries read as fresh
    #[must_use]
    pub fn entry(&self, key: &LedgerKey) -> AttemptLedgerEntry {
        self.entries
            .get(key)
            .copied()
            .unwrap_or_else(|| AttemptLedgerEntry::fresh(*key))
    }

    /// Whether a write for `key` is still unanswered
    #[must_use]
    pub fn is_saving(&self, key: &LedgerKey) -> bool {
        self.in_flight.contains_key(key)
    }
}

/// Session actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoringAction {
    /// Fetch the ledger
    Load,
    /// Fetch answered
    Loaded {
        /// Rows matching the session filter
        entries: Vec<AttemptLedgerEntry>,
    },
    /// Fetch failed
    LoadFailed {
        /// Transport detail
        error: String,
    },
    /// Judge tapped a button
    Judge {
        /// Entry tapped
        key: LedgerKey,
        /// Button
        action: JudgeAction,
    },
    /// Write answered
    Saved {
        /// Sequence number of the write
        seq: u64,
        /// Entry as stored
        entry: AttemptLedgerEntry,
    },
    /// Write failed
    SaveFailed {
        /// Entry written
        key: LedgerKey,
        /// Sequence number of the write
        seq: u64,
        /// Transport detail
        error: String,
    },
    /// Open the correction dialog
    BeginEdit {
        /// Entry to correct
        key: LedgerKey,
    },
    /// Change the zone counter in the dialog
    AdjustZone {
        /// Signed change
        delta: i64,
    },
    /// Change the top counter in the dialog
    AdjustTop {
        /// Signed change
        delta: i64,
    },
    /// Toggle the zone flag in the dialog
    SetZoneReached(bool),
    /// Toggle the top flag in the dialog
    SetTopReached(bool),
    /// Persist the dialog's entry
    ConfirmEdit,
    /// Close the dialog without saving
    CancelEdit,
    /// Hide the current error
    DismissError,
}

/// Session environment
#[derive(Clone)]
pub struct ScoringEnvironment {
    /// Competition service
    pub api: Arc<dyn CompetitionApi>,
}

impl ScoringEnvironment {
    /// Environment talking to `api`
    #[must_use]
    pub fn new(api: Arc<dyn CompetitionApi>) -> Self {
        Self { api }
    }
}

/// Reducer for [`ScoringState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringReducer;

impl ScoringReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn load(state: &mut ScoringState, env: &ScoringEnvironment) -> Effect<ScoringAction> {
        state.loading = true;
        let api = Arc::clone(&env.api);
        let (competition, filter) = (state.competition_id, state.filter);
        async_effect! {
            match api.fetch_ledger(competition, filter).await {
                Ok(entries) => Some(ScoringAction::Loaded { entries }),
                Err(error) => Some(ScoringAction::LoadFailed { error: error.to_string() }),
            }
        }
    }

    fn save(
        state: &mut ScoringState,
        entry: AttemptLedgerEntry,
        env: &ScoringEnvironment,
    ) -> Effect<ScoringAction> {
        let key = entry.key();
        state.last_seq += 1;
        let seq = state.last_seq;
        state.entries.insert(key, entry);
        state.in_flight.insert(key, seq);

        let api = Arc::clone(&env.api);
        let request = RecordAttemptRequest::new(state.competition_id, &entry);
        async_effect! {
            match api.record_attempt(request).await {
                Ok(entry) => Some(ScoringAction::Saved { seq, entry }),
                Err(error) => Some(ScoringAction::SaveFailed {
                    key,
                    seq,
                    error: error.to_string(),
                }),
            }
        }
    }

    fn edit<F>(state: &mut ScoringState, change: F)
    where
        F: FnOnce(&mut EditDraft) -> Result<(), ValidationError>,
    {
        let Some(draft) = state.draft.as_mut() else {
            state.error = Some(SessionError::Invalid(ValidationError::NoEditOpen));
            return;
        };
        if let Err(err) = change(draft) {
            state.error = Some(SessionError::Invalid(err));
        }
    }
}

impl Reducer for ScoringReducer {
    type State = ScoringState;
    type Action = ScoringAction;
    type Environment = ScoringEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ScoringAction::Load => smallvec![Self::load(state, env)],

            ScoringAction::Loaded { entries } => {
                state.loading = false;
                if matches!(state.error, Some(SessionError::StaleData { .. })) {
                    state.error = None;
                }
                // Entries with a write in flight keep their newer local value.
                let in_flight = &state.in_flight;
                state.entries.retain(|key, _| in_flight.contains_key(key));
                for entry in entries {
                    let key = entry.key();
                    if !in_flight.contains_key(&key) {
                        state.entries.insert(key, entry);
                    }
                }
                smallvec![Effect::None]
            },

            ScoringAction::LoadFailed { error } => {
                state.loading = false;
                tracing::warn!(error = %error, "Ledger fetch failed");
                state.error = Some(SessionError::StaleData { detail: error });
                smallvec![Effect::None]
            },

            ScoringAction::Judge { key, action } => {
                let current = state.entry(&key);
                if !current.accepts_taps() {
                    return smallvec![Effect::None];
                }
                let next = current.apply(action);
                tracing::debug!(%key, ?action, "Judge action");
                smallvec![Self::save(state, next, env)]
            },

            ScoringAction::Saved { seq, entry } => {
                let key = entry.key();
                if state.in_flight.get(&key) != Some(&seq) {
                    tracing::debug!(%key, seq, "Ignoring superseded save");
                    return smallvec![Effect::None];
                }
                state.in_flight.remove(&key);
                state.entries.insert(key, entry);
                smallvec![Effect::None]
            },

            ScoringAction::SaveFailed { key, seq, error } => {
                if state.in_flight.get(&key) != Some(&seq) {
                    return smallvec![Effect::None];
                }
                state.in_flight.remove(&key);
                tracing::warn!(%key, seq, error = %error, "Ledger write failed");
                state.error = Some(SessionError::SaveFailed { key, detail: error });
                smallvec![Self::load(state, env)]
            },

            ScoringAction::BeginEdit { key } => {
                state.draft = Some(EditDraft::begin(state.entry(&key)));
                smallvec![Effect::None]
            },

            ScoringAction::AdjustZone { delta } => {
                Self::edit(state, |draft| draft.adjust_zone(delta));
                smallvec![Effect::None]
            },

            ScoringAction::AdjustTop { delta } => {
                Self::edit(state, |draft| draft.adjust_top(delta));
                smallvec![Effect::None]
            },

            ScoringAction::SetZoneReached(reached) => {
                Self::edit(state, |draft| draft.set_zone_reached(reached));
                smallvec![Effect::None]
            },

            ScoringAction::SetTopReached(reached) => {
                Self::edit(state, |draft| {
                    draft.set_top_reached(reached);
                    Ok(())
                });
                smallvec![Effect::None]
            },

            ScoringAction::ConfirmEdit => {
                let Some(draft) = state.draft.take() else {
                    state.error = Some(SessionError::Invalid(ValidationError::NoEditOpen));
                    return smallvec![Effect::None];
                };
                if !draft.is_dirty() {
                    return smallvec![Effect::None];
                }
                match draft.clone().commit() {
                    Ok(entry) => smallvec![Self::save(state, entry, env)],
                    Err(err) => {
                        state.draft = Some(draft);
                        state.error = Some(SessionError::Invalid(err));
                        smallvec![Effect::None]
                    },
                }
            },

            ScoringAction::CancelEdit => {
                state.draft = None;
                smallvec![Effect::None]
            },

            ScoringAction::DismissError => {
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
    use crate::types::{
        Boulder, BoulderId, Category, CategoryId, ClimberId, Gender, Round, RoundId,
    };
    use std::time::Duration;
    use topout_runtime::Store;
    use topout_testing::{ReducerTest, assertions};

    type Session = Store<ScoringState, ScoringAction, ScoringEnvironment, ScoringReducer>;

    const SETTLE: Duration = Duration::from_secs(2);

    struct Harness {
        api: LocalCompetitionApi,
        env: ScoringEnvironment,
        state: ScoringState,
        key: LedgerKey,
    }

    fn harness() -> Harness {
        let competition_id = CompetitionId::new();
        let category = Category {
            id: CategoryId::new(),
            competition_id,
            gender: Gender::Open,
            age_group: "Open".into(),
            label: "Open".into(),
        };
        let boulder = BoulderId::new();
        let round = Round {
            id: RoundId::new(),
            category_id: category.id,
            order: 1,
            label: "Final".into(),
            boulders: vec![Boulder { id: boulder, number: 1 }],
            advance_count: 0,
            completed: false,
        };
        let filter = LedgerFilter::round(round.id);
        let api = LocalCompetitionApi::new(InMemoryRepository::from_fixture(Fixture {
            competition_id,
            categories: vec![category],
            rounds: vec![round],
            ..Fixture::default()
        }));
        Harness {
            env: ScoringEnvironment::new(Arc::new(api.clone())),
            api,
            state: ScoringState::new(competition_id, filter),
            key: LedgerKey::new(ClimberId::new(), boulder),
        }
    }

    fn session(h: &Harness) -> Session {
        Store::new(h.state.clone(), ScoringReducer::new(), h.env.clone())
    }

    fn is_loaded(action: &ScoringAction) -> bool {
        matches!(action, ScoringAction::Loaded { .. })
    }

    #[test]
    fn tap_displays_optimistically_and_saves() {
        let h = harness();
        let key = h.key;
        ReducerTest::new(ScoringReducer::new())
            .with_env(h.env)
            .given_state(h.state)
            .when_action(ScoringAction::Judge {
                key,
                action: JudgeAction::Zone,
            })
            .then_state(move |state| {
                let entry = state.entry(&key);
                assert!(entry.zone_reached);
                assert_eq!(entry.top_attempts, 1);
                assert!(state.is_saving(&key));
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn taps_after_top_do_nothing() {
        let h = harness();
        let key = h.key;
        ReducerTest::new(ScoringReducer::new())
            .with_env(h.env)
            .given_state(h.state)
            .when_actions([
                ScoringAction::Judge {
                    key,
                    action: JudgeAction::Top,
                },
                ScoringAction::Judge {
                    key,
                    action: JudgeAction::Attempt,
                },
            ])
            .then_state(move |state| {
                assert_eq!(state.entry(&key).top_attempts, 1);
                assert_eq!(state.last_seq, 1);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn superseded_save_is_ignored() {
        let h = harness();
        let key = h.key;
        let stale = AttemptLedgerEntry::fresh(key).apply(JudgeAction::Attempt);
        ReducerTest::new(ScoringReducer::new())
            .with_env(h.env)
            .given_state(h.state)
            .when_actions([
                ScoringAction::Judge {
                    key,
                    action: JudgeAction::Attempt,
                },
                ScoringAction::Judge {
                    key,
                    action: JudgeAction::Zone,
                },
                ScoringAction::Saved {
                    seq: 1,
                    entry: stale,
                },
            ])
            .then_state(move |state| {
                let entry = state.entry(&key);
                assert_eq!(entry.top_attempts, 2);
                assert!(entry.zone_reached);
                assert_eq!(state.in_flight.get(&key), Some(&2));
            })
            .run();
    }

    #[tokio::test]
    async fn confirmed_edit_is_persisted_once() {
        let h = harness();
        let store = session(&h);
        let key = h.key;
        for action in [
            ScoringAction::BeginEdit { key },
            ScoringAction::AdjustTop { delta: 4 },
            ScoringAction::SetZoneReached(true),
            ScoringAction::AdjustZone { delta: 1 },
        ] {
            store.send(action).await.unwrap();
        }
        assert_eq!(h.api.save_calls(), 0);

        store
            .send_and_wait_for(
                ScoringAction::ConfirmEdit,
                |a| matches!(a, ScoringAction::Saved { .. }),
                SETTLE,
            )
            .await
            .unwrap();
        assert_eq!(h.api.save_calls(), 1);
        assert!(
            store
                .state(|s| s.draft.is_none() && !s.is_saving(&key))
                .await
        );

        let stored = h
            .api
            .fetch_ledger(h.state.competition_id, h.state.filter)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!((stored[0].zone_attempts, stored[0].top_attempts), (2, 4));
        assert!(stored[0].zone_reached && !stored[0].top_reached);
    }

    #[tokio::test]
    async fn failed_save_reports_and_reconciles_without_retry() {
        let h = harness();
        let store = session(&h);
        let key = h.key;
        h.api.fail(Operation::Save, true);

        // A failed write reloads the ledger.
        store
            .send_and_wait_for(
                ScoringAction::Judge {
                    key,
                    action: JudgeAction::Attempt,
                },
                is_loaded,
                SETTLE,
            )
            .await
            .unwrap();

        assert_eq!(h.api.save_calls(), 1);
        let state = store.state(ScoringState::clone).await;
        assert!(matches!(state.error, Some(SessionError::SaveFailed { .. })));
        assert!(
            state
                .error
                .as_ref()
                .unwrap()
                .to_string()
                .starts_with("Your last action may not have been saved")
        );
        // The refetch replaced the optimistic tap with the stored (absent) row.
        assert_eq!(state.entry(&key), AttemptLedgerEntry::fresh(key));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn failed_fetch_reports_stale_data() {
        let h = harness();
        let store = session(&h);
        h.api.fail(Operation::Fetch, true);
        store
            .send_and_wait_for(
                ScoringAction::Load,
                |a| matches!(a, ScoringAction::LoadFailed { .. }),
                SETTLE,
            )
            .await
            .unwrap();
        assert!(
            store
                .state(|s| matches!(s.error, Some(SessionError::StaleData { .. })))
                .await
        );

        h.api.fail(Operation::Fetch, false);
        store
            .send_and_wait_for(ScoringAction::Load, is_loaded, SETTLE)
            .await
            .unwrap();
        assert!(store.state(|s| s.error.is_none()).await);
    }

    #[test]
    fn invalid_correction_keeps_dialog_open() {
        let h = harness();
        let key = h.key;
        ReducerTest::new(ScoringReducer::new())
            .with_env(h.env)
            .given_state(h.state)
            .when_actions([
                ScoringAction::BeginEdit { key },
                ScoringAction::SetTopReached(true),
                ScoringAction::SetZoneReached(false),
            ])
            .then_state(|state| {
                assert_eq!(
                    state.error,
                    Some(SessionError::Invalid(ValidationError::ZoneRequiredByTop))
                );
                assert!(state.draft.as_ref().unwrap().entry().zone_reached);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn edit_without_dialog_is_rejected() {
        let h = harness();
        ReducerTest::new(ScoringReducer::new())
            .with_env(h.env)
            .given_state(h.state)
            .when_action(ScoringAction::AdjustTop { delta: 1 })
            .then_state(|state| {
                assert_eq!(
                    state.error,
                    Some(SessionError::Invalid(ValidationError::NoEditOpen))
                );
            })
            .run();
    }
}
