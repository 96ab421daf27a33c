//! Promotion of a round's best climbers into the next round.

use crate::error::{AdvanceError, RepositoryError};
use crate::ledger::AttemptLedgerEntry;
use crate::ranking::{RankedResult, rank};
use crate::repository::{CompetitionRepository, InsertOutcome};
use crate::types::{ClimberId, LedgerFilter, RoundId, StartlistEntry};
use topout_runtime::metrics::AdvancementMetrics;

/// Climbers that qualify from a ranked round.
///
/// Everyone with `rank <= advance_count` qualifies, so a tie on the last
/// qualifying rank takes every tied climber along. The input order of
/// `results` (the ranking order) is kept.
#[must_use]
pub fn select_advancing(results: &[RankedResult], advance_count: u32) -> Vec<ClimberId> {
    results
        .iter()
        .filter(|r| r.rank <= advance_count)
        .map(|r| r.climber_id)
        .collect()
}

/// Successful advancement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advancement {
    /// Round the climbers came from, now completed
    pub from: RoundId,
    /// Round the climbers were written to
    pub to: RoundId,
    /// Climbers present in the next round for this advancement
    pub advanced: usize,
    /// Of those, climbers that were already present from an earlier run
    pub already_present: usize,
}

/// Advance the qualifying climbers of `round` into the next round.
///
/// Steps:
/// 1. Reject completed rounds, last rounds and rounds without results.
/// 2. Rank the round and select the qualifying climbers.
/// 3. Write one start list entry per climber in the next round, numbered
///    by rank order. Climbers already there are left alone, so a re-run
///    after a partial failure only writes what is missing.
/// 4. Mark the round completed, only if every write succeeded.
///
/// # Errors
///
/// - [`AdvanceError::AlreadyCompleted`], [`AdvanceError::NoNextRound`],
///   [`AdvanceError::NoResults`]: conflicts, nothing was written
/// - [`AdvanceError::Partial`]: some entries could not be written; the
///   round stays open
/// - [`AdvanceError::Repository`]: reading the inputs failed
pub async fn advance_round(
    repo: &dyn CompetitionRepository,
    round_id: RoundId,
) -> Result<Advancement, AdvanceError> {
    let result = run(repo, round_id).await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(AdvanceError::Partial { .. }) => "partial",
        Err(err) if err.is_conflict() => "conflict",
        Err(_) => "error",
    };
    AdvancementMetrics::record_run(outcome);
    result
}

async fn run(repo: &dyn CompetitionRepository, round_id: RoundId) -> Result<Advancement, AdvanceError> {
    let round = repo.round(round_id).await.map_err(|err| match err {
        RepositoryError::NotFound(_) => AdvanceError::RoundNotFound(round_id),
        other => other.into(),
    })?;

    if round.completed {
        return Err(AdvanceError::AlreadyCompleted(round_id));
    }

    let next = repo
        .next_round(round_id)
        .await?
        .ok_or(AdvanceError::NoNextRound(round_id))?;

    let competition = repo.competition_of_round(round_id).await?;
    let startlist = repo.startlist(round_id).await?;
    // Rows of climbers removed from the round stay in the ledger.
    let entries: Vec<AttemptLedgerEntry> = repo
        .ledger(competition, LedgerFilter::round(round_id))
        .await?
        .into_iter()
        .filter(|e| startlist.iter().any(|slot| slot.climber_id == e.climber_id))
        .collect();
    if entries.is_empty() {
        return Err(AdvanceError::NoResults(round_id));
    }

    let advancing = select_advancing(&rank(&startlist, &entries), round.advance_count);
    let expected = advancing.len();

    let mut advanced = 0;
    let mut already_present = 0;
    for (climber_id, start_order) in advancing.into_iter().zip(1..) {
        let entry = StartlistEntry {
            round_id: next.id,
            climber_id,
            start_order,
        };
        match repo.insert_startlist_entry(entry).await {
            Ok(InsertOutcome::Inserted) => advanced += 1,
            Ok(InsertOutcome::AlreadyPresent) => {
                advanced += 1;
                already_present += 1;
            },
            Err(error) => {
                tracing::warn!(
                    round = %round_id,
                    climber = %climber_id,
                    start_order,
                    error = %error,
                    "Failed to write advancing climber"
                );
            },
        }
    }

    if advanced < expected {
        return Err(AdvanceError::Partial { advanced, expected });
    }

    repo.mark_round_completed(round_id).await.map_err(|error| {
        tracing::warn!(round = %round_id, error = %error, "Failed to mark round completed");
        AdvanceError::Partial { advanced, expected }
    })?;

    tracing::info!(
        from = %round_id,
        to = %next.id,
        advanced,
        already_present,
        "Round advanced"
    );

    Ok(Advancement {
        from: round_id,
        to: next.id,
        advanced,
        already_present,
    })
}
