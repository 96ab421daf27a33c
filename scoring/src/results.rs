//! Full-competition result snapshots.
//!
//! A snapshot is what `GET results` returns and what every live push
//! carries: all categories, each with all of its rounds ranked.

use crate::error::RepositoryError;
use crate::ranking::{RankedResult, rank};
use crate::repository::CompetitionRepository;
use crate::types::{CategoryId, ClimberId, CompetitionId, Gender, LedgerFilter, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use topout_runtime::metrics::ResultsMetrics;

/// A ranked climber with their display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Ranking figures
    #[serde(flatten)]
    pub result: RankedResult,
    /// Climber display name, empty if unknown
    #[serde(default)]
    pub name: String,
}

/// Ranking of one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResults {
    /// Round identity
    pub round_id: RoundId,
    /// Round label
    pub label: String,
    /// Order within the category
    pub order: u32,
    /// Whether advancement out of the round has run
    pub completed: bool,
    /// Climbers in ranking order
    pub results: Vec<ResultRow>,
}

/// All rounds of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResults {
    /// Category identity
    pub category_id: CategoryId,
    /// Category label
    pub label: String,
    /// Gender of the category
    pub gender: Gender,
    /// Age group of the category
    pub age_group: String,
    /// Rounds in order
    pub rounds: Vec<RoundResults>,
}

/// The full snapshot pushed to observers
pub type CompetitionResults = Vec<CategoryResults>;

/// Rank every round of every category of `competition`.
///
/// # Errors
///
/// Returns the first repository error encountered.
pub async fn competition_results(
    repo: &dyn CompetitionRepository,
    competition: CompetitionId,
) -> Result<CompetitionResults, RepositoryError> {
    let started = Instant::now();

    let names: BTreeMap<ClimberId, String> = repo
        .climbers(competition)
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut snapshot = Vec::new();
    for category in repo.categories(competition).await? {
        let mut rounds = Vec::new();
        for round in repo.rounds(category.id).await? {
            let startlist = repo.startlist(round.id).await?;
            let entries = repo.ledger(competition, LedgerFilter::round(round.id)).await?;

            let results = rank(&startlist, &entries)
                .into_iter()
                .map(|result| ResultRow {
                    name: names.get(&result.climber_id).cloned().unwrap_or_default(),
                    result,
                })
                .collect();

            rounds.push(RoundResults {
                round_id: round.id,
                label: round.label,
                order: round.order,
                completed: round.completed,
                results,
            });
        }

        snapshot.push(CategoryResults {
            category_id: category.id,
            label: category.label,
            gender: category.gender,
            age_group: category.age_group,
            rounds,
        });
    }

    ResultsMetrics::record_compute(started.elapsed());
    Ok(snapshot)
}
