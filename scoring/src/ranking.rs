//! Ranking of climbers within a round.
//!
//! [`rank`] is the only place ordering is decided; result display,
//! advancement and live pushes all go through it.

use crate::ledger::AttemptLedgerEntry;
use crate::types::{ClimberId, StartlistEntry};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// One climber's standing in a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// Ranked climber
    pub climber_id: ClimberId,
    /// Dense rank; equal performances share a rank
    pub rank: u32,
    /// Boulders topped
    pub tops: u32,
    /// Sum of top attempts over all boulders
    pub top_attempts: u32,
    /// Boulders with the zone reached
    pub zones: u32,
    /// Sum of zone attempts over all boulders
    pub zone_attempts: u32,
    /// Display score rounded to one decimal; never used for ordering
    pub total_score: f64,
    /// Start order in the round, the final tie-break
    pub start_order: u32,
}

impl RankedResult {
    /// The performance tuple that decides shared ranks
    const fn performance(&self) -> (Reverse<u32>, Reverse<u32>, u32, u32) {
        (
            Reverse(self.tops),
            Reverse(self.zones),
            self.top_attempts,
            self.zone_attempts,
        )
    }
}

/// Rank the climbers of one round.
///
/// `startlist` names the climbers and their start order; `entries` are the
/// ledger rows for the round's boulders. Climbers without rows rank with
/// zero tops and zones. Rows for climbers missing from the start list, such
/// as climbers removed after they were scored, are left out.
///
/// Ordering: tops ↓, zones ↓, top attempts ↑, zone attempts ↑, start order ↑.
/// Ranks are dense and only the first four keys decide them.
#[must_use]
pub fn rank(startlist: &[StartlistEntry], entries: &[AttemptLedgerEntry]) -> Vec<RankedResult> {
    let mut totals: BTreeMap<ClimberId, RankedResult> = startlist
        .iter()
        .map(|slot| (slot.climber_id, blank(slot.climber_id, slot.start_order)))
        .collect();
    let mut scores: BTreeMap<ClimberId, f64> = BTreeMap::new();

    for entry in entries {
        let Some(total) = totals.get_mut(&entry.climber_id) else {
            continue;
        };

        total.tops += u32::from(entry.top_reached);
        total.zones += u32::from(entry.zone_reached);
        total.top_attempts = total.top_attempts.saturating_add(entry.top_attempts);
        total.zone_attempts = total.zone_attempts.saturating_add(entry.zone_attempts);
        *scores.entry(entry.climber_id).or_default() += entry.score();
    }

    let mut ranked: Vec<RankedResult> = totals
        .into_values()
        .map(|mut result| {
            let score = scores.get(&result.climber_id).copied().unwrap_or_default();
            result.total_score = (score * 10.0).round() / 10.0;
            result
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.performance()
            .cmp(&b.performance())
            .then(a.start_order.cmp(&b.start_order))
            .then_with(|| a.climber_id.cmp(&b.climber_id))
    });

    let mut current = 0;
    let mut previous: Option<(Reverse<u32>, Reverse<u32>, u32, u32)> = None;
    for result in &mut ranked {
        let performance = result.performance();
        if previous != Some(performance) {
            current += 1;
            previous = Some(performance);
        }
        result.rank = current;
    }

    ranked
}

const fn blank(climber_id: ClimberId, start_order: u32) -> RankedResult {
    RankedResult {
        climber_id,
        rank: 0,
        tops: 0,
        top_attempts: 0,
        zones: 0,
        zone_attempts: 0,
        total_score: 0.0,
        start_order,
    }
}
