//! The attempt ledger and the rules that move it.
//!
//! A ledger entry is the record of one climber on one boulder. It changes in
//! exactly two ways:
//!
//! - **Judge taps** ([`JudgeAction`]) during live scoring, applied with
//!   [`AttemptLedgerEntry::apply`]. Taps are ignored once the top is reached.
//! - **Corrections** through an [`EditDraft`], which adjusts counters and
//!   flags freely (even after a top) and produces one complete entry on
//!   commit.
//!
//! Both paths are pure; persisting the result is the caller's job.

use crate::error::ValidationError;
use crate::types::{BoulderId, ClimberId, LedgerKey};
use serde::{Deserialize, Serialize};

/// Zone/top attempt record for one (climber, boulder)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptLedgerEntry {
    /// Climber being scored
    pub climber_id: ClimberId,
    /// Boulder being climbed
    pub boulder_id: BoulderId,
    /// Attempts taken up to and including the one that reached the zone
    #[serde(rename = "attempts_zone")]
    pub zone_attempts: u32,
    /// Attempts taken up to and including the one that reached the top
    #[serde(rename = "attempts_top")]
    pub top_attempts: u32,
    /// Zone hold reached
    pub zone_reached: bool,
    /// Top hold reached
    pub top_reached: bool,
}

/// A judge tap during live scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeAction {
    /// An attempt that gained no hold
    Attempt,
    /// An attempt that reached the zone
    Zone,
    /// An attempt that reached the top
    Top,
}

impl AttemptLedgerEntry {
    /// Entry for a climber who has not tried the boulder yet
    #[must_use]
    pub const fn fresh(key: LedgerKey) -> Self {
        Self {
            climber_id: key.climber_id,
            boulder_id: key.boulder_id,
            zone_attempts: 0,
            top_attempts: 0,
            zone_reached: false,
            top_reached: false,
        }
    }

    /// The ledger key of this entry
    #[must_use]
    pub const fn key(&self) -> LedgerKey {
        LedgerKey::new(self.climber_id, self.boulder_id)
    }

    /// Whether judge taps still change this entry
    #[must_use]
    pub const fn accepts_taps(&self) -> bool {
        !self.top_reached
    }

    /// Apply a judge tap.
    ///
    /// A completed climb is returned unchanged. Counters saturate instead of
    /// wrapping.
    #[must_use]
    pub fn apply(&self, action: JudgeAction) -> Self {
        if !self.accepts_taps() {
            return *self;
        }

        let mut next = *self;
        next.top_attempts = next.top_attempts.saturating_add(1);

        // Until the zone is banked every attempt is also a zone attempt.
        if !next.zone_reached {
            next.zone_attempts = next.zone_attempts.saturating_add(1);
            if matches!(action, JudgeAction::Zone | JudgeAction::Top) {
                next.zone_reached = true;
            }
        }

        if action == JudgeAction::Top {
            next.top_reached = true;
        }

        next
    }

    /// Check the scoring rules every stored entry must satisfy.
    ///
    /// `zone_attempts <= top_attempts` is not required here; only the
    /// correction dialog keeps that ordering.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEntry`] naming the broken rule.
    pub const fn validate(&self) -> Result<(), ValidationError> {
        if self.zone_reached && self.zone_attempts == 0 {
            return Err(ValidationError::InvalidEntry(
                "zone reached with zero zone attempts",
            ));
        }
        if self.top_reached && self.top_attempts == 0 {
            return Err(ValidationError::InvalidEntry(
                "top reached with zero top attempts",
            ));
        }
        if self.top_reached && !self.zone_reached {
            return Err(ValidationError::InvalidEntry(
                "top reached without the zone",
            ));
        }
        Ok(())
    }

    /// Per-boulder display score: a top is worth 25 and a zone 10, each
    /// minus 0.1 for every attempt after the first.
    #[must_use]
    pub fn score(&self) -> f64 {
        if self.top_reached {
            25.0 - 0.1 * f64::from(self.top_attempts.saturating_sub(1))
        } else if self.zone_reached {
            10.0 - 0.1 * f64::from(self.zone_attempts.saturating_sub(1))
        } else {
            0.0
        }
    }
}

/// An open correction of one ledger entry
///
/// Intermediate states are never persisted; only [`EditDraft::commit`]
/// yields an entry to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    original: AttemptLedgerEntry,
    current: AttemptLedgerEntry,
}

impl EditDraft {
    /// Start correcting `entry`
    #[must_use]
    pub const fn begin(entry: AttemptLedgerEntry) -> Self {
        Self {
            original: entry,
            current: entry,
        }
    }

    /// The entry as it stands in the dialog
    #[must_use]
    pub const fn entry(&self) -> &AttemptLedgerEntry {
        &self.current
    }

    /// The entry the correction started from
    #[must_use]
    pub const fn original(&self) -> &AttemptLedgerEntry {
        &self.original
    }

    /// Whether the draft differs from where it started
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.original != self.current
    }

    const fn min_zone(&self) -> u32 {
        if self.current.zone_reached { 1 } else { 0 }
    }

    const fn min_top(&self) -> u32 {
        if self.current.zone_reached || self.current.top_reached {
            1
        } else {
            0
        }
    }

    /// Change the zone counter by `delta`.
    ///
    /// The result is floored at the minimum the flags require and clamped
    /// to the top counter.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CounterOverflow`] if the counter would
    /// leave the `u32` range.
    pub fn adjust_zone(&mut self, delta: i64) -> Result<(), ValidationError> {
        let zone = offset(self.current.zone_attempts, delta)?.max(self.min_zone());
        self.current.zone_attempts = zone.min(self.current.top_attempts);
        Ok(())
    }

    /// Change the top counter by `delta`.
    ///
    /// Lowering the top below the zone lowers the zone with it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CounterOverflow`] if the counter would
    /// leave the `u32` range.
    pub fn adjust_top(&mut self, delta: i64) -> Result<(), ValidationError> {
        let top = offset(self.current.top_attempts, delta)?.max(self.min_top());
        self.current.top_attempts = top;
        self.current.zone_attempts = self.current.zone_attempts.min(top);
        Ok(())
    }

    /// Set or clear the zone flag.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZoneRequiredByTop`] when clearing the zone
    /// of a topped boulder.
    pub fn set_zone_reached(&mut self, reached: bool) -> Result<(), ValidationError> {
        if reached {
            self.current.zone_reached = true;
            self.current.zone_attempts = self.current.zone_attempts.max(1);
            self.current.top_attempts = self.current.top_attempts.max(self.current.zone_attempts);
        } else {
            if self.current.top_reached {
                return Err(ValidationError::ZoneRequiredByTop);
            }
            self.current.zone_reached = false;
        }
        Ok(())
    }

    /// Set or clear the top flag. Setting it also banks the zone.
    pub fn set_top_reached(&mut self, reached: bool) {
        if reached {
            self.current.top_reached = true;
            self.current.zone_reached = true;
            self.current.zone_attempts = self.current.zone_attempts.max(1);
            self.current.top_attempts = self.current.top_attempts.max(self.current.zone_attempts);
        } else {
            self.current.top_reached = false;
        }
    }

    /// Finish the correction, yielding the entry to persist.
    ///
    /// # Errors
    ///
    /// Returns the rule the draft breaks, if any.
    pub fn commit(self) -> Result<AttemptLedgerEntry, ValidationError> {
        self.current.validate()?;
        Ok(self.current)
    }
}

fn offset(value: u32, delta: i64) -> Result<u32, ValidationError> {
    let shifted = i64::from(value)
        .checked_add(delta)
        .ok_or(ValidationError::CounterOverflow)?;
    u32::try_from(shifted.max(0)).map_err(|_| ValidationError::CounterOverflow)
}
