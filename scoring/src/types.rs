//! Competition data model.
//!
//! Identifiers are UUID newtypes so a climber id can never be passed where a
//! boulder id is expected. Everything here is plain data; behaviour lives in
//! the ledger, ranking and advancement modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(
    /// Competition identifier
    CompetitionId
);
id_type!(
    /// Category identifier
    CategoryId
);
id_type!(
    /// Round identifier
    RoundId
);
id_type!(
    /// Boulder identifier
    BoulderId
);
id_type!(
    /// Climber identifier
    ClimberId
);

/// Gender category a climber competes in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Women's category
    Female,
    /// Men's category
    Male,
    /// Open / mixed category
    Open,
}

/// A registered climber. Immutable once registered for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Climber {
    /// Climber identity
    pub id: ClimberId,
    /// Display name
    pub name: String,
    /// Gender category
    pub gender: Gender,
    /// Age category label (e.g. "U16", "Open")
    pub age_group: String,
}

/// A boulder problem within a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boulder {
    /// Boulder identity
    pub id: BoulderId,
    /// Ordinal number within the round, starting at 1
    pub number: u32,
}

/// One stage of a category (qualification, semifinal, final)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round identity
    pub id: RoundId,
    /// Owning category
    pub category_id: CategoryId,
    /// Ordinal order within the category, starting at 1
    pub order: u32,
    /// Display label (e.g. "Qualification")
    pub label: String,
    /// Boulders in the order they are climbed
    pub boulders: Vec<Boulder>,
    /// Number of climbers promoted to the next round
    pub advance_count: u32,
    /// Set once advancement out of this round has succeeded
    #[serde(default)]
    pub completed: bool,
}

impl Round {
    /// Whether `boulder` belongs to this round
    #[must_use]
    pub fn has_boulder(&self, boulder: BoulderId) -> bool {
        self.boulders.iter().any(|b| b.id == boulder)
    }
}

/// A gender/age-group category of a competition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category identity
    pub id: CategoryId,
    /// Owning competition
    pub competition_id: CompetitionId,
    /// Gender of the category
    pub gender: Gender,
    /// Age group of the category
    pub age_group: String,
    /// Display label, unique within the competition
    pub label: String,
}

/// A climber's slot in a round's start list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartlistEntry {
    /// Round the climber is registered for
    pub round_id: RoundId,
    /// Registered climber
    pub climber_id: ClimberId,
    /// Position in the round, unique and dense from 1
    pub start_order: u32,
}

/// Key of an attempt ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    /// Climber being scored
    pub climber_id: ClimberId,
    /// Boulder being climbed
    pub boulder_id: BoulderId,
}

impl LedgerKey {
    /// Build a key from its parts
    #[must_use]
    pub const fn new(climber_id: ClimberId, boulder_id: BoulderId) -> Self {
        Self {
            climber_id,
            boulder_id,
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.climber_id, self.boulder_id)
    }
}

/// Filter for attempt ledger queries. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerFilter {
    /// Only boulders of this round
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundId>,
    /// Only this boulder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boulder: Option<BoulderId>,
    /// Only this climber
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climber: Option<ClimberId>,
    /// Only rounds of this category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,
}

impl LedgerFilter {
    /// Filter matching every boulder of `round`
    #[must_use]
    pub const fn round(round: RoundId) -> Self {
        Self {
            round: Some(round),
            boulder: None,
            climber: None,
            category: None,
        }
    }
}

/// Identifies a start list by its human-facing labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartlistQuery {
    /// Competition owning the category
    pub competition_id: CompetitionId,
    /// Category label
    pub category: String,
    /// Round label within the category
    pub round: String,
}
