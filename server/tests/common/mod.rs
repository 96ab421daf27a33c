//! Shared fixture: one category with a two-boulder qualification and a final.

#![allow(dead_code)] // Each test binary uses a different subset

use std::sync::Arc;
use topout_scoring::{
    Boulder, BoulderId, Category, CategoryId, Climber, ClimberId, CompetitionId, Fixture, Gender,
    InMemoryRepository, Round, RoundId, StartlistEntry,
};
use topout_server::{AppState, ResultsHub};

pub struct Competition {
    pub id: CompetitionId,
    pub qualification: RoundId,
    pub final_round: RoundId,
    pub boulders: [BoulderId; 2],
    /// Alex, Blair, Casey in start order
    pub climbers: [ClimberId; 3],
    pub fixture: Fixture,
}

impl Competition {
    pub fn new() -> Self {
        let id = CompetitionId::new();
        let category = Category {
            id: CategoryId::new(),
            competition_id: id,
            gender: Gender::Male,
            age_group: "Open".into(),
            label: "Men".into(),
        };
        let boulders = [BoulderId::new(), BoulderId::new()];
        let qualification = Round {
            id: RoundId::new(),
            category_id: category.id,
            order: 1,
            label: "Qualification".into(),
            boulders: vec![
                Boulder {
                    id: boulders[0],
                    number: 1,
                },
                Boulder {
                    id: boulders[1],
                    number: 2,
                },
            ],
            advance_count: 2,
            completed: false,
        };
        let final_round = Round {
            id: RoundId::new(),
            category_id: category.id,
            order: 2,
            label: "Final".into(),
            boulders: vec![Boulder {
                id: BoulderId::new(),
                number: 1,
            }],
            advance_count: 0,
            completed: false,
        };
        let people: Vec<Climber> = ["Alex", "Blair", "Casey"]
            .into_iter()
            .map(|name| Climber {
                id: ClimberId::new(),
                name: name.into(),
                gender: Gender::Male,
                age_group: "Open".into(),
            })
            .collect();
        let startlist = people
            .iter()
            .zip(1..)
            .map(|(c, start_order)| StartlistEntry {
                round_id: qualification.id,
                climber_id: c.id,
                start_order,
            })
            .collect();

        Self {
            id,
            qualification: qualification.id,
            final_round: final_round.id,
            boulders,
            climbers: [people[0].id, people[1].id, people[2].id],
            fixture: Fixture {
                competition_id: id,
                categories: vec![category],
                rounds: vec![qualification, final_round],
                climbers: people,
                startlist,
                ledger: Vec::new(),
            },
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            Arc::new(InMemoryRepository::from_fixture(self.fixture.clone())),
            ResultsHub::new(16),
        )
    }
}
