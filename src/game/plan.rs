//! The fixed five-round match plan

use super::{RoundType, Side};
use serde::{Deserialize, Serialize};

/// Rounds in every match.
pub const ROUNDS_PER_MATCH: u32 = 5;

/// Number of letters rounds before the conundrum.
pub const LETTERS_ROUNDS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundPlan {
    pub round_number: u32,
    pub round_type: RoundType,
    /// `None` for the conundrum
    pub picker: Option<Side>,
}

/// Ordered, immutable list of rounds for one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlan {
    rounds: Vec<RoundPlan>,
}

impl MatchPlan {
    /// Four letters rounds alternating picker from `starting_picker`, then the conundrum.
    pub fn standard(starting_picker: Side) -> Self {
        let mut rounds = Vec::with_capacity(ROUNDS_PER_MATCH as usize);
        let mut picker = starting_picker;
        for round_number in 1..=LETTERS_ROUNDS {
            rounds.push(RoundPlan {
                round_number,
                round_type: RoundType::Letters,
                picker: Some(picker),
            });
            picker = picker.other();
        }
        rounds.push(RoundPlan {
            round_number: ROUNDS_PER_MATCH,
            round_type: RoundType::Conundrum,
            picker: None,
        });
        Self { rounds }
    }

    pub fn rounds(&self) -> &[RoundPlan] {
        &self.rounds
    }

    pub fn round(&self, round_number: u32) -> Option<&RoundPlan> {
        self.rounds.iter().find(|r| r.round_number == round_number)
    }

    /// The round after `after_round_number`, or `None` once the plan is exhausted.
    pub fn next_round(&self, after_round_number: u32) -> Option<&RoundPlan> {
        self.round(after_round_number.checked_add(1)?)
    }

    pub fn first(&self) -> &RoundPlan {
        &self.rounds[0]
    }
}
