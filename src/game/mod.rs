//! Game rules: letter pools, pick constraints, word and conundrum validation,
//! the fixed match plan and the authoritative match engine

pub mod action;
pub mod conundrum;
pub mod dictionary;
pub mod engine;
pub mod letters;
pub mod picker;
pub mod plan;
pub mod validation;

use serde::{Deserialize, Serialize};

/// Stable identifier of a player (uuid string assigned at identify time)
pub type PlayerId = String;

/// Stable identifier of a match (uuid string)
pub type MatchId = String;

/// Number of letters drawn in every letters round.
pub const LETTERS_PER_ROUND: usize = 9;

/// Whether a letter comes from the vowel or the consonant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LetterKind {
    Vowel,
    Consonant,
}

impl LetterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LetterKind::Vowel => "VOWEL",
            LetterKind::Consonant => "CONSONANT",
        }
    }
}

/// The two kinds of round in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundType {
    Letters,
    Conundrum,
}

/// Seat of a participant. `A` is the first player handed over by matchmaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_other() {
        assert_eq!(Side::A.other(), Side::B);
        assert_eq!(Side::B.other(), Side::A);
    }

    #[test]
    fn test_letter_kind_wire_names() {
        assert_eq!(serde_json::to_string(&LetterKind::Vowel).unwrap(), r#""VOWEL""#);
        let kind: LetterKind = serde_json::from_str(r#""CONSONANT""#).unwrap();
        assert_eq!(kind, LetterKind::Consonant);
    }
}
