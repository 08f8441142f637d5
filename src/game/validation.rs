//! Word and conundrum validation
//!
//! Checks a submission in a fixed order and stops at the first failure:
//! 1. Non-empty after normalization
//! 2. Alphabetic characters only
//! 3. Present in the dictionary
//! 4. Buildable from the round's letters (with multiplicity)

use super::dictionary::DictionaryProvider;
use super::LETTERS_PER_ROUND;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Score for a word that uses every letter of the bag.
pub const FULL_BAG_SCORE: u32 = 12;

/// Why a submission was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Empty,
    NonAlphabetical,
    NotInDictionary,
    NotConstructable,
}

impl FailureKind {
    /// Short label for result screens.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Empty => "No word",
            FailureKind::NonAlphabetical => "Letters only",
            FailureKind::NotInDictionary => "Not in dictionary",
            FailureKind::NotConstructable => "Not in the letters",
        }
    }
}

/// Verdict for one submitted word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordValidationResult {
    pub normalized_word: String,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_kind: Option<FailureKind>,
    pub score: u32,
}

impl WordValidationResult {
    fn failed(normalized_word: String, kind: FailureKind) -> Self {
        Self {
            normalized_word,
            is_valid: false,
            failure_kind: Some(kind),
            score: 0,
        }
    }

    fn valid(normalized_word: String) -> Self {
        let score = score_for_length(normalized_word.chars().count());
        Self {
            normalized_word,
            is_valid: true,
            failure_kind: None,
            score,
        }
    }
}

/// Trim and case-fold raw input.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// True when every character is an ASCII letter. Empty input is not alphabetic.
pub fn is_alphabetic(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_alphabetic())
}

/// Case-insensitive multiset containment: can `word` be spelled from `letters`?
pub fn can_construct(word: &str, letters: impl IntoIterator<Item = char>) -> bool {
    if word.is_empty() {
        return false;
    }

    let mut available: HashMap<char, usize> = HashMap::new();
    for letter in letters {
        *available.entry(letter.to_ascii_lowercase()).or_insert(0) += 1;
    }

    for c in word.chars() {
        match available.get_mut(&c.to_ascii_lowercase()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => return false,
        }
    }
    true
}

/// Length score with the full-bag bonus.
pub fn score_for_length(len: usize) -> u32 {
    if len == LETTERS_PER_ROUND {
        FULL_BAG_SCORE
    } else {
        len as u32
    }
}

/// Validates letters-round submissions against a dictionary.
#[derive(Clone)]
pub struct WordValidator {
    dictionary: Arc<dyn DictionaryProvider>,
}

impl WordValidator {
    pub fn new(dictionary: Arc<dyn DictionaryProvider>) -> Self {
        Self { dictionary }
    }

    pub fn validate(&self, raw: &str, letters: &[char]) -> WordValidationResult {
        let word = normalize(raw);

        if word.is_empty() {
            return WordValidationResult::failed(word, FailureKind::Empty);
        }
        if !is_alphabetic(&word) {
            return WordValidationResult::failed(word, FailureKind::NonAlphabetical);
        }
        if !self.dictionary.contains(&word) {
            return WordValidationResult::failed(word, FailureKind::NotInDictionary);
        }
        if !can_construct(&word, letters.iter().copied()) {
            return WordValidationResult::failed(word, FailureKind::NotConstructable);
        }

        WordValidationResult::valid(word)
    }

    /// Verdict for a player who never submitted.
    pub fn missing() -> WordValidationResult {
        WordValidationResult::failed(String::new(), FailureKind::Empty)
    }
}

/// Exact-match check for conundrum guesses.
pub struct ConundrumValidator;

impl ConundrumValidator {
    pub fn is_correct(guess: &str, answer: &str) -> bool {
        let guess = normalize(guess);
        !guess.is_empty() && guess == normalize(answer)
    }
}
