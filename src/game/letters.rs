//! Weighted letter pools and the vowel/consonant letter generator
//!
//! Draws are a linear scan over the pool in letter order, so the same RNG
//! state always yields the same letter.

use super::LetterKind;
use rand::Rng;
use thiserror::Error;

/// Default vowel weights.
pub const DEFAULT_VOWEL_WEIGHTS: [(char, u32); 5] =
    [('A', 15), ('E', 21), ('I', 13), ('O', 13), ('U', 5)];

/// Default consonant weights.
pub const DEFAULT_CONSONANT_WEIGHTS: [(char, u32); 21] = [
    ('B', 2),
    ('C', 3),
    ('D', 6),
    ('F', 2),
    ('G', 3),
    ('H', 2),
    ('J', 1),
    ('K', 1),
    ('L', 5),
    ('M', 4),
    ('N', 8),
    ('P', 4),
    ('Q', 1),
    ('R', 9),
    ('S', 9),
    ('T', 9),
    ('V', 1),
    ('W', 1),
    ('X', 1),
    ('Y', 1),
    ('Z', 1),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LetterPoolError {
    #[error("letter pool total weight must be positive")]
    ZeroTotalWeight,
    #[error("'{0}' is not an ASCII letter")]
    NotALetter(char),
}

/// A mapping of letters to positive weights.
#[derive(Debug, Clone)]
pub struct WeightedLetterPool {
    /// Sorted by letter, zero weights removed
    entries: Vec<(char, u32)>,
    total: u32,
}

impl WeightedLetterPool {
    /// Build a pool. Letters are upper-cased; zero-weight entries are dropped.
    pub fn new(weights: &[(char, u32)]) -> Result<Self, LetterPoolError> {
        let mut entries = Vec::with_capacity(weights.len());
        for &(letter, weight) in weights {
            if !letter.is_ascii_alphabetic() {
                return Err(LetterPoolError::NotALetter(letter));
            }
            if weight > 0 {
                entries.push((letter.to_ascii_uppercase(), weight));
            }
        }
        entries.sort_by_key(|(letter, _)| *letter);

        let total: u32 = entries.iter().map(|(_, w)| *w).sum();
        if total == 0 {
            return Err(LetterPoolError::ZeroTotalWeight);
        }

        Ok(Self { entries, total })
    }

    /// Draw one letter according to the weights.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> char {
        let target = rng.random_range(0..self.total);
        let mut cumulative = 0;
        for &(letter, weight) in &self.entries {
            cumulative += weight;
            if cumulative > target {
                return letter;
            }
        }
        // Unreachable while total is the exact sum, kept as the documented fallback
        self.entries[self.entries.len() - 1].0
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, letter: char) -> bool {
        let upper = letter.to_ascii_uppercase();
        self.entries.iter().any(|(l, _)| *l == upper)
    }

    #[cfg(test)]
    pub fn total_weight(&self) -> u32 {
        self.total
    }

    /// Weight of a letter, 0 if absent.
    #[cfg(test)]
    pub fn weight_of(&self, letter: char) -> u32 {
        let upper = letter.to_ascii_uppercase();
        self.entries
            .iter()
            .find(|(l, _)| *l == upper)
            .map(|(_, w)| *w)
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.entries.iter().map(|(l, _)| *l)
    }
}

/// Vowel and consonant pools used to fill a letters round.
#[derive(Debug, Clone)]
pub struct LetterGenerator {
    vowels: WeightedLetterPool,
    consonants: WeightedLetterPool,
}

impl LetterGenerator {
    pub fn new(vowels: WeightedLetterPool, consonants: WeightedLetterPool) -> Self {
        Self { vowels, consonants }
    }

    /// Generator over the default frequency tables.
    pub fn standard() -> Self {
        // The default tables are non-empty with positive weights
        let vowels = WeightedLetterPool::new(&DEFAULT_VOWEL_WEIGHTS)
            .unwrap_or_else(|_| unreachable!("default vowel table is valid"));
        let consonants = WeightedLetterPool::new(&DEFAULT_CONSONANT_WEIGHTS)
            .unwrap_or_else(|_| unreachable!("default consonant table is valid"));
        Self { vowels, consonants }
    }

    pub fn pool(&self, kind: LetterKind) -> &WeightedLetterPool {
        match kind {
            LetterKind::Vowel => &self.vowels,
            LetterKind::Consonant => &self.consonants,
        }
    }

    pub fn draw<R: Rng + ?Sized>(&self, kind: LetterKind, rng: &mut R) -> char {
        self.pool(kind).draw(rng)
    }

    pub fn contains(&self, letter: char, kind: LetterKind) -> bool {
        self.pool(kind).contains(letter)
    }
}

impl Default for LetterGenerator {
    fn default() -> Self {
        Self::standard()
    }
}
