//! Conundrum supply: a scrambled nine-letter word and its answer

use super::dictionary::WordListDictionary;
use super::LETTERS_PER_ROUND;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Attempts at producing a scramble that differs from the answer.
const MAX_SCRAMBLE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conundrum {
    /// Letters shown to both players, uppercase
    pub scrambled: String,
    /// Uppercase answer, revealed once the round closes
    pub answer: String,
}

/// Source of conundrums for the final round.
pub trait ConundrumProvider: Send + Sync {
    fn random_conundrum(&self, rng: &mut dyn RngCore) -> Option<Conundrum>;
}

/// Shuffle the letters of `answer` with the supplied RNG.
///
/// Retries a few times so the scramble rarely equals the answer; words
/// made of a single repeated letter are returned as-is.
pub fn scramble(answer: &str, rng: &mut dyn RngCore) -> String {
    let upper = answer.to_uppercase();
    let mut letters: Vec<char> = upper.chars().collect();
    for _ in 0..MAX_SCRAMBLE_ATTEMPTS {
        letters.shuffle(&mut *rng);
        let candidate: String = letters.iter().collect();
        if candidate != upper {
            return candidate;
        }
    }
    letters.iter().collect()
}

/// Draws answers from the nine-letter words of a dictionary.
#[derive(Debug, Clone)]
pub struct DictionaryConundrums {
    answers: Vec<String>,
}

impl DictionaryConundrums {
    pub fn from_dictionary(dictionary: &WordListDictionary) -> Self {
        Self {
            answers: dictionary.words_of_length(LETTERS_PER_ROUND),
        }
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

impl ConundrumProvider for DictionaryConundrums {
    fn random_conundrum(&self, rng: &mut dyn RngCore) -> Option<Conundrum> {
        if self.answers.is_empty() {
            return None;
        }
        let answer = &self.answers[rng.random_range(0..self.answers.len())];
        Some(Conundrum {
            scrambled: scramble(answer, rng),
            answer: answer.to_uppercase(),
        })
    }
}

/// A fixed list of scramble/answer pairs, served in random order.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct FixedConundrums {
    pairs: Vec<Conundrum>,
}

#[cfg(test)]
impl FixedConundrums {
    pub fn new(pairs: Vec<Conundrum>) -> Self {
        Self { pairs }
    }
}

#[cfg(test)]
impl ConundrumProvider for FixedConundrums {
    fn random_conundrum(&self, rng: &mut dyn RngCore) -> Option<Conundrum> {
        if self.pairs.is_empty() {
            return None;
        }
        Some(self.pairs[rng.random_range(0..self.pairs.len())].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sorted(s: &str) -> Vec<char> {
        let mut chars: Vec<char> = s.chars().collect();
        chars.sort();
        chars
    }

    #[test]
    fn test_scramble_is_permutation() {
        let mut rng = StdRng::seed_from_u64(3);
        let scrambled = scramble("countdown", &mut rng);
        assert_eq!(sorted(&scrambled), sorted("COUNTDOWN"));
        assert_ne!(scrambled, "COUNTDOWN");
    }

    #[test]
    fn test_scramble_repeated_letter() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(scramble("aaa", &mut rng), "AAA");
    }

    #[test]
    fn test_dictionary_conundrums_are_nine_letters() {
        let provider = DictionaryConundrums::from_dictionary(WordListDictionary::embedded());
        assert!(!provider.is_empty());
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let c = provider.random_conundrum(&mut rng).unwrap();
            assert_eq!(c.answer.len(), LETTERS_PER_ROUND);
            assert_eq!(sorted(&c.scrambled), sorted(&c.answer));
            assert!(WordListDictionary::embedded()
                .words_of_length(9)
                .contains(&c.answer.to_lowercase()));
        }
    }

    #[test]
    fn test_seeded_provider_is_deterministic() {
        let provider = DictionaryConundrums::from_dictionary(WordListDictionary::embedded());
        let a = provider.random_conundrum(&mut StdRng::seed_from_u64(5));
        let b = provider.random_conundrum(&mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_providers_return_none() {
        let mut rng = StdRng::seed_from_u64(1);
        let empty = DictionaryConundrums::from_dictionary(&WordListDictionary::default());
        assert!(empty.random_conundrum(&mut rng).is_none());
        assert!(FixedConundrums::default().random_conundrum(&mut rng).is_none());
    }
}
