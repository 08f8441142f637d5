//! Pick constraints for letters rounds
//!
//! Before every pick the picker may only choose a kind that still leaves
//! enough slots to end the round with at least one vowel and one consonant.

use super::{LetterKind, LETTERS_PER_ROUND};
use std::collections::BTreeSet;

/// Kinds the picker may choose next.
///
/// `picks_so_far` is the number of letters already in the bag.
pub fn allowed_kinds(
    picks_so_far: usize,
    vowel_count: usize,
    consonant_count: usize,
    target_slots: usize,
) -> BTreeSet<LetterKind> {
    let mut allowed = BTreeSet::new();
    if picks_so_far >= target_slots {
        return allowed;
    }
    let remaining = target_slots - picks_so_far;

    for kind in [LetterKind::Vowel, LetterKind::Consonant] {
        let (vowels, consonants) = match kind {
            LetterKind::Vowel => (vowel_count + 1, consonant_count),
            LetterKind::Consonant => (vowel_count, consonant_count + 1),
        };
        let needed_vowels = 1usize.saturating_sub(vowels);
        let needed_consonants = 1usize.saturating_sub(consonants);
        if needed_vowels + needed_consonants <= remaining - 1 {
            allowed.insert(kind);
        }
    }

    allowed
}

/// Convenience over a bag of already-classified picks, target of nine.
pub fn allowed_kinds_for(picks: &[LetterKind]) -> BTreeSet<LetterKind> {
    let vowels = picks.iter().filter(|k| **k == LetterKind::Vowel).count();
    let consonants = picks.len() - vowels;
    allowed_kinds(picks.len(), vowels, consonants, LETTERS_PER_ROUND)
}

pub fn is_allowed(picks: &[LetterKind], kind: LetterKind) -> bool {
    allowed_kinds_for(picks).contains(&kind)
}
