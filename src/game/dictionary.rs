//! Dictionary lookup for word validation
//!
//! Ships a compact embedded word list; a larger list can be loaded from a
//! file at startup. Lookups expect a normalized (lowercase) word.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::io;
use std::path::Path;

/// Embedded wordlist: lowercase, alphabetic only, one per line
static WORDS_DATA: &str = include_str!("../../data/words.txt");

static EMBEDDED_WORDS: Lazy<WordListDictionary> =
    Lazy::new(|| WordListDictionary::from_lines(WORDS_DATA.lines()));

/// Dictionary collaborator consulted by the word validator.
pub trait DictionaryProvider: Send + Sync {
    /// `normalized_word` is already trimmed and lowercased.
    fn contains(&self, normalized_word: &str) -> bool;
}

/// In-memory word list with O(1) lookup.
#[derive(Debug, Clone, Default)]
pub struct WordListDictionary {
    words: HashSet<String>,
}

impl WordListDictionary {
    /// Build from lines; blank and non-alphabetic lines are skipped.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let words = lines
            .into_iter()
            .map(|line| line.trim().to_lowercase())
            .filter(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_alphabetic()))
            .collect();
        Self { words }
    }

    /// Load a newline separated word list from disk.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(Self::from_lines(data.lines()))
    }

    /// The embedded list, parsed once per process.
    pub fn embedded() -> &'static WordListDictionary {
        &EMBEDDED_WORDS
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// All words of exactly `len` letters, sorted for deterministic selection.
    pub fn words_of_length(&self, len: usize) -> Vec<String> {
        let mut words: Vec<String> = self
            .words
            .iter()
            .filter(|w| w.len() == len)
            .cloned()
            .collect();
        words.sort();
        words
    }
}

impl DictionaryProvider for WordListDictionary {
    fn contains(&self, normalized_word: &str) -> bool {
        self.words.contains(normalized_word)
    }
}
