use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use rand::seq::IteratorRandom;

pub const PATTERN_ABSENT: char = '0';
pub const PATTERN_PRESENT: char = '1';
pub const PATTERN_CORRECT: char = '2';

/// True when every position of the pattern is a hit.
pub fn is_all_correct(pattern: &str) -> bool {
    !pattern.is_empty() && pattern.chars().all(|c| c == PATTERN_CORRECT)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluateError {
    #[error("word not allowed: {word}")]
    WordNotAllowed { word: String },
    #[error("evaluator backend failure: {message}")]
    Backend { message: String },
}

/// The external word oracle. Supplies target words and judges guesses; the
/// engine never computes a pattern itself, so clients and server stay in
/// lockstep. Calls may block on I/O (a word-list lookup, a remote service)
/// and are the only blocking work allowed inside a room's critical section.
#[async_trait]
pub trait GuessEvaluator: Send + Sync {
    /// The next target word, or `None` once the supply is exhausted.
    async fn next_word(&self) -> Result<Option<String>, EvaluateError>;

    /// Pattern for `guess` against `target`, one digit per position.
    /// Unrecognized candidates are rejected with `WordNotAllowed`, never
    /// retried.
    async fn evaluate(&self, guess: &str, target: &str) -> Result<String, EvaluateError>;
}

/// Evaluator backed by a plain word list, one word per line. Lines starting
/// with '#' and blank lines are skipped; only 5-8 letter words are kept.
pub struct WordListEvaluator {
    words: HashSet<String>,
}

impl WordListEvaluator {
    pub fn from_word_list(word_list: &str) -> Self {
        let words = word_list
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .map(|word| word.trim().to_lowercase())
            .filter(|word| word.len() >= 5 && word.len() <= 8)
            .collect();

        Self { words }
    }

    /// Load from a newline-separated word file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading word list {}", path.as_ref().display()))?;
        Ok(Self::from_word_list(&contents))
    }

    /// Small fixed vocabulary for deterministic tests.
    pub fn with_test_words() -> Self {
        let list = [
            "about", "above", "after", "again", "beach", "black", "brown", "chair", "close",
            "crane", "early", "house", "place", "right", "round", "today", "which", "world",
            "wrong",
        ];
        Self::from_word_list(&list.join("\n"))
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    fn is_known(&self, word: &str) -> bool {
        word.chars().all(|c| c.is_alphabetic()) && self.words.contains(word)
    }
}

#[async_trait]
impl GuessEvaluator for WordListEvaluator {
    async fn next_word(&self) -> Result<Option<String>, EvaluateError> {
        let mut rng = rand::thread_rng();
        Ok(self.words.iter().choose(&mut rng).cloned())
    }

    async fn evaluate(&self, guess: &str, target: &str) -> Result<String, EvaluateError> {
        let guess = guess.trim().to_lowercase();
        if !self.is_known(&guess) {
            return Err(EvaluateError::WordNotAllowed {
                word: guess.to_string(),
            });
        }
        Ok(compute_pattern(&guess, &target.trim().to_lowercase()))
    }
}

/// Two-pass pattern computation. Correct positions are claimed first so a
/// duplicated letter is never reported present more often than it occurs
/// in the target.
pub fn compute_pattern(guess: &str, target: &str) -> String {
    let guess_chars: Vec<char> = guess.chars().collect();
    let target_chars: Vec<char> = target.chars().collect();

    let mut remaining = std::collections::HashMap::new();
    for &ch in &target_chars {
        *remaining.entry(ch).or_insert(0u32) += 1;
    }

    let mut pattern = vec![PATTERN_ABSENT; guess_chars.len()];

    // First pass: exact hits
    for (i, &ch) in guess_chars.iter().enumerate() {
        if target_chars.get(i) == Some(&ch) {
            pattern[i] = PATTERN_CORRECT;
            if let Some(count) = remaining.get_mut(&ch) {
                *count -= 1;
            }
        }
    }

    // Second pass: misplaced letters, bounded by what's left in the target
    for (i, &ch) in guess_chars.iter().enumerate() {
        if pattern[i] == PATTERN_CORRECT {
            continue;
        }
        if let Some(count) = remaining.get_mut(&ch) {
            if *count > 0 {
                pattern[i] = PATTERN_PRESENT;
                *count -= 1;
            }
        }
    }

    pattern.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_exact_match() {
        assert_eq!(compute_pattern("crane", "crane"), "22222");
        assert!(is_all_correct("22222"));
    }

    #[test]
    fn test_pattern_no_match() {
        assert_eq!(compute_pattern("pivot", "musky"), "00000");
        assert!(!is_all_correct("00000"));
    }

    #[test]
    fn test_pattern_mixed() {
        // target "hello": w absent, o present, r absent, l correct, d absent
        assert_eq!(compute_pattern("world", "hello"), "01020");
    }

    #[test]
    fn test_pattern_duplicate_letters_bounded_by_target() {
        // "llama" vs "hello": the first 'l' is misplaced, the second claims
        // the remaining 'l', the rest miss entirely
        assert_eq!(compute_pattern("llama", "hello"), "11000");

        // "lllll" vs "hello": only positions 2 and 3 are exact; no 'l'
        // budget is left for the others
        assert_eq!(compute_pattern("lllll", "hello"), "00220");
    }

    #[test]
    fn test_word_list_parsing() {
        let list = "# comment\ncrane\n\n   spaced  \nab\ntoolongword";
        let evaluator = WordListEvaluator::from_word_list(list);
        assert_eq!(evaluator.word_count(), 2); // crane, spaced
    }

    #[tokio::test]
    async fn test_evaluate_rejects_unknown_words() {
        let evaluator = WordListEvaluator::with_test_words();
        let result = evaluator.evaluate("zzzzz", "crane").await;
        assert_eq!(
            result,
            Err(EvaluateError::WordNotAllowed {
                word: "zzzzz".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_evaluate_is_case_insensitive() {
        let evaluator = WordListEvaluator::with_test_words();
        let pattern = evaluator.evaluate("CRANE", "crane").await.unwrap();
        assert_eq!(pattern, "22222");
    }

    #[tokio::test]
    async fn test_next_word_comes_from_the_list() {
        let evaluator = WordListEvaluator::with_test_words();
        for _ in 0..10 {
            let word = evaluator.next_word().await.unwrap().unwrap();
            assert!(evaluator.is_known(&word));
        }
    }

    #[tokio::test]
    async fn test_empty_list_exhausts_immediately() {
        let evaluator = WordListEvaluator::from_word_list("");
        assert_eq!(evaluator.next_word().await.unwrap(), None);
    }
}
