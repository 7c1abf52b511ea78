//! Fuzzy utterance matching against the command registry.
//!
//! Scores are integers in `0..=100`. The weighted scorer combines a plain
//! edit-based ratio with partial (best substring window) and token-based
//! ratios so that extra words around a trigger phrase and reordered words
//! still score highly.

use log::debug;
use std::collections::BTreeSet;

use crate::commands::CommandRegistry;

/// Default confidence a command match must exceed.
pub const DEFAULT_THRESHOLD: u8 = 75;

/// Length ratio at which the scorer starts comparing substrings.
const PARTIAL_LENGTH_RATIO: f64 = 1.5;

/// Length ratio at which substring scores are discounted more heavily.
const LONG_LENGTH_RATIO: f64 = 8.0;

const PARTIAL_SCALE: f64 = 0.9;
const LONG_PARTIAL_SCALE: f64 = 0.6;
const TOKEN_SCALE: f64 = 0.95;

/// Longest utterance prefix, in characters, handed to the scorer.
pub const MAX_UTTERANCE_CHARS: usize = 200;

/// Best registry phrase for an utterance and its score.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchResult {
    pub phrase: String,
    pub score: u8,
}

/// Matches utterances against a registry with a fixed confidence threshold.
pub struct FuzzyMatcher<'r> {
    registry: &'r CommandRegistry,
    threshold: u8,
}

impl<'r> FuzzyMatcher<'r> {
    /// # Arguments
    /// * `registry` - Phrases to score against.
    /// * `threshold` - Exclusive minimum score for [`best_match`](Self::best_match).
    pub fn new(registry: &'r CommandRegistry, threshold: u8) -> Self {
        Self {
            registry,
            threshold,
        }
    }

    /// Returns the best-scoring phrase when its score exceeds the threshold.
    ///
    /// # Details
    /// Ties on the maximum score resolve to the lexicographically smallest
    /// phrase, since the registry iterates in phrase order and only a strictly
    /// higher score replaces the current best.
    pub fn best_match(&self, utterance: &str) -> Option<MatchResult> {
        let candidate = self.best_candidate(utterance)?;
        if candidate.score > self.threshold {
            debug!(
                "event=command_match status=hit phrase=\"{}\" score={}",
                candidate.phrase, candidate.score
            );
            Some(candidate)
        } else {
            debug!(
                "event=command_match status=miss best=\"{}\" score={} threshold={}",
                candidate.phrase, candidate.score, self.threshold
            );
            None
        }
    }

    /// Highest-scoring phrase regardless of the threshold.
    ///
    /// # Details
    /// Only the first [`MAX_UTTERANCE_CHARS`] characters are scored, which
    /// bounds the window scan for runaway transcriptions.
    pub fn best_candidate(&self, utterance: &str) -> Option<MatchResult> {
        let utterance = capped(utterance);
        let mut best: Option<MatchResult> = None;
        for (phrase, _) in self.registry.iter() {
            let score = weighted_ratio(utterance, phrase);
            if best.as_ref().map_or(true, |current| score > current.score) {
                best = Some(MatchResult {
                    phrase: phrase.to_string(),
                    score,
                });
            }
        }
        best
    }
}

/// Lowercases and collapses runs of whitespace to single spaces.
///
/// # Arguments
/// * `text` - Raw transcription.
///
/// # Returns
/// The normalized form every stage downstream of speech input expects.
pub fn normalize_utterance(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capped(utterance: &str) -> &str {
    match utterance.char_indices().nth(MAX_UTTERANCE_CHARS) {
        Some((end, _)) => &utterance[..end],
        None => utterance,
    }
}

/// Lowercases, replaces punctuation with spaces, and collapses whitespace.
fn process(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalize_utterance(&cleaned)
}

fn chars(text: &str) -> Vec<char> {
    text.chars().collect()
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Similarity in `0.0..=1.0`: matched characters over total characters.
fn similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(a, b) as f64 / total as f64
}

fn to_score(value: f64) -> u8 {
    (value * 100.0).round().clamp(0.0, 100.0) as u8
}

fn plain_ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    to_score(similarity(&chars(a), &chars(b)))
}

fn plain_partial_ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (a, b) = (chars(a), chars(b));
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        let value = similarity(&short, window);
        if value > best {
            best = value;
            if value >= 1.0 {
                break;
            }
        }
    }
    to_score(best)
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn token_set_with(a: &str, b: &str, scorer: fn(&str, &str) -> u8) -> u8 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    let join = |tokens: Vec<&str>| tokens.join(" ");
    let shared = join(set_a.intersection(&set_b).copied().collect());
    let only_a = join(set_a.difference(&set_b).copied().collect());
    let only_b = join(set_b.difference(&set_a).copied().collect());
    let combined_a = format!("{shared} {only_a}").trim().to_string();
    let combined_b = format!("{shared} {only_b}").trim().to_string();
    scorer(&shared, &combined_a)
        .max(scorer(&shared, &combined_b))
        .max(scorer(&combined_a, &combined_b))
}

/// Best similarity of the shorter string against any equal-length window of the longer.
///
/// # Arguments
/// * `a`, `b` - Raw strings; both are lowercased and stripped of punctuation first.
///
/// # Returns
/// A score in `0..=100`, or 0 when either side is blank.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    plain_partial_ratio(&process(a), &process(b))
}

/// Combined case-insensitive, order-tolerant score used for command matching.
///
/// # Details
/// Strings of similar length are compared whole and by sorted or de-duplicated
/// words. Once one side is at least 1.5 times longer, substring windows are
/// scored instead and discounted, more heavily past a length ratio of 8.
pub fn weighted_ratio(a: &str, b: &str) -> u8 {
    let (a, b) = (process(a), process(b));
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let base = plain_ratio(&a, &b) as f64;
    let (len_a, len_b) = (a.chars().count() as f64, b.chars().count() as f64);
    let length_ratio = len_a.max(len_b) / len_a.min(len_b);

    let best = if length_ratio < PARTIAL_LENGTH_RATIO {
        let sort = plain_ratio(&sorted_tokens(&a), &sorted_tokens(&b)) as f64 * TOKEN_SCALE;
        let set = token_set_with(&a, &b, plain_ratio) as f64 * TOKEN_SCALE;
        base.max(sort).max(set)
    } else {
        let scale = if length_ratio > LONG_LENGTH_RATIO {
            LONG_PARTIAL_SCALE
        } else {
            PARTIAL_SCALE
        };
        let partial = plain_partial_ratio(&a, &b) as f64 * scale;
        let sort = plain_partial_ratio(&sorted_tokens(&a), &sorted_tokens(&b)) as f64
            * TOKEN_SCALE
            * scale;
        let set = token_set_with(&a, &b, plain_partial_ratio) as f64 * TOKEN_SCALE * scale;
        base.max(partial).max(sort).max(set)
    };
    best.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_full() {
        assert_eq!(plain_ratio(&process("open google"), &process("Open Google")), 100);
        assert_eq!(weighted_ratio("open google", "open google"), 100);
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(weighted_ratio("", "open google"), 0);
        assert_eq!(partial_ratio("   ", "note"), 0);
    }

    #[test]
    fn ratio_counts_shared_characters() {
        // "abcd" vs "abce": 3 shared of 8 total characters -> 75.
        assert_eq!(plain_ratio("abcd", "abce"), 75);
    }

    #[test]
    fn partial_ratio_finds_embedded_phrase() {
        assert_eq!(partial_ratio("milk", "buy milk and eggs"), 100);
        assert!(partial_ratio("dentist", "buy milk and eggs") < 80);
    }

    #[test]
    fn token_ratios_ignore_word_order() {
        assert_eq!(
            plain_ratio(&sorted_tokens("google open"), &sorted_tokens("open google")),
            100
        );
        assert_eq!(token_set_with("open open google", "google open", plain_ratio), 100);
    }

    #[test]
    fn surrounding_words_still_score_high() {
        let score = weighted_ratio("can you open google for me", "open google");
        assert!(score > DEFAULT_THRESHOLD, "score was {score}");
    }

    #[test]
    fn matcher_selects_open_google() {
        let registry = CommandRegistry::builtin();
        let matcher = FuzzyMatcher::new(&registry, DEFAULT_THRESHOLD);
        let result = matcher.best_match("can you open google for me").unwrap();
        assert_eq!(result.phrase, "open google");
    }

    #[test]
    fn matcher_returns_none_below_threshold() {
        let registry = CommandRegistry::builtin();
        let matcher = FuzzyMatcher::new(&registry, DEFAULT_THRESHOLD);
        assert!(matcher.best_match("").is_none());
        assert!(matcher.best_match("zzzz qqqq xxxx").is_none());
    }

    #[test]
    fn threshold_is_exclusive() {
        let registry = CommandRegistry::builtin();
        let best = FuzzyMatcher::new(&registry, 0)
            .best_candidate("open googel")
            .unwrap();
        assert!(FuzzyMatcher::new(&registry, best.score).best_match("open googel").is_none());
        assert!(FuzzyMatcher::new(&registry, best.score - 1)
            .best_match("open googel")
            .is_some());
    }

    #[test]
    fn raising_threshold_never_adds_matches() {
        let registry = CommandRegistry::builtin();
        let utterances = ["open google", "what time is it", "remember this", "blah", ""];
        for threshold in [0u8, 50, 75, 90, 100] {
            let looser = FuzzyMatcher::new(&registry, threshold);
            let stricter = FuzzyMatcher::new(&registry, threshold.saturating_add(10));
            for utterance in utterances {
                if stricter.best_match(utterance).is_some() {
                    assert!(looser.best_match(utterance).is_some());
                }
            }
        }
    }

    #[test]
    fn ties_resolve_to_smallest_phrase() {
        let registry = CommandRegistry::builtin();
        let matcher = FuzzyMatcher::new(&registry, 0);
        let first = matcher.best_candidate("zzz").unwrap();
        let second = matcher.best_candidate("zzz").unwrap();
        assert_eq!(first, second);
        let tied: Vec<&str> = registry
            .iter()
            .map(|(phrase, _)| phrase)
            .filter(|phrase| weighted_ratio("zzz", phrase) == first.score)
            .collect();
        assert_eq!(tied.first().copied(), Some(first.phrase.as_str()));
    }

    #[test]
    fn long_utterances_are_scored_on_their_prefix() {
        let registry = CommandRegistry::builtin();
        let matcher = FuzzyMatcher::new(&registry, DEFAULT_THRESHOLD);
        let rambling = format!("lock doors {}", "and then some more words ".repeat(2_000));
        assert_eq!(capped(&rambling).chars().count(), MAX_UTTERANCE_CHARS);
        assert_eq!(
            matcher.best_candidate(&rambling),
            matcher.best_candidate(capped(&rambling))
        );
        assert_eq!(capped("lock doors"), "lock doors");
        assert_eq!(capped(&"é".repeat(300)).chars().count(), MAX_UTTERANCE_CHARS);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_utterance("  Open\tGOOGLE  now "), "open google now");
    }
}
