//! Shared text normalization and similarity helpers.
//!
//! Tokenization, stop-word filtering, naive suffix stemming, and token-set
//! Jaccard similarity. The deduplication engine and the keyword recall
//! strategy share these helpers so that "similar" means the same thing on
//! both the write and the read path.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Common stop words filtered from token sets.
pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
        "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can", "need",
        "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your",
        "his", "its", "our", "their", "this", "that", "these", "those", "there", "here", "what",
        "which", "who", "whom", "when", "where", "why", "how", "all", "any", "both", "each", "few",
        "more", "most", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
        "too", "very", "just", "about", "into", "over", "under", "again", "then", "once", "also",
    ]
    .into_iter()
    .collect()
});

/// Collapses runs of whitespace into single spaces and trims the ends.
#[must_use]
pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form used for content hashing: lowercased with normalized
/// whitespace. Punctuation is preserved so that genuinely different
/// sentences keep different hashes.
#[must_use]
pub fn canonical_content(input: &str) -> String {
    normalize_whitespace(&input.to_lowercase())
}

/// Strips a naive set of English suffixes.
///
/// Not a real stemmer; just enough that "databases" and "database" or
/// "testing" and "test" land on the same token. Tokens shorter than five
/// characters are returned unchanged to avoid over-stripping.
#[must_use]
pub fn stem(token: &str) -> &str {
    if token.len() < 5 {
        return token;
    }
    for suffix in ["ingly", "edly", "ing", "ies", "ed", "ly", "es", "s"] {
        if let Some(stripped) = token.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped;
            }
        }
    }
    token
}

/// Tokenizes into lowercased alphanumeric tokens, dropping stop words and
/// single-character tokens, and stemming the survivors.
#[must_use]
pub fn tokenize(input: &str) -> Vec<String> {
    input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t.as_str()))
        .map(|t| stem(&t).to_string())
        .collect()
}

/// Tokenizes into a set for overlap comparisons.
#[must_use]
pub fn token_set(input: &str) -> HashSet<String> {
    tokenize(input).into_iter().collect()
}

/// Token-set Jaccard similarity in [0, 1].
///
/// Case- and punctuation-insensitive by construction of [`token_set`].
/// Two empty token sets compare as 0.0, not 1.0: a pair of stop-word-only
/// strings carries no evidence of similarity.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();

    intersection as f64 / union as f64
}

/// Overlap coefficient: intersection over the smaller token set, in [0, 1].
///
/// More forgiving than Jaccard for short sentences, where one or two
/// changed words dominate the union. Used to bind update markers to their
/// correction targets.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn overlap_coefficient(a: &str, b: &str) -> f64 {
    let set_a = token_set(a);
    let set_b = token_set(b);

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / set_a.len().min(set_b.len()) as f64
}

/// Fraction of `query` tokens present in `candidate` in [0, 1].
///
/// Asymmetric by design: a short query fully contained in a long memory
/// should score 1.0, which Jaccard would punish.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn containment_score(query: &str, candidate: &str) -> f64 {
    let query_tokens = token_set(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens = token_set(candidate);
    let hits = query_tokens
        .iter()
        .filter(|t| candidate_tokens.contains(*t))
        .count();
    hits as f64 / query_tokens.len() as f64
}
