//! Text normalization for pattern keys and keyword extraction.
//!
//! Deterministic and allocation-light: no stemming, no synonyms. The same
//! normalized form is used as the pattern store key and as the haystack for
//! keyword substring matching, so both sides must go through `normalize`.

/// Minimum keyword length used by the suggestion engine.
pub const DEFAULT_MIN_KEYWORD_LEN: usize = 3;

/// Small, non-load-bearing list of function words that never count as keywords.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "this", "that", "was", "are", "but", "not", "you",
    "your", "our", "its", "has", "had", "have", "into", "onto", "off", "out", "via",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lowercase, turn every non-word, non-space character into a separator,
/// collapse whitespace runs and trim.
///
/// Empty or punctuation-only input yields an empty string, which callers
/// treat as "no pattern".
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if is_word_char(c) {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }

    out
}

/// Split normalized text into keywords, dropping short tokens and stop words.
///
/// Duplicates are kept in input order; each occurrence contributes to
/// keyword scoring the same way it would if typed twice.
pub fn extract_keywords(text: &str, min_length: usize) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|w| w.chars().count() >= min_length)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}
