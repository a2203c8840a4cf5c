//! Query intent classifier.
//!
//! Deterministic keyword/length heuristics that pick a budget profile for a
//! query. Pure decision function: no I/O, never fails, never blocks.
//!
//! Priority chain (first match wins):
//!
//! ```text
//! Multimedia → Technical → Research → Simple
//! ```
//!
//! Multimedia is checked first because it gates the video lane, which is the
//! most expensive lane to dispatch.

use serde::{Deserialize, Serialize};

/// Coarse classification of a query, used only to index the budget table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Simple,
    Technical,
    Research,
    Multimedia,
}

impl QueryIntent {
    /// All intents, in budget-table row order.
    pub const ALL: [QueryIntent; 4] = [
        QueryIntent::Simple,
        QueryIntent::Technical,
        QueryIntent::Research,
        QueryIntent::Multimedia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Technical => "technical",
            Self::Research => "research",
            Self::Multimedia => "multimedia",
        }
    }
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Marker tables
// ============================================================================

/// Multimedia markers. Matched as whole tokens, so inflections are listed
/// ("demo" must not catch "democracy", nor "watch" catch "watchdog").
const MULTIMEDIA_MARKERS: &[&str] = &[
    "video",
    "videos",
    "watch",
    "watching",
    "demo",
    "demos",
    "tutorial",
    "tutorials",
    "screencast",
    "screencasts",
    "youtube",
    "clip",
    "clips",
];

/// Technical markers
const TECHNICAL_MARKERS: &[&str] = &[
    "time complexity",
    "rfc",
    "error code",
    "api",
    "algorithm",
    "implement",
    "stack trace",
    "compile",
    "syntax",
    "exception",
];

/// Comparative / academic markers
const RESEARCH_MARKERS: &[&str] = &[
    "compare",
    "comparison",
    "survey",
    "systematic",
    "analysis",
    "study",
    "versus",
];

/// Queries longer than this many whitespace tokens are treated as research.
pub const RESEARCH_TOKEN_THRESHOLD: usize = 15;

// ============================================================================
// Classification
// ============================================================================

/// Classify a query into an intent.
pub fn classify(query: &str) -> QueryIntent {
    let tokens = normalize(query);

    if contains_word(&tokens, MULTIMEDIA_MARKERS) {
        return QueryIntent::Multimedia;
    }

    if contains_any(&tokens, TECHNICAL_MARKERS) {
        return QueryIntent::Technical;
    }

    if query.split_whitespace().count() > RESEARCH_TOKEN_THRESHOLD
        || contains_any(&tokens, RESEARCH_MARKERS)
    {
        return QueryIntent::Research;
    }

    QueryIntent::Simple
}

/// Lowercase and split on anything that is not alphanumeric.
fn normalize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_any(tokens: &[String], markers: &[&str]) -> bool {
    markers.iter().any(|marker| matches_marker(tokens, marker))
}

fn contains_word(tokens: &[String], words: &[&str]) -> bool {
    tokens.iter().any(|t| words.contains(&t.as_str()))
}

/// Single-word markers match a token prefix ("api" matches "apis", not "rapid").
/// Multi-word markers match a run of consecutive tokens, prefix on the last word.
fn matches_marker(tokens: &[String], marker: &str) -> bool {
    let words: Vec<&str> = marker.split_whitespace().collect();
    match words.as_slice() {
        [] => false,
        [single] => tokens.iter().any(|t| t.starts_with(single)),
        phrase => tokens.windows(phrase.len()).any(|window| {
            let last = phrase.len() - 1;
            window.iter().zip(phrase.iter()).enumerate().all(|(i, (t, w))| {
                if i == last {
                    t.starts_with(w)
                } else {
                    t == w
                }
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_marker_requires_adjacent_tokens() {
        let tokens = normalize("what is the time complexity of heapsort");
        assert!(matches_marker(&tokens, "time complexity"));

        let tokens = normalize("time spent on complexity");
        assert!(!matches_marker(&tokens, "time complexity"));
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("RFC-9110, please!"), vec!["rfc", "9110", "please"]);
    }

    #[test]
    fn test_multimedia_words_match_whole_tokens() {
        assert!(contains_word(&normalize("two Demos, one clip"), MULTIMEDIA_MARKERS));
        assert!(!contains_word(&normalize("democracy"), MULTIMEDIA_MARKERS));
        assert!(!contains_word(&normalize("watchdog timer"), MULTIMEDIA_MARKERS));
        assert!(!contains_word(&normalize("clipboard history"), MULTIMEDIA_MARKERS));
    }

    #[test]
    fn test_single_marker_is_prefix_only() {
        let tokens = normalize("a rapid answer");
        assert!(!matches_marker(&tokens, "api"));
        let tokens = normalize("rest apis");
        assert!(matches_marker(&tokens, "api"));
    }
}
