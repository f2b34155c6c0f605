// src/transcript/matcher.rs
// The line protocol: `[<speaker>]: <optional "(stage direction) "><body>`

use once_cell::sync::Lazy;
use regex::Regex;

static UTTERANCE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[([^\]]+)\]:\s*(?:\([^)]+\)\s*)?(.+)$").expect("utterance pattern is valid")
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utterance {
    pub speaker_label: String,
    pub content: String,
}

/// Turns one line into an utterance, or rejects it as narrative noise.
/// Implementations see a single line and keep no state between calls.
pub trait LineMatcher: Send + Sync {
    fn match_line(&self, line: &str) -> Option<Utterance>;
}

/// The bracketed-label protocol the prompt asks the model to follow.
#[derive(Clone, Copy, Debug, Default)]
pub struct BracketMatcher;

impl LineMatcher for BracketMatcher {
    fn match_line(&self, line: &str) -> Option<Utterance> {
        let caps = UTTERANCE_LINE.captures(line)?;
        let speaker_label = caps.get(1)?.as_str().trim();
        let content = caps.get(2)?.as_str().trim();
        if content.is_empty() {
            return None;
        }
        Some(Utterance {
            speaker_label: speaker_label.to_string(),
            content: content.to_string(),
        })
    }
}
