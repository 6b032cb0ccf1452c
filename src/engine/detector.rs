//! Cheap Word-markup detection.
//!
//! A single multi-pattern scan decides whether any cleaning is needed at
//! all; most content that reaches the cleaner was never near Word.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;

/// Substrings that only Word (or its paste buffer) produces.
pub const WORD_MARKERS: &[&str] = &[
    "mso-",
    "class=\"Mso",
    "class='Mso",
    "<o:p>",
    "<!--[if",
    "<![if",
    "w:WordDocument",
    "panose-1:",
    "urn:schemas-microsoft-com:",
    "style=\"mso-",
    "<m:",
    "<v:",
    "font-family:\"Cambria Math\"",
];

static MARKERS: LazyLock<Option<AhoCorasick>> = LazyLock::new(|| match AhoCorasick::new(WORD_MARKERS) {
    Ok(automaton) => Some(automaton),
    Err(e) => {
        tracing::error!("Word marker automaton unavailable, falling back to substring scan: {e}");
        None
    }
});

/// `true` if `content` contains any Word marker.
pub fn contains_word_markup(content: &str) -> bool {
    match MARKERS.as_ref() {
        Some(automaton) => automaton.is_match(content),
        None => WORD_MARKERS.iter().any(|marker| content.contains(marker)),
    }
}
