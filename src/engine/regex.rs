//! Lazily compiled, fail-soft regular expressions.
//!
//! Every pattern the engine uses is a `static` [`Pattern`]. Compilation
//! happens on first use; a pattern that fails to build (or a replacement
//! that cannot run) never corrupts content: the substitution is skipped
//! and the input is returned unchanged.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder, Replacer};

use crate::error::{CleanerError, Result};

/// Upper bound on the compiled program size of any single pattern.
const SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// A named regex compiled on first use.
///
/// # Example
///
/// ```
/// use word_cleaner::engine::Pattern;
///
/// static DIGITS: Pattern = Pattern::new("digits", r"\d+");
/// assert_eq!(DIGITS.replace("abc 123 def", "NUM"), "abc NUM def");
/// ```
pub struct Pattern {
    name: &'static str,
    source: &'static str,
    compiled: OnceLock<std::result::Result<Regex, String>>,
}

impl Pattern {
    pub const fn new(name: &'static str, source: &'static str) -> Self {
        Self {
            name,
            source,
            compiled: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The compiled regex, or a [`CleanerError::Pattern`] if it cannot be built.
    pub fn regex(&self) -> Result<&Regex> {
        self.compiled
            .get_or_init(|| {
                RegexBuilder::new(self.source)
                    .size_limit(SIZE_LIMIT)
                    .build()
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|reason| CleanerError::Pattern {
                rule: self.name,
                reason: reason.clone(),
            })
    }

    /// `true` if the pattern matches. An unusable pattern never matches.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex().is_ok_and(|re| re.is_match(haystack))
    }

    /// Number of non-overlapping matches.
    pub fn count(&self, haystack: &str) -> usize {
        self.regex()
            .map(|re| re.find_iter(haystack).count())
            .unwrap_or(0)
    }

    /// Replace every match, returning the input unchanged (and logging) if the
    /// pattern is unusable.
    pub fn replace<R: Replacer>(&self, haystack: &str, replacement: R) -> String {
        self.try_replace(haystack, replacement)
            .map(Cow::into_owned)
            .unwrap_or_else(|e| {
                tracing::warn!("Skipping substitution: {e}");
                haystack.to_string()
            })
    }

    /// Fallible form of [`replace`](Self::replace).
    pub fn try_replace<'h, R: Replacer>(
        &self,
        haystack: &'h str,
        replacement: R,
    ) -> Result<Cow<'h, str>> {
        if haystack.is_empty() {
            return Ok(Cow::Borrowed(haystack));
        }
        Ok(self.regex()?.replace_all(haystack, replacement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static EMAIL: Pattern = Pattern::new(
        "email",
        r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}",
    );
    static BROKEN: Pattern = Pattern::new("broken", "[invalid");

    #[test]
    fn replaces_every_match() {
        let html = r#"<a href="mailto:user@example.com">user@example.com</a>"#;
        assert_eq!(EMAIL.replace(html, "[EMAIL]").matches("[EMAIL]").count(), 2);
        assert_eq!(EMAIL.count(html), 2);
    }

    #[test]
    fn unusable_pattern_returns_input_unchanged() {
        let html = "<p>unchanged</p>";
        assert_eq!(BROKEN.replace(html, "x"), html);
        assert!(!BROKEN.is_match(html));
        assert_eq!(BROKEN.count(html), 0);
    }

    #[test]
    fn unusable_pattern_reports_its_name() {
        let err = BROKEN.regex().unwrap_err();
        assert!(matches!(err, CleanerError::Pattern { rule: "broken", .. }));
    }

    #[test]
    fn empty_input_is_borrowed() {
        assert!(matches!(EMAIL.try_replace("", "x").unwrap(), Cow::Borrowed("")));
    }
}
