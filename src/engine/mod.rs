//! The synchronous cleaning engine.
//!
//! [`Engine::clean`] is the uncached pipeline: excerpt stripping, the
//! Word-markup gate, path selection (tree or pattern) and fallback. Every
//! failure inside it degrades to returning the input unchanged.

pub mod chunk;
pub mod detector;
pub mod markup;
pub mod pattern;
pub mod protect;
pub mod rebuild;
mod regex;
pub mod rules;
pub mod tree;

use std::fmt;

pub use self::detector::contains_word_markup;
pub use self::pattern::PatternCleaner;
pub use self::protect::{ProtectedRegion, ProtectedRegions, RegionKind};
pub use self::rebuild::{ListStrategy, Reconstructor};
pub use self::regex::Pattern;
pub use self::tree::TreeStatistics;

use self::markup::{add_slashes, has_escaped_quotes, strip_all_tags, structure_balanced, unescape_if_needed, unescape_slashes};
use self::rules::{MAIN_RULES, RuleCounts};
use crate::policy::CleaningPolicy;

static ALL_STYLE_ATTRIBUTES: Pattern = Pattern::new(
    "strip_styles_only",
    r#"(?i)(<[a-z][^>]*?)\s+style\s*=\s*(?:"[^"]*"|'[^']*')"#,
);

/// Which branch of the pipeline produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CleaningPath {
    /// No Word markup and nothing else requested.
    Unchanged,
    /// Every tag removed.
    StripAllHtml,
    /// Only `style` attributes removed from non-Word content.
    StripStylesOnly,
    Tree,
    Pattern,
    /// The tree path failed and the pattern path took over.
    TreeFallback,
}

impl fmt::Display for CleaningPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unchanged => "unchanged",
            Self::StripAllHtml => "strip_all_html",
            Self::StripStylesOnly => "strip_styles_only",
            Self::Tree => "tree",
            Self::Pattern => "pattern",
            Self::TreeFallback => "tree_fallback",
        };
        f.write_str(name)
    }
}

/// Result of one engine run.
#[derive(Clone, Debug)]
pub struct CleanOutcome {
    pub content: String,
    pub path: CleaningPath,
    /// Present when the tree path ran.
    pub tree_stats: Option<TreeStatistics>,
    /// Match counts per pattern rule, present when the pattern path ran.
    pub rule_counts: Option<RuleCounts>,
}

impl CleanOutcome {
    fn new(content: String, path: CleaningPath) -> Self {
        Self {
            content,
            path,
            tree_stats: None,
            rule_counts: None,
        }
    }
}

/// The uncached cleaning pipeline.
///
/// # Example
///
/// ```
/// use word_cleaner::{CleaningPolicy, Engine};
///
/// let engine = Engine::default();
/// let html = r#"<p class="MsoNormal">Hello<o:p></o:p></p>"#;
/// let cleaned = engine.clean(html, "post", &CleaningPolicy::for_content_type("post"));
/// assert_eq!(cleaned, "<p>Hello</p>");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Engine {
    tree_processing: bool,
    patterns: PatternCleaner,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    /// `tree_processing` is a global switch; the tree path also needs the
    /// policy's `use_tree_processing`.
    pub fn new(tree_processing: bool) -> Self {
        Self {
            tree_processing,
            patterns: PatternCleaner,
        }
    }

    /// Whether `content` would be changed (and so is worth caching) under `policy`.
    pub fn needs_cleaning(content: &str, policy: &CleaningPolicy) -> bool {
        policy.strip_all_html || contains_word_markup(content)
    }

    pub fn clean(&self, content: &str, content_type: &str, policy: &CleaningPolicy) -> String {
        self.clean_detailed(content, content_type, policy).content
    }

    /// Run the pipeline and report how the result was produced.
    pub fn clean_detailed(&self, content: &str, content_type: &str, policy: &CleaningPolicy) -> CleanOutcome {
        if content.is_empty() {
            return CleanOutcome::new(String::new(), CleaningPath::Unchanged);
        }
        if policy.strip_all_html {
            return CleanOutcome::new(strip_all_tags(content), CleaningPath::StripAllHtml);
        }
        if !contains_word_markup(content) {
            if policy.strip_all_styles {
                return CleanOutcome::new(strip_styles_only(content), CleaningPath::StripStylesOnly);
            }
            return CleanOutcome::new(content.to_string(), CleaningPath::Unchanged);
        }

        let use_tree = self.tree_processing
            && policy.use_tree_processing
            && !pattern::is_simple_text(content, content_type);
        if use_tree {
            return self.clean_tree(content, content_type, policy);
        }

        let working = unescape_if_needed(content);
        let mut counts = RuleCounts::new();
        let cleaned = if pattern::is_simple_text(&working, content_type) || chunk::needs_chunking(&working, content_type) {
            self.patterns.clean_unescaped(&working, content_type, policy)
        } else {
            let regions = protect::extract(&working, policy);
            self.patterns.clean_counted(&regions, content_type, policy, Some(&mut counts))
        };
        CleanOutcome {
            rule_counts: Some(counts),
            ..CleanOutcome::new(cleaned, CleaningPath::Pattern)
        }
    }

    fn clean_tree(&self, content: &str, content_type: &str, policy: &CleaningPolicy) -> CleanOutcome {
        let working = unescape_if_needed(content);
        let regions = protect::extract(&working, policy);

        match tree::clean(&regions.content, policy) {
            Ok(output) => {
                let mut rebuilder = Reconstructor::new(policy, ListStrategy::DetectOrdered);
                let restored = rebuilder.restore(&output.html, &regions);
                let lost_region = !regions.is_empty() && protect::contains_token(&restored);
                let restored = if lost_region || (structure_balanced(&working) && !structure_balanced(&restored)) {
                    tracing::warn!("Tree cleaning broke table or list structure, keeping input");
                    working.into_owned()
                } else {
                    restored
                };
                tracing::debug!(
                    "Tree pass: {} processed, {} cleaned, {} skipped in {:?}",
                    output.stats.elements_processed,
                    output.stats.elements_cleaned,
                    output.stats.elements_skipped,
                    output.stats.elapsed
                );
                CleanOutcome {
                    tree_stats: Some(output.stats),
                    ..CleanOutcome::new(restored, CleaningPath::Tree)
                }
            }
            Err(e) => {
                tracing::debug!("Tree path unavailable, falling back to patterns: {e}");
                let mut counts = RuleCounts::new();
                let cleaned = self.patterns.clean_counted(&regions, content_type, policy, Some(&mut counts));
                CleanOutcome {
                    rule_counts: Some(counts),
                    ..CleanOutcome::new(cleaned, CleaningPath::TreeFallback)
                }
            }
        }
    }
}

/// Remove every `style` attribute, preserving backslash escaping of quotes.
pub fn strip_styles_only(content: &str) -> String {
    if has_escaped_quotes(content) {
        add_slashes(&ALL_STYLE_ATTRIBUTES.replace(&unescape_slashes(content), "${1}"))
    } else {
        ALL_STYLE_ATTRIBUTES.replace(content, "${1}")
    }
}

/// The main rule table, for callers that want to inspect it.
pub fn main_rule_names() -> Vec<&'static str> {
    MAIN_RULES.iter().map(|rule| rule.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Switch;

    const WORD: &str = r#"<p class="MsoNormal">Hello<o:p></o:p></p>"#;

    #[test]
    fn clean_input_is_untouched() {
        let html = r#"<p style="color:red" class="lead">Plain</p>"#;
        let outcome = Engine::default().clean_detailed(html, "post", &CleaningPolicy::default());
        assert_eq!(outcome.path, CleaningPath::Unchanged);
        assert_eq!(outcome.content, html);
    }

    #[test]
    fn both_paths_clean_word_paragraphs() {
        let policy = CleaningPolicy::default();
        let tree = Engine::new(true).clean_detailed(WORD, "post", &policy);
        let pattern = Engine::new(false).clean_detailed(WORD, "post", &policy);
        assert_eq!(tree.path, CleaningPath::Tree);
        assert_eq!(pattern.path, CleaningPath::Pattern);
        assert_eq!(tree.content, "<p>Hello</p>");
        assert_eq!(pattern.content, "<p>Hello</p>");
    }

    #[test]
    fn policy_can_disable_the_tree_path() {
        let policy = CleaningPolicy::default().with(Switch::UseTreeProcessing, false);
        assert_eq!(Engine::default().clean_detailed(WORD, "post", &policy).path, CleaningPath::Pattern);
    }

    #[test]
    fn short_text_fields_take_the_pattern_path() {
        let policy = CleaningPolicy::for_content_type("acf_text");
        assert_eq!(Engine::default().clean_detailed(WORD, "acf_text", &policy).path, CleaningPath::Pattern);
    }

    #[test]
    fn excerpts_lose_every_tag_even_without_word_markup() {
        let policy = CleaningPolicy::for_content_type("excerpt");
        let html = "<p><strong>Short</strong> summary</p>";
        assert_eq!(Engine::default().clean(html, "excerpt", &policy), "Short summary");
    }

    #[test]
    fn strip_styles_only_keeps_escaping() {
        let policy = CleaningPolicy::default().with(Switch::StripAllStyles, true);
        let html = r#"<p style=\"color:red\">It\'s</p>"#;
        let outcome = Engine::default().clean_detailed(html, "post", &policy);
        assert_eq!(outcome.path, CleaningPath::StripStylesOnly);
        assert_eq!(outcome.content, r#"<p>It\'s</p>"#);
    }

    #[test]
    fn escaped_word_content_is_returned_unescaped() {
        let html = r#"<p class=\"MsoNormal\">It\'s<o:p></o:p></p>"#;
        for tree in [true, false] {
            let out = Engine::new(tree).clean(html, "post", &CleaningPolicy::default());
            assert_eq!(out, "<p>It's</p>");
        }
    }

    #[test]
    fn digits_after_a_table_do_not_swallow_it() {
        let html = r#"<table><tr><td>Cell</td></tr></table>5 apples<p class="MsoNormal">x</p>"#;
        for tree in [true, false] {
            let out = Engine::new(tree).clean(html, "post", &CleaningPolicy::default());
            assert!(out.contains("<td>\n  Cell\n  </td>"), "{out}");
            assert!(out.ends_with("</table>5 apples<p>x</p>"), "{out}");
            assert!(!out.contains("MARKER"));
        }
    }

    #[test]
    fn unparseable_fragments_fall_back_to_patterns() {
        let mut html = String::from(r#"<p class="MsoNormal">Intro<o:p></o:p></p>"#);
        for _ in 0..=tree::MAX_PARSE_ERRORS {
            html.push_str("<p>stray</b></p>");
        }
        let outcome = Engine::new(true).clean_detailed(&html, "post", &CleaningPolicy::default());
        assert_eq!(outcome.path, CleaningPath::TreeFallback);
        assert!(outcome.rule_counts.is_some());
        assert!(outcome.content.starts_with("<p>Intro</p><p>stray</p>"), "{}", outcome.content);
        assert!(!outcome.content.contains("Mso"));
        assert!(!outcome.content.contains("</b>"));
    }

    #[test]
    fn a_few_parse_errors_stay_on_the_tree_path() {
        let html = r#"<p class="MsoNormal">Intro<o:p></o:p></p><p>stray</b></p>"#;
        let outcome = Engine::new(true).clean_detailed(html, "post", &CleaningPolicy::default());
        assert_eq!(outcome.path, CleaningPath::Tree);
        assert_eq!(outcome.content, "<p>Intro</p><p>stray</p>");
    }

    #[test]
    fn main_rules_are_listed_in_order() {
        let names = main_rule_names();
        assert_eq!(names.first(), Some(&"o_tags"));
        assert!(names.contains(&"mso_classes"));
    }
}
