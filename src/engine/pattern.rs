//! The pattern (regex) cleaning path.

use super::chunk::{CHUNK_SIZE, needs_chunking, split_chunks};
use super::detector::contains_word_markup;
use super::markup::{balance_tags, has_complex_html, structure_balanced, unescape_if_needed};
use super::protect::{ProtectedRegions, contains_token, extract};
use super::rebuild::{ListStrategy, Reconstructor};
use super::rules::{MAIN_RULES, REPAIR_RULES, RuleCounts, SIMPLE_TEXT_GATES, apply_gated, apply_rules};
use crate::policy::{CHUNK_SUFFIX, CleaningPolicy};

/// Content types that get the reduced rule set when they hold no complex markup.
pub const SIMPLE_TEXT_TYPES: &[&str] = &["acf_text", "acf_textarea"];

pub fn is_simple_text(content: &str, content_type: &str) -> bool {
    SIMPLE_TEXT_TYPES.contains(&content_type) && !has_complex_html(content)
}

/// Ordered regex substitutions with table/list protection, chunking for
/// large fragments and a structural repair pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternCleaner;

impl PatternCleaner {
    /// Clean `content`, removing one level of backslash escaping first if
    /// the content carries escaped quotes.
    pub fn clean(&self, content: &str, content_type: &str, policy: &CleaningPolicy) -> String {
        let working = unescape_if_needed(content);
        self.clean_unescaped(&working, content_type, policy)
    }

    pub(crate) fn clean_unescaped(&self, content: &str, content_type: &str, policy: &CleaningPolicy) -> String {
        if is_simple_text(content, content_type) {
            return apply_gated(&MAIN_RULES, SIMPLE_TEXT_GATES, content, policy);
        }
        if needs_chunking(content, content_type) {
            return self.clean_chunked(content, content_type, policy);
        }
        let regions = extract(content, policy);
        self.clean_with_regions(&regions, content_type, policy)
    }

    /// Clean content whose tables and lists were already lifted out.
    ///
    /// `regions.content` holds the tokenized fragment. If the result breaks
    /// structure that the input had intact, the original fragment is
    /// returned instead.
    pub fn clean_with_regions(&self, regions: &ProtectedRegions, content_type: &str, policy: &CleaningPolicy) -> String {
        self.clean_counted(regions, content_type, policy, None)
    }

    pub(crate) fn clean_counted(
        &self,
        regions: &ProtectedRegions,
        content_type: &str,
        policy: &CleaningPolicy,
        counts: Option<&mut RuleCounts>,
    ) -> String {
        let cleaned = apply_rules(&MAIN_RULES, &regions.content, policy, counts);
        let restored = Reconstructor::new(policy, ListStrategy::Unordered).restore(&cleaned, regions);
        let repaired = repair(&restored, content_type);

        let original = regions.original_content();
        let lost_region = !regions.is_empty() && contains_token(&repaired);
        if lost_region || (structure_balanced(&original) && !structure_balanced(&repaired)) {
            tracing::warn!("Pattern cleaning broke table or list structure, keeping input");
            return original;
        }
        repaired
    }

    fn clean_chunked(&self, content: &str, content_type: &str, policy: &CleaningPolicy) -> String {
        let chunk_type = format!("{content_type}{CHUNK_SUFFIX}");
        let chunks = split_chunks(content, CHUNK_SIZE);
        tracing::debug!("Cleaning {} bytes of {content_type} in {} chunks", content.len(), chunks.len());

        let mut out = String::with_capacity(content.len());
        for chunk in chunks {
            if contains_word_markup(chunk) {
                out.push_str(&self.clean_unescaped(chunk, &chunk_type, policy));
            } else {
                out.push_str(chunk);
            }
        }
        balance_tags(&out)
    }
}

/// Structural repair; balancing is left to the parent for chunk types.
pub fn repair(html: &str, content_type: &str) -> String {
    let repaired = apply_rules(&REPAIR_RULES, html, &CleaningPolicy::none(), None);
    if content_type.ends_with(CHUNK_SUFFIX) {
        repaired
    } else {
        balance_tags(&repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::markup::tag_counts;

    fn clean(html: &str, content_type: &str) -> String {
        let policy = CleaningPolicy::for_content_type(content_type);
        PatternCleaner.clean(html, content_type, &policy)
    }

    #[test]
    fn cleans_a_word_paragraph() {
        let html = r#"<p class="MsoNormal" style="margin:0cm;mso-line-height-alt:12pt"><span lang="EN-US" style="font-family:Calibri">Hello<o:p></o:p></span></p>"#;
        assert_eq!(clean(html, "post"), "<p>Hello</p>");
    }

    #[test]
    fn rebuilds_protected_tables() {
        let html = r#"<p class="MsoNormal">Intro</p><table class="MsoTableGrid"><tr><td style="mso-x:1"><p class="MsoNormal">A</p></td><td>B</td></tr></table>"#;
        let out = clean(html, "post");
        assert!(out.starts_with("<p>Intro</p><table border=\"1\" cellspacing=\"0\" cellpadding=\"0\">"));
        assert_eq!(tag_counts(&out, "td"), (2, 2));
        assert!(!out.contains("Mso"));
    }

    #[test]
    fn pseudo_lists_become_unordered_lists() {
        let html = "<p class=\"MsoListParagraphCxSpFirst\"><!--[if !supportLists]-->1.<!--[endif]-->One</p>\n<p class=\"MsoListParagraphCxSpLast\"><!--[if !supportLists]-->2.<!--[endif]-->Two</p>";
        assert_eq!(clean(html, "post"), "<ul>\n  <li>One</li>\n  <li>Two</li>\n</ul>");
    }

    #[test]
    fn short_text_fields_keep_non_word_styles() {
        let html = r#"<span class="MsoNormal" style="color:red;mso-bidi-font-family:Arial">Title</span>"#;
        assert_eq!(clean(html, "acf_text"), r#"<span style="color:red;">Title</span>"#);
    }

    #[test]
    fn escaped_content_is_unescaped_once() {
        let html = r#"<p class=\"MsoNormal\">It\'s here</p>"#;
        assert_eq!(clean(html, "post"), "<p>It's here</p>");
    }

    #[test]
    fn large_posts_are_cleaned_in_chunks() {
        let paragraph = r#"<p class="MsoNormal"><span style="font-size:12pt">text</span><o:p></o:p></p>"#;
        let html = paragraph.repeat(1_000);
        assert!(html.len() > 40_000);
        let out = clean(&html, "post");
        assert_eq!(out, "<p>text</p>".repeat(1_000));
    }

    #[test]
    fn chunk_types_are_not_balanced() {
        assert_eq!(repair("<div><p>open", "post_chunk"), "<div><p>open");
        assert_eq!(repair("<div><p>open", "post"), "<div><p>open</p></div>");
    }
}
