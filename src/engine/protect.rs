//! Lifting tables and lists out of a fragment before cleaning.
//!
//! Each protected region is replaced by a placeholder token so the main
//! rules never touch its structure; the reconstructor later rebuilds the
//! region and substitutes it back in a single pass. Tokens are bracketed
//! (`[[TABLE_MARKER_0]]`) so surrounding text can never extend them.

use std::collections::HashMap;
use std::ops::Range;

use regex::Captures;

use super::markup::balanced_spans;
use super::regex::Pattern;
use crate::policy::CleaningPolicy;

static TOKEN: Pattern = Pattern::new("region_token", r"\[\[(?:TABLE|MSOLIST|LIST)_MARKER_\d+\]\]");

/// Consecutive Word pseudo-list paragraphs.
pub(crate) static MSO_LIST_RUN: Pattern = Pattern::new(
    "mso_list_run",
    r#"(?is)<p\b[^>]*class\s*=\s*["']?MsoListParagraph[^>]*>.*?</p>(?:\s*<p\b[^>]*class\s*=\s*["']?MsoListParagraph[^>]*>.*?</p>)*"#,
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Table,
    List,
    MsoList,
}

impl RegionKind {
    fn token(self, index: usize) -> String {
        match self {
            Self::Table => format!("[[TABLE_MARKER_{index}]]"),
            Self::List => format!("[[LIST_MARKER_{index}]]"),
            Self::MsoList => format!("[[MSOLIST_MARKER_{index}]]"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectedRegion {
    pub token: String,
    pub kind: RegionKind,
    pub original: String,
}

/// A fragment with its tables and lists replaced by tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtectedRegions {
    /// The fragment with every region replaced by its token.
    pub content: String,
    pub regions: Vec<ProtectedRegion>,
}

impl ProtectedRegions {
    /// Content with nothing protected.
    pub fn unprotected(content: &str) -> Self {
        Self {
            content: content.to_string(),
            regions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn count(&self, kind: RegionKind) -> usize {
        self.regions.iter().filter(|r| r.kind == kind).count()
    }

    /// Replace every token in `content` using `render`. Tokens with no
    /// region are left as they are.
    pub fn substitute(&self, content: &str, mut render: impl FnMut(&ProtectedRegion) -> String) -> String {
        if self.regions.is_empty() {
            return content.to_string();
        }
        let by_token: HashMap<&str, &ProtectedRegion> =
            self.regions.iter().map(|r| (r.token.as_str(), r)).collect();
        TOKEN.replace(content, |caps: &Captures<'_>| {
            let token = &caps[0];
            match by_token.get(token) {
                Some(region) => render(region),
                None => token.to_string(),
            }
        })
    }

    /// The fragment as it was before extraction.
    pub fn original_content(&self) -> String {
        self.substitute(&self.content, |region| region.original.clone())
    }
}

/// Whether `content` still holds a region token.
pub fn contains_token(content: &str) -> bool {
    TOKEN.is_match(content)
}

/// Lift tables (when `protect_tables`) and then lists (when `protect_lists`)
/// out of `content`.
///
/// Content that already contains placeholder-shaped text is returned
/// unprotected.
pub fn extract(content: &str, policy: &CleaningPolicy) -> ProtectedRegions {
    if contains_token(content) {
        tracing::debug!("Content already contains region tokens, skipping protection");
        return ProtectedRegions::unprotected(content);
    }

    let mut regions = Vec::new();
    let mut working = content.to_string();

    if policy.protect_tables {
        let spans = balanced_spans(&working, &["table"]);
        working = lift(&working, &spans, RegionKind::Table, 0, &mut regions);
    }

    if policy.protect_lists {
        let spans = balanced_spans(&working, &["ul", "ol"]);
        working = lift(&working, &spans, RegionKind::List, 0, &mut regions);

        let list_count = spans.len();
        let runs: Vec<Range<usize>> = MSO_LIST_RUN
            .regex()
            .map(|re| re.find_iter(&working).map(|m| m.range()).collect())
            .unwrap_or_default();
        working = lift(&working, &runs, RegionKind::MsoList, list_count, &mut regions);
    }

    ProtectedRegions {
        content: working,
        regions,
    }
}

fn lift(
    content: &str,
    spans: &[Range<usize>],
    kind: RegionKind,
    first_index: usize,
    regions: &mut Vec<ProtectedRegion>,
) -> String {
    if spans.is_empty() {
        return content.to_string();
    }
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for (i, span) in spans.iter().enumerate() {
        let token = kind.token(first_index + i);
        out.push_str(&content[last..span.start]);
        out.push_str(&token);
        regions.push(ProtectedRegion {
            token,
            kind,
            original: content[span.clone()].to_string(),
        });
        last = span.end;
    }
    out.push_str(&content[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protect_all() -> CleaningPolicy {
        CleaningPolicy::clean_everything()
    }

    #[test]
    fn lifts_tables_and_lists() {
        let html = "<p>a</p><table><tr><td>1</td></tr></table><ul><li>x</li></ul>";
        let regions = extract(html, &protect_all());
        assert_eq!(regions.content, "<p>a</p>[[TABLE_MARKER_0]][[LIST_MARKER_0]]");
        assert_eq!(regions.count(RegionKind::Table), 1);
        assert_eq!(regions.count(RegionKind::List), 1);
        assert_eq!(regions.original_content(), html);
    }

    #[test]
    fn lists_inside_tables_stay_with_the_table() {
        let html = "<table><tr><td><ul><li>x</li></ul></td></tr></table>";
        let regions = extract(html, &protect_all());
        assert_eq!(regions.content, "[[TABLE_MARKER_0]]");
        assert_eq!(regions.count(RegionKind::List), 0);
    }

    #[test]
    fn pseudo_list_tokens_follow_genuine_lists() {
        let html = "<ul><li>a</li></ul><p class=\"MsoListParagraph\">one</p>\n<p class=\"MsoListParagraphCxSpLast\">two</p><p>after</p>";
        let regions = extract(html, &protect_all());
        assert_eq!(regions.content, "[[LIST_MARKER_0]][[MSOLIST_MARKER_1]]<p>after</p>");
    }

    #[test]
    fn substitution_does_not_confuse_similar_tokens() {
        let html: String = (0..11).map(|i| format!("<table><tr><td>{i}</td></tr></table>")).collect();
        let regions = extract(&html, &protect_all());
        assert!(regions.content.contains("[[TABLE_MARKER_10]]"));
        assert_eq!(regions.original_content(), html);
    }

    #[test]
    fn existing_tokens_disable_protection() {
        let html = "<p>[[TABLE_MARKER_0]]</p><table><tr><td>1</td></tr></table>";
        let regions = extract(html, &protect_all());
        assert!(regions.is_empty());
        assert_eq!(regions.content, html);
    }

    #[test]
    fn digits_after_a_region_stay_outside_its_token() {
        let html = "<table><tr><td>Cell</td></tr></table>5 apples<ul><li>x</li></ul>10";
        let regions = extract(html, &protect_all());
        assert_eq!(regions.content, "[[TABLE_MARKER_0]]5 apples[[LIST_MARKER_0]]10");
        assert_eq!(regions.original_content(), html);
    }

    #[test]
    fn unbracketed_marker_text_is_plain_content() {
        let html = "<p>TABLE_MARKER_0</p><table><tr><td>1</td></tr></table>";
        let regions = extract(html, &protect_all());
        assert_eq!(regions.count(RegionKind::Table), 1);
        assert_eq!(regions.original_content(), html);
    }

    #[test]
    fn disabled_switches_protect_nothing() {
        let html = "<table><tr><td>1</td></tr></table><ul><li>x</li></ul>";
        assert!(extract(html, &CleaningPolicy::none()).is_empty());
    }
}
