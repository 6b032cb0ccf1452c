//! Rebuilding protected tables and lists into canonical, clean markup.

use std::collections::HashMap;

use super::markup::{balance_tags, balanced_spans, strip_all_tags, structure_balanced};
use super::protect::{ProtectedRegion, ProtectedRegions, RegionKind};
use super::regex::Pattern;
use super::rules::{apply_rules, MAIN_RULES};
use crate::error::CleanerError;
use crate::policy::CleaningPolicy;

static TABLE_OPEN: Pattern = Pattern::new("table_open", r"(?is)^\s*<table\b([^>]*)>");
static TABLE_CLOSE: Pattern = Pattern::new("table_close", r"(?is)</table\s*>\s*$");
static BORDER: Pattern = Pattern::new("border_attr", r#"(?i)\bborder\s*=\s*["']?(\d+)"#);
static CELLSPACING: Pattern = Pattern::new("cellspacing_attr", r#"(?i)\bcellspacing\s*=\s*["']?(\d+)"#);
static CELLPADDING: Pattern = Pattern::new("cellpadding_attr", r#"(?i)\bcellpadding\s*=\s*["']?(\d+)"#);
static WIDTH: Pattern = Pattern::new("width_attr", r#"(?i)\bwidth\s*=\s*["']?(\d+%?)"#);
static VALIGN: Pattern = Pattern::new("valign_attr", r#"(?i)\bvalign\s*=\s*["']?([a-z]+)"#);
static CAPTION_OPEN: Pattern = Pattern::new("caption_open", r"(?is)^\s*<caption\b[^>]*>");
static CAPTION_CLOSE: Pattern = Pattern::new("caption_close", r"(?is)</caption\s*>\s*$");
static ROW_OPEN: Pattern = Pattern::new("row_open", r"(?is)^\s*<tr\b[^>]*>");
static ROW_CLOSE: Pattern = Pattern::new("row_close", r"(?is)</tr\s*>\s*$");
static CELL_OPEN: Pattern = Pattern::new("cell_open", r"(?is)^\s*<(td|th)\b([^>]*)>");
static CELL_CLOSE: Pattern = Pattern::new("cell_close", r"(?is)</t[dh]\s*>\s*$");

static CELL_P: Pattern = Pattern::new("cell_p", r"(?i)<p\b[^>]*>");
static CELL_SPAN: Pattern = Pattern::new("cell_span", r"(?i)<span\b[^>]*>");
static CELL_P_SPAN: Pattern = Pattern::new("cell_p_span", r"(?is)<p>\s*<span>([^<]*)</span>\s*</p>");
static CELL_NESTED_P: Pattern = Pattern::new("cell_nested_p", r"(?is)<p>\s*<p>");
static CELL_DOUBLE_CLOSE: Pattern = Pattern::new("cell_double_close", r"(?is)</p>\s*</p>");

static LIST_MARKERS: Pattern = Pattern::new(
    "list_markers",
    r"(?is)<!--\[if !supportLists\]-->.*?<!--\[endif\]-->|<!\[if !supportLists\]>.*?<!\[endif\]>",
);
static LIST_TAG: Pattern = Pattern::new("list_tag", r"(?i)<(ul|ol|li)\b[^>]*>");
static LI_TRAILING: Pattern = Pattern::new("li_trailing", r"(?s)<li>\s*>\s*");
static ITEM_SPLIT: Pattern = Pattern::new(
    "list_item_split",
    r#"(?is)</p>\s*<p\b[^>]*class\s*=\s*["']?MsoListParagraph[^>]*>"#,
);
static FIRST_ITEM_OPEN: Pattern = Pattern::new("first_item_open", r"(?is)^\s*<p\b[^>]*>");
static LAST_ITEM_CLOSE: Pattern = Pattern::new("last_item_close", r"(?is)</p>\s*$");
static ORDINAL: Pattern = Pattern::new("ordinal_marker", r"^\(?(?:\d+|[a-zA-Z]|[ivxlcdmIVXLCDM]+)[.)]$");

/// How pseudo-list paragraphs become a list element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListStrategy {
    /// Always `<ul>`.
    Unordered,
    /// `<ol>` when the first item's Word marker is a number, letter or numeral.
    DetectOrdered,
}

/// Rebuilds protected regions for one cleaning call.
///
/// Identical regions seen again during the same call are served from a
/// memo instead of being rebuilt.
pub struct Reconstructor<'a> {
    policy: &'a CleaningPolicy,
    strategy: ListStrategy,
    memo: HashMap<blake3::Hash, String>,
}

impl<'a> Reconstructor<'a> {
    pub fn new(policy: &'a CleaningPolicy, strategy: ListStrategy) -> Self {
        Self {
            policy,
            strategy,
            memo: HashMap::new(),
        }
    }

    /// Substitute rebuilt regions for every token in `content`.
    pub fn restore(&mut self, content: &str, regions: &ProtectedRegions) -> String {
        regions.substitute(content, |region| self.rebuild(region))
    }

    /// Rebuild one region, keeping the original if the rebuilt markup fails
    /// the structure check.
    pub fn rebuild(&mut self, region: &ProtectedRegion) -> String {
        let key = self.memo_key(region.kind, &region.original);
        if let Some(done) = self.memo.get(&key) {
            return done.clone();
        }
        let rebuilt = match region.kind {
            RegionKind::Table => self.rebuild_table(&region.original),
            RegionKind::List => self.rebuild_list(&region.original),
            RegionKind::MsoList => self.rebuild_pseudo_list(&region.original),
        };
        let rebuilt = if structure_balanced(&rebuilt) {
            rebuilt
        } else {
            let err = CleanerError::Reconstruction(format!("{} failed structure check", region.token));
            tracing::warn!(error = %err, "Keeping original region");
            region.original.clone()
        };
        self.memo.insert(key, rebuilt.clone());
        rebuilt
    }

    fn memo_key(&self, kind: RegionKind, fragment: &str) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(format!("{kind:?}|{:?}|", self.strategy).as_bytes());
        hasher.update(self.policy.fingerprint().as_bytes());
        hasher.update(b"|");
        hasher.update(fragment.as_bytes());
        hasher.finalize()
    }

    /// Canonical table: presentational attributes with defaults, an optional
    /// bare `<caption>`, rows and cells in source order, cells keeping only
    /// `width` and `valign`.
    pub fn rebuild_table(&mut self, table: &str) -> String {
        let attrs = TABLE_OPEN
            .regex()
            .ok()
            .and_then(|re| re.captures(table))
            .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .unwrap_or_default();
        let border = capture(&BORDER, &attrs).unwrap_or("1");
        let cellspacing = capture(&CELLSPACING, &attrs).unwrap_or("0");
        let cellpadding = capture(&CELLPADDING, &attrs).unwrap_or("0");

        let inner = TABLE_CLOSE.replace(&TABLE_OPEN.replace(table, ""), "");
        let rows = balanced_spans(&inner, &["tr"]);
        if rows.is_empty() && !strip_all_tags(&inner).is_empty() {
            return table.to_string();
        }

        let mut out = format!(
            "<table border=\"{border}\" cellspacing=\"{cellspacing}\" cellpadding=\"{cellpadding}\">\n"
        );
        // A caption can only precede the first row.
        let head = &inner[..rows.first().map_or(inner.len(), |row| row.start)];
        if let Some(span) = balanced_spans(head, &["caption"]).into_iter().next() {
            let caption = CAPTION_CLOSE.replace(&CAPTION_OPEN.replace(&head[span], ""), "");
            let caption = self.clean_cell(&caption);
            if !caption.is_empty() {
                out.push_str(&format!("<caption>{caption}</caption>\n"));
            }
        }
        for row in rows {
            let row_inner = ROW_CLOSE.replace(&ROW_OPEN.replace(&inner[row], ""), "");
            out.push_str("<tr>\n");
            for cell in balanced_spans(&row_inner, &["td", "th"]) {
                self.push_cell(&row_inner[cell], &mut out);
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>");
        out
    }

    fn push_cell(&mut self, cell: &str, out: &mut String) {
        let (tag, attrs) = CELL_OPEN
            .regex()
            .ok()
            .and_then(|re| re.captures(cell))
            .map(|caps| {
                let tag = caps.get(1).map_or("td", |m| m.as_str()).to_ascii_lowercase();
                let attrs = caps.get(2).map_or("", |m| m.as_str()).to_string();
                (tag, attrs)
            })
            .unwrap_or_else(|| ("td".to_string(), String::new()));

        let mut kept = String::new();
        if let Some(width) = capture(&WIDTH, &attrs) {
            kept.push_str(&format!(" width=\"{width}\""));
        }
        if let Some(valign) = capture(&VALIGN, &attrs) {
            kept.push_str(&format!(" valign=\"{valign}\""));
        }

        let content = CELL_CLOSE.replace(&CELL_OPEN.replace(cell, ""), "");
        let content = self.clean_cell(&content);
        out.push_str(&format!("  <{tag}{kept}>\n  {content}\n  </{tag}>\n"));
    }

    fn clean_cell(&mut self, content: &str) -> String {
        let mut cleaned = String::with_capacity(content.len());
        let mut last = 0;
        for span in balanced_spans(content, &["table"]) {
            cleaned.push_str(&content[last..span.start]);
            cleaned.push_str(&self.rebuild_table(&content[span.clone()]));
            last = span.end;
        }
        cleaned.push_str(&content[last..]);

        let cleaned = apply_rules(&MAIN_RULES, &cleaned, self.policy, None);
        let cleaned = CELL_SPAN.replace(&CELL_P.replace(&cleaned, "<p>"), "<span>");
        let cleaned = CELL_P_SPAN.replace(&cleaned, "<p>${1}</p>");
        let cleaned = CELL_NESTED_P.replace(&cleaned, "<p>");
        let cleaned = CELL_DOUBLE_CLOSE.replace(&cleaned, "</p>");
        balance_tags(&cleaned).trim().to_string()
    }

    /// A genuine list: marker comments dropped, main rules applied, every
    /// attribute of `ul`/`ol`/`li` removed.
    pub fn rebuild_list(&self, list: &str) -> String {
        let cleaned = LIST_MARKERS.replace(list, "");
        let cleaned = apply_rules(&MAIN_RULES, &cleaned, self.policy, None);
        let cleaned = LIST_TAG.replace(&cleaned, "<${1}>");
        LI_TRAILING.replace(&cleaned, "<li>")
    }

    /// A run of Word list paragraphs turned into a real list.
    pub fn rebuild_pseudo_list(&self, run: &str) -> String {
        let items: Vec<String> = match ITEM_SPLIT.regex() {
            Ok(re) => re.split(run).map(str::to_string).collect(),
            Err(_) => vec![run.to_string()],
        };
        let last = items.len().saturating_sub(1);
        let tag = match self.strategy {
            ListStrategy::DetectOrdered if items.first().is_some_and(|first| is_ordered_marker(first)) => "ol",
            _ => "ul",
        };

        let mut out = format!("<{tag}>\n");
        for (i, item) in items.iter().enumerate() {
            let mut item = item.clone();
            if i == 0 {
                item = FIRST_ITEM_OPEN.replace(&item, "");
            }
            if i == last {
                item = LAST_ITEM_CLOSE.replace(&item, "");
            }
            let item = LIST_MARKERS.replace(&item, "");
            let item = apply_rules(&MAIN_RULES, &item, self.policy, None);
            let item = item.trim();
            if !item.is_empty() {
                out.push_str(&format!("  <li>{item}</li>\n"));
            }
        }
        out.push_str(&format!("</{tag}>"));
        out
    }
}

fn capture<'h>(pattern: &Pattern, haystack: &'h str) -> Option<&'h str> {
    pattern
        .regex()
        .ok()?
        .captures(haystack)?
        .get(1)
        .map(|m| m.as_str())
}

/// Inspects the Word list marker (`<!--[if !supportLists]-->…<!--[endif]-->`)
/// of a paragraph.
fn is_ordered_marker(item: &str) -> bool {
    let Ok(re) = LIST_MARKERS.regex() else {
        return false;
    };
    let Some(marker) = re.find(item) else {
        return false;
    };
    let text = strip_all_tags(marker.as_str())
        .replace("&nbsp;", " ")
        .replace('\u{a0}', " ");
    ORDINAL.is_match(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::markup::tag_counts;

    const WORD_TABLE: &str = r#"<table class="MsoTableGrid" border=0 cellpadding="5" style="border-collapse:collapse"><tr style="height:12pt"><td width="200" valign=top style="mso-border-alt:solid"><p class="MsoNormal"><span style="font-size:11pt">A1<o:p></o:p></span></p></td><th width="50%">B1</th></tr><tr><td>A2</td><td>B2</td></tr></table>"#;

    #[test]
    fn table_keeps_rows_cells_and_allowed_attributes() {
        let policy = CleaningPolicy::clean_everything();
        let mut rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        let out = rebuilder.rebuild_table(WORD_TABLE);
        assert!(out.starts_with("<table border=\"0\" cellspacing=\"0\" cellpadding=\"5\">"));
        assert_eq!(tag_counts(&out, "tr"), (2, 2));
        assert_eq!(tag_counts(&out, "td"), (3, 3));
        assert_eq!(tag_counts(&out, "th"), (1, 1));
        assert!(out.contains("<td width=\"200\" valign=\"top\">"));
        assert!(out.contains("<th width=\"50%\">"));
        assert!(out.contains("<p>A1</p>"));
        assert!(!out.contains("Mso"));
        assert!(!out.contains("style"));
    }

    #[test]
    fn rebuilding_a_rebuilt_table_changes_nothing() {
        let policy = CleaningPolicy::clean_everything();
        let mut rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        let once = rebuilder.rebuild_table(WORD_TABLE);
        let twice = rebuilder.rebuild_table(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn nested_tables_are_rebuilt_inside_cells() {
        let policy = CleaningPolicy::clean_everything();
        let mut rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        let html = "<table><tr><td><table style=\"x\"><tr><td>inner</td></tr></table></td></tr></table>";
        let out = rebuilder.rebuild_table(html);
        assert_eq!(tag_counts(&out, "table"), (2, 2));
        assert_eq!(tag_counts(&out, "td"), (2, 2));
        assert!(out.contains("inner"));
    }

    #[test]
    fn genuine_list_loses_attributes() {
        let policy = CleaningPolicy::clean_everything();
        let rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        let out = rebuilder.rebuild_list(r#"<ul type="disc" style="margin:0"><li class="MsoNormal" style="mso-list:l0">One</li></ul>"#);
        assert_eq!(out, "<ul><li>One</li></ul>");
    }

    const PSEUDO_LIST: &str = "<p class=\"MsoListParagraphCxSpFirst\" style=\"text-indent:-18pt;mso-list:l0 level1 lfo1\"><!--[if !supportLists]--><span style=\"mso-list:Ignore\">1.<span>&nbsp;&nbsp; </span></span><!--[endif]-->First</p>\n<p class=\"MsoListParagraphCxSpLast\"><!--[if !supportLists]--><span>2.</span><!--[endif]-->Second</p>";

    #[test]
    fn pseudo_list_is_unordered_on_the_pattern_strategy() {
        let policy = CleaningPolicy::clean_everything();
        let rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        assert_eq!(
            rebuilder.rebuild_pseudo_list(PSEUDO_LIST),
            "<ul>\n  <li>First</li>\n  <li>Second</li>\n</ul>"
        );
    }

    #[test]
    fn pseudo_list_detects_ordinal_markers() {
        let policy = CleaningPolicy::clean_everything();
        let rebuilder = Reconstructor::new(&policy, ListStrategy::DetectOrdered);
        assert!(rebuilder.rebuild_pseudo_list(PSEUDO_LIST).starts_with("<ol>"));

        let bullets = PSEUDO_LIST.replace("1.", "\u{b7}");
        assert!(rebuilder.rebuild_pseudo_list(&bullets).starts_with("<ul>"));
    }

    #[test]
    fn captions_survive_as_bare_captions() {
        let policy = CleaningPolicy::clean_everything();
        let mut rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        let html = r#"<table class="MsoTableGrid"><caption class="MsoCaption" style="mso-x:1">Quarterly totals</caption><tr><td>1</td></tr></table>"#;
        let out = rebuilder.rebuild_table(html);
        assert!(out.starts_with("<table border=\"1\" cellspacing=\"0\" cellpadding=\"0\">\n<caption>Quarterly totals</caption>\n<tr>"), "{out}");
        assert_eq!(rebuilder.rebuild_table(&out), out);
    }

    #[test]
    fn nested_table_captions_stay_in_their_cell() {
        let policy = CleaningPolicy::clean_everything();
        let mut rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        let html = "<table><tr><td><table><caption>inner</caption><tr><td>x</td></tr></table></td></tr></table>";
        let out = rebuilder.rebuild_table(html);
        assert_eq!(tag_counts(&out, "caption"), (1, 1));
        assert!(out.find("<caption>").is_some_and(|at| at > out.find("<td>").unwrap_or(usize::MAX)));
    }

    #[test]
    fn rejected_rebuild_keeps_the_original_region() {
        let policy = CleaningPolicy::clean_everything();
        let mut rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        let region = ProtectedRegion {
            token: "[[LIST_MARKER_0]]".to_string(),
            kind: RegionKind::List,
            original: r#"<ul class="x"><li>a</li></ul></ul>"#.to_string(),
        };
        assert_eq!(rebuilder.rebuild(&region), region.original);
    }

    #[test]
    fn table_without_rows_is_kept() {
        let policy = CleaningPolicy::clean_everything();
        let mut rebuilder = Reconstructor::new(&policy, ListStrategy::Unordered);
        let html = "<table>stray text</table>";
        assert_eq!(rebuilder.rebuild_table(html), html);
    }
}
