//! Low-level markup helpers shared by both cleaning paths.

use std::borrow::Cow;
use std::ops::Range;

use super::regex::Pattern;

/// Elements that never have a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Element names whose open/close counts must survive cleaning.
const STRUCTURAL: &[&str] = &["table", "tr", "td", "th", "ul", "ol", "li"];

/// A comment, or a start/end tag with its name and remaining attribute text.
static TAG: Pattern = Pattern::new(
    "tag",
    r"(?s)<!--.*?-->|<(/?)([a-zA-Z][a-zA-Z0-9:_-]*)([^>]*)>",
);

static SCRIPT_STYLE: Pattern = Pattern::new(
    "script_style_blocks",
    r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>",
);
static COMMENT: Pattern = Pattern::new("comments", r"(?s)<!--.*?-->");
static ANY_TAG: Pattern = Pattern::new("any_tag", r"<[a-zA-Z/!?][^>]*>");

/// Complex-structure tags; their presence routes short fields to the full pipeline.
static COMPLEX_TAG: Pattern = Pattern::new("complex_tag", r"(?i)<(?:table|div|ul|ol|h1|h2|h3)\b");
static OPEN_TAG: Pattern = Pattern::new("open_tag", r"<[a-zA-Z][^>]*>");

/// Tag count above which a fragment counts as complex.
const COMPLEX_TAG_COUNT: usize = 10;

struct Tag<'h> {
    range: Range<usize>,
    closing: bool,
    name: String,
    self_closing: bool,
    text: &'h str,
}

/// Scans `html` for tags, skipping comments.
fn tags(html: &str) -> Vec<Tag<'_>> {
    let Ok(re) = TAG.regex() else {
        return Vec::new();
    };
    re.captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(2)?;
            let rest = caps.get(3).map_or("", |m| m.as_str());
            Some(Tag {
                range: whole.range(),
                closing: caps.get(1).is_some_and(|m| !m.is_empty()),
                name: name.as_str().to_ascii_lowercase(),
                self_closing: rest.trim_end().ends_with('/'),
                text: whole.as_str(),
            })
        })
        .collect()
}

/// Byte ranges of every outermost element named in `names`, matched with
/// depth counting so nested structures stay inside their parent's span.
///
/// Names in the set share one depth counter (`ul` and `ol` nest in each
/// other). Unclosed elements produce no span.
pub fn balanced_spans(html: &str, names: &[&str]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for tag in tags(html) {
        if !names.contains(&tag.name.as_str()) || tag.self_closing {
            continue;
        }
        if !tag.closing {
            if depth == 0 {
                start = tag.range.start;
            }
            depth += 1;
        } else if depth > 0 {
            depth -= 1;
            if depth == 0 {
                spans.push(start..tag.range.end);
            }
        }
    }
    spans
}

/// Close unclosed elements, drop stray closing tags and close a `<p>` that
/// is followed by another `<p>` opener. Void elements are ignored.
pub fn balance_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + 16);
    let mut stack: Vec<String> = Vec::new();
    let mut last = 0;

    for tag in tags(html) {
        out.push_str(&html[last..tag.range.start]);
        last = tag.range.end;
        let is_void = VOID_ELEMENTS.contains(&tag.name.as_str());

        if tag.closing {
            if is_void {
                continue;
            }
            if let Some(pos) = stack.iter().rposition(|open| *open == tag.name) {
                let unclosed: Vec<String> = stack.drain(pos + 1..).collect();
                for name in unclosed.iter().rev() {
                    out.push_str(&format!("</{name}>"));
                }
                stack.pop();
                out.push_str(tag.text);
            }
        } else {
            if tag.name == "p" && stack.last().is_some_and(|top| top == "p") {
                stack.pop();
                out.push_str("</p>");
            }
            if !is_void && !tag.self_closing {
                stack.push(tag.name);
            }
            out.push_str(tag.text);
        }
    }
    out.push_str(&html[last..]);
    for name in stack.iter().rev() {
        out.push_str(&format!("</{name}>"));
    }
    out
}

/// `true` when every structural element (table, row, cell, list, item) has
/// as many closing tags as opening tags.
pub fn structure_balanced(html: &str) -> bool {
    let mut counts = [0isize; STRUCTURAL.len()];
    for tag in tags(html) {
        if tag.self_closing {
            continue;
        }
        if let Some(i) = STRUCTURAL.iter().position(|name| *name == tag.name) {
            counts[i] += if tag.closing { -1 } else { 1 };
        }
    }
    counts.iter().all(|c| *c == 0)
}

/// Count of `(opening, closing)` tags for one element name.
pub fn tag_counts(html: &str, name: &str) -> (usize, usize) {
    tags(html)
        .iter()
        .filter(|tag| tag.name == name && !tag.self_closing)
        .fold((0, 0), |(open, close), tag| {
            if tag.closing {
                (open, close + 1)
            } else {
                (open + 1, close)
            }
        })
}

/// Remove script/style blocks, comments and every tag, then trim.
pub fn strip_all_tags(html: &str) -> String {
    let without_blocks = SCRIPT_STYLE.replace(html, "");
    let without_comments = COMMENT.replace(&without_blocks, "");
    ANY_TAG.replace(&without_comments, "").trim().to_string()
}

/// Contains a table, div, list or top-level heading, or more than ten tags.
pub fn has_complex_html(html: &str) -> bool {
    COMPLEX_TAG.is_match(html) || OPEN_TAG.count(html) > COMPLEX_TAG_COUNT
}

/// `true` if the content carries backslash-escaped quotes.
pub fn has_escaped_quotes(content: &str) -> bool {
    content.contains("\\\"") || content.contains("\\'")
}

/// Remove one level of backslash escaping (`\x` becomes `x`, `\\` becomes `\`).
pub fn unescape_slashes(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Backslash-escape quotes and backslashes.
pub fn add_slashes(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 8);
    for c in content.chars() {
        if matches!(c, '\\' | '"' | '\'') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Unescape only when escaped quotes are present.
pub fn unescape_if_needed(content: &str) -> Cow<'_, str> {
    if has_escaped_quotes(content) {
        Cow::Owned(unescape_slashes(content))
    } else {
        Cow::Borrowed(content)
    }
}

pub fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

pub fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// `Mso`/`mso` followed by one or more ASCII alphanumerics.
pub fn is_mso_class(token: &str) -> bool {
    token
        .strip_prefix("Mso")
        .or_else(|| token.strip_prefix("mso"))
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Drop Word class tokens from a class attribute value.
pub fn filter_mso_classes(value: &str) -> String {
    value
        .split_whitespace()
        .filter(|token| !is_mso_class(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary.
pub fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
