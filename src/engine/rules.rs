//! The ordered substitution rules of the pattern path.
//!
//! Rules are data: a named [`Pattern`], a replacement, and the policy switch
//! that gates it. Order matters; [`MAIN_RULES`] runs top to bottom.

use std::collections::BTreeMap;

use regex::Captures;

use super::markup::filter_mso_classes;
use super::regex::Pattern;
use crate::policy::{CleaningPolicy, Switch};

/// What a match is replaced with.
pub enum Replacement {
    /// A `regex` expansion template (`${1}` style).
    Template(&'static str),
    /// A function of the captures.
    With(fn(&Captures<'_>) -> String),
}

pub struct Rule {
    pub pattern: Pattern,
    pub replacement: Replacement,
    /// `None` means always on.
    pub gate: Option<Switch>,
}

impl Rule {
    const fn new(name: &'static str, source: &'static str, replacement: &'static str, gate: Switch) -> Self {
        Self {
            pattern: Pattern::new(name, source),
            replacement: Replacement::Template(replacement),
            gate: Some(gate),
        }
    }

    const fn with(
        name: &'static str,
        source: &'static str,
        f: fn(&Captures<'_>) -> String,
        gate: Switch,
    ) -> Self {
        Self {
            pattern: Pattern::new(name, source),
            replacement: Replacement::With(f),
            gate: Some(gate),
        }
    }

    const fn always(name: &'static str, source: &'static str, replacement: &'static str) -> Self {
        Self {
            pattern: Pattern::new(name, source),
            replacement: Replacement::Template(replacement),
            gate: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.pattern.name()
    }

    pub fn enabled(&self, policy: &CleaningPolicy) -> bool {
        self.gate.is_none_or(|switch| policy.get(switch))
    }

    /// Apply this rule, returning the input unchanged if it cannot run.
    pub fn apply(&self, input: &str) -> String {
        match &self.replacement {
            Replacement::Template(template) => self.pattern.replace(input, *template),
            Replacement::With(f) => self.pattern.replace(input, |caps: &Captures<'_>| f(caps)),
        }
    }
}

/// Per-rule match counts.
pub type RuleCounts = BTreeMap<&'static str, usize>;

/// Run every enabled rule of `rules` in order.
pub fn apply_rules(rules: &[Rule], input: &str, policy: &CleaningPolicy, counts: Option<&mut RuleCounts>) -> String {
    let mut counts = counts;
    rules
        .iter()
        .filter(|rule| rule.enabled(policy))
        .fold(input.to_string(), |acc, rule| {
            if let Some(counts) = counts.as_deref_mut() {
                let hits = rule.pattern.count(&acc);
                if hits > 0 {
                    *counts.entry(rule.name()).or_default() += hits;
                }
            }
            rule.apply(&acc)
        })
}

/// Run only the rules gated by one of `gates`.
pub fn apply_gated(rules: &[Rule], gates: &[Switch], input: &str, policy: &CleaningPolicy) -> String {
    rules
        .iter()
        .filter(|rule| rule.gate.is_some_and(|g| gates.contains(&g)) && rule.enabled(policy))
        .fold(input.to_string(), |acc, rule| rule.apply(&acc))
}

/// Switches whose rules make up the reduced set for short text fields.
pub const SIMPLE_TEXT_GATES: &[Switch] = &[
    Switch::XmlNamespaces,
    Switch::ConditionalComments,
    Switch::MsoClasses,
    Switch::MsoStyles,
];

/// Switches whose rules apply to the contents of a text node.
pub const TEXT_NODE_GATES: &[Switch] = &[Switch::XmlNamespaces, Switch::ConditionalComments];

/// Declaration values may hold entities (`&quot;`), whose `;` does not end the value.
static MSO_DECLARATION: Pattern = Pattern::new(
    "mso_declaration",
    r"(?i)\s*mso-[^:;]+:(?:&#?[a-z0-9]+;|[^;])*;?",
);
static FONT_DECLARATION: Pattern = Pattern::new(
    "font_declaration",
    r"(?i)\s*(?:font-family|font-size|font-weight|font-style|line-height)\s*:(?:&#?[a-z0-9]+;|[^;])*;?",
);

pub fn strip_mso_declarations(style: &str) -> String {
    MSO_DECLARATION.replace(style, "").trim().to_string()
}

pub fn strip_font_declarations(style: &str) -> String {
    FONT_DECLARATION.replace(style, "").trim().to_string()
}

/// Rebuilds a matched `class` attribute (prefix in group 1, value in 2 or 3).
fn rewrite_class(caps: &Captures<'_>) -> String {
    rewrite_attribute(caps, "class", filter_mso_classes)
}

fn rewrite_mso_style(caps: &Captures<'_>) -> String {
    rewrite_attribute(caps, "style", strip_mso_declarations)
}

fn rewrite_font_style(caps: &Captures<'_>) -> String {
    rewrite_attribute(caps, "style", strip_font_declarations)
}

fn rewrite_attribute(caps: &Captures<'_>, name: &str, clean: fn(&str) -> String) -> String {
    let prefix = caps.get(1).map_or("", |m| m.as_str());
    let (value, quote) = match (caps.get(2), caps.get(3)) {
        (Some(m), _) => (m.as_str(), '"'),
        (None, Some(m)) => (m.as_str(), '\''),
        (None, None) => ("", '"'),
    };
    let cleaned = clean(value);
    if cleaned.is_empty() {
        prefix.trim_end().to_string()
    } else {
        format!("{prefix}{name}={quote}{cleaned}{quote}")
    }
}

/// The main pipeline, in application order.
pub static MAIN_RULES: [Rule; 20] = [
    Rule::new("o_tags", r"(?i)</?o:p\s*/?>", "", Switch::XmlNamespaces),
    Rule::new(
        "xml_namespace_tags",
        r"(?i)</?[a-z][a-z0-9]*:[a-z][a-z0-9]*\b[^>]*>",
        "",
        Switch::XmlNamespaces,
    ),
    Rule::new(
        "list_marker_comments",
        r"(?is)<!--\[if [^\]]*\]-->.*?<!--\[endif\]-->",
        "",
        Switch::ConditionalComments,
    ),
    Rule::new(
        "conditional_comments",
        r"(?is)<!--\[if.*?\]>.*?<!\[endif\]-->",
        "",
        Switch::ConditionalComments,
    ),
    Rule::new(
        "downlevel_conditionals",
        r"(?is)<!\[if.*?\]>.*?<!\[endif\]>",
        "",
        Switch::ConditionalComments,
    ),
    Rule::with(
        "mso_classes",
        r#"(?i)(<[a-z][^>]*?\s)class\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        rewrite_class,
        Switch::MsoClasses,
    ),
    Rule::with(
        "mso_style_declarations",
        r#"(?i)(<[a-z][^>]*?\s)style\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        rewrite_mso_style,
        Switch::MsoStyles,
    ),
    Rule::new(
        "loose_mso_declarations",
        r#"(?i)(<[a-z][^>]*?)\s+mso-[a-z0-9-]*\s*:[^;>"']*;?"#,
        "${1}",
        Switch::MsoStyles,
    ),
    Rule::with(
        "font_declarations",
        r#"(?i)(<[a-z][^>]*?\s)style\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        rewrite_font_style,
        Switch::FontAttributes,
    ),
    Rule::new(
        "loose_font_declarations",
        r#"(?i)(<[a-z][^>]*?)\s+(?:font-family|font-size|font-weight|font-style|line-height)\s*:[^;>"']*;?"#,
        "${1}",
        Switch::FontAttributes,
    ),
    Rule::new("tag_trailing", r"(?i)(<[a-z][^>]*?)[;\s]+>", "${1}>", Switch::FontAttributes),
    Rule::new(
        "block_style_attributes",
        r#"(?i)(<(?:p|span|li|td|tr|th|div|ul|ol|table)\b[^>]*?)\s+style\s*=\s*(?:"[^"]*"|'[^']*')"#,
        "${1}",
        Switch::StyleAttributes,
    ),
    Rule::new(
        "lang_attributes",
        r#"(?i)(<[a-z][^>]*?)\s+lang\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+)"#,
        "${1}",
        Switch::LangAttributes,
    ),
    Rule::new(
        "mso_attributes",
        r#"(?i)(<[a-z][^>]*?)\s+mso-[a-z0-9-]*\s*=\s*(?:"[^"]*"|'[^']*')"#,
        "${1}",
        Switch::MsoStyles,
    ),
    Rule::new(
        "all_style_attributes",
        r#"(?i)(<[a-z][^>]*?)\s+style\s*=\s*(?:"[^"]*"|'[^']*')"#,
        "${1}",
        Switch::StripAllStyles,
    ),
    Rule::new("empty_spans", r"(?is)<span>\s*</span>", "", Switch::EmptyElements),
    Rule::new("empty_attributed_spans", r"(?is)<span\s[^>]*>\s*</span>", "", Switch::EmptyElements),
    Rule::new("empty_class", r#"(?i)\s+class\s*=\s*(?:"\s*"|'\s*')"#, "", Switch::EmptyElements),
    Rule::new("empty_style", r#"(?i)\s+style\s*=\s*(?:"\s*"|'\s*')"#, "", Switch::EmptyElements),
    Rule::new("empty_lang", r#"(?i)\s+lang\s*=\s*(?:"\s*"|'\s*')"#, "", Switch::EmptyElements),
];

/// Structural repairs applied after regions are restored.
pub static REPAIR_RULES: [Rule; 8] = [
    Rule::always("p_before_table", r"(?is)<p>\s*(<table\b[^>]*>)", "${1}"),
    Rule::always("p_after_table", r"(?is)(</table>)\s*</p>", "${1}"),
    Rule::always("p_before_list", r"(?is)<p>\s*(<(?:ul|ol)\b[^>]*>)", "${1}"),
    Rule::always("p_after_list", r"(?is)(</(?:ul|ol)>)\s*</p>", "${1}"),
    Rule::always("p_span", r"(?is)<p>\s*<span>([^<]*)</span>\s*</p>", "<p>${1}</p>"),
    Rule::always("nested_p", r"(?is)<p(\s[^>]*)?>\s*<p(?:\s[^>]*)?>", "<p${1}>"),
    Rule::always("double_p_close", r"(?is)</p>\s*</p>", "</p>"),
    Rule::always("li_trailing", r"(?s)<li>\s*>\s*", "<li>"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> String {
        apply_rules(&MAIN_RULES, input, &CleaningPolicy::clean_everything(), None)
    }

    #[test]
    fn removes_office_paragraph_tags_without_eating_spaces() {
        assert_eq!(run("Hello<o:p></o:p> World"), "Hello World");
    }

    #[test]
    fn removes_namespaced_tags() {
        assert_eq!(run("<p>a<w:Sdt id=\"1\">b</w:Sdt></p>"), "<p>ab</p>");
        assert_eq!(run("<p>in <st1:City>Paris</st1:City></p>"), "<p>in Paris</p>");
    }

    #[test]
    fn removes_conditional_blocks() {
        let html = "<p>a</p><!--[if gte mso 9]><xml><w:WordDocument></w:WordDocument></xml><![endif]--><p>b</p>";
        assert_eq!(run(html), "<p>a</p><p>b</p>");
        assert_eq!(run("<![if !supportLists]>1.<![endif]>Item"), "Item");
    }

    #[test]
    fn filters_class_tokens_and_drops_empty_attribute() {
        assert_eq!(run("<p class=\"MsoNormal lead\">x</p>"), "<p class=\"lead\">x</p>");
        assert_eq!(run("<p class='MsoNormal'>x</p>"), "<p>x</p>");
    }

    #[test]
    fn strips_style_attributes_on_block_elements() {
        let html = "<p style=\"mso-margin-top-alt:auto;color:red\">x</p>";
        assert_eq!(run(html), "<p>x</p>");
    }

    #[test]
    fn keeps_non_word_styles_when_only_mso_styles_enabled() {
        let policy = CleaningPolicy::none().with(Switch::MsoStyles, true);
        let html = "<p style=\"mso-bidi-font-size:11pt; color:red\">x</p>";
        assert_eq!(apply_rules(&MAIN_RULES, html, &policy, None), "<p style=\"color:red\">x</p>");
    }

    #[test]
    fn declarations_with_entities_are_removed_whole() {
        let style = "font-size:14.0pt;mso-fareast-font-family:&quot;Times New Roman&quot;;color:red";
        assert_eq!(strip_mso_declarations(style), "font-size:14.0pt;color:red");
        assert_eq!(strip_font_declarations("font-family:&quot;Arial&quot;,sans-serif;color:red"), "color:red");
    }

    #[test]
    fn font_declarations_leave_other_styles() {
        let policy = CleaningPolicy::none().with(Switch::FontAttributes, true);
        let html = "<a style=\"font-family:Calibri;color:blue\">x</a>";
        assert_eq!(apply_rules(&MAIN_RULES, html, &policy, None), "<a style=\"color:blue\">x</a>");
    }

    #[test]
    fn removes_lang_and_empty_spans() {
        assert_eq!(run("<p><span lang=EN-US></span>text</p>"), "<p>text</p>");
    }

    #[test]
    fn disabled_rules_do_not_run() {
        let html = "<p class=\"MsoNormal\">x<o:p></o:p></p>";
        assert_eq!(apply_rules(&MAIN_RULES, html, &CleaningPolicy::none(), None), html);
    }

    #[test]
    fn counts_matches_per_rule() {
        let mut counts = RuleCounts::new();
        apply_rules(&MAIN_RULES, "<o:p></o:p><o:p></o:p>", &CleaningPolicy::clean_everything(), Some(&mut counts));
        assert_eq!(counts.get("o_tags"), Some(&4));
    }

    #[test]
    fn repairs_paragraph_wrapped_tables() {
        let html = "<p><table><tr><td>a</td></tr></table></p><p><span>t</span></p><p></p></p>";
        let out = apply_rules(&REPAIR_RULES, html, &CleaningPolicy::none(), None);
        assert_eq!(out, "<table><tr><td>a</td></tr></table><p>t</p><p></p>");
    }

    #[test]
    fn every_rule_compiles() {
        for rule in MAIN_RULES.iter().chain(REPAIR_RULES.iter()) {
            assert!(rule.pattern.regex().is_ok(), "rule {} failed to compile", rule.name());
        }
    }
}
