//! Tree-based cleaning of a parsed fragment.
//!
//! The fragment is parsed once with `scraper`, walked depth-first to decide
//! what changes, and serialized back with those changes applied. The tree
//! itself is never mutated.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, node::Element, node::Node};

use super::detector::contains_word_markup;
use super::markup::{VOID_ELEMENTS, escape_attr, escape_text, filter_mso_classes};
use super::rules::{MAIN_RULES, TEXT_NODE_GATES, apply_gated, strip_font_declarations, strip_mso_declarations};
use crate::error::{CleanerError, Result};
use crate::policy::CleaningPolicy;

/// More parse errors than this and the fragment goes to the pattern path.
pub const MAX_PARSE_ERRORS: usize = 10;

/// Counters gathered during one tree pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeStatistics {
    pub elements_processed: usize,
    pub elements_cleaned: usize,
    pub elements_skipped: usize,
    /// Changes per cleaning switch.
    pub pattern_counts: BTreeMap<&'static str, usize>,
    pub elapsed: Duration,
}

impl TreeStatistics {
    /// Percentage of processed elements that needed cleaning.
    pub fn efficiency(&self) -> f64 {
        if self.elements_processed == 0 {
            return 0.0;
        }
        self.elements_cleaned as f64 / self.elements_processed as f64 * 100.0
    }

    fn bump(&mut self, pattern: &'static str) {
        *self.pattern_counts.entry(pattern).or_default() += 1;
    }
}

#[derive(Debug)]
pub struct TreeOutput {
    pub html: String,
    pub stats: TreeStatistics,
}

/// Clean `fragment` through a parsed tree.
///
/// Fails with [`CleanerError::Parse`] when the parser reports more than
/// [`MAX_PARSE_ERRORS`] problems; callers fall back to the pattern path.
pub fn clean(fragment: &str, policy: &CleaningPolicy) -> Result<TreeOutput> {
    let started = Instant::now();
    if fragment.trim().is_empty() {
        return Ok(TreeOutput {
            html: fragment.to_string(),
            stats: TreeStatistics::default(),
        });
    }

    let document = Html::parse_fragment(fragment);
    if document.errors.len() > MAX_PARSE_ERRORS {
        return Err(CleanerError::Parse(format!(
            "{} parse errors, first: {}",
            document.errors.len(),
            document.errors.first().map_or("", |e| e.as_ref())
        )));
    }

    let root = document.root_element();
    let mut walker = Walker {
        policy,
        edits: Edits {
            drop_conditionals: policy.conditional_comments,
            ..Edits::default()
        },
        stats: TreeStatistics::default(),
    };
    for child in root.children() {
        walker.visit(child);
    }

    let mut html = String::with_capacity(fragment.len());
    walker.edits.serialize_children(*root, &mut html);

    let mut stats = walker.stats;
    stats.elapsed = started.elapsed();
    Ok(TreeOutput { html, stats })
}

struct Walker<'p> {
    policy: &'p CleaningPolicy,
    edits: Edits,
    stats: TreeStatistics,
}

impl Walker<'_> {
    fn visit(&mut self, node: NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => self.visit_text(node.id(), text),
            Node::Element(el) => {
                self.visit_element(node, el);
                for child in node.children() {
                    self.visit(child);
                }
            }
            Node::Comment(comment) => {
                if self.policy.conditional_comments && conditional_kind(comment).is_some() {
                    self.stats.bump("conditional_comments");
                }
            }
            _ => {}
        }
    }

    fn visit_text(&mut self, id: NodeId, text: &str) {
        if !contains_word_markup(text) {
            return;
        }
        let cleaned = apply_gated(&MAIN_RULES, TEXT_NODE_GATES, text, self.policy);
        if cleaned != text {
            self.stats.bump("text_patterns");
            self.edits.texts.insert(id, cleaned);
        }
    }

    fn visit_element(&mut self, node: NodeRef<'_, Node>, el: &Element) {
        self.stats.elements_processed += 1;
        if self.policy.xml_namespaces && el.name().contains(':') {
            self.edits.unwrap.insert(node.id());
            self.stats.bump("xml_namespaces");
            self.stats.elements_cleaned += 1;
            return;
        }

        let markup = ElementRef::wrap(node).map(|e| e.html()).unwrap_or_default();
        if !contains_word_markup(&markup) {
            self.stats.elements_skipped += 1;
            return;
        }
        if let Some(attrs) = self.clean_attributes(el) {
            self.edits.attrs.insert(node.id(), attrs);
            self.stats.elements_cleaned += 1;
        }
    }

    /// The element's attributes after cleaning, or `None` if unchanged.
    fn clean_attributes(&mut self, el: &Element) -> Option<Vec<(String, String)>> {
        let policy = self.policy;
        let original: Vec<(String, String)> =
            el.attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let mut attrs = Vec::with_capacity(original.len());

        for (name, value) in &original {
            let lower = name.to_ascii_lowercase();
            let kept = match lower.as_str() {
                "class" if policy.mso_classes => {
                    let filtered = filter_mso_classes(value);
                    if filtered != value.trim() {
                        self.stats.bump("mso_classes");
                    }
                    Some(filtered)
                }
                "style" => {
                    let mut style = value.trim().to_string();
                    if policy.style_attributes && policy.mso_styles {
                        let next = strip_mso_declarations(&style);
                        if next != style {
                            self.stats.bump("mso_styles");
                        }
                        style = next;
                    }
                    if policy.font_attributes {
                        let next = strip_font_declarations(&style);
                        if next != style {
                            self.stats.bump("font_attributes");
                        }
                        style = next;
                    }
                    if policy.strip_all_styles && !style.is_empty() {
                        self.stats.bump("strip_all_styles");
                        style.clear();
                    }
                    Some(style)
                }
                "lang" if policy.lang_attributes => {
                    self.stats.bump("lang_attributes");
                    None
                }
                _ if policy.mso_styles && lower.starts_with("mso-") => {
                    self.stats.bump("mso_styles");
                    None
                }
                _ => Some(value.clone()),
            };
            match kept {
                Some(v) if v.trim().is_empty() && matches!(lower.as_str(), "class" | "style") => {}
                Some(v) => attrs.push((name.clone(), v)),
                None => {}
            }
        }

        (attrs != original).then_some(attrs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Conditional {
    /// `[if …]>…<![endif]` in a single comment.
    Complete,
    /// `[if …]` opening a range of siblings.
    Open,
    /// `[endif]` closing a range.
    End,
}

fn conditional_kind(comment: &str) -> Option<Conditional> {
    let text = comment.trim_start();
    if text.starts_with("[if") {
        if text.contains("endif") {
            Some(Conditional::Complete)
        } else {
            Some(Conditional::Open)
        }
    } else if text.starts_with("[endif") {
        Some(Conditional::End)
    } else {
        None
    }
}

#[derive(Default)]
struct Edits {
    attrs: HashMap<NodeId, Vec<(String, String)>>,
    texts: HashMap<NodeId, String>,
    unwrap: HashSet<NodeId>,
    drop_conditionals: bool,
}

impl Edits {
    fn serialize_children(&self, node: NodeRef<'_, Node>, out: &mut String) {
        let children: Vec<NodeRef<'_, Node>> = node.children().collect();
        let mut i = 0;
        while i < children.len() {
            let child = children[i];
            if self.drop_conditionals {
                if let Node::Comment(comment) = child.value() {
                    match conditional_kind(comment) {
                        Some(Conditional::Complete | Conditional::End) => {
                            i += 1;
                            continue;
                        }
                        Some(Conditional::Open) => {
                            let end = children[i + 1..].iter().position(|n| {
                                matches!(n.value(), Node::Comment(c) if conditional_kind(c) == Some(Conditional::End))
                            });
                            i += end.map_or(1, |pos| pos + 2);
                            continue;
                        }
                        None => {}
                    }
                }
            }
            self.serialize_node(child, out);
            i += 1;
        }
    }

    fn serialize_node(&self, node: NodeRef<'_, Node>, out: &mut String) {
        let id = node.id();
        match node.value() {
            Node::Element(el) => {
                if self.unwrap.contains(&id) {
                    self.serialize_children(node, out);
                    return;
                }
                let tag = el.name();
                out.push('<');
                out.push_str(tag);

                let mut attrs: Vec<(&str, &str)> = match self.attrs.get(&id) {
                    Some(rewritten) => rewritten.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
                    None => el.attrs().collect(),
                };
                attrs.sort_unstable_by(|a, b| a.0.cmp(b.0));
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&tag) {
                    return;
                }
                self.serialize_children(node, out);

                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Node::Text(text) => {
                let text = self.texts.get(&id).map_or(&**text, String::as_str);
                let raw = node
                    .parent()
                    .and_then(|p| p.value().as_element())
                    .is_some_and(|el| matches!(el.name(), "script" | "style"));
                if raw {
                    out.push_str(text);
                } else {
                    escape_text(text, out);
                }
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment.as_ref());
                out.push_str("-->");
            }
            Node::Document | Node::Fragment => self.serialize_children(node, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Switch;

    fn run(html: &str) -> String {
        clean(html, &CleaningPolicy::clean_everything()).unwrap().html
    }

    #[test]
    fn strips_word_classes_and_styles() {
        let html = r#"<p class="MsoNormal lead" style="mso-margin-top-alt:auto;color:red;font-size:12pt" lang="EN-US">Hello</p>"#;
        assert_eq!(run(html), r#"<p class="lead" style="color:red;">Hello</p>"#);
    }

    #[test]
    fn unwraps_namespaced_elements() {
        let html = r#"<p class="MsoNormal">Hello<o:p></o:p> <st1:place>World</st1:place></p>"#;
        assert_eq!(run(html), "<p>Hello World</p>");
    }

    #[test]
    fn drops_conditional_comments_and_their_ranges() {
        let html = "<p class=\"MsoNormal\"><!--[if !supportLists]--><span>1.</span><!--[endif]-->Item</p><!--[if gte mso 9]><xml></xml><![endif]-->";
        assert_eq!(run(html), "<p>Item</p>");
    }

    #[test]
    fn keeps_unrelated_markup_verbatim() {
        let html = r#"<p><a href="/x?a=1&amp;b=2">link</a> &lt;tag&gt;&nbsp;</p>"#;
        assert_eq!(run(html), html);
    }

    #[test]
    fn strip_all_styles_empties_every_style() {
        let policy = CleaningPolicy::none().with(Switch::StripAllStyles, true);
        let html = r#"<p class="MsoNormal" style="color:red">x</p>"#;
        assert_eq!(clean(html, &policy).unwrap().html, r#"<p class="MsoNormal">x</p>"#);
    }

    #[test]
    fn counts_processed_cleaned_and_skipped() {
        let html = r#"<div><p class="MsoNormal">a</p><p>b</p></div>"#;
        let out = clean(html, &CleaningPolicy::clean_everything()).unwrap();
        assert_eq!(out.stats.elements_processed, 3);
        assert_eq!(out.stats.elements_skipped, 1);
        assert_eq!(out.stats.elements_cleaned, 1);
        assert_eq!(out.stats.pattern_counts.get("mso_classes"), Some(&1));
        assert!(out.stats.efficiency() > 33.0);
    }

    #[test]
    fn serialization_is_stable() {
        let html = r#"<p class="MsoNormal" id="a" title="t">x<br>y</p>"#;
        let once = run(html);
        assert_eq!(run(&once), once);
    }

    #[test]
    fn empty_fragment_passes_through() {
        assert_eq!(run("  "), "  ");
    }
}
