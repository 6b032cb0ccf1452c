//! Cleaning policies and the rule evaluator that resolves them.
//!
//! A [`CleaningPolicy`] is the fully-resolved set of boolean switches for one
//! clean operation. [`resolve_policy`] builds it from the built-in defaults
//! for a content type, then overlays whatever a [`PolicyStore`] holds for
//! that type, key by key.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CleanerError, Result};

/// Suffix appended to a content type when a large input is split into chunks.
pub const CHUNK_SUFFIX: &str = "_chunk";

/// One named switch of a [`CleaningPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Switch {
    XmlNamespaces,
    ConditionalComments,
    MsoClasses,
    MsoStyles,
    FontAttributes,
    StyleAttributes,
    LangAttributes,
    EmptyElements,
    ProtectTables,
    ProtectLists,
    StripAllStyles,
    StripAllHtml,
    UseTreeProcessing,
}

impl Switch {
    /// Every switch, in the canonical order used for fingerprints.
    pub const ALL: [Switch; 13] = [
        Switch::XmlNamespaces,
        Switch::ConditionalComments,
        Switch::MsoClasses,
        Switch::MsoStyles,
        Switch::FontAttributes,
        Switch::StyleAttributes,
        Switch::LangAttributes,
        Switch::EmptyElements,
        Switch::ProtectTables,
        Switch::ProtectLists,
        Switch::StripAllStyles,
        Switch::StripAllHtml,
        Switch::UseTreeProcessing,
    ];

    /// The setting name used in stored overrides.
    pub fn name(self) -> &'static str {
        match self {
            Switch::XmlNamespaces => "xml_namespaces",
            Switch::ConditionalComments => "conditional_comments",
            Switch::MsoClasses => "mso_classes",
            Switch::MsoStyles => "mso_styles",
            Switch::FontAttributes => "font_attributes",
            Switch::StyleAttributes => "style_attributes",
            Switch::LangAttributes => "lang_attributes",
            Switch::EmptyElements => "empty_elements",
            Switch::ProtectTables => "protect_tables",
            Switch::ProtectLists => "protect_lists",
            Switch::StripAllStyles => "strip_all_styles",
            Switch::StripAllHtml => "strip_all_html",
            Switch::UseTreeProcessing => "use_tree_processing",
        }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Switch {
    type Err = CleanerError;

    fn from_str(s: &str) -> Result<Self> {
        // `use_dom_processing` is what older stored settings call the tree switch.
        if s == "use_dom_processing" {
            return Ok(Switch::UseTreeProcessing);
        }
        Switch::ALL
            .into_iter()
            .find(|switch| switch.name() == s)
            .ok_or_else(|| CleanerError::Config(format!("unknown cleaning switch `{s}`")))
    }
}

/// The resolved set of boolean cleaning switches for one operation.
///
/// Every field always has a value; there is no "unset" state. Build one with
/// [`resolve_policy`], [`CleaningPolicy::for_content_type`], or by hand for a
/// policy override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningPolicy {
    pub xml_namespaces: bool,
    pub conditional_comments: bool,
    pub mso_classes: bool,
    pub mso_styles: bool,
    pub font_attributes: bool,
    pub style_attributes: bool,
    pub lang_attributes: bool,
    pub empty_elements: bool,
    pub protect_tables: bool,
    pub protect_lists: bool,
    pub strip_all_styles: bool,
    pub strip_all_html: bool,
    pub use_tree_processing: bool,
}

impl CleaningPolicy {
    /// Generic default: remove every kind of Word markup and protect tables
    /// and lists.
    pub const fn clean_everything() -> Self {
        Self {
            xml_namespaces: true,
            conditional_comments: true,
            mso_classes: true,
            mso_styles: true,
            font_attributes: true,
            style_attributes: true,
            lang_attributes: true,
            empty_elements: true,
            protect_tables: true,
            protect_lists: true,
            strip_all_styles: false,
            strip_all_html: false,
            use_tree_processing: true,
        }
    }

    /// A policy with every switch off. Useful as a base for overrides.
    pub const fn none() -> Self {
        Self {
            xml_namespaces: false,
            conditional_comments: false,
            mso_classes: false,
            mso_styles: false,
            font_attributes: false,
            style_attributes: false,
            lang_attributes: false,
            empty_elements: false,
            protect_tables: false,
            protect_lists: false,
            strip_all_styles: false,
            strip_all_html: false,
            use_tree_processing: false,
        }
    }

    /// Built-in defaults for a content type, before any stored overrides.
    ///
    /// Chunk types (`post_chunk`) resolve to their base type's defaults.
    pub fn for_content_type(content_type: &str) -> Self {
        match base_content_type(content_type) {
            "post" | "page" | "wp_content" | "acf_wysiwyg" | "acf_block_field"
            | "acf_block_content" => Self::clean_everything(),
            "acf_text" | "acf_textarea" => Self {
                font_attributes: false,
                style_attributes: false,
                lang_attributes: false,
                empty_elements: false,
                protect_tables: false,
                protect_lists: false,
                ..Self::clean_everything()
            },
            "excerpt" => Self {
                protect_tables: false,
                protect_lists: false,
                strip_all_html: true,
                ..Self::clean_everything()
            },
            _ => Self::clean_everything(),
        }
    }

    pub fn get(&self, switch: Switch) -> bool {
        match switch {
            Switch::XmlNamespaces => self.xml_namespaces,
            Switch::ConditionalComments => self.conditional_comments,
            Switch::MsoClasses => self.mso_classes,
            Switch::MsoStyles => self.mso_styles,
            Switch::FontAttributes => self.font_attributes,
            Switch::StyleAttributes => self.style_attributes,
            Switch::LangAttributes => self.lang_attributes,
            Switch::EmptyElements => self.empty_elements,
            Switch::ProtectTables => self.protect_tables,
            Switch::ProtectLists => self.protect_lists,
            Switch::StripAllStyles => self.strip_all_styles,
            Switch::StripAllHtml => self.strip_all_html,
            Switch::UseTreeProcessing => self.use_tree_processing,
        }
    }

    pub fn set(&mut self, switch: Switch, value: bool) {
        let slot = match switch {
            Switch::XmlNamespaces => &mut self.xml_namespaces,
            Switch::ConditionalComments => &mut self.conditional_comments,
            Switch::MsoClasses => &mut self.mso_classes,
            Switch::MsoStyles => &mut self.mso_styles,
            Switch::FontAttributes => &mut self.font_attributes,
            Switch::StyleAttributes => &mut self.style_attributes,
            Switch::LangAttributes => &mut self.lang_attributes,
            Switch::EmptyElements => &mut self.empty_elements,
            Switch::ProtectTables => &mut self.protect_tables,
            Switch::ProtectLists => &mut self.protect_lists,
            Switch::StripAllStyles => &mut self.strip_all_styles,
            Switch::StripAllHtml => &mut self.strip_all_html,
            Switch::UseTreeProcessing => &mut self.use_tree_processing,
        };
        *slot = value;
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, switch: Switch, value: bool) -> Self {
        self.set(switch, value);
        self
    }

    /// Overlay stored overrides onto this policy. Overrides win; unknown
    /// names are logged and skipped. When a legacy alias and the current
    /// name are both stored, the current name wins.
    pub fn overlay(&mut self, overrides: &HashMap<String, bool>) {
        let mut resolved: Vec<(bool, &str, Switch, bool)> = Vec::with_capacity(overrides.len());
        for (name, value) in overrides {
            match name.parse::<Switch>() {
                Ok(switch) => resolved.push((switch.name() == name.as_str(), name.as_str(), switch, *value)),
                Err(e) => tracing::warn!("Ignoring stored override: {e}"),
            }
        }
        // Aliases sort before current names, so the current name is applied last.
        resolved.sort_unstable_by_key(|(current, name, ..)| (*current, *name));
        for (_, _, switch, value) in resolved {
            self.set(switch, value);
        }
    }

    /// Names of the switches that are on, in canonical order.
    pub fn active(&self) -> Vec<&'static str> {
        Switch::ALL
            .into_iter()
            .filter(|s| self.get(*s))
            .map(Switch::name)
            .collect()
    }

    /// Canonical, order-stable encoding of every switch. Two policies have the
    /// same fingerprint iff they are equal.
    pub fn fingerprint(&self) -> String {
        Switch::ALL
            .into_iter()
            .map(|s| format!("{}={}", s.name(), u8::from(self.get(s))))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl Default for CleaningPolicy {
    fn default() -> Self {
        Self::clean_everything()
    }
}

/// Strip any number of trailing `_chunk` suffixes from a content type.
pub fn base_content_type(content_type: &str) -> &str {
    let mut base = content_type;
    while let Some(stripped) = base.strip_suffix(CHUNK_SUFFIX) {
        base = stripped;
    }
    base
}

/// Settings persistence consumed by the rule evaluator.
///
/// Returns the explicitly stored switches for a content type, or `None` when
/// nothing is stored for it.
pub trait PolicyStore: Send + Sync {
    fn overrides(&self, content_type: &str) -> Option<HashMap<String, bool>>;
}

/// In-memory [`PolicyStore`], filled in code or loaded from JSON.
///
/// # Example
///
/// ```
/// use word_cleaner::{PolicyStore, StaticPolicyStore};
///
/// let store = StaticPolicyStore::from_json(r#"{"post": {"strip_all_styles": true}}"#).unwrap();
/// assert_eq!(store.overrides("post").unwrap()["strip_all_styles"], true);
/// assert!(store.overrides("page").is_none());
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticPolicyStore {
    types: HashMap<String, HashMap<String, bool>>,
}

impl StaticPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one switch value for a content type.
    pub fn with_override(mut self, content_type: &str, switch: Switch, value: bool) -> Self {
        self.insert(content_type, switch, value);
        self
    }

    pub fn insert(&mut self, content_type: &str, switch: Switch, value: bool) {
        self.types
            .entry(content_type.to_string())
            .or_default()
            .insert(switch.name().to_string(), value);
    }

    /// Parse a `{"<content type>": {"<switch>": bool}}` document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CleanerError::Config(e.to_string()))
    }
}

impl PolicyStore for StaticPolicyStore {
    fn overrides(&self, content_type: &str) -> Option<HashMap<String, bool>> {
        self.types.get(content_type).cloned()
    }
}

/// Resolve the policy for a content type: built-in defaults, then stored
/// overrides for the exact type (or its base type, for chunks).
pub fn resolve_policy(content_type: &str, store: Option<&dyn PolicyStore>) -> CleaningPolicy {
    let mut policy = CleaningPolicy::for_content_type(content_type);
    if let Some(store) = store {
        let overrides = store
            .overrides(content_type)
            .or_else(|| store.overrides(base_content_type(content_type)));
        if let Some(overrides) = overrides {
            policy.overlay(&overrides);
        }
    }
    policy
}
