//! Recursive cleaning targets: a text field, or a container of fields.

/// A value to clean, tagged with the content type it should be cleaned as.
///
/// Containers model repeaters, groups and flexible layouts; cleaning walks
/// every text leaf and leaves the shape alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Text { content_type: String, value: String },
    Container { content_type: String, children: Vec<Field> },
}

impl Field {
    pub fn text(content_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            content_type: content_type.into(),
            value: value.into(),
        }
    }

    pub fn container(content_type: impl Into<String>, children: Vec<Field>) -> Self {
        Self::Container {
            content_type: content_type.into(),
            children,
        }
    }

    pub fn content_type(&self) -> &str {
        match self {
            Self::Text { content_type, .. } | Self::Container { content_type, .. } => content_type,
        }
    }

    /// Every text leaf, depth-first, as `(content_type, value)`.
    pub fn leaves_mut(&mut self) -> Vec<(&str, &mut String)> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a mut self, leaves: &mut Vec<(&'a str, &'a mut String)>) {
        match self {
            Self::Text { content_type, value } => leaves.push((content_type.as_str(), value)),
            Self::Container { children, .. } => {
                for child in children {
                    child.collect_leaves(leaves);
                }
            }
        }
    }

    /// The text value, if this is a leaf.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Text { value, .. } => Some(value),
            Self::Container { .. } => None,
        }
    }
}
