use std::{collections::BTreeMap, fmt};

/// The value of a single item field.
///
/// Links start out as raw text or lists, exactly as the authoring toolchain
/// produced them, and are turned into [`FieldValue::Links`] by link
/// postprocessing before any rule runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A single scalar value.
    Text(String),
    /// A multi-valued field, such as `tags`.
    List(Vec<String>),
    /// Resolved link targets, as item ids.
    Links(Vec<String>),
}

impl FieldValue {
    /// Iterates over the individual values.
    ///
    /// A text value yields itself, list and link values yield each element.
    pub fn values(&self) -> impl Iterator<Item = &str> + '_ {
        let values: &[String] = match self {
            Self::Text(text) => std::slice::from_ref(text),
            Self::List(values) | Self::Links(values) => values,
        };
        values.iter().map(String::as_str)
    }

    /// Whether the field carries no value at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(values) | Self::Links(values) => values.is_empty(),
        }
    }

    /// Converts a raw link value into resolved target ids.
    ///
    /// Text is split on commas; empty segments are dropped.
    fn into_links(self) -> Self {
        match self {
            Self::Text(text) => Self::Links(split_ids(&text)),
            Self::List(values) => Self::Links(
                values
                    .iter()
                    .flat_map(|value| split_ids(value))
                    .collect(),
            ),
            links @ Self::Links(_) => links,
        }
    }
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

/// Where an item was defined.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    /// The document the item was defined in.
    pub docname: String,
    /// The line within the document, if known.
    pub lineno: Option<u32>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lineno {
            Some(line) => write!(f, "{}:{line}", self.docname),
            None => write!(f, "{}", self.docname),
        }
    }
}

/// A single node of the validated graph.
///
/// The identity core (id, type, external flag) is fixed; everything else lives
/// in a generic field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: String,
    kind: String,
    is_external: bool,
    location: Option<Location>,
    fields: BTreeMap<String, FieldValue>,
}

impl Item {
    /// Creates an internal item with no fields.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            is_external: false,
            location: None,
            fields: BTreeMap::new(),
        }
    }

    /// Marks the item as imported from another project.
    #[must_use]
    pub const fn external(mut self) -> Self {
        self.is_external = true;
        self
    }

    /// Sets a field, returning the item.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Sets a resolved link field, returning the item.
    #[must_use]
    pub fn with_links<I, S>(mut self, name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets = targets.into_iter().map(Into::into).collect();
        self.fields.insert(name.into(), FieldValue::Links(targets));
        self
    }

    /// Records where the item was defined.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// The unique id of the item.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The directive (type name) of the item.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether the item was imported from outside the validated project.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        self.is_external
    }

    /// Where the item was defined, if known.
    #[must_use]
    pub const fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Returns a field by name.
    ///
    /// This does not include the identity fields `id` and `type`; see
    /// [`Item::values_of`].
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Iterates over all fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> + '_ {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Sets (or overwrites) a field.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Returns the values of a field, including the identity fields.
    ///
    /// `id` and `type` are answered from the item's identity core; anything
    /// else comes from the field map. Returns `None` if the field is absent.
    #[must_use]
    pub fn values_of(&self, name: &str) -> Option<Vec<&str>> {
        match name {
            "id" => Some(vec![self.id.as_str()]),
            "type" => Some(vec![self.kind.as_str()]),
            _ => self.fields.get(name).map(|value| value.values().collect()),
        }
    }

    /// The resolved targets of a link field.
    ///
    /// Returns an empty slice if the field is absent or has not been
    /// postprocessed into links.
    #[must_use]
    pub fn links(&self, name: &str) -> &[String] {
        match self.fields.get(name) {
            Some(FieldValue::Links(targets)) => targets,
            _ => &[],
        }
    }

    /// Iterates over every resolved link field and its targets.
    pub fn link_fields(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.fields.iter().filter_map(|(name, value)| match value {
            FieldValue::Links(targets) => Some((name.as_str(), targets.as_slice())),
            _ => None,
        })
    }

    /// Converts the raw values of the given link fields into target ids.
    pub(crate) fn postprocess_links<'a>(&mut self, link_fields: impl IntoIterator<Item = &'a str>) {
        for name in link_fields {
            if let Some(value) = self.fields.remove(name) {
                self.fields.insert(name.to_string(), value.into_links());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("A, B,C", &["A", "B", "C"]; "comma separated")]
    #[test_case("A", &["A"]; "single")]
    #[test_case("", &[]; "empty")]
    #[test_case(" , A ,", &["A"]; "blank segments")]
    fn text_links_are_split(raw: &str, expected: &[&str]) {
        let mut item = Item::new("X", "t").with_field("satisfies", raw);
        item.postprocess_links(["satisfies"]);

        assert_eq!(item.links("satisfies"), expected);
    }

    #[test]
    fn list_links_are_flattened() {
        let mut item = Item::new("X", "t").with_field(
            "satisfies",
            vec!["A, B".to_string(), "C".to_string()],
        );
        item.postprocess_links(["satisfies"]);

        assert_eq!(item.links("satisfies"), ["A", "B", "C"]);
    }

    #[test]
    fn postprocessing_is_idempotent() {
        let mut item = Item::new("X", "t").with_field("satisfies", "A,B");
        item.postprocess_links(["satisfies"]);
        let once = item.clone();
        item.postprocess_links(["satisfies"]);

        assert_eq!(item, once);
    }

    #[test]
    fn non_link_fields_are_untouched() {
        let mut item = Item::new("X", "t").with_field("title", "a, b");
        item.postprocess_links(["satisfies"]);

        assert_eq!(item.field("title"), Some(&FieldValue::from("a, b")));
        assert!(item.links("title").is_empty());
    }

    #[test]
    fn identity_fields_are_visible_as_values() {
        let item = Item::new("REQ_1", "req").with_field("status", "valid");

        assert_eq!(item.values_of("id"), Some(vec!["REQ_1"]));
        assert_eq!(item.values_of("type"), Some(vec!["req"]));
        assert_eq!(item.values_of("status"), Some(vec!["valid"]));
        assert_eq!(item.values_of("missing"), None);
    }
}
