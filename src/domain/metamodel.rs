//! The normalized, resolved form of the metamodel.
//!
//! Everything in here is produced by the [loader](super::loader) and is
//! immutable afterwards.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use regex::{Regex, RegexBuilder};

use crate::domain::{Condition, Directive, Item};

/// Fields whose pattern applies to every element of a list value.
pub const ARRAY_FIELDS: &[&str] = &["tags", "sections"];

/// Fields that are always present on items and never count as custom fields.
pub const BUILTIN_FIELDS: &[&str] = &[
    "target_id",
    "id",
    "status",
    "docname",
    "lineno",
    "type",
    "lineno_content",
    "doctype",
    "content",
    "type_name",
    "type_color",
    "type_style",
    "title",
    "full_title",
    "layout",
    "template",
    "id_parent",
    "id_complete",
    "external_css",
    "sections",
    "section_name",
    "type_prefix",
    "constraints_passed",
    "collapse",
    "hide",
    "delete",
    "jinja_content",
    "is_part",
    "is_need",
    "is_external",
    "is_import",
    "is_modified",
    "modifications",
    "has_dead_links",
    "has_forbidden_dead_links",
    "tags",
    "arch",
    "parts",
];

/// The generic link field every item may carry.
pub const BUILTIN_LINK_FIELD: &str = "links";

/// Returns whether a field name belongs to the fixed built-in vocabulary.
#[must_use]
pub fn is_builtin_field(name: &str) -> bool {
    BUILTIN_FIELDS.contains(&name)
}

/// A compiled validation pattern that remembers its source text.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regular expression.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    /// The pattern as written in the metamodel.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the value matches the pattern.
    ///
    /// Like the structural validators this feeds, the match is a search: use
    /// `^`/`$` anchors to constrain the whole value.
    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One entry of a resolved link specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTargetEntry {
    /// Targets must be items of this type.
    Type(Directive),
    /// Target ids must match this pattern. Not resolved further.
    Pattern(Pattern),
}

/// The resolved form of a comma-separated link specifier such as
/// `"comp_req, ^feat_req__.*$"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkTarget {
    entries: Vec<LinkTargetEntry>,
}

impl LinkTarget {
    pub(crate) const fn new(entries: Vec<LinkTargetEntry>) -> Self {
        Self { entries }
    }

    /// All resolved entries, in specifier order.
    #[must_use]
    pub fn entries(&self) -> &[LinkTargetEntry] {
        &self.entries
    }

    /// The concrete target types.
    pub fn types(&self) -> impl Iterator<Item = &Directive> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            LinkTargetEntry::Type(directive) => Some(directive),
            LinkTargetEntry::Pattern(_) => None,
        })
    }

    /// The pattern entries.
    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            LinkTargetEntry::Pattern(pattern) => Some(pattern),
            LinkTargetEntry::Type(_) => None,
        })
    }

    /// Whether at least one entry references a concrete type.
    #[must_use]
    pub fn has_types(&self) -> bool {
        self.types().next().is_some()
    }

    /// Whether the specifier consists only of patterns (and is non-empty).
    #[must_use]
    pub fn is_pattern_only(&self) -> bool {
        !self.entries.is_empty() && !self.has_types()
    }

    /// Whether an id matches any of the pattern entries.
    #[must_use]
    pub fn matches_id(&self, id: &str) -> bool {
        self.patterns().any(|pattern| pattern.is_match(id))
    }

    /// Whether an existing item is an acceptable target.
    ///
    /// The item is accepted if its type is one of the concrete entries, or
    /// its id matches one of the pattern entries.
    #[must_use]
    pub fn accepts(&self, target: &Item) -> bool {
        self.types().any(|directive| directive.as_str() == target.kind())
            || self.matches_id(target.id())
    }
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match entry {
                LinkTargetEntry::Type(directive) => write!(f, "{directive}")?,
                LinkTargetEntry::Pattern(pattern) => write!(f, "{pattern}")?,
            }
        }
        Ok(())
    }
}

/// Whether a field or link is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Necessity {
    /// Must be present.
    Mandatory,
    /// May be present.
    Optional,
}

/// A single item type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub(crate) directive: Directive,
    pub(crate) title: String,
    pub(crate) prefix: String,
    pub(crate) tags: Vec<String>,
    pub(crate) parts: usize,
    pub(crate) color: Option<String>,
    pub(crate) style: Option<String>,
    pub(crate) mandatory_fields: BTreeMap<String, Pattern>,
    pub(crate) optional_fields: BTreeMap<String, Pattern>,
    pub(crate) mandatory_links: BTreeMap<String, LinkTarget>,
    pub(crate) optional_links: BTreeMap<String, LinkTarget>,
}

impl TypeDefinition {
    /// The directive naming this type.
    #[must_use]
    pub const fn directive(&self) -> &Directive {
        &self.directive
    }

    /// The human-readable title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The id prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Tags attached to the type itself.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// The number of `__`-separated segments an id of this type has.
    #[must_use]
    pub const fn parts(&self) -> usize {
        self.parts
    }

    /// Presentation color, if declared.
    #[must_use]
    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    /// Presentation style, if declared.
    #[must_use]
    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    /// The pattern every id of this type must match.
    ///
    /// Types built by the loader always have one.
    #[must_use]
    pub fn id_pattern(&self) -> Option<&Pattern> {
        self.mandatory_fields.get("id")
    }

    /// Mandatory fields and their patterns.
    #[must_use]
    pub const fn mandatory_fields(&self) -> &BTreeMap<String, Pattern> {
        &self.mandatory_fields
    }

    /// Optional fields and their patterns.
    #[must_use]
    pub const fn optional_fields(&self) -> &BTreeMap<String, Pattern> {
        &self.optional_fields
    }

    /// Mandatory links and their resolved targets.
    #[must_use]
    pub const fn mandatory_links(&self) -> &BTreeMap<String, LinkTarget> {
        &self.mandatory_links
    }

    /// Optional links and their resolved targets.
    #[must_use]
    pub const fn optional_links(&self) -> &BTreeMap<String, LinkTarget> {
        &self.optional_links
    }

    /// All fields with their necessity. Mandatory fields come first.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Pattern, Necessity)> + '_ {
        let mandatory = self
            .mandatory_fields
            .iter()
            .map(|(name, pattern)| (name.as_str(), pattern, Necessity::Mandatory));
        let optional = self
            .optional_fields
            .iter()
            .filter(|(name, _)| !self.mandatory_fields.contains_key(*name))
            .map(|(name, pattern)| (name.as_str(), pattern, Necessity::Optional));
        mandatory.chain(optional)
    }

    /// All links with their necessity. Mandatory links come first.
    pub fn links(&self) -> impl Iterator<Item = (&str, &LinkTarget, Necessity)> + '_ {
        let mandatory = self
            .mandatory_links
            .iter()
            .map(|(name, target)| (name.as_str(), target, Necessity::Mandatory));
        let optional = self
            .optional_links
            .iter()
            .filter(|(name, _)| !self.mandatory_links.contains_key(*name))
            .map(|(name, target)| (name.as_str(), target, Necessity::Optional));
        mandatory.chain(optional)
    }

    /// Returns the resolved target of a link field declared for this type.
    #[must_use]
    pub fn link(&self, name: &str) -> Option<&LinkTarget> {
        self.mandatory_links
            .get(name)
            .or_else(|| self.optional_links.get(name))
    }

    /// Whether the type declares the field (as a field or a link).
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.mandatory_fields.contains_key(name)
            || self.optional_fields.contains_key(name)
            || self.link(name).is_some()
    }

    /// Whether the type declares any field or link constraint at all.
    #[must_use]
    pub fn has_constraints(&self) -> bool {
        !(self.mandatory_fields.is_empty()
            && self.optional_fields.is_empty()
            && self.mandatory_links.is_empty()
            && self.optional_links.is_empty())
    }
}

/// All item types, keyed by directive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeRegistry {
    types: BTreeMap<Directive, TypeDefinition>,
}

impl TypeRegistry {
    pub(crate) const fn new(types: BTreeMap<Directive, TypeDefinition>) -> Self {
        Self { types }
    }

    /// Looks up a type by directive.
    #[must_use]
    pub fn get(&self, directive: &str) -> Option<&TypeDefinition> {
        self.types.get(directive)
    }

    /// Whether the directive is declared.
    #[must_use]
    pub fn contains(&self, directive: &str) -> bool {
        self.types.contains_key(directive)
    }

    /// Iterates over all types in directive order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDefinition> + '_ {
        self.types.values()
    }

    /// The number of declared types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Reverse-direction naming for a link field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraLink {
    /// The link field name.
    pub option: String,
    /// Label for the link as seen from the target.
    pub incoming: String,
    /// Label for the link as seen from the source.
    pub outgoing: String,
}

/// A single case-insensitive prohibited term.
#[derive(Debug, Clone)]
pub struct ProhibitedTerm {
    term: String,
    regex: Regex,
}

impl ProhibitedTerm {
    /// Compiles a pattern that matches anywhere in a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regular expression.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::compile(pattern, pattern)
    }

    /// Compiles a term that only matches as a whole word.
    ///
    /// # Errors
    ///
    /// Returns an error if the term is not a valid regular expression.
    pub fn word(term: &str) -> Result<Self, regex::Error> {
        Self::compile(term, &format!(r"\b(?:{term})\b"))
    }

    fn compile(term: &str, expression: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(expression)
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            term: term.to_string(),
            regex,
        })
    }

    /// The term as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.term
    }

    /// Returns the matched text, if the term occurs in the value.
    #[must_use]
    pub fn find<'v>(&self, value: &'v str) -> Option<&'v str> {
        self.regex.find(value).map(|m| m.as_str())
    }
}

/// A configured prohibited-word rule.
#[derive(Debug, Clone)]
pub struct ProhibitedWordCheck {
    pub(crate) name: String,
    pub(crate) types: BTreeSet<String>,
    pub(crate) fields: BTreeMap<String, Vec<ProhibitedTerm>>,
}

impl ProhibitedWordCheck {
    /// Fields scanned when a check does not name any.
    pub const DEFAULT_FIELDS: &'static [&'static str] = &["title", "content"];

    /// The configured name of the check.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the check applies to items of the given type.
    #[must_use]
    pub fn applies_to(&self, directive: &str) -> bool {
        self.types.contains(directive)
    }

    /// The types the check applies to.
    #[must_use]
    pub const fn types(&self) -> &BTreeSet<String> {
        &self.types
    }

    /// Scanned fields and the terms prohibited in each.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Vec<ProhibitedTerm>> {
        &self.fields
    }
}

/// A declarative check over links between items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCheckDefinition {
    pub(crate) name: String,
    pub(crate) include: BTreeSet<Directive>,
    pub(crate) condition: Option<Condition>,
    pub(crate) links: BTreeMap<String, Condition>,
    pub(crate) explanation: String,
}

impl GraphCheckDefinition {
    /// The configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether an item is selected as a source of this check.
    #[must_use]
    pub fn selects(&self, item: &Item) -> bool {
        self.include.contains(item.kind())
            && self
                .condition
                .as_ref()
                .is_none_or(|condition| condition.evaluate(item))
    }

    /// Link fields and the condition every target must satisfy.
    #[must_use]
    pub const fn links(&self) -> &BTreeMap<String, Condition> {
        &self.links
    }

    /// Why the check exists.
    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

/// A defect in the metamodel that was reported and dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A link specifier names a type that is not declared.
    #[error("In metamodel: {directive}, link '{link}' references unknown type '{target}'.")]
    UnknownLinkTarget {
        /// The type declaring the link.
        directive: String,
        /// The link field.
        link: String,
        /// The unresolved type name.
        target: String,
    },
    /// A check is configured for a type that is not declared.
    #[error("In metamodel: check '{check}' references unknown type '{target}'.")]
    UnknownCheckType {
        /// The configured check.
        check: String,
        /// The unresolved type name.
        target: String,
    },
}

/// The loaded metamodel.
#[derive(Debug, Clone)]
pub struct Metamodel {
    pub(crate) types: TypeRegistry,
    pub(crate) extra_links: Vec<ExtraLink>,
    pub(crate) custom_fields: Vec<String>,
    pub(crate) prohibited_words: Vec<ProhibitedWordCheck>,
    pub(crate) graph_checks: Vec<GraphCheckDefinition>,
    pub(crate) config_errors: Vec<ConfigError>,
}

impl Metamodel {
    /// The type registry.
    #[must_use]
    pub const fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Declared link fields with reverse-direction labels.
    #[must_use]
    pub fn extra_links(&self) -> &[ExtraLink] {
        &self.extra_links
    }

    /// All custom (non built-in) field names, sorted and de-duplicated.
    #[must_use]
    pub fn custom_fields(&self) -> &[String] {
        &self.custom_fields
    }

    /// Configured prohibited-word checks.
    #[must_use]
    pub fn prohibited_words(&self) -> &[ProhibitedWordCheck] {
        &self.prohibited_words
    }

    /// Configured declarative graph checks.
    #[must_use]
    pub fn graph_checks(&self) -> &[GraphCheckDefinition] {
        &self.graph_checks
    }

    /// Configuration errors found (and dropped) while loading.
    #[must_use]
    pub fn config_errors(&self) -> &[ConfigError] {
        &self.config_errors
    }

    /// Every field name that carries links on some item.
    ///
    /// This is the union of all declared link fields, the extra links, and the
    /// built-in `links` field.
    #[must_use]
    pub fn link_fields(&self) -> BTreeSet<&str> {
        let mut fields: BTreeSet<&str> = self
            .types
            .iter()
            .flat_map(|definition| definition.links().map(|(name, _, _)| name))
            .collect();
        fields.extend(self.extra_links.iter().map(|link| link.option.as_str()));
        fields.insert(BUILTIN_LINK_FIELD);
        fields
    }
}
