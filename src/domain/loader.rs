//! Turns the raw metamodel declarations into a resolved [`Metamodel`].
//!
//! Loading happens in two passes. The first builds every [`TypeDefinition`]
//! with its fields; the second resolves the link specifiers against the now
//! complete set of directives, so types may reference types declared after
//! them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::{debug, error, instrument};

use crate::domain::{
    condition::{Condition, ConditionParseError, ConditionSource},
    directive::InvalidDirectiveError,
    metamodel::{
        ConfigError, ExtraLink, GraphCheckDefinition, LinkTarget, LinkTargetEntry, Pattern,
        ProhibitedTerm, ProhibitedWordCheck, TypeDefinition, TypeRegistry, is_builtin_field,
    },
    Directive, Metamodel,
};

/// Marks a link specifier entry as a pattern rather than a type name.
const PATTERN_SIGIL: char = '^';

const DEFAULT_PARTS: usize = 3;

/// The raw metamodel, as declared.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetamodelSource {
    #[serde(default)]
    needs_types: BTreeMap<String, TypeDeclaration>,
    #[serde(default)]
    needs_types_base_options: BaseOptions,
    #[serde(default)]
    needs_extra_links: BTreeMap<String, ExtraLinkDeclaration>,
    #[serde(default)]
    prohibited_words_checks: BTreeMap<String, ProhibitedWordsDeclaration>,
    #[serde(default)]
    graph_checks: BTreeMap<String, GraphCheckDeclaration>,
}

#[derive(Debug, Clone, Deserialize)]
struct TypeDeclaration {
    title: String,
    prefix: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    parts: Option<usize>,
    #[serde(default)]
    mandatory_options: BTreeMap<String, String>,
    #[serde(default)]
    optional_options: BTreeMap<String, String>,
    #[serde(default)]
    mandatory_links: BTreeMap<String, String>,
    #[serde(default)]
    optional_links: BTreeMap<String, String>,
    color: Option<String>,
    style: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BaseOptions {
    #[serde(default)]
    optional_options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExtraLinkDeclaration {
    incoming: String,
    outgoing: String,
}

/// Either a single `pattern` (optionally limited to `fields`), or per-field
/// term lists such as `title: [shall, must]`.
#[derive(Debug, Clone, Deserialize)]
struct ProhibitedWordsDeclaration {
    #[serde(default)]
    types: Vec<String>,
    pattern: Option<String>,
    fields: Option<Vec<String>>,
    #[serde(flatten)]
    per_field: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphCheckDeclaration {
    needs: GraphCheckSelector,
    check: BTreeMap<String, ConditionSource>,
    #[serde(default)]
    explanation: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphCheckSelector {
    include: String,
    condition: Option<ConditionSource>,
}

impl MetamodelSource {
    /// Parses the metamodel from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML or does not have the
    /// expected shape.
    pub fn from_yaml(text: &str) -> Result<Self, MetamodelError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Errors that abort loading the metamodel.
#[derive(Debug, thiserror::Error)]
pub enum MetamodelError {
    /// The metamodel text could not be parsed.
    #[error("failed to parse metamodel: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A type name is not a valid directive.
    #[error(transparent)]
    InvalidDirective(#[from] InvalidDirectiveError),
    /// A field or link pattern is not a valid regular expression.
    #[error("In metamodel: {directive}, '{field}' has an invalid pattern: {source}")]
    InvalidPattern {
        /// The declaring type.
        directive: String,
        /// The field or link.
        field: String,
        /// The regex error.
        source: regex::Error,
    },
    /// A prohibited term is not a valid regular expression.
    #[error("In metamodel: prohibited word check '{check}' has an invalid term '{term}': {source}")]
    InvalidTerm {
        /// The configured check.
        check: String,
        /// The term as configured.
        term: String,
        /// The regex error.
        source: regex::Error,
    },
    /// A graph check condition could not be parsed.
    #[error("In metamodel: graph check '{check}': {source}")]
    InvalidCondition {
        /// The configured check.
        check: String,
        /// The parse error.
        source: ConditionParseError,
    },
}

/// Loads and resolves a metamodel.
///
/// Unknown type names in link specifiers and check type lists are
/// configuration errors: they are logged, recorded on the returned metamodel
/// and dropped. Invalid patterns abort loading.
///
/// # Errors
///
/// Returns an error if a directive is invalid, or a pattern or condition
/// cannot be compiled.
#[instrument(level = "debug", skip_all)]
pub fn load(source: MetamodelSource) -> Result<Metamodel, MetamodelError> {
    let MetamodelSource {
        needs_types,
        needs_types_base_options,
        needs_extra_links,
        prohibited_words_checks,
        graph_checks,
    } = source;

    let mut config_errors = Vec::new();

    // First pass: fields only. Links are kept raw until every type is known.
    let mut types = BTreeMap::new();
    let mut raw_links = Vec::new();
    for (name, declaration) in needs_types {
        let directive = Directive::new(name)?;
        let (definition, links) =
            build_type(directive, declaration, &needs_types_base_options.optional_options)?;
        raw_links.push(links);
        types.insert(definition.directive.clone(), definition);
    }

    // Second pass: resolve links.
    let known: BTreeSet<Directive> = types.keys().cloned().collect();
    for links in raw_links {
        let resolved = links.resolve(&known, &mut config_errors)?;
        if let Some(definition) = types.get_mut(&links.directive) {
            definition.mandatory_links = resolved.0;
            definition.optional_links = resolved.1;
        }
    }

    let custom_fields = collect_custom_fields(types.values());

    let extra_links = needs_extra_links
        .into_iter()
        .map(|(option, declaration)| ExtraLink {
            option,
            incoming: declaration.incoming,
            outgoing: declaration.outgoing,
        })
        .collect();

    let prohibited_words = prohibited_words_checks
        .into_iter()
        .map(|(name, declaration)| {
            build_prohibited_words(name, declaration, &known, &mut config_errors)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let graph_checks = graph_checks
        .into_iter()
        .map(|(name, declaration)| {
            build_graph_check(name, declaration, &known, &mut config_errors)
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        types = types.len(),
        config_errors = config_errors.len(),
        "loaded metamodel"
    );

    Ok(Metamodel {
        types: TypeRegistry::new(types),
        extra_links,
        custom_fields,
        prohibited_words,
        graph_checks,
        config_errors,
    })
}

/// Link specifiers of one type, awaiting resolution.
struct RawLinks {
    directive: Directive,
    mandatory: BTreeMap<String, String>,
    optional: BTreeMap<String, String>,
}

type ResolvedLinks = (BTreeMap<String, LinkTarget>, BTreeMap<String, LinkTarget>);

impl RawLinks {
    fn resolve(
        &self,
        known: &BTreeSet<Directive>,
        errors: &mut Vec<ConfigError>,
    ) -> Result<ResolvedLinks, MetamodelError> {
        let mut resolve_all = |links: &BTreeMap<String, String>| {
            links
                .iter()
                .map(|(link, specifier)| {
                    resolve_link_target(&self.directive, link, specifier, known, errors)
                        .map(|target| (link.clone(), target))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
        };
        let mandatory = resolve_all(&self.mandatory)?;
        let optional = resolve_all(&self.optional)?;
        Ok((mandatory, optional))
    }
}

fn build_type(
    directive: Directive,
    declaration: TypeDeclaration,
    base_optional: &BTreeMap<String, String>,
) -> Result<(TypeDefinition, RawLinks), MetamodelError> {
    let prefix = declaration
        .prefix
        .unwrap_or_else(|| format!("{directive}__"));

    let mut mandatory_options = declaration.mandatory_options;
    mandatory_options
        .entry("id".to_string())
        .or_insert_with(|| format!("^{prefix}[0-9a-z_]+$"));

    // Base options are merged last, so they take precedence over a type's own
    // optional declaration of the same field.
    let mut optional_options = declaration.optional_options;
    optional_options.extend(base_optional.clone());

    let compile = |fields: BTreeMap<String, String>| {
        fields
            .into_iter()
            .map(|(field, pattern)| match Pattern::new(&pattern) {
                Ok(pattern) => Ok((field, pattern)),
                Err(source) => Err(MetamodelError::InvalidPattern {
                    directive: directive.to_string(),
                    field,
                    source,
                }),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
    };
    let mandatory_fields = compile(mandatory_options)?;
    let optional_fields = compile(optional_options)?;

    let links = RawLinks {
        directive: directive.clone(),
        mandatory: declaration.mandatory_links,
        optional: declaration.optional_links,
    };

    let definition = TypeDefinition {
        directive,
        title: declaration.title,
        prefix,
        tags: declaration.tags,
        parts: declaration.parts.unwrap_or(DEFAULT_PARTS),
        color: declaration.color,
        style: declaration.style,
        mandatory_fields,
        optional_fields,
        mandatory_links: BTreeMap::new(),
        optional_links: BTreeMap::new(),
    };

    Ok((definition, links))
}

/// Resolves a comma-separated link specifier.
///
/// Entries starting with `^` are kept as patterns; everything else must name a
/// declared type. Unknown names are reported and dropped.
fn resolve_link_target(
    directive: &Directive,
    link: &str,
    specifier: &str,
    known: &BTreeSet<Directive>,
    errors: &mut Vec<ConfigError>,
) -> Result<LinkTarget, MetamodelError> {
    let mut entries = Vec::new();
    for value in specifier.split(',').map(str::trim).filter(|v| !v.is_empty()) {
        if value.starts_with(PATTERN_SIGIL) {
            let pattern = Pattern::new(value).map_err(|source| MetamodelError::InvalidPattern {
                directive: directive.to_string(),
                field: link.to_string(),
                source,
            })?;
            entries.push(LinkTargetEntry::Pattern(pattern));
        } else if let Some(target) = known.get(value) {
            entries.push(LinkTargetEntry::Type(target.clone()));
        } else {
            let config_error = ConfigError::UnknownLinkTarget {
                directive: directive.to_string(),
                link: link.to_string(),
                target: value.to_string(),
            };
            error!("{config_error}");
            errors.push(config_error);
        }
    }
    Ok(LinkTarget::new(entries))
}

fn collect_custom_fields<'a>(types: impl Iterator<Item = &'a TypeDefinition>) -> Vec<String> {
    let all: BTreeSet<&str> = types
        .flat_map(|definition| {
            definition
                .mandatory_fields
                .keys()
                .chain(definition.optional_fields.keys())
                .map(String::as_str)
        })
        .collect();

    all.into_iter()
        .filter(|field| !is_builtin_field(field))
        .map(str::to_string)
        .collect()
}

fn check_types(
    check: &str,
    types: Vec<String>,
    known: &BTreeSet<Directive>,
    errors: &mut Vec<ConfigError>,
) -> BTreeSet<String> {
    types
        .into_iter()
        .filter(|target| {
            let found = known.contains(target.as_str());
            if !found {
                let config_error = ConfigError::UnknownCheckType {
                    check: check.to_string(),
                    target: target.clone(),
                };
                error!("{config_error}");
                errors.push(config_error);
            }
            found
        })
        .collect()
}

fn build_prohibited_words(
    name: String,
    declaration: ProhibitedWordsDeclaration,
    known: &BTreeSet<Directive>,
    errors: &mut Vec<ConfigError>,
) -> Result<ProhibitedWordCheck, MetamodelError> {
    let invalid = |term: &str, source| MetamodelError::InvalidTerm {
        check: name.clone(),
        term: term.to_string(),
        source,
    };

    let mut fields: BTreeMap<String, Vec<ProhibitedTerm>> = BTreeMap::new();

    if let Some(pattern) = &declaration.pattern {
        let scanned = declaration.fields.clone().unwrap_or_else(|| {
            ProhibitedWordCheck::DEFAULT_FIELDS
                .iter()
                .map(|field| (*field).to_string())
                .collect()
        });
        for field in scanned {
            let term = ProhibitedTerm::new(pattern).map_err(|source| invalid(pattern, source))?;
            fields.entry(field).or_default().push(term);
        }
    }

    for (field, terms) in &declaration.per_field {
        for term in terms {
            let term = ProhibitedTerm::word(term).map_err(|source| invalid(term, source))?;
            fields.entry(field.clone()).or_default().push(term);
        }
    }

    let types = check_types(&name, declaration.types, known, errors);

    Ok(ProhibitedWordCheck {
        name,
        types,
        fields,
    })
}

fn build_graph_check(
    name: String,
    declaration: GraphCheckDeclaration,
    known: &BTreeSet<Directive>,
    errors: &mut Vec<ConfigError>,
) -> Result<GraphCheckDefinition, MetamodelError> {
    let invalid = |source| MetamodelError::InvalidCondition {
        check: name.clone(),
        source,
    };

    let include = declaration
        .needs
        .include
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    let include = check_types(&name, include, known, errors)
        .into_iter()
        .filter_map(|directive| known.get(directive.as_str()).cloned())
        .collect();

    let condition = declaration
        .needs
        .condition
        .map(Condition::try_from)
        .transpose()
        .map_err(invalid)?;

    let links = declaration
        .check
        .into_iter()
        .map(|(link, source)| Condition::try_from(source).map(|condition| (link, condition)))
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map_err(invalid)?;

    Ok(GraphCheckDefinition {
        name,
        include,
        condition,
        links,
        explanation: declaration.explanation,
    })
}
