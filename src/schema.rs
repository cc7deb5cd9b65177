//! Structural schemas derived from the type registry.
//!
//! Every type becomes one schema: a *selector* picking the items of that type,
//! a *local* validator over the item's own fields, and (when a link names
//! concrete target types) a *network* validator over the linked items. The
//! result is written as a side artifact for external schema validators.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::instrument;

use crate::domain::{
    metamodel::ARRAY_FIELDS, Item, LinkTarget, Necessity, Pattern, TypeDefinition, TypeRegistry,
};

const SEVERITY: &str = "violation";
const MESSAGE: &str = "Item does not conform to the metamodel";

/// The complete schema artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDefinitions {
    /// One schema per constrained type, in directive order.
    pub schemas: Vec<TypeSchema>,
}

impl SchemaDefinitions {
    /// Renders the artifact as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Finds the schemas whose selector matches the item.
    pub fn select<'a>(&'a self, item: &'a Item) -> impl Iterator<Item = &'a TypeSchema> + 'a {
        self.schemas
            .iter()
            .filter(move |schema| schema.select.matches(item))
    }
}

/// The schema of a single type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSchema {
    /// `need-type-{directive}`.
    pub id: String,
    /// Always `violation`.
    pub severity: String,
    /// Reported when validation fails.
    pub message: String,
    /// Which items the schema applies to.
    pub select: Selector,
    /// What the selected items must satisfy.
    pub validate: Validators,
}

/// Selects the items a schema applies to by exact field values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selector {
    properties: BTreeMap<String, Const>,
    required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Const {
    #[serde(rename = "const")]
    value: String,
}

impl Selector {
    fn for_type(directive: &str) -> Self {
        Self {
            properties: BTreeMap::from([(
                "type".to_string(),
                Const {
                    value: directive.to_string(),
                },
            )]),
            required: vec!["type".to_string()],
        }
    }

    /// Whether the item is selected.
    #[must_use]
    pub fn matches(&self, item: &Item) -> bool {
        let required = self
            .required
            .iter()
            .all(|field| item.values_of(field).is_some());
        required
            && self.properties.iter().all(|(field, constant)| {
                item.values_of(field)
                    .is_some_and(|values| values == [constant.value.as_str()])
            })
    }
}

/// The validators of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validators {
    /// Constraints on the item's own fields.
    pub local: LocalValidator,
    /// Constraints on linked items, keyed by link field.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub network: BTreeMap<String, LinkConstraint>,
}

/// Constraints on the fields of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct LocalValidator {
    /// Field schemas by field name.
    pub properties: BTreeMap<String, PropertySchema>,
    /// Fields that must be present.
    pub required: Vec<String>,
}

/// The schema of a single value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PropertySchema {
    /// A string value.
    String {
        /// A pattern the value must match.
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        /// The only allowed value.
        #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
        constant: Option<String>,
        /// The allowed values.
        #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
        one_of: Option<Vec<String>>,
    },
    /// A list of values.
    Array {
        /// The schema of every element.
        items: Box<PropertySchema>,
    },
}

impl PropertySchema {
    fn pattern(pattern: impl Into<String>) -> Self {
        Self::String {
            pattern: Some(pattern.into()),
            constant: None,
            one_of: None,
        }
    }

    fn array_of(items: Self) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    fn for_field(name: &str, pattern: &Pattern) -> Self {
        let schema = Self::pattern(pattern.as_str());
        if ARRAY_FIELDS.contains(&name) {
            Self::array_of(schema)
        } else {
            schema
        }
    }

    fn one_of_types(target: &LinkTarget) -> Self {
        let mut types: Vec<String> = target.types().map(ToString::to_string).collect();
        let (constant, one_of) = if types.len() == 1 {
            (types.pop(), None)
        } else {
            (None, Some(types))
        };
        Self::String {
            pattern: None,
            constant,
            one_of,
        }
    }
}

/// A constraint on the targets of one link field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkConstraint {
    /// What a target must look like to count.
    pub contains: Contains,
    /// How many targets must count.
    #[serde(rename = "minContains")]
    pub min_contains: usize,
}

/// Matches linked items by their own fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contains {
    /// Constraints on the linked item's fields.
    pub local: TargetProperties,
}

/// Field schemas a linked item must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetProperties {
    /// Field schemas by field name.
    pub properties: BTreeMap<String, PropertySchema>,
}

/// Builds the schema artifact for every constrained type.
#[must_use]
#[instrument(level = "debug", skip_all, fields(types = types.len()))]
pub fn emit(types: &TypeRegistry) -> SchemaDefinitions {
    SchemaDefinitions {
        schemas: types
            .iter()
            .filter(|definition| definition.has_constraints())
            .map(type_schema)
            .collect(),
    }
}

fn type_schema(definition: &TypeDefinition) -> TypeSchema {
    let directive = definition.directive().as_str();

    let mut local = LocalValidator::default();
    for (name, pattern, necessity) in definition.fields() {
        if necessity == Necessity::Mandatory {
            local.required.push(name.to_string());
        }
        local
            .properties
            .insert(name.to_string(), PropertySchema::for_field(name, pattern));
    }

    let mut network = BTreeMap::new();
    for (name, target, necessity) in definition.links() {
        if necessity == Necessity::Mandatory {
            local.required.push(name.to_string());
        }

        if target.has_types() {
            let min_contains = match necessity {
                Necessity::Mandatory => 1,
                Necessity::Optional => 0,
            };
            network.insert(
                name.to_string(),
                LinkConstraint {
                    contains: Contains {
                        local: TargetProperties {
                            properties: BTreeMap::from([(
                                "type".to_string(),
                                PropertySchema::one_of_types(target),
                            )]),
                        },
                    },
                    min_contains,
                },
            );
        } else if let Some(pattern) = combined_pattern(target) {
            local.properties.insert(
                name.to_string(),
                PropertySchema::array_of(PropertySchema::pattern(pattern)),
            );
        }
    }

    TypeSchema {
        id: format!("need-type-{directive}"),
        severity: SEVERITY.to_string(),
        message: MESSAGE.to_string(),
        select: Selector::for_type(directive),
        validate: Validators { local, network },
    }
}

/// Joins the pattern entries of a link into a single alternation.
fn combined_pattern(target: &LinkTarget) -> Option<String> {
    let patterns: Vec<&str> = target.patterns().map(Pattern::as_str).collect();
    match patterns.as_slice() {
        [] => None,
        [single] => Some((*single).to_string()),
        many => Some(
            many.iter()
                .map(|pattern| format!("(?:{pattern})"))
                .collect::<Vec<_>>()
                .join("|"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        checks::test_support::metamodel,
        domain::{Directive, TypeDefinition},
    };

    const METAMODEL: &str = r#"
needs_types:
  comp:
    title: Component
    mandatory_options:
      status: "^(valid|draft)$"
    optional_options:
      tags: "^[a-z]+$"
    mandatory_links:
      implements: req
    optional_links:
      uses: "comp, req"
      external: "^ext__.*$"
      mixed: "req, ^lib__.*$"
  req:
    title: Requirement
"#;

    fn schemas() -> SchemaDefinitions {
        emit(metamodel(METAMODEL).types())
    }

    fn schema<'a>(schemas: &'a SchemaDefinitions, directive: &str) -> &'a TypeSchema {
        schemas
            .schemas
            .iter()
            .find(|schema| schema.id == format!("need-type-{directive}"))
            .unwrap()
    }

    #[test]
    fn selector_matches_exactly_one_type() {
        let schemas = schemas();
        for directive in ["comp", "req"] {
            let item = Item::new("x", directive);
            let selected: Vec<_> = schemas.select(&item).map(|s| s.id.as_str()).collect();
            assert_eq!(selected, [format!("need-type-{directive}")]);
        }
        assert_eq!(schemas.select(&Item::new("x", "other")).count(), 0);
    }

    #[test]
    fn local_validator_lists_fields_and_required() {
        let schemas = schemas();
        let local = &schema(&schemas, "comp").validate.local;

        assert_eq!(local.required, ["id", "status", "implements"]);
        assert_eq!(
            local.properties["status"],
            PropertySchema::pattern("^(valid|draft)$")
        );
        assert_eq!(
            local.properties["tags"],
            PropertySchema::array_of(PropertySchema::pattern("^[a-z]+$"))
        );
        assert_eq!(
            local.properties["external"],
            PropertySchema::array_of(PropertySchema::pattern("^ext__.*$"))
        );
        assert!(!local.properties.contains_key("implements"));
        assert!(!local.properties.contains_key("mixed"));
    }

    #[test]
    fn network_validator_only_for_concrete_targets() {
        let schemas = schemas();
        let network = &schema(&schemas, "comp").validate.network;

        assert_eq!(
            network.keys().collect::<Vec<_>>(),
            ["implements", "mixed", "uses"]
        );
        assert_eq!(network["implements"].min_contains, 1);
        assert_eq!(network["uses"].min_contains, 0);
        assert!(schema(&schemas, "req").validate.network.is_empty());
    }

    #[test]
    fn serialized_shape() {
        let schemas = schemas();
        let value = serde_json::to_value(schema(&schemas, "comp")).unwrap();

        assert_eq!(value["severity"], "violation");
        assert_eq!(
            value["select"],
            json!({"properties": {"type": {"const": "comp"}}, "required": ["type"]})
        );
        assert_eq!(
            value["validate"]["network"]["implements"],
            json!({
                "contains": {"local": {"properties": {"type": {"type": "string", "const": "req"}}}},
                "minContains": 1
            })
        );
        assert_eq!(
            value["validate"]["network"]["uses"]["contains"]["local"]["properties"]["type"],
            json!({"type": "string", "enum": ["comp", "req"]})
        );
        assert!(value["validate"]["local"]["properties"]["tags"]["items"]["pattern"].is_string());

        let req = serde_json::to_value(schema(&schemas, "req")).unwrap();
        assert!(req["validate"].get("network").is_none());
    }

    #[test]
    fn types_without_constraints_are_skipped() {
        let directive = Directive::new("bare".to_string()).unwrap();
        let definition = TypeDefinition {
            directive: directive.clone(),
            title: "Bare".to_string(),
            prefix: "bare__".to_string(),
            tags: Vec::new(),
            parts: 3,
            color: None,
            style: None,
            mandatory_fields: BTreeMap::new(),
            optional_fields: BTreeMap::new(),
            mandatory_links: BTreeMap::new(),
            optional_links: BTreeMap::new(),
        };
        let registry = TypeRegistry::new(BTreeMap::from([(directive, definition)]));

        assert!(emit(&registry).schemas.is_empty());
    }

    #[test]
    fn multiple_patterns_become_one_alternation() {
        let metamodel = metamodel(
            r#"
needs_types:
  doc:
    title: Document
    optional_links:
      refs: "^a__.*$, ^b__.*$"
"#,
        );
        let schemas = emit(metamodel.types());

        assert_eq!(
            schema(&schemas, "doc").validate.local.properties["refs"],
            PropertySchema::array_of(PropertySchema::pattern("(?:^a__.*$)|(?:^b__.*$)"))
        );
    }

    #[test]
    fn emission_is_deterministic() {
        assert_eq!(
            schemas().to_json_pretty().unwrap(),
            schemas().to_json_pretty().unwrap()
        );
    }
}
