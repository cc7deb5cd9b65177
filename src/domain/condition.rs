//! Conditions evaluated against item fields.
//!
//! Conditions appear in the declarative `graph_checks` section of the
//! metamodel. The leaf form is a string such as `safety != QM`; leaves can be
//! combined with `and`, `or` and `not` mappings.

use std::fmt;

use serde::Deserialize;

use crate::domain::Item;

/// A predicate over the fields of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The field holds the value (for multi-valued fields: contains it).
    Equals {
        /// Field name.
        field: String,
        /// Expected value.
        value: String,
    },
    /// The field does not hold the value. Missing fields satisfy this.
    NotEquals {
        /// Field name.
        field: String,
        /// Rejected value.
        value: String,
    },
    /// All nested conditions hold.
    All(Vec<Condition>),
    /// At least one nested condition holds.
    Any(Vec<Condition>),
    /// The nested condition does not hold.
    Not(Box<Condition>),
}

/// Error returned when a condition expression cannot be parsed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid condition '{0}': expected '<field> == <value>' or '<field> != <value>'")]
pub struct ConditionParseError(String);

impl Condition {
    /// Parses a leaf expression of the form `field == value` or
    /// `field != value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the operator is missing or either side is empty.
    pub fn parse(expression: &str) -> Result<Self, ConditionParseError> {
        let operator = ["==", "!="]
            .into_iter()
            .filter_map(|operator| expression.find(operator).map(|at| (at, operator)))
            .min();
        let Some((at, operator)) = operator else {
            return Err(ConditionParseError(expression.to_string()));
        };
        let (field, value) = (&expression[..at], &expression[at + operator.len()..]);
        let negated = operator == "!=";

        let field = field.trim();
        let value = value.trim();
        if field.is_empty() || value.is_empty() {
            return Err(ConditionParseError(expression.to_string()));
        }

        let (field, value) = (field.to_string(), value.to_string());
        Ok(if negated {
            Self::NotEquals { field, value }
        } else {
            Self::Equals { field, value }
        })
    }

    /// Evaluates the condition against an item.
    #[must_use]
    pub fn evaluate(&self, item: &Item) -> bool {
        match self {
            Self::Equals { field, value } => item
                .values_of(field)
                .is_some_and(|values| values.contains(&value.as_str())),
            Self::NotEquals { field, value } => !item
                .values_of(field)
                .is_some_and(|values| values.contains(&value.as_str())),
            Self::All(conditions) => conditions.iter().all(|c| c.evaluate(item)),
            Self::Any(conditions) => conditions.iter().any(|c| c.evaluate(item)),
            Self::Not(condition) => !condition.evaluate(item),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, conditions: &[Condition], op: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, condition) in conditions.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{condition}")?;
            }
            write!(f, ")")
        }

        match self {
            Self::Equals { field, value } => write!(f, "{field} == {value}"),
            Self::NotEquals { field, value } => write!(f, "{field} != {value}"),
            Self::All(conditions) => join(f, conditions, "and"),
            Self::Any(conditions) => join(f, conditions, "or"),
            Self::Not(condition) => write!(f, "not ({condition})"),
        }
    }
}

/// The serialized shape of a condition in the metamodel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConditionSource {
    /// A leaf expression.
    Expression(String),
    /// `and: [...]`
    All {
        /// Nested conditions.
        and: Vec<ConditionSource>,
    },
    /// `or: [...]`
    Any {
        /// Nested conditions.
        or: Vec<ConditionSource>,
    },
    /// `not: ...`
    Not {
        /// Negated condition.
        not: Box<ConditionSource>,
    },
}

impl TryFrom<ConditionSource> for Condition {
    type Error = ConditionParseError;

    fn try_from(source: ConditionSource) -> Result<Self, Self::Error> {
        let convert = |sources: Vec<ConditionSource>| {
            sources
                .into_iter()
                .map(Self::try_from)
                .collect::<Result<Vec<_>, _>>()
        };

        match source {
            ConditionSource::Expression(expression) => Self::parse(&expression),
            ConditionSource::All { and } => convert(and).map(Self::All),
            ConditionSource::Any { or } => convert(or).map(Self::Any),
            ConditionSource::Not { not } => Ok(Self::Not(Box::new(Self::try_from(*not)?))),
        }
    }
}
