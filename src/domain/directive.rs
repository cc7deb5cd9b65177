use std::{borrow::Borrow, fmt, ops::Deref, str::FromStr};

use non_empty_string::NonEmptyString;
use serde::{Deserialize, Serialize};

/// The unique name of an item type.
///
/// Directives are flat, case-sensitive and must be non-empty. They are used
/// both as the key of the type registry and as the `type` of every item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Directive(NonEmptyString);

impl Directive {
    /// Creates a new `Directive` from a string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDirectiveError` if the string is empty or contains
    /// whitespace.
    pub fn new(s: String) -> Result<Self, InvalidDirectiveError> {
        if s.chars().any(char::is_whitespace) {
            return Err(InvalidDirectiveError(s));
        }
        NonEmptyString::new(s)
            .map(Self)
            .map_err(InvalidDirectiveError)
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Directive {
    type Error = InvalidDirectiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Directive {
    type Error = InvalidDirectiveError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl From<Directive> for String {
    fn from(value: Directive) -> Self {
        value.0.as_str().to_owned()
    }
}

impl AsRef<str> for Directive {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl Borrow<str> for Directive {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl Deref for Directive {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Directive {
    type Err = InvalidDirectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Error returned when a type name is empty or contains whitespace.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid directive '{0}': must be non-empty and contain no whitespace")]
pub struct InvalidDirectiveError(String);
