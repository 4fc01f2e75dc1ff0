use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Canonical `category/name` pair naming a module.
///
/// Equality and hashing go through the canonical string form, so two
/// identifiers are equal exactly when their `category/name` text is equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Identifier {
    pub category: String,
    pub name: String,
}

/// How a module entered the resolved set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// Selected through a category filter.
    Declared,
    /// Requested explicitly with a `category/name` specifier.
    Single,
}

impl Identifier {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Parse a `category/name` specifier, splitting on the first `/`.
    pub fn parse(spec: &str) -> Result<Self, SchemaError> {
        match spec.split_once('/') {
            Some((category, name)) => Ok(Self::new(category, name)),
            None => Err(SchemaError::InvalidSpecifier(spec.to_owned())),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl FromStr for Identifier {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for Identifier {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}
