use crate::types::Digest;
use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// Root descriptor (`meta.json`) listing every category with its expected digest.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetaFile {
    pub version: u32,
    pub categories: Vec<CategoryRef>,
}

/// Entry in the root descriptor pointing at `<name>/meta.json`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CategoryRef {
    pub name: String,
    pub sha256: Digest,
}

/// Category descriptor (`<category>/meta.json`). The category name is not part
/// of the file body; it comes from the referencing [`CategoryRef`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CategoryFile {
    pub version: u32,
    pub modules: Vec<ModuleEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ModuleEntry {
    pub name: String,
    pub cmd: Vec<String>,
    pub sha256: Digest,
}

impl MetaFile {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.version == 0 {
            return Err(SchemaError::Invalid("meta version must be set".to_owned()));
        }
        for (i, cat) in self.categories.iter().enumerate() {
            if cat.name.is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "category entry {i} has an empty name"
                )));
            }
            if cat.sha256.as_str().is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "category '{}' has no sha256",
                    cat.name
                )));
            }
        }
        Ok(())
    }
}

impl CategoryFile {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.version == 0 {
            return Err(SchemaError::Invalid(
                "category version must be set".to_owned(),
            ));
        }
        for (i, module) in self.modules.iter().enumerate() {
            if module.name.is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "module entry {i} has an empty name"
                )));
            }
            if module.sha256.as_str().is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "module '{}' has no sha256",
                    module.name
                )));
            }
        }
        Ok(())
    }
}

/// Parse and validate a root descriptor.
pub fn parse_meta_str(input: &str) -> Result<MetaFile, SchemaError> {
    let meta: MetaFile = serde_json::from_str(input)?;
    meta.validate()?;
    Ok(meta)
}

/// Parse and validate a category descriptor.
pub fn parse_category_str(input: &str) -> Result<CategoryFile, SchemaError> {
    let category: CategoryFile = serde_json::from_str(input)?;
    category.validate()?;
    Ok(category)
}
