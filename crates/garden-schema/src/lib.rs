//! Descriptor schema, module identifiers, and command argument resolution for Garden.
//!
//! This crate defines the data layer shared by every other Garden crate: the
//! JSON root and category descriptors (`MetaFile`, `CategoryFile`), the
//! canonical `category/name` module `Identifier`, per-module argument
//! overrides (`ModArg`) with their comma-separated grammar, and placeholder
//! substitution over a module's command template.

pub mod args;
pub mod descriptor;
pub mod identifier;
pub mod types;

pub use args::{
    find_overrides, parse_mod_args, resolve_command, unresolved_placeholders, ModArg,
    TARGET_PLACEHOLDER,
};
pub use descriptor::{
    parse_category_str, parse_meta_str, CategoryFile, CategoryRef, MetaFile, ModuleEntry,
};
pub use identifier::{Identifier, Selection};
pub use types::{ContainerHandle, Digest, ImageTag};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse descriptor: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("descriptor is not the correct file type: {0}")]
    Invalid(String),
    #[error(
        "invalid module specifier '{0}': expected '<category>/<module>' (the separator is always '/', e.g. net/nmap)"
    )]
    InvalidSpecifier(String),
    #[error("invalid module argument '{0}': expected '<category>/<module>-<key>=<value>'")]
    InvalidOverride(String),
    #[error("unresolved placeholder '{placeholder}' in command for {module}")]
    UnresolvedPlaceholder { module: String, placeholder: String },
}
