//! Module registry for Garden: loads the `meta.json` tree, verifies sha256
//! digests of every category and module file, and flattens the selection into
//! an ordered list of `ContainerModule` execution units.

pub mod authoring;
pub mod integrity;
pub mod loader;
pub mod resolve;

pub use authoring::TreeBuilder;
pub use integrity::{sha256_hex, verify_tree, IntegrityFailure, IntegrityReport};
pub use loader::{load_meta, Category, CategorySource, ModuleTree, META_FILE};
pub use resolve::{definition_path, resolve_modules, ContainerModule, ResolveOptions, DEFINITION_EXT};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("schema error: {0}")]
    Schema(#[from] garden_schema::SchemaError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("'{}' is not a directory and does not reference a meta.json", .0.display())]
    NotMetaFile(PathBuf),
    #[error("hash failed for category file \"{category}\": expected {expected}, calculated {actual}")]
    CategoryIntegrity {
        category: String,
        expected: String,
        actual: String,
    },
    #[error("hash failed for module file \"{module}\": expected {expected}, calculated {actual}")]
    ModuleIntegrity {
        module: String,
        expected: String,
        actual: String,
    },
    #[error("category not found: {0}")]
    CategoryNotFound(String),
    #[error("module not found: {0}")]
    ModuleNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_category_integrity() {
        let e = RegistryError::CategoryIntegrity {
            category: "net".to_owned(),
            expected: "aa".to_owned(),
            actual: "bb".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("\"net\""));
        assert!(msg.contains("bb"));
    }

    #[test]
    fn display_not_meta_file() {
        let e = RegistryError::NotMetaFile(PathBuf::from("/tmp/x.json"));
        assert!(e.to_string().contains("/tmp/x.json"));
    }

    #[test]
    fn display_module_not_found() {
        let e = RegistryError::ModuleNotFound("net/zmap".to_owned());
        assert!(e.to_string().contains("net/zmap"));
    }
}
