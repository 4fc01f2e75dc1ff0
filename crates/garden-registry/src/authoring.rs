//! Writes module trees with freshly computed digests.
//!
//! Used by module authors to regenerate descriptors after editing a
//! definition file, and by tests to build fixture trees.

use crate::integrity::sha256_hex;
use crate::loader::META_FILE;
use crate::resolve::definition_path;
use crate::RegistryError;
use garden_schema::{CategoryFile, CategoryRef, Digest, MetaFile, ModuleEntry};
use std::fs;
use std::path::Path;

struct PlannedModule {
    name: String,
    cmd: Vec<String>,
    definition: String,
}

/// In-memory description of a module tree, written in one go by [`TreeBuilder::write`].
#[derive(Default)]
pub struct TreeBuilder {
    categories: Vec<(String, Vec<PlannedModule>)>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a category, even if it ends up with no modules.
    #[must_use]
    pub fn category(mut self, name: &str) -> Self {
        self.category_mut(name);
        self
    }

    /// Add a module with a minimal generated definition file.
    #[must_use]
    pub fn module(self, category: &str, name: &str, cmd: &[&str]) -> Self {
        let definition = format!("FROM alpine:3\nLABEL garden.module=\"{category}/{name}\"\n");
        self.module_with_definition(category, name, cmd, &definition)
    }

    #[must_use]
    pub fn module_with_definition(
        mut self,
        category: &str,
        name: &str,
        cmd: &[&str],
        definition: &str,
    ) -> Self {
        self.category_mut(category).push(PlannedModule {
            name: name.to_owned(),
            cmd: cmd.iter().map(|s| (*s).to_owned()).collect(),
            definition: definition.to_owned(),
        });
        self
    }

    fn category_mut(&mut self, name: &str) -> &mut Vec<PlannedModule> {
        let idx = match self.categories.iter().position(|(n, _)| n == name) {
            Some(i) => i,
            None => {
                self.categories.push((name.to_owned(), Vec::new()));
                self.categories.len() - 1
            }
        };
        &mut self.categories[idx].1
    }

    /// Write definition files, category descriptors, and the root descriptor
    /// under `root`, each referencing the sha256 of what it points at.
    pub fn write(&self, root: &Path) -> Result<(), RegistryError> {
        let mut refs = Vec::new();
        for (category, modules) in &self.categories {
            fs::create_dir_all(root.join(category))?;

            let mut entries = Vec::new();
            for module in modules {
                let path = definition_path(root, category, &module.name);
                fs::write(&path, module.definition.as_bytes())?;
                entries.push(ModuleEntry {
                    name: module.name.clone(),
                    cmd: module.cmd.clone(),
                    sha256: Digest::new(sha256_hex(module.definition.as_bytes())),
                });
            }

            let body = serde_json::to_vec_pretty(&CategoryFile {
                version: 1,
                modules: entries,
            })?;
            fs::write(root.join(category).join(META_FILE), &body)?;
            refs.push(CategoryRef {
                name: category.clone(),
                sha256: Digest::new(sha256_hex(&body)),
            });
        }

        let meta = serde_json::to_vec_pretty(&MetaFile {
            version: 1,
            categories: refs,
        })?;
        fs::write(root.join(META_FILE), meta)?;
        Ok(())
    }
}
