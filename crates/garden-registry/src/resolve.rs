use crate::integrity::read_with_digest;
use crate::loader::{Category, CategorySource, ModuleTree};
use crate::RegistryError;
use garden_schema::{Identifier, Selection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension of a module's definition file, `<category>/<module>.Dockerfile`.
pub const DEFINITION_EXT: &str = "Dockerfile";

/// Selection criteria for [`resolve_modules`].
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Category names to load; `*` selects all of them.
    pub categories: Vec<String>,
    /// Explicit `category/name` specifiers.
    pub singles: Vec<String>,
    pub skip_integrity: bool,
}

/// One resolved execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerModule {
    pub identifier: Identifier,
    pub definition: PathBuf,
    pub command: Vec<String>,
    pub selection: Selection,
}

pub fn definition_path(base: &Path, category: &str, module: &str) -> PathBuf {
    base.join(category).join(format!("{module}.{DEFINITION_EXT}"))
}

/// Load, verify, and flatten a module tree into an ordered unit list.
///
/// Categories selected by the filter come first, in declaration order,
/// followed by one unit per single specifier in the order given. A module
/// reachable both ways appears twice. Any error aborts the whole resolution.
pub fn resolve_modules(
    root: &Path,
    options: &ResolveOptions,
) -> Result<Vec<ContainerModule>, RegistryError> {
    let tree = ModuleTree::open(root)?;

    let mut categories: Vec<Category> = Vec::new();
    if !options.categories.is_empty() {
        categories.extend(tree.load_categories(&options.categories, options.skip_integrity)?);
    }
    for spec in &options.singles {
        categories.push(tree.load_single(spec, options.skip_integrity)?);
    }

    let mut units = Vec::new();
    for category in &categories {
        let true_category = category.true_category();
        let selection = match category.source {
            CategorySource::Declared => Selection::Declared,
            CategorySource::SingleSelection { .. } => Selection::Single,
        };
        for module in &category.modules {
            let path = definition_path(tree.base(), true_category, &module.name);
            let (_, actual) = read_with_digest(&path)?;
            if !options.skip_integrity && !module.sha256.matches(&actual) {
                return Err(RegistryError::ModuleIntegrity {
                    module: format!("{true_category}/{}", module.name),
                    expected: module.sha256.to_string(),
                    actual,
                });
            }
            debug!("found definition for {true_category}/{}: {}", module.name, path.display());
            units.push(ContainerModule {
                identifier: Identifier::new(true_category, module.name.as_str()),
                definition: path,
                command: module.cmd.clone(),
                selection,
            });
        }
    }
    Ok(units)
}
