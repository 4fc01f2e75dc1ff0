use crate::integrity::read_with_digest;
use crate::RegistryError;
use garden_schema::{parse_category_str, parse_meta_str, CategoryRef, Identifier, MetaFile, ModuleEntry};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of both the root and the per-category descriptor.
pub const META_FILE: &str = "meta.json";

/// Where a resolved category came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorySource {
    /// Declared in the root descriptor and selected by the category filter.
    Declared,
    /// In-memory wrapper around exactly one explicitly requested module.
    SingleSelection { category: String },
}

/// A loaded, integrity-checked category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub version: u32,
    pub name: String,
    pub source: CategorySource,
    pub modules: Vec<ModuleEntry>,
}

impl Category {
    /// Category under which the modules' definition files live on disk.
    pub fn true_category(&self) -> &str {
        match &self.source {
            CategorySource::Declared => &self.name,
            CategorySource::SingleSelection { category } => category,
        }
    }

    fn single(version: u32, category: &str, module: ModuleEntry) -> Self {
        Self {
            version,
            name: format!("single-{category}"),
            source: CategorySource::SingleSelection {
                category: category.to_owned(),
            },
            modules: vec![module],
        }
    }
}

/// Locate and parse the root descriptor.
///
/// `path` may be a directory containing `meta.json`, or the `meta.json` file
/// itself. Returns the descriptor and the directory it lives in.
pub fn load_meta(path: &Path) -> Result<(MetaFile, PathBuf), RegistryError> {
    let info = std::fs::metadata(path)?;
    let meta_path = if info.is_dir() {
        path.join(META_FILE)
    } else if path.file_name().is_some_and(|n| n == META_FILE) {
        path.to_path_buf()
    } else {
        return Err(RegistryError::NotMetaFile(path.to_path_buf()));
    };

    let content = std::fs::read_to_string(&meta_path)?;
    let meta = parse_meta_str(&content)?;
    let base = meta_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    debug!(
        "meta loaded from {}: version {}, {} categories",
        meta_path.display(),
        meta.version,
        meta.categories.len()
    );
    Ok((meta, base))
}

/// Root descriptor bound to the directory it was loaded from.
#[derive(Debug, Clone)]
pub struct ModuleTree {
    base: PathBuf,
    meta: MetaFile,
}

impl ModuleTree {
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let (meta, base) = load_meta(path)?;
        Ok(Self { base, meta })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn meta(&self) -> &MetaFile {
        &self.meta
    }

    /// Load every declared category selected by `filter`, in declaration order.
    ///
    /// A filter containing `*` selects everything; names that match nothing
    /// are ignored.
    pub fn load_categories(
        &self,
        filter: &[String],
        skip_integrity: bool,
    ) -> Result<Vec<Category>, RegistryError> {
        let wildcard = filter.iter().any(|f| f == "*");
        let categories = self
            .meta
            .categories
            .iter()
            .filter(|c| wildcard || filter.iter().any(|f| *f == c.name))
            .map(|c| self.load_category(c, skip_integrity))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "loaded categories: [{}]",
            categories
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(categories)
    }

    fn load_category(
        &self,
        cat_ref: &CategoryRef,
        skip_integrity: bool,
    ) -> Result<Category, RegistryError> {
        let path = self.base.join(&cat_ref.name).join(META_FILE);
        let (data, actual) = read_with_digest(&path)?;

        if !skip_integrity && !cat_ref.sha256.matches(&actual) {
            return Err(RegistryError::CategoryIntegrity {
                category: cat_ref.name.clone(),
                expected: cat_ref.sha256.to_string(),
                actual,
            });
        }

        let text = String::from_utf8(data)
            .map_err(|e| RegistryError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let file = parse_category_str(&text)?;
        Ok(Category {
            version: file.version,
            name: cat_ref.name.clone(),
            source: CategorySource::Declared,
            modules: file.modules,
        })
    }

    /// Resolve one `category/name` specifier into a single-selection category.
    ///
    /// The category is matched by exact name; `*` is not a wildcard here.
    pub fn load_single(&self, spec: &str, skip_integrity: bool) -> Result<Category, RegistryError> {
        let id = Identifier::parse(spec)?;
        let cat_ref = self
            .meta
            .categories
            .iter()
            .find(|c| c.name == id.category)
            .ok_or_else(|| RegistryError::CategoryNotFound(id.category.clone()))?;
        let category = self.load_category(cat_ref, skip_integrity)?;
        let module = category
            .modules
            .into_iter()
            .find(|m| m.name == id.name)
            .ok_or_else(|| RegistryError::ModuleNotFound(id.to_string()))?;
        debug!("loaded single module {id}");
        Ok(Category::single(category.version, &id.category, module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::TreeBuilder;

    fn sample_tree(dir: &Path) {
        TreeBuilder::new()
            .module("net", "nmap", &["nmap", "-sV", "<TARGET>"])
            .module("net", "masscan", &["masscan", "<TARGET>"])
            .module("web", "nuclei", &["nuclei", "-u", "<TARGET>"])
            .write(dir)
            .unwrap();
    }

    #[test]
    fn loads_meta_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let (meta, base) = load_meta(dir.path()).unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(base, dir.path());
    }

    #[test]
    fn loads_meta_from_file() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let (meta, base) = load_meta(&dir.path().join("meta.json")).unwrap();
        assert_eq!(meta.categories.len(), 2);
        assert_eq!(base, dir.path());
    }

    #[test]
    fn directory_without_meta_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_meta(dir.path()).unwrap_err();
        assert!(matches!(err, RegistryError::Io(_)));
    }

    #[test]
    fn file_not_named_meta_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("modules.json");
        std::fs::write(&other, "{}").unwrap();
        let err = load_meta(&other).unwrap_err();
        assert!(matches!(err, RegistryError::NotMetaFile(_)));
    }

    #[test]
    fn category_descriptor_is_not_a_root_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let err = load_meta(&dir.path().join("net").join("meta.json")).unwrap_err();
        assert!(matches!(err, RegistryError::Schema(_)));
    }

    #[test]
    fn filter_matching_nothing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let tree = ModuleTree::open(dir.path()).unwrap();
        let cats = tree
            .load_categories(&["not-a-category".to_owned()], false)
            .unwrap();
        assert!(cats.is_empty());
    }

    #[test]
    fn wildcard_loads_all_in_order() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let tree = ModuleTree::open(dir.path()).unwrap();
        let cats = tree.load_categories(&["*".to_owned()], false).unwrap();
        let names: Vec<_> = cats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["net", "web"]);
        assert_eq!(cats[0].modules[0].name, "nmap");
        assert_eq!(cats[0].modules[1].name, "masscan");
        assert!(cats.iter().all(|c| c.source == CategorySource::Declared));
    }

    #[test]
    fn tampered_category_names_category() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let cat_path = dir.path().join("web").join("meta.json");
        let mut bytes = std::fs::read(&cat_path).unwrap();
        bytes.push(b'\n');
        std::fs::write(&cat_path, bytes).unwrap();

        let tree = ModuleTree::open(dir.path()).unwrap();
        let err = tree.load_categories(&["*".to_owned()], false).unwrap_err();
        match err {
            RegistryError::CategoryIntegrity {
                category, actual, ..
            } => {
                assert_eq!(category, "web");
                assert_eq!(actual.len(), 64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tampered_category_loads_when_skipping_integrity() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let cat_path = dir.path().join("web").join("meta.json");
        let mut bytes = std::fs::read(&cat_path).unwrap();
        bytes.push(b' ');
        std::fs::write(&cat_path, bytes).unwrap();

        let tree = ModuleTree::open(dir.path()).unwrap();
        let cats = tree.load_categories(&["web".to_owned()], true).unwrap();
        assert_eq!(cats.len(), 1);
    }

    #[test]
    fn single_specifier_wraps_one_module() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let tree = ModuleTree::open(dir.path()).unwrap();
        let cat = tree.load_single("net/masscan", false).unwrap();
        assert_eq!(cat.name, "single-net");
        assert_eq!(cat.true_category(), "net");
        assert_eq!(cat.modules.len(), 1);
        assert_eq!(cat.modules[0].name, "masscan");
    }

    #[test]
    fn single_specifier_unknown_category() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let tree = ModuleTree::open(dir.path()).unwrap();
        let err = tree.load_single("dns/dnsx", false).unwrap_err();
        assert!(matches!(err, RegistryError::CategoryNotFound(ref c) if c == "dns"));
    }

    #[test]
    fn single_specifier_wildcard_category_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let tree = ModuleTree::open(dir.path()).unwrap();
        let err = tree.load_single("*/nmap", false).unwrap_err();
        assert!(matches!(err, RegistryError::CategoryNotFound(ref c) if c == "*"));
    }

    #[test]
    fn single_specifier_ignores_other_tampered_categories() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let cat_path = dir.path().join("web").join("meta.json");
        let mut bytes = std::fs::read(&cat_path).unwrap();
        bytes.push(b'\n');
        std::fs::write(&cat_path, bytes).unwrap();

        let tree = ModuleTree::open(dir.path()).unwrap();
        let cat = tree.load_single("net/nmap", false).unwrap();
        assert_eq!(cat.modules[0].name, "nmap");
    }

    #[test]
    fn single_specifier_unknown_module() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let tree = ModuleTree::open(dir.path()).unwrap();
        let err = tree.load_single("net/zmap", false).unwrap_err();
        assert!(matches!(err, RegistryError::ModuleNotFound(ref m) if m == "net/zmap"));
    }

    #[test]
    fn single_specifier_without_separator() {
        let dir = tempfile::tempdir().unwrap();
        sample_tree(dir.path());
        let tree = ModuleTree::open(dir.path()).unwrap();
        let err = tree.load_single("nmap", false).unwrap_err();
        assert!(matches!(err, RegistryError::Schema(_)));
    }
}
