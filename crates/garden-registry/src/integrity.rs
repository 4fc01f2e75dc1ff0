use crate::loader::{load_meta, META_FILE};
use crate::resolve::definition_path;
use crate::RegistryError;
use garden_schema::{parse_category_str, Digest};
use sha2::{Digest as _, Sha256};
use std::fs;
use std::path::Path;

/// Lowercase hex sha256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Read a file and return its bytes together with their sha256.
pub fn read_with_digest(path: &Path) -> Result<(Vec<u8>, String), RegistryError> {
    let data = fs::read(path)?;
    let digest = sha256_hex(&data);
    Ok((data, digest))
}

/// Report produced by [`verify_tree`].
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub categories_checked: usize,
    pub categories_passed: usize,
    pub modules_checked: usize,
    pub modules_passed: usize,
    pub failed: Vec<IntegrityFailure>,
}

#[derive(Debug)]
pub struct IntegrityFailure {
    pub subject: String,
    pub reason: String,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Check every category and module file under a module tree.
///
/// Unlike resolution, which stops at the first mismatch, this walks the whole
/// tree and records every failure. Only the root descriptor must be readable.
pub fn verify_tree(root: &Path) -> Result<IntegrityReport, RegistryError> {
    let (meta, base) = load_meta(root)?;
    let mut report = IntegrityReport {
        categories_checked: meta.categories.len(),
        ..Default::default()
    };

    for cat_ref in &meta.categories {
        let cat_path = base.join(&cat_ref.name).join(META_FILE);
        let (data, actual) = match read_with_digest(&cat_path) {
            Ok(v) => v,
            Err(e) => {
                report.failed.push(IntegrityFailure {
                    subject: cat_ref.name.clone(),
                    reason: format!("category read error: {e}"),
                });
                continue;
            }
        };
        if !cat_ref.sha256.matches(&actual) {
            report.failed.push(IntegrityFailure {
                subject: cat_ref.name.clone(),
                reason: format!("category hash mismatch: got {actual}"),
            });
            continue;
        }
        report.categories_passed += 1;

        let category = match std::str::from_utf8(&data)
            .map_err(|e| e.to_string())
            .and_then(|s| parse_category_str(s).map_err(|e| e.to_string()))
        {
            Ok(c) => c,
            Err(e) => {
                report.failed.push(IntegrityFailure {
                    subject: cat_ref.name.clone(),
                    reason: format!("category parse error: {e}"),
                });
                continue;
            }
        };

        for module in &category.modules {
            report.modules_checked += 1;
            let subject = format!("{}/{}", cat_ref.name, module.name);
            let path = definition_path(&base, &cat_ref.name, &module.name);
            match check_file(&path, &module.sha256) {
                Ok(()) => report.modules_passed += 1,
                Err(reason) => report.failed.push(IntegrityFailure { subject, reason }),
            }
        }
    }

    Ok(report)
}

fn check_file(path: &Path, expected: &Digest) -> Result<(), String> {
    let (_, actual) =
        read_with_digest(path).map_err(|e| format!("module read error: {e}"))?;
    if expected.matches(&actual) {
        Ok(())
    } else {
        Err(format!("module hash mismatch: got {actual}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::TreeBuilder;

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn clean_tree_passes() {
        let dir = tempfile::tempdir().unwrap();
        TreeBuilder::new()
            .module("net", "nmap", &["nmap", "<TARGET>"])
            .module("net", "masscan", &["masscan", "<TARGET>"])
            .module("web", "nuclei", &["nuclei", "-u", "<TARGET>"])
            .write(dir.path())
            .unwrap();

        let report = verify_tree(dir.path()).unwrap();
        assert_eq!(report.categories_checked, 2);
        assert_eq!(report.categories_passed, 2);
        assert_eq!(report.modules_checked, 3);
        assert_eq!(report.modules_passed, 3);
        assert!(report.is_clean());
    }

    #[test]
    fn reports_every_failure() {
        let dir = tempfile::tempdir().unwrap();
        TreeBuilder::new()
            .module("net", "nmap", &["nmap"])
            .module("web", "nuclei", &["nuclei"])
            .module("web", "ffuf", &["ffuf"])
            .write(dir.path())
            .unwrap();

        std::fs::write(dir.path().join("net").join("meta.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("web").join("ffuf.Dockerfile"), b"FROM evil").unwrap();

        let report = verify_tree(dir.path()).unwrap();
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].subject, "net");
        assert_eq!(report.failed[1].subject, "web/ffuf");
        assert_eq!(report.modules_passed, 1);
    }

    #[test]
    fn missing_module_file_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        TreeBuilder::new()
            .module("net", "nmap", &["nmap"])
            .write(dir.path())
            .unwrap();
        std::fs::remove_file(dir.path().join("net").join("nmap.Dockerfile")).unwrap();

        let report = verify_tree(dir.path()).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("read error"));
    }
}
