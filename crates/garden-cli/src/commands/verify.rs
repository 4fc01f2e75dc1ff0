use super::{json_pretty, EXIT_REGISTRY_ERROR, EXIT_SUCCESS};
use garden_core::CoreError;
use garden_registry::verify_tree;
use std::path::Path;

pub fn run(modules_dir: &Path, json: bool) -> Result<u8, String> {
    let report = verify_tree(modules_dir).map_err(|e| CoreError::from(e).to_string())?;

    if json {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|f| serde_json::json!({ "subject": f.subject, "reason": f.reason }))
            .collect();
        let payload = serde_json::json!({
            "categories_checked": report.categories_checked,
            "categories_passed": report.categories_passed,
            "modules_checked": report.modules_checked,
            "modules_passed": report.modules_passed,
            "failed": failed,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "module tree integrity: {}/{} categories, {}/{} modules passed",
            report.categories_passed,
            report.categories_checked,
            report.modules_passed,
            report.modules_checked
        );
        for f in &report.failed {
            println!("  FAIL {}: {}", f.subject, f.reason);
        }
    }

    if report.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_REGISTRY_ERROR)
    }
}
