use super::{json_pretty, EXIT_SUCCESS};
use garden_core::CoreError;
use garden_registry::{resolve_modules, ResolveOptions};
use std::path::Path;

pub fn run(
    modules_dir: &Path,
    categories: Vec<String>,
    singles: Vec<String>,
    skip_integrity: bool,
    json: bool,
) -> Result<u8, String> {
    let modules = resolve_modules(
        modules_dir,
        &ResolveOptions {
            categories,
            singles,
            skip_integrity,
        },
    )
    .map_err(|e| CoreError::from(e).to_string())?;

    if json {
        println!("{}", json_pretty(&modules)?);
    } else if modules.is_empty() {
        println!("no modules found");
    } else {
        for module in &modules {
            println!("{}\t{}", module.identifier, module.command.join(" "));
        }
    }
    Ok(EXIT_SUCCESS)
}
