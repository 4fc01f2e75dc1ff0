use super::{json_pretty, spin_fail, spin_ok, spinner, status_mark, EXIT_RUNTIME_ERROR, EXIT_SUCCESS};
use chrono::Local;
use garden_core::{
    ContainerResult, CoreError, FsReportSink, GardenConfig, Orchestrator, RunOptions,
};
use garden_registry::{resolve_modules, ResolveOptions};
use garden_runtime::{check_docker_prereqs, format_missing, select_client, ClientOptions};
use garden_schema::parse_mod_args;
use std::sync::Arc;

pub struct RunArgs {
    pub target: String,
    pub categories: Vec<String>,
    pub singles: Vec<String>,
    pub modargs: String,
    pub write_reports: bool,
}

pub fn run(config: &GardenConfig, args: &RunArgs, json: bool) -> Result<u8, String> {
    let target = args.target.trim();
    if target.is_empty() {
        return Err("a non-empty --target is required".to_owned());
    }
    if args.categories.is_empty() && args.singles.is_empty() {
        return Err("nothing selected: pass --category and/or --single".to_owned());
    }

    let overrides = parse_mod_args(&args.modargs).map_err(|e| CoreError::from(e).to_string())?;

    let modules = resolve_modules(
        &config.modules_dir,
        &ResolveOptions {
            categories: args.categories.clone(),
            singles: args.singles.clone(),
            skip_integrity: config.ignore_hashes,
        },
    )
    .map_err(|e| CoreError::from(e).to_string())?;

    if config.backend == "docker" && std::env::var("GARDEN_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = check_docker_prereqs();
        if !missing.is_empty() {
            return Err(format!("runtime error: {}", format_missing(&missing)));
        }
    }

    let client = select_client(
        &config.backend,
        &ClientOptions {
            host: config.host.clone(),
            context: config.context.clone(),
        },
    )
    .map_err(|e| CoreError::from(e).to_string())?;

    let mut orchestrator = Orchestrator::new(Arc::from(client));
    let mut report_dir = None;
    if args.write_reports {
        let sink = FsReportSink::new(&config.reports_dir, Local::now());
        report_dir = Some(sink.run_dir());
        orchestrator = orchestrator.with_sink(Box::new(sink));
    }

    let mut options = RunOptions::new(target);
    options.args = overrides;
    options.namespace.clone_from(&config.namespace);
    options.unit_timeout = config.unit_timeout();
    options.strict_placeholders = config.strict_placeholders;

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("running {} modules...", modules.len())))
    };

    let outcome = orchestrator.run_with(&modules, &options, |result, done, total| {
        if let Some(ref pb) = pb {
            pb.println(format!(
                "{} {}",
                status_mark(result.is_success()),
                result.identifier
            ));
            pb.set_message(format!("{done}/{total} modules finished"));
        }
    });

    let results = match outcome {
        Ok(r) => r,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "run aborted");
            }
            return Err(e.to_string());
        }
    };

    let failed = results.iter().filter(|r| !r.is_success()).count();
    if let Some(ref pb) = pb {
        let summary = format!("{}/{} modules succeeded", results.len() - failed, results.len());
        if failed == 0 {
            spin_ok(pb, &summary);
        } else {
            spin_fail(pb, &summary);
        }
    }

    if json {
        let payload = serde_json::json!({
            "target": target,
            "report_dir": report_dir,
            "results": results.iter().map(result_json).collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for r in results.iter().filter(|r| !r.is_success()) {
            if let Some(e) = &r.error {
                println!("  {}: {e}", r.identifier);
            }
        }
        if let Some(dir) = &report_dir {
            println!("reports: {}", dir.display());
        }
    }

    if failed == 0 {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_RUNTIME_ERROR)
    }
}

fn result_json(result: &ContainerResult) -> serde_json::Value {
    serde_json::json!({
        "module": result.identifier.to_string(),
        "success": result.is_success(),
        "exit_code": result.exit_code,
        "error": result.error.as_ref().map(ToString::to_string),
        "output": result.output,
        "build_output": result.build_output,
    })
}
