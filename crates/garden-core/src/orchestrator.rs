use crate::report::ReportSink;
use crate::CoreError;
use garden_registry::ContainerModule;
use garden_runtime::{image_tag, RuntimeClient, RuntimeError};
use garden_schema::{
    find_overrides, resolve_command, unresolved_placeholders, ContainerHandle, Identifier,
    ImageTag, ModArg, SchemaError,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Version component of every image tag built by this engine.
pub const RUN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outcome of one module execution.
#[derive(Debug)]
pub struct ContainerResult {
    pub identifier: Identifier,
    pub output: String,
    pub build_output: String,
    pub exit_code: Option<i64>,
    pub error: Option<RuntimeError>,
}

impl ContainerResult {
    fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            output: String::new(),
            build_output: String::new(),
            exit_code: None,
            error: None,
        }
    }

    fn failed(identifier: Identifier, error: RuntimeError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(identifier)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target: String,
    pub args: Vec<ModArg>,
    pub namespace: String,
    pub version: String,
    /// Per-module deadline measured from dispatch. `None` waits indefinitely.
    pub unit_timeout: Option<Duration>,
    /// Fail before dispatch if any command still contains a `<...>` placeholder.
    pub strict_placeholders: bool,
}

impl RunOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            args: Vec::new(),
            namespace: "garden".to_owned(),
            version: RUN_VERSION.to_owned(),
            unit_timeout: None,
            strict_placeholders: false,
        }
    }
}

/// A module with its command fully substituted and its image tag assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUnit {
    pub identifier: Identifier,
    pub definition: PathBuf,
    pub tag: ImageTag,
    pub command: Vec<String>,
}

/// Runs resolved modules concurrently against one target.
pub struct Orchestrator {
    client: Arc<dyn RuntimeClient>,
    sink: Option<Box<dyn ReportSink>>,
    dispatch: tracing::Dispatch,
}

impl Orchestrator {
    /// Create an orchestrator sharing `client` between all units.
    ///
    /// The logging dispatcher active at construction is captured here and
    /// installed in every unit thread.
    pub fn new(client: Arc<dyn RuntimeClient>) -> Self {
        Self {
            client,
            sink: None,
            dispatch: tracing::dispatcher::get_default(Clone::clone),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Apply overrides and the target to every module's command.
    pub fn prepare(
        &self,
        modules: &[ContainerModule],
        options: &RunOptions,
    ) -> Result<Vec<PreparedUnit>, CoreError> {
        let mut units = Vec::with_capacity(modules.len());
        for module in modules {
            let overrides = find_overrides(&options.args, &module.identifier, module.selection);
            debug!(
                "{} overrides found for {}",
                overrides.len(),
                module.identifier
            );
            let command = resolve_command(&module.command, &overrides, &options.target);

            let leftover = unresolved_placeholders(&command);
            if let Some(placeholder) = leftover.into_iter().next() {
                if options.strict_placeholders {
                    return Err(SchemaError::UnresolvedPlaceholder {
                        module: module.identifier.to_string(),
                        placeholder,
                    }
                    .into());
                }
                warn!(
                    "{} command keeps unresolved placeholder {placeholder}",
                    module.identifier
                );
            }

            units.push(PreparedUnit {
                identifier: module.identifier.clone(),
                definition: module.definition.clone(),
                tag: image_tag(&options.namespace, &options.version, &module.identifier),
                command,
            });
        }
        Ok(units)
    }

    pub fn run(
        &self,
        modules: &[ContainerModule],
        options: &RunOptions,
    ) -> Result<Vec<ContainerResult>, CoreError> {
        self.run_with(modules, options, |_, _, _| {})
    }

    /// Execute every module concurrently and return once all have finished.
    ///
    /// Results are returned in completion order. `on_result` is called with
    /// each result, the number collected so far, and the total, right after it
    /// has been handed to the report sink. A unit's failure is recorded in its
    /// own result and never affects the others; only preparation errors fail
    /// the call, and those happen before anything is dispatched.
    pub fn run_with(
        &self,
        modules: &[ContainerModule],
        options: &RunOptions,
        mut on_result: impl FnMut(&ContainerResult, usize, usize),
    ) -> Result<Vec<ContainerResult>, CoreError> {
        let units = self.prepare(modules, options)?;
        let total = units.len();
        info!("starting {total} modules with {} client", self.client.name());

        let (tx, rx) = mpsc::channel::<(usize, ContainerResult)>();
        let mut pending: Vec<Option<Identifier>> = Vec::with_capacity(total);
        let dispatched_at = Instant::now();

        for (idx, unit) in units.into_iter().enumerate() {
            let identifier = unit.identifier.clone();
            pending.push(Some(identifier.clone()));

            let unit_tx = tx.clone();
            let client = Arc::clone(&self.client);
            let dispatch = self.dispatch.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("garden-unit-{idx}"))
                .spawn(move || {
                    let result = tracing::dispatcher::with_default(&dispatch, || {
                        catch_unwind(AssertUnwindSafe(|| execute_unit(client.as_ref(), &unit)))
                            .unwrap_or_else(|_| {
                                ContainerResult::failed(
                                    unit.identifier.clone(),
                                    RuntimeError::Aborted("execution unit panicked".to_owned()),
                                )
                            })
                    });
                    let _ = unit_tx.send((idx, result));
                });
            if let Err(e) = spawned {
                warn!("failed to spawn execution unit for {identifier}: {e}");
                let _ = tx.send((idx, ContainerResult::failed(identifier, RuntimeError::Io(e))));
            }
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while results.len() < total {
            let received = match options.unit_timeout {
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                Some(limit) => {
                    let remaining = limit.saturating_sub(dispatched_at.elapsed());
                    rx.recv_timeout(remaining)
                }
            };

            match received {
                Ok((idx, result)) => {
                    if pending.get_mut(idx).and_then(Option::take).is_none() {
                        continue;
                    }
                    self.collect(result, &mut results, total, &mut on_result);
                }
                Err(reason) => {
                    for identifier in pending.iter_mut().filter_map(Option::take) {
                        warn!("{identifier} did not report a result");
                        let error = match (reason, options.unit_timeout) {
                            (RecvTimeoutError::Timeout, Some(limit)) => {
                                RuntimeError::TimedOut(limit.as_secs())
                            }
                            _ => RuntimeError::Aborted(
                                "execution unit exited without a result".to_owned(),
                            ),
                        };
                        let result = ContainerResult::failed(identifier, error);
                        self.collect(result, &mut results, total, &mut on_result);
                    }
                }
            }
        }

        info!("all {total} modules finished");
        Ok(results)
    }

    fn collect(
        &self,
        result: ContainerResult,
        results: &mut Vec<ContainerResult>,
        total: usize,
        on_result: &mut impl FnMut(&ContainerResult, usize, usize),
    ) {
        if let Some(sink) = &self.sink {
            match sink.submit(&result) {
                Ok(()) => info!("report generated for {}", result.identifier),
                Err(e) => warn!("an error occurred when saving report for {}: {e}", result.identifier),
            }
        }
        results.push(result);
        if let Some(last) = results.last() {
            on_result(last, results.len(), total);
        }
    }
}

fn execute_unit(client: &dyn RuntimeClient, unit: &PreparedUnit) -> ContainerResult {
    let mut result = ContainerResult::new(unit.identifier.clone());
    if let Err(e) = drive_unit(client, unit, &mut result) {
        warn!("{} failed: {e}", unit.identifier);
        result.error = Some(e);
    }
    result
}

fn drive_unit(
    client: &dyn RuntimeClient,
    unit: &PreparedUnit,
    result: &mut ContainerResult,
) -> Result<(), RuntimeError> {
    let id = &unit.identifier;
    let definition = std::fs::read(&unit.definition)?;

    let built = client.build(&unit.tag, &definition).map_err(|mut e| {
        if let RuntimeError::BuildFailed { log, .. } = &mut e {
            result.build_output = std::mem::take(log);
        }
        e
    })?;
    result.build_output = built.log;
    info!("successfully built image {} for {id}", built.image);

    let handle = client.start(&built.image, &unit.command)?;
    info!("successfully started {id} as {handle}");

    let outcome = collect_output(client, &handle, result);
    if let Err(e) = client.remove(&handle) {
        debug!("could not remove {handle} for {id}: {e}");
    }
    outcome?;
    info!("{id} finished, {} bytes of output", result.output.len());
    Ok(())
}

fn collect_output(
    client: &dyn RuntimeClient,
    handle: &ContainerHandle,
    result: &mut ContainerResult,
) -> Result<(), RuntimeError> {
    let status = client.wait(handle)?;
    result.exit_code = Some(status.exit_code);
    debug!("{} exited with code {}", result.identifier, status.exit_code);

    let output = client.logs(handle)?;
    result.output = String::from_utf8_lossy(&output).into_owned();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use garden_registry::TreeBuilder;
    use garden_runtime::{MockClient, Stage};
    use garden_schema::{parse_mod_args, Selection};

    fn module(dir: &std::path::Path, category: &str, name: &str, cmd: &[&str]) -> ContainerModule {
        let path = dir.join(format!("{category}-{name}.Dockerfile"));
        std::fs::write(&path, "FROM alpine:3\n").unwrap();
        ContainerModule {
            identifier: Identifier::new(category, name),
            definition: path,
            command: cmd.iter().map(|s| (*s).to_owned()).collect(),
            selection: Selection::Declared,
        }
    }

    #[test]
    fn prepare_substitutes_overrides_and_target() {
        let dir = tempfile::tempdir().unwrap();
        let modules = vec![module(dir.path(), "net", "nmap", &["nmap", "<flag>", "<TARGET>"])];
        let mut options = RunOptions::new("10.0.0.1");
        options.args = parse_mod_args("net/nmap-flag=-F").unwrap();

        let orch = Orchestrator::new(Arc::new(MockClient::new()));
        let units = orch.prepare(&modules, &options).unwrap();
        assert_eq!(units[0].command, vec!["nmap", "-F", "10.0.0.1"]);
        assert_eq!(units[0].tag.as_str(), format!("garden/{RUN_VERSION}/net/nmap"));
    }

    #[test]
    fn prepare_single_selection_matches_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = module(dir.path(), "net", "nmap", &["nmap", "<flag>"]);
        m.selection = Selection::Single;
        let mut options = RunOptions::new("t");
        options.args = parse_mod_args("nmap-flag=fast").unwrap();

        let orch = Orchestrator::new(Arc::new(MockClient::new()));
        let units = orch.prepare(&[m], &options).unwrap();
        assert_eq!(units[0].command, vec!["nmap", "fast"]);
    }

    #[test]
    fn lenient_mode_keeps_unmatched_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let modules = vec![module(dir.path(), "net", "nmap", &["nmap", "<flag>"])];
        let orch = Orchestrator::new(Arc::new(MockClient::new()));
        let units = orch.prepare(&modules, &RunOptions::new("t")).unwrap();
        assert_eq!(units[0].command, vec!["nmap", "<flag>"]);
    }

    #[test]
    fn strict_mode_fails_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let modules = vec![
            module(dir.path(), "net", "masscan", &["masscan", "<TARGET>"]),
            module(dir.path(), "net", "nmap", &["nmap", "<flag>"]),
        ];
        let client = Arc::new(MockClient::new());
        let orch = Orchestrator::new(client.clone());
        let mut options = RunOptions::new("t");
        options.strict_placeholders = true;

        let err = orch.run(&modules, &options).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Schema(SchemaError::UnresolvedPlaceholder { ref placeholder, .. }) if placeholder == "<flag>"
        ));
        assert!(client.started().is_empty());
    }

    #[test]
    fn run_collects_output_and_build_log() {
        let dir = tempfile::tempdir().unwrap();
        let modules = vec![module(dir.path(), "net", "nmap", &["echo", "<TARGET>"])];
        let orch = Orchestrator::new(Arc::new(MockClient::new()));
        let results = orch.run(&modules, &RunOptions::new("hello world!")).unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!(r.is_success());
        assert_eq!(r.output.trim(), "mock-run: echo hello world!");
        assert!(r.build_output.starts_with("mock-build:"));
        assert_eq!(r.exit_code, Some(0));
    }

    #[test]
    fn missing_definition_fails_only_that_unit() {
        let dir = tempfile::tempdir().unwrap();
        let ok = module(dir.path(), "net", "nmap", &["nmap"]);
        let mut gone = module(dir.path(), "net", "masscan", &["masscan"]);
        gone.definition = dir.path().join("missing.Dockerfile");

        let orch = Orchestrator::new(Arc::new(MockClient::new()));
        let results = orch.run(&[ok, gone], &RunOptions::new("t")).unwrap();
        assert_eq!(results.len(), 2);
        let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].identifier.to_string(), "net/masscan");
        assert!(matches!(failed[0].error, Some(RuntimeError::Io(_))));
    }

    #[test]
    fn start_failure_keeps_build_log() {
        let dir = tempfile::tempdir().unwrap();
        let modules = vec![module(dir.path(), "net", "nmap", &["nmap"])];
        let client = MockClient::new().fail_at("net/nmap", Stage::Start);
        let orch = Orchestrator::new(Arc::new(client));
        let results = orch.run(&modules, &RunOptions::new("t")).unwrap();
        assert!(matches!(results[0].error, Some(RuntimeError::StartFailed(_))));
        assert!(!results[0].build_output.is_empty());
        assert!(results[0].output.is_empty());
    }

    #[test]
    fn failed_build_keeps_partial_build_log() {
        let dir = tempfile::tempdir().unwrap();
        let modules = vec![module(dir.path(), "net", "nmap", &["nmap"])];
        let client = MockClient::new().fail_at("net/nmap", Stage::Build);
        let orch = Orchestrator::new(Arc::new(client));
        let results = orch.run(&modules, &RunOptions::new("t")).unwrap();
        assert!(matches!(results[0].error, Some(RuntimeError::BuildFailed { .. })));
        assert!(results[0].build_output.contains("step 1/1 failed"));
        assert_eq!(results[0].exit_code, None);
    }

    #[test]
    fn container_is_removed_when_wait_or_logs_fails() {
        // Check the handle with the call that is not scripted to fail.
        for stage in [Stage::Wait, Stage::Logs] {
            let dir = tempfile::tempdir().unwrap();
            let modules = vec![module(dir.path(), "net", "nmap", &["nmap"])];
            let client = Arc::new(MockClient::new().fail_at("net/nmap", stage));
            let orch = Orchestrator::new(client.clone());
            let results = orch.run(&modules, &RunOptions::new("t")).unwrap();

            assert!(!results[0].is_success());
            assert_eq!(client.started().len(), 1);
            let handle = ContainerHandle::new("mock-0");
            let still_known = match stage {
                Stage::Wait => client.logs(&handle).is_ok(),
                _ => client.wait(&handle).is_ok(),
            };
            assert!(!still_known, "container left behind after {stage:?} failure");
        }
    }

    #[test]
    fn container_is_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let modules = vec![module(dir.path(), "net", "nmap", &["nmap"])];
        let client = Arc::new(MockClient::new());
        let orch = Orchestrator::new(client.clone());
        orch.run(&modules, &RunOptions::new("t")).unwrap();
        assert!(client.logs(&ContainerHandle::new("mock-0")).is_err());
    }

    #[test]
    fn empty_unit_list_returns_immediately() {
        let orch = Orchestrator::new(Arc::new(MockClient::new()));
        let results = orch.run(&[], &RunOptions::new("t")).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn modules_from_tree_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        TreeBuilder::new()
            .module("web", "nuclei", &["nuclei", "-u", "<TARGET>"])
            .write(dir.path())
            .unwrap();
        let modules = garden_registry::resolve_modules(
            dir.path(),
            &garden_registry::ResolveOptions {
                categories: vec!["*".to_owned()],
                ..Default::default()
            },
        )
        .unwrap();
        let orch = Orchestrator::new(Arc::new(MockClient::new()));
        let results = orch.run(&modules, &RunOptions::new("example.com")).unwrap();
        assert_eq!(results[0].output.trim(), "mock-run: nuclei -u example.com");
    }
}
