use crate::client::{BuildOutput, RuntimeClient, TerminalStatus};
use crate::RuntimeError;
use garden_schema::{ContainerHandle, ImageTag};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Lifecycle step at which a scripted failure is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Build,
    Start,
    Wait,
    Logs,
}

/// In-memory runtime client with deterministic output.
///
/// Failures and delays are keyed by a module's `category/name`, matched
/// against the end of the image tag.
#[derive(Default)]
pub struct MockClient {
    failures: HashMap<String, Stage>,
    delays: HashMap<String, Duration>,
    next_id: AtomicU64,
    containers: Mutex<HashMap<String, (ImageTag, Vec<String>)>>,
    started: Mutex<Vec<(ImageTag, Vec<String>)>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given module fail at `stage`.
    #[must_use]
    pub fn fail_at(mut self, module: &str, stage: Stage) -> Self {
        self.failures.insert(module.to_lowercase(), stage);
        self
    }

    /// Make waiting on the given module take `delay`.
    #[must_use]
    pub fn with_delay(mut self, module: &str, delay: Duration) -> Self {
        self.delays.insert(module.to_lowercase(), delay);
        self
    }

    /// Every `(image, command)` pair passed to [`RuntimeClient::start`], in call order.
    pub fn started(&self) -> Vec<(ImageTag, Vec<String>)> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn key_for<'a>(map: &'a HashMap<String, impl Sized>, tag: &ImageTag) -> Option<&'a String> {
        map.keys().find(|k| tag.as_str().ends_with(&format!("/{k}")))
    }

    fn check(&self, tag: &ImageTag, stage: Stage) -> Result<(), RuntimeError> {
        let Some(key) = Self::key_for(&self.failures, tag) else {
            return Ok(());
        };
        if self.failures[key] != stage {
            return Ok(());
        }
        let msg = format!("mock {stage:?} failure for {key}");
        Err(match stage {
            Stage::Build => RuntimeError::BuildFailed {
                log: format!("mock-build: {tag}\nmock-build: step 1/1 failed\n"),
                message: msg,
            },
            Stage::Start => RuntimeError::StartFailed(msg),
            Stage::Wait => RuntimeError::WaitFailed(msg),
            Stage::Logs => RuntimeError::LogsFailed(msg),
        })
    }

    fn lookup(&self, handle: &ContainerHandle) -> Result<(ImageTag, Vec<String>), RuntimeError> {
        let containers = self
            .containers
            .lock()
            .map_err(|e| RuntimeError::WaitFailed(format!("mutex poisoned: {e}")))?;
        containers
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| RuntimeError::WaitFailed(format!("no such container: {handle}")))
    }
}

impl RuntimeClient for MockClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn build(&self, tag: &ImageTag, definition: &[u8]) -> Result<BuildOutput, RuntimeError> {
        self.check(tag, Stage::Build)?;
        Ok(BuildOutput {
            image: tag.clone(),
            log: format!("mock-build: {tag} ({} bytes)\n", definition.len()),
        })
    }

    fn start(&self, image: &ImageTag, command: &[String]) -> Result<ContainerHandle, RuntimeError> {
        self.check(image, Stage::Start)?;
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers
            .lock()
            .map_err(|e| RuntimeError::StartFailed(format!("mutex poisoned: {e}")))?
            .insert(id.clone(), (image.clone(), command.to_vec()));
        self.started
            .lock()
            .map_err(|e| RuntimeError::StartFailed(format!("mutex poisoned: {e}")))?
            .push((image.clone(), command.to_vec()));
        Ok(ContainerHandle::new(id))
    }

    fn wait(&self, handle: &ContainerHandle) -> Result<TerminalStatus, RuntimeError> {
        let (image, _) = self.lookup(handle)?;
        if let Some(key) = Self::key_for(&self.delays, &image) {
            std::thread::sleep(self.delays[key]);
        }
        self.check(&image, Stage::Wait)?;
        Ok(TerminalStatus { exit_code: 0 })
    }

    fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>, RuntimeError> {
        let (image, command) = self.lookup(handle)?;
        self.check(&image, Stage::Logs)?;
        Ok(format!("mock-run: {}\n", command.join(" ")).into_bytes())
    }

    fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.containers
            .lock()
            .map_err(|e| RuntimeError::Io(std::io::Error::other(format!("mutex poisoned: {e}"))))?
            .remove(handle.as_str());
        Ok(())
    }
}
