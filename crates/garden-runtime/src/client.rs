use crate::RuntimeError;
use garden_schema::{ContainerHandle, Identifier, ImageTag};
use serde::{Deserialize, Serialize};

/// Result of a successful image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub image: ImageTag,
    pub log: String,
}

/// State reported once a container process is no longer running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerminalStatus {
    pub exit_code: i64,
}

/// Endpoint selection passed through to the runtime.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub host: Option<String>,
    /// Named runtime context; takes precedence over `host`.
    pub context: Option<String>,
}

/// Container runtime used to execute modules.
///
/// One client is shared by every concurrently running module, so
/// implementations must tolerate concurrent calls.
pub trait RuntimeClient: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Build an image from a single definition file and tag it.
    fn build(&self, tag: &ImageTag, definition: &[u8]) -> Result<BuildOutput, RuntimeError>;

    /// Create and start a process from `image` running `command`, with
    /// stdout and stderr captured into one stream.
    fn start(&self, image: &ImageTag, command: &[String]) -> Result<ContainerHandle, RuntimeError>;

    /// Block until the process is no longer running.
    fn wait(&self, handle: &ContainerHandle) -> Result<TerminalStatus, RuntimeError>;

    /// Read the combined output stream to completion.
    fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>, RuntimeError>;

    /// Release a finished process. Clients without cleanup keep the default.
    fn remove(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
        Ok(())
    }
}

pub fn select_client(
    name: &str,
    options: &ClientOptions,
) -> Result<Box<dyn RuntimeClient>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerClient::new(options.clone()))),
        "mock" => Ok(Box::new(crate::mock::MockClient::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

/// Deterministic image tag for one module: `<namespace>/<version>/<category>/<name>`.
///
/// A leading `v` on the version is dropped and the tag is lower-cased, since
/// image references may not contain upper-case characters.
pub fn image_tag(namespace: &str, version: &str, id: &Identifier) -> ImageTag {
    let version = version.strip_prefix('v').unwrap_or(version);
    ImageTag::new(format!("{namespace}/{version}/{}/{}", id.category, id.name).to_lowercase())
}
