//! Runtime clients for Garden module execution.
//!
//! This crate implements the container boundary used by the orchestrator: the
//! `RuntimeClient` trait (build an image from a definition, start a process,
//! wait for it to stop, read its combined output), a `DockerClient` that drives
//! the `docker` CLI, a scriptable `MockClient`, deterministic image tagging, and
//! prerequisite checking.

pub mod client;
pub mod docker;
pub mod mock;
pub mod prereq;

pub use client::{
    image_tag, select_client, BuildOutput, ClientOptions, RuntimeClient, TerminalStatus,
};
pub use docker::DockerClient;
pub use mock::{MockClient, Stage};
pub use prereq::{check_docker_prereqs, format_missing, MissingPrereq};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    /// `log` holds whatever build output was produced before the failure.
    #[error("image build failed: {message}")]
    BuildFailed { message: String, log: String },
    #[error("container start failed: {0}")]
    StartFailed(String),
    #[error("waiting for container failed: {0}")]
    WaitFailed(String),
    #[error("reading container logs failed: {0}")]
    LogsFailed(String),
    #[error("module did not finish within {0} seconds")]
    TimedOut(u64),
    #[error("execution aborted: {0}")]
    Aborted(String),
}

impl RuntimeError {
    /// A build failure that produced no output.
    pub fn build_failed(message: impl Into<String>) -> Self {
        Self::BuildFailed {
            message: message.into(),
            log: String::new(),
        }
    }
}
