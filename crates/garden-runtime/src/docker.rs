use crate::client::{BuildOutput, ClientOptions, RuntimeClient, TerminalStatus};
use crate::RuntimeError;
use garden_schema::{ContainerHandle, ImageTag};
use std::io::Write;
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Runtime client backed by the `docker` command-line tool.
///
/// Every operation is a separate `docker` invocation, so the client holds no
/// connection state and can be shared freely between threads.
pub struct DockerClient {
    binary: String,
    options: ClientOptions,
}

impl DockerClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            binary: "docker".to_owned(),
            options,
        }
    }

    /// Use a different docker-compatible binary (e.g. `podman`).
    #[must_use]
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_owned();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.global_args());
        cmd
    }

    fn global_args(&self) -> Vec<String> {
        if let Some(ctx) = &self.options.context {
            vec!["--context".to_owned(), ctx.clone()]
        } else if let Some(host) = &self.options.host {
            vec!["--host".to_owned(), host.clone()]
        } else {
            Vec::new()
        }
    }
}

/// Wrap a definition file into a tar build context holding a single `Dockerfile`.
pub fn build_context(definition: &[u8]) -> Result<Vec<u8>, RuntimeError> {
    let mut ar = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(definition.len() as u64);
    header.set_mode(0o600);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    ar.append_data(&mut header, "Dockerfile", definition)?;
    Ok(ar.into_inner()?)
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_owned()
}

impl RuntimeClient for DockerClient {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn available(&self) -> bool {
        self.command()
            .args(["version", "--format", "{{.Server.Version}}"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn build(&self, tag: &ImageTag, definition: &[u8]) -> Result<BuildOutput, RuntimeError> {
        let context = build_context(definition)?;
        debug!("docker build --tag {tag} ({} byte context)", context.len());

        let mut child = self
            .command()
            .args(["build", "--tag", tag.as_str(), "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::build_failed(format!("failed to spawn docker: {e}")))?;

        // Feed the context from another thread so a chatty build cannot fill
        // the output pipes while we are still writing.
        let stdin = child.stdin.take();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&context)?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        let sent = match writer.join() {
            Ok(written) => written.map_err(|e| format!("failed to send build context: {e}")),
            Err(_) => Err("build context writer panicked".to_owned()),
        };
        if let Err(message) = sent {
            return Err(RuntimeError::BuildFailed { message, log });
        }

        if !output.status.success() {
            return Err(RuntimeError::BuildFailed {
                message: format!(
                    "docker build exited with {}: {}",
                    output.status,
                    stderr_text(&output)
                ),
                log,
            });
        }

        Ok(BuildOutput {
            image: tag.clone(),
            log,
        })
    }

    fn start(&self, image: &ImageTag, command: &[String]) -> Result<ContainerHandle, RuntimeError> {
        // A TTY merges stdout and stderr into one log stream.
        let created = self
            .command()
            .args(["create", "--tty", image.as_str()])
            .args(command)
            .output()
            .map_err(|e| RuntimeError::StartFailed(format!("failed to spawn docker: {e}")))?;
        if !created.status.success() {
            return Err(RuntimeError::StartFailed(format!(
                "docker create exited with {}: {}",
                created.status,
                stderr_text(&created)
            )));
        }
        let id = String::from_utf8_lossy(&created.stdout).trim().to_owned();
        if id.is_empty() {
            return Err(RuntimeError::StartFailed(
                "docker create returned no container id".to_owned(),
            ));
        }

        let started = self
            .command()
            .args(["start", &id])
            .output()
            .map_err(|e| RuntimeError::StartFailed(format!("failed to spawn docker: {e}")))?;
        if !started.status.success() {
            return Err(RuntimeError::StartFailed(format!(
                "docker start {id} exited with {}: {}",
                started.status,
                stderr_text(&started)
            )));
        }
        Ok(ContainerHandle::new(id))
    }

    fn wait(&self, handle: &ContainerHandle) -> Result<TerminalStatus, RuntimeError> {
        let output = self
            .command()
            .args(["wait", handle.as_str()])
            .output()
            .map_err(|e| RuntimeError::WaitFailed(format!("failed to spawn docker: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError::WaitFailed(format!(
                "docker wait {handle} exited with {}: {}",
                output.status,
                stderr_text(&output)
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let exit_code = text.trim().parse::<i64>().map_err(|e| {
            RuntimeError::WaitFailed(format!("unexpected docker wait output '{}': {e}", text.trim()))
        })?;
        Ok(TerminalStatus { exit_code })
    }

    fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>, RuntimeError> {
        let output = self
            .command()
            .args(["logs", handle.as_str()])
            .output()
            .map_err(|e| RuntimeError::LogsFailed(format!("failed to spawn docker: {e}")))?;
        if !output.status.success() {
            return Err(RuntimeError::LogsFailed(format!(
                "docker logs {handle} exited with {}: {}",
                output.status,
                stderr_text(&output)
            )));
        }
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(combined)
    }

    fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let output = self.command().args(["rm", "--force", handle.as_str()]).output()?;
        if !output.status.success() {
            return Err(RuntimeError::Io(std::io::Error::other(format!(
                "docker rm {handle} exited with {}: {}",
                output.status,
                stderr_text(&output)
            ))));
        }
        Ok(())
    }
}
