use crate::artifact::collect_artifacts;
use crate::config::EngineSpec;
use crate::models::{ArtifactSet, EngineError, EngineInvocation, EngineVariant};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
    time::{timeout_at, Instant},
};

/// Diagnostics carried by an execution error are cut to this many bytes.
const MAX_DIAGNOSTICS_BYTES: usize = 4096;

/// One byte past the cap, so truncation is still visible after draining.
const DRAIN_LIMIT: usize = MAX_DIAGNOSTICS_BYTES + 1;

const READ_CHUNK_SIZE: usize = 8192;

#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs the engine selected by `invocation.variant` inside its workspace.
    async fn run(&self, invocation: &EngineInvocation) -> Result<ArtifactSet, EngineError>;

    fn is_available(&self, variant: EngineVariant) -> bool;
}

/// Runs engine binaries as local subprocesses.
#[derive(Clone)]
pub struct LocalExecutor {
    engines: Arc<HashMap<EngineVariant, EngineSpec>>,
}

impl LocalExecutor {
    pub fn new(engines: HashMap<EngineVariant, EngineSpec>) -> Self {
        Self {
            engines: Arc::new(engines),
        }
    }

    pub fn spec(&self, variant: EngineVariant) -> Option<&EngineSpec> {
        self.engines.get(&variant)
    }

    fn resolve(&self, variant: EngineVariant) -> Result<(&EngineSpec, PathBuf), EngineError> {
        let spec = self.engines.get(&variant).ok_or_else(|| {
            EngineError::EngineUnavailable(format!("No engine configured for variant {}", variant))
        })?;
        let program = find_executable(&spec.executable).ok_or_else(|| {
            EngineError::EngineUnavailable(format!(
                "Engine {} needs '{}', which is not installed or not executable",
                variant, spec.executable
            ))
        })?;
        Ok((spec, program))
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn run(&self, invocation: &EngineInvocation) -> Result<ArtifactSet, EngineError> {
        let (spec, program) = self.resolve(invocation.variant)?;
        let workspace_dir = &invocation.workspace.path;

        // The engine writes its outputs relative to its own working directory,
        // which is set on the child only; this process's cwd is never touched.
        let mut command = Command::new(&program);
        command
            .args(&spec.args)
            .arg(&invocation.input_path)
            .current_dir(workspace_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        debug!(
            "Launching {:?} {:?} {:?} in {:?}",
            program, spec.args, invocation.input_path, workspace_dir
        );

        let deadline = Instant::now() + invocation.timeout;
        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => EngineError::EngineUnavailable(
                format!("Failed to launch {}: {}", spec.executable, e),
            ),
            _ => EngineError::Storage(format!("Failed to launch {}: {}", spec.executable, e)),
        })?;
        let process_group = child.id();

        let mut stdout_task = drain(child.stdout.take());
        let mut stderr_task = drain(child.stderr.take());

        let status = match timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                kill_process_group(process_group);
                stdout_task.abort();
                stderr_task.abort();
                return Err(EngineError::Storage(format!(
                    "Failed to wait for {}: {}",
                    spec.executable, e
                )));
            }
            Err(_) => {
                // Kill and reap before reporting, so no child outlives the call.
                kill_process_group(process_group);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out engine {}: {}", spec.executable, e);
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(EngineError::Timeout(invocation.timeout));
            }
        };

        // Whatever the engine left running in its group goes with it.
        kill_process_group(process_group);

        // A process outside the group may still hold the pipes open; the
        // deadline covers the reads too.
        let output = timeout_at(deadline, async {
            tokio::join!(&mut stdout_task, &mut stderr_task)
        })
        .await;
        let (stdout, stderr) = match output {
            Ok((stdout, stderr)) => (stdout.unwrap_or_default(), stderr.unwrap_or_default()),
            Err(_) => {
                stdout_task.abort();
                stderr_task.abort();
                warn!("Output of {} still open at the deadline", spec.executable);
                return Err(EngineError::Timeout(invocation.timeout));
            }
        };

        if !status.success() {
            let diagnostics = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(EngineError::EngineExecution {
                exit_code: status.code(),
                diagnostics: truncate(diagnostics.trim(), MAX_DIAGNOSTICS_BYTES),
            });
        }

        let input_name = invocation
            .input_path
            .file_name()
            .and_then(|name| name.to_str());
        collect_artifacts(
            workspace_dir,
            &spec.primary_extension,
            &spec.auxiliary_extensions,
            input_name,
        )
        .await
    }

    fn is_available(&self, variant: EngineVariant) -> bool {
        self.resolve(variant).is_ok()
    }
}

/// Reads a child pipe to the end on its own task, so a chatty engine never
/// blocks on a full pipe while we wait for it to exit. Only the first
/// `DRAIN_LIMIT` bytes are kept.
fn drain<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let room = DRAIN_LIMIT.saturating_sub(buffer.len());
                        buffer.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

/// SIGKILL to the engine's process group. A group that is already gone is
/// not an error.
#[cfg(unix)]
fn kill_process_group(process_group: Option<u32>) {
    let Some(pgid) = process_group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!("Failed to kill process group {}: {}", pgid, err);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_process_group: Option<u32>) {}

fn truncate(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Resolves an executable the way a shell would: names containing a path
/// separator are taken as paths, bare names are searched on `PATH`.
pub fn find_executable(executable: &str) -> Option<PathBuf> {
    let candidate = Path::new(executable);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(executable))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
