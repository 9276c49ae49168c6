//! Subprocess supervision: spawn, capture, timeout and process-tree kill.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::error::ProcessError;

/// Captured bytes per stream; the rest is drained and discarded.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// How long to wait for the output pipes to close after the process exits.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// An external command to run under supervision.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn build_command(&self) -> Command {
        let mut std_command = std::process::Command::new(&self.program);
        std_command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            std_command.current_dir(dir);
        }

        // New process group so a timeout can take down the whole tree.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            std_command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut command = Command::from(std_command);
        command.kill_on_drop(true);
        command
    }
}

/// Result of a process that ran to completion (successfully or not).
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a process to completion or until its timeout elapses.
///
/// A non-zero exit is returned as output, not as an error. On timeout the
/// process tree is killed and the child reaped before `Timeout` is returned.
pub async fn run_process(spec: ProcessSpec) -> Result<ProcessOutput, ProcessError> {
    let start = Instant::now();
    debug!("Spawning {:?} {:?}", spec.program, spec.args);

    let mut child = spec.build_command().spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProcessError::NotFound {
                program: spec.program.clone(),
            }
        } else {
            ProcessError::Spawn {
                program: spec.program.clone(),
                source: e,
            }
        }
    })?;

    let pid = child.id();
    let stdout_task = tokio::spawn(capture(child.stdout.take()));
    let stderr_task = tokio::spawn(capture(child.stderr.take()));

    match timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout = collect(stdout_task, pid).await;
            let stderr = collect(stderr_task, pid).await;
            let elapsed = start.elapsed();
            debug!(
                "{:?} exited with {:?} after {:?}",
                spec.program,
                status.code(),
                elapsed
            );
            Ok(ProcessOutput {
                exit_code: status.code(),
                stdout,
                stderr,
                elapsed,
            })
        }
        Ok(Err(e)) => Err(ProcessError::Io(e)),
        Err(_) => {
            warn!(
                "{:?} exceeded {:?}, terminating process tree",
                spec.program, spec.timeout
            );
            kill_tree(pid).await;
            if let Err(e) = child.kill().await {
                debug!("Child already gone after tree kill: {}", e);
            }
            stdout_task.abort();
            stderr_task.abort();
            Err(ProcessError::Timeout {
                program: spec.program.clone(),
                timeout_secs: whole_seconds(spec.timeout),
            })
        }
    }
}

/// Seconds for messages, rounded up so a sub-second limit never reads as 0s.
fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

async fn capture<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let Some(mut stream) = stream else {
        return Vec::new();
    };
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_CAPTURE_BYTES.saturating_sub(captured.len());
                captured.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    captured
}

/// Waits briefly for a capture task. A grandchild holding the pipe open is
/// killed together with its process group.
async fn collect(task: tokio::task::JoinHandle<Vec<u8>>, pid: Option<u32>) -> String {
    let abort = task.abort_handle();
    match timeout(PIPE_GRACE, task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).to_string(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            debug!("Output pipe still open after exit, killing leftover processes");
            kill_tree(pid).await;
            abort.abort();
            String::new()
        }
    }
}

#[cfg(unix)]
async fn kill_tree(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", raw, e),
    }
}

#[cfg(windows)]
async fn kill_tree(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        warn!("Failed to run taskkill for {}: {}", pid, e);
    }
}

#[cfg(not(any(unix, windows)))]
async fn kill_tree(_pid: Option<u32>) {}
