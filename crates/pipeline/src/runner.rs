//! Process Runner
//!
//! Runs one shell command as a subprocess in its own process group, with a
//! deadline. Knows nothing about tools or phases.
//!
//! - Exit status is reported, never raised: a non-zero exit is data.
//! - On timeout or cancellation the whole process group gets SIGTERM, then
//!   SIGKILL once the grace period lapses. The group never outlives `run`.
//! - Only a failure to spawn (or to wait on) the OS process is an `Err`.
//!
//! Output is buffered in memory. Recon tools print tens of MB at most; a
//! tool expected to print gigabytes should write to `{output}` instead.

use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use recon_core::{CoreError, CoreResult};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Default time a terminated process group gets to exit before SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound on draining pipes after the process group is gone.
const PIPE_DRAIN_LIMIT: Duration = Duration::from_secs(2);

/// Captured outcome of one subprocess.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_seconds: f64,
    pub timed_out: bool,
    /// Stopped because the run was cancelled
    pub cancelled: bool,
    /// Signal that terminated the process, if any
    pub signal: Option<i32>,
}

impl ProcessOutput {
    /// Exited on its own with code 0.
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }
}

/// Runs a command line to completion or deadline.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> CoreResult<ProcessOutput>;
}

/// `sh -c` based runner.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    grace_period: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

enum Ending {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TERM -> KILL grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    fn build_command(command: &str) -> Command {
        #[cfg(windows)]
        let (shell, shell_arg) = ("cmd", "/C");
        #[cfg(not(windows))]
        let (shell, shell_arg) = ("sh", "-c");

        let mut cmd = Command::new(shell);
        cmd.arg(shell_arg)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// TERM the group, wait out the grace period, then KILL.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
        signal_group(child, pid, GroupSignal::Terminate);
        let status = match timeout(self.grace_period, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => {
                tracing::debug!(?pid, "process group ignored SIGTERM, sending SIGKILL");
                signal_group(child, pid, GroupSignal::Kill);
                let _ = child.start_kill();
                child.wait().await.ok()
            }
        };
        // Sweep grandchildren that outlived the group leader.
        signal_group(child, pid, GroupSignal::Kill);
        status
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        timeout_secs: u64,
        cancel: &CancellationToken,
    ) -> CoreResult<ProcessOutput> {
        let start = Instant::now();
        let mut child = Self::build_command(command)
            .spawn()
            .map_err(|e| CoreError::spawn(format!("failed to spawn `{}`: {}", command, e)))?;
        let pid = child.id();

        let stdout_task = spawn_reader(child.stdout.take());
        let stderr_task = spawn_reader(child.stderr.take());

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = sleep(Duration::from_secs(timeout_secs)) => Ending::TimedOut,
            _ = cancel.cancelled() => Ending::Cancelled,
        };

        let mut output = ProcessOutput::default();
        let status = match ending {
            Ending::Exited(status) => {
                let status = status?;
                signal_group(&mut child, pid, GroupSignal::Kill);
                Some(status)
            }
            Ending::TimedOut => {
                output.timed_out = true;
                self.terminate(&mut child, pid).await
            }
            Ending::Cancelled => {
                output.cancelled = true;
                self.terminate(&mut child, pid).await
            }
        };
        output.elapsed_seconds = start.elapsed().as_secs_f64();

        if let Some(status) = status {
            output.exit_code = status.code();
            output.signal = exit_signal(&status);
        }
        output.stdout = drain(stdout_task).await;
        output.stderr = drain(stderr_task).await;

        Ok(output)
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    })
}

async fn drain(task: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    let abort = task.abort_handle();
    match timeout(PIPE_DRAIN_LIMIT, task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            tracing::warn!("pipe still open after process exit, dropping remaining output");
            abort.abort();
            String::new()
        }
    }
}

#[derive(Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(_child: &mut Child, pid: Option<u32>, signal: GroupSignal) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    let signal = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) with a negative pid only sends a signal to the
    // process group we created with process_group(0).
    unsafe {
        libc::kill(-pid, signal);
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _pid: Option<u32>, _signal: GroupSignal) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
