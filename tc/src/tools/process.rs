//! Child process helpers shared by the subprocess-backed tools
//!
//! Every child runs in its own process group so cancellation reaches the
//! whole tree (`sh -c` plus whatever it spawned).

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Time a child gets between SIGTERM and SIGKILL
pub const TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Captured result of a finished, cancelled or timed-out child
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub cancelled: bool,
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Exited 0 on its own
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.cancelled && !self.timed_out
    }

    /// Name of the terminating signal, if any
    pub fn signal_name(&self) -> Option<String> {
        self.signal.map(|sig| {
            nix::sys::signal::Signal::try_from(sig)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|_| sig.to_string())
        })
    }
}

enum Finish {
    Exited(ExitStatus),
    Cancelled,
    TimedOut,
}

/// Put the child in its own process group and pipe its output
pub fn prepare_command(cmd: &mut Command, with_stdin: bool) {
    cmd.stdin(if with_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
}

/// Spawn `cmd`, feed it `stdin`, and wait for exit, cancellation or timeout
///
/// On cancellation or timeout the process group is terminated (SIGTERM,
/// then SIGKILL after [`TERMINATION_GRACE`]) and whatever output was
/// produced so far is returned.
pub async fn run_with_cancel(
    mut cmd: Command,
    stdin: Option<Vec<u8>>,
    cancel: &CancellationToken,
    timeout: Duration,
) -> std::io::Result<ProcessOutput> {
    debug!(?timeout, has_stdin = stdin.is_some(), "process::run_with_cancel: called");
    prepare_command(&mut cmd, stdin.is_some());
    let mut child = cmd.spawn()?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(&input).await {
                debug!(%e, "process::run_with_cancel: child closed stdin early");
            }
        });
    }

    let stdout_task = spawn_reader(child.stdout.take());
    let stderr_task = spawn_reader(child.stderr.take());

    let finish = tokio::select! {
        status = child.wait() => Finish::Exited(status?),
        _ = cancel.cancelled() => Finish::Cancelled,
        _ = tokio::time::sleep(timeout) => Finish::TimedOut,
    };

    let (status, cancelled, timed_out) = match finish {
        Finish::Exited(status) => (status, false, false),
        Finish::Cancelled => {
            debug!("process::run_with_cancel: cancelled, terminating child");
            (terminate_child(&mut child).await?, true, false)
        }
        Finish::TimedOut => {
            debug!("process::run_with_cancel: timed out, terminating child");
            (terminate_child(&mut child).await?, false, true)
        }
    };

    let stdout = collect_reader(stdout_task).await;
    let stderr = collect_reader(stderr_task).await;

    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code: status.code(),
        signal: exit_signal(&status),
        cancelled,
        timed_out,
    })
}

/// SIGTERM the child's process group, wait out the grace period, then SIGKILL
pub async fn terminate_child(child: &mut Child) -> std::io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped
        return child.wait().await;
    };
    debug!(pid, "process::terminate_child: sending SIGTERM");
    send_signal(pid, nix::sys::signal::Signal::SIGTERM);

    match tokio::time::timeout(TERMINATION_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(pid, "Child ignored SIGTERM, sending SIGKILL");
            send_signal(pid, nix::sys::signal::Signal::SIGKILL);
            child.kill().await?;
            child.wait().await
        }
    }
}

fn send_signal(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid as i32);
    if killpg(pid, signal).is_err() {
        // Not a group leader (or already gone); signal the process itself
        let _ = kill(pid, signal);
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!(%e, "process::spawn_reader: read failed");
            }
            buf
        })
    })
}

async fn collect_reader(task: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match tokio::time::timeout(TERMINATION_GRACE, task).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(e)) => {
            debug!(%e, "process::collect_reader: reader task failed");
            String::new()
        }
        Err(_) => {
            debug!("process::collect_reader: pipe held open by a grandchild, giving up");
            String::new()
        }
    }
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
