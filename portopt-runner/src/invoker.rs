//! Launching the external computation.
//!
//! One OS process per call, no pooling. Both output pipes are drained on
//! their own threads while the child runs, so a child that fills one pipe
//! while the other is unread cannot deadlock.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::GatewayError;

/// Caller-owned flag; setting it kills the running child.
pub type CancelFlag = Arc<AtomicBool>;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Per-call limits. The default imposes none.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelFlag>,
}

impl InvokeOptions {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: Option<CancelFlag>) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Runs `executable script args...` and returns its exit code and output.
///
/// A non-zero exit is a normal `Ok` outcome; only launch problems, deadline
/// expiry and cancellation are errors here.
pub trait ProcessInvoker: Send + Sync {
    fn run(
        &self,
        executable: &str,
        script: &Path,
        args: &[String],
        opts: &InvokeOptions,
    ) -> Result<ProcessOutput, GatewayError>;
}

/// [`ProcessInvoker`] backed by `std::process`.
///
/// On unix the child leads its own process group, and expiry or cancellation
/// kills the whole group. The deadline covers draining the output as well as
/// the child's exit, so a background process that inherited the pipes cannot
/// hold the call open past it.
#[derive(Debug, Clone)]
pub struct SystemInvoker {
    poll_interval: Duration,
}

impl SystemInvoker {
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
        }
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    fn wait(
        &self,
        child: &mut Child,
        opts: &InvokeOptions,
        started: Instant,
    ) -> Result<ExitStatus, GatewayError> {
        if opts.timeout.is_none() && opts.cancel.is_none() {
            return child
                .wait()
                .map_err(|e| GatewayError::io("wait for child process", e));
        }

        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| GatewayError::io("poll child process", e))?
            {
                return Ok(status);
            }
            if opts.is_cancelled() {
                kill_and_reap(child);
                return Err(GatewayError::Cancelled);
            }
            if let Some(limit) = opts.timeout {
                if started.elapsed() >= limit {
                    kill_and_reap(child);
                    return Err(GatewayError::Timeout { after: limit });
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Waits for one drained stream under the same limits as the child.
    ///
    /// The child has already exited here; anything still holding the pipe is
    /// a descendant, and it is killed along with the group on expiry.
    fn collect(
        &self,
        output: Option<Receiver<Vec<u8>>>,
        stream: &str,
        child: &mut Child,
        opts: &InvokeOptions,
        started: Instant,
    ) -> Result<String, GatewayError> {
        let Some(output) = output else {
            return Ok(String::new());
        };

        if opts.timeout.is_none() && opts.cancel.is_none() {
            return Ok(match output.recv() {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => reader_lost(stream),
            });
        }

        loop {
            let slice = match opts.timeout {
                Some(limit) => limit
                    .saturating_sub(started.elapsed())
                    .min(self.poll_interval),
                None => self.poll_interval,
            };
            match output.recv_timeout(slice) {
                Ok(bytes) => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
                Err(RecvTimeoutError::Disconnected) => return Ok(reader_lost(stream)),
                Err(RecvTimeoutError::Timeout) => {}
            }
            if opts.is_cancelled() {
                warn!(stream, "cancelled while a descendant still held the output pipe");
                kill_group(child);
                return Err(GatewayError::Cancelled);
            }
            if let Some(limit) = opts.timeout {
                if started.elapsed() >= limit {
                    warn!(stream, "deadline passed while a descendant still held the output pipe");
                    kill_group(child);
                    return Err(GatewayError::Timeout { after: limit });
                }
            }
        }
    }
}

impl Default for SystemInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInvoker for SystemInvoker {
    fn run(
        &self,
        executable: &str,
        script: &Path,
        args: &[String],
        opts: &InvokeOptions,
    ) -> Result<ProcessOutput, GatewayError> {
        debug!(executable, script = %script.display(), ?args, "spawning external process");

        let mut command = Command::new(executable);
        command
            .arg(script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| GatewayError::Spawn {
            program: executable.to_string(),
            source,
        })?;
        let started = Instant::now();

        // Reader threads are detached: on expiry they finish once the killed
        // group releases the pipes, and their sends go nowhere.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child, opts, started)?;
        let stdout = self.collect(stdout, "stdout", &mut child, opts, started)?;
        let stderr = self.collect(stderr, "stderr", &mut child, opts, started)?;

        Ok(ProcessOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                warn!(error = %e, "reading child output failed");
            }
            let _ = tx.send(buf);
        });
        rx
    })
}

fn reader_lost(stream: &str) -> String {
    warn!(stream, "output reader thread ended without output");
    String::new()
}

fn kill_and_reap(child: &mut Child) {
    kill_group(child);
    if let Err(e) = child.wait() {
        warn!(pid = child.id(), error = %e, "failed to reap child process");
    }
}

/// Kills the child's process group; the child is its leader, so the group id
/// is the child's pid.
#[cfg(unix)]
fn kill_group(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        warn!(pid = child.id(), "child pid out of range for a process group");
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses a group.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        let e = std::io::Error::last_os_error();
        if e.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, error = %e, "failed to kill process group");
        }
    }
}

/// Without process groups only the direct child can be addressed.
#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(pid = child.id(), error = %e, "failed to kill child process");
    }
}
