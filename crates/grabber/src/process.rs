//! Bounded execution of external tools.
//!
//! A child's stdout and stderr are drained by a dedicated task for the whole
//! lifetime of the process, so a chatty tool can never block on a full pipe.
//! The drain task is always joined before an outcome is built, on the success
//! path as well as after a timeout kill, so trailing diagnostics are kept.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use log::{debug, error, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use crate::error::{GrabError, GrabResult};

/// How long to wait for a killed child to be reaped and for its pipes to close
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Fully resolved description of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub executable: PathBuf,
    pub arguments: Vec<String>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(executable: impl Into<PathBuf>, arguments: Vec<String>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            arguments,
            timeout,
        }
    }

    /// Short name used in logs and errors ("yt-dlp", "ffmpeg")
    pub fn program_name(&self) -> String {
        self.executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable.display().to_string())
    }

    pub fn display_command(&self) -> String {
        format!("{} {}", self.executable.display(), self.arguments.join(" "))
    }

    fn to_command(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/c").arg(&self.executable);
            cmd
        } else {
            Command::new(&self.executable)
        };
        cmd.args(&self.arguments);
        cmd
    }
}

/// What a finished (or killed) process left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code as reported by the OS, -1 when the process was terminated by a signal
    pub exit_code: i32,
    /// stdout and stderr lines interleaved in arrival order
    pub combined_output: String,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Launches external commands under a wall-clock deadline
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    drain_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Run `spec` to completion.
    ///
    /// Fails with [`GrabError::Launch`] if the executable cannot be started and
    /// with [`GrabError::Timeout`] if it outlives `spec.timeout`. A non-zero exit
    /// code is not an error here; interpreting it is up to the caller.
    pub async fn run(&self, spec: &ProcessSpec) -> GrabResult<ProcessOutcome> {
        let outcome = self.execute(spec).await?;
        if outcome.timed_out {
            return Err(GrabError::timeout(spec.program_name(), spec.timeout.as_secs()));
        }
        Ok(outcome)
    }

    /// Like [`run`](Self::run) but reports a timeout through `ProcessOutcome::timed_out`
    /// together with whatever output was captured before the kill.
    pub async fn execute(&self, spec: &ProcessSpec) -> GrabResult<ProcessOutcome> {
        let program = spec.program_name();
        debug!("Executing: {}", spec.display_command());

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| GrabError::launch(&program, e))?;

        let drain = OutputDrain::spawn(
            program.clone(),
            child.stdout.take(),
            child.stderr.take(),
        );

        let (exit_code, timed_out) = match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
            Ok(Err(e)) => {
                self.force_kill(&program, &mut child).await;
                drain.finish(self.drain_grace).await;
                return Err(GrabError::io(format!("Failed to wait for {}", program), e));
            }
            Err(_) => {
                error!(
                    "{} did not finish within {} seconds, killing process",
                    program,
                    spec.timeout.as_secs()
                );
                self.force_kill(&program, &mut child).await;
                (-1, true)
            }
        };

        let combined_output = drain.finish(self.drain_grace).await;
        debug!(
            "{} finished in {:.1}s (exit code: {}, timed out: {}, output: {} bytes)",
            program,
            started.elapsed().as_secs_f64(),
            exit_code,
            timed_out,
            combined_output.len()
        );

        Ok(ProcessOutcome {
            exit_code,
            combined_output,
            timed_out,
        })
    }

    /// SIGKILL the child and reap it, but never wait longer than the grace period
    async fn force_kill(&self, program: &str, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            // Already exited between the deadline and the kill
            debug!("Kill of {} failed: {}", program, e);
        }
        match tokio::time::timeout(self.drain_grace, child.wait()).await {
            Ok(Ok(status)) => debug!("{} terminated: {}", program, status),
            Ok(Err(e)) => warn!("Failed to reap {}: {}", program, e),
            Err(_) => warn!(
                "{} still not reaped {:?} after kill, leaving it to the runtime",
                program, self.drain_grace
            ),
        }
    }
}

/// Background reader accumulating both output pipes of one child
struct OutputDrain {
    label: String,
    handle: JoinHandle<()>,
    buffer: Arc<Mutex<String>>,
}

impl OutputDrain {
    fn spawn<O, E>(label: String, stdout: Option<O>, stderr: Option<E>) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&buffer);
        let task_label = label.clone();

        let handle = tokio::spawn(async move {
            let mut out_reader = stdout.map(LineReader::new);
            let mut err_reader = stderr.map(LineReader::new);

            while out_reader.is_some() || err_reader.is_some() {
                let (is_stdout, result) = tokio::select! {
                    r = next_line(&mut out_reader) => (true, r),
                    r = next_line(&mut err_reader) => (false, r),
                };

                let closed = match result {
                    Ok(Some(line)) => {
                        debug!("{}: {}", task_label, line);
                        let mut buf = sink.lock().unwrap_or_else(|p| p.into_inner());
                        buf.push_str(&line);
                        buf.push('\n');
                        false
                    }
                    Ok(None) => true,
                    Err(e) => {
                        warn!("Error reading {} output: {}", task_label, e);
                        true
                    }
                };

                if closed {
                    if is_stdout {
                        out_reader = None;
                    } else {
                        err_reader = None;
                    }
                }
            }
        });

        Self { label, handle, buffer }
    }

    /// Join the reader and hand back everything it collected
    async fn finish(self, grace: Duration) -> String {
        let OutputDrain { label, mut handle, buffer } = self;

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} output reader panicked: {}", label, e),
            Err(_) => {
                // A grandchild can keep the pipe open after the child is gone
                warn!("{} output still open {:?} after exit, abandoning reader", label, grace);
                handle.abort();
            }
        }

        let mut buf = buffer.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *buf)
    }
}

/// Newline-delimited reader that tolerates invalid UTF-8 and cancellation
struct LineReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        // read_until keeps partial data in `pending` if this future is dropped
        let n = self.reader.read_until(b'\n', &mut self.pending).await?;
        if n == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let mut end = self.pending.len();
        while end > 0 && matches!(self.pending[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        self.pending.clear();
        Ok(Some(line))
    }
}

async fn next_line<R: AsyncRead + Unpin>(reader: &mut Option<LineReader<R>>) -> io::Result<Option<String>> {
    match reader {
        Some(r) => r.next_line().await,
        None => std::future::pending().await,
    }
}
