//! Spawning external build steps and watching their output.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use conveyor_types::{ConveyorError, Result};

use crate::progress_log::ProgressLog;

/// One external command of a build pipeline.
#[derive(Debug, Clone)]
pub struct SpawnCommand {
    pub command: String,
    pub args: Vec<String>,
}

impl SpawnCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for SpawnCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// What a watched process run produced. `output` is the merged transcript of
/// stdout and stderr in arrival order, identical to what went into the log.
#[derive(Debug, Clone)]
pub struct SpawnResult {
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub output: String,
}

/// Classifies a completed run as failed from its exit code and transcript.
/// Exists because some build tools exit zero on partial failure.
pub type ErrorFinder = Arc<dyn Fn(i32, &str) -> bool + Send + Sync>;

/// Failure on nonzero exit only.
pub fn failure_on_nonzero() -> ErrorFinder {
    Arc::new(|code, _output| code != 0)
}

/// Failure on nonzero exit, or on the pattern appearing anywhere in the
/// transcript of a zero-exit run.
pub fn failure_on_pattern(pattern: &str) -> Result<ErrorFinder> {
    let re = Regex::new(pattern).map_err(|e| ConveyorError::Other(e.to_string()))?;
    Ok(Arc::new(move |code, output| {
        code != 0 || re.is_match(output)
    }))
}

/// Run one command to completion in `cwd`, streaming its output into `log`.
///
/// On timeout the process group gets SIGTERM, two seconds of grace, then a
/// hard kill; the result reports `timed_out` with whatever output arrived.
/// A spawn failure (missing binary, bad cwd) is an error; a nonzero exit is
/// not, classification being the error finder's job.
pub async fn spawn_and_watch(
    cmd: &SpawnCommand,
    cwd: &Path,
    log: Arc<dyn ProgressLog>,
    timeout_ms: u64,
) -> Result<SpawnResult> {
    let mut command = tokio::process::Command::new(&cmd.command);
    command
        .args(&cmd.args)
        .current_dir(cwd)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    #[cfg(unix)]
    {
        command.process_group(0);
    }

    let start = tokio::time::Instant::now();
    let mut child = command.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let transcript = Arc::new(tokio::sync::Mutex::new(Vec::<String>::new()));

    let mut readers = Vec::new();
    if let Some(stdout) = stdout {
        readers.push(tokio::spawn(watch_stream(
            stdout,
            Arc::clone(&log),
            Arc::clone(&transcript),
        )));
    }
    if let Some(stderr) = stderr {
        readers.push(tokio::spawn(watch_stream(
            stderr,
            Arc::clone(&log),
            Arc::clone(&transcript),
        )));
    }

    let timeout = Duration::from_millis(timeout_ms);
    let (exit_code, timed_out) = tokio::select! {
        status = child.wait() => (status?.code().unwrap_or(-1), false),
        _ = tokio::time::sleep(timeout) => {
            #[cfg(unix)]
            {
                if let Some(pid) = child.id() {
                    // SIGTERM the whole process group, then give it 2s.
                    unsafe { libc::kill(-(pid as i32), libc::SIGTERM); }
                }
                tokio::select! {
                    _ = child.wait() => {}
                    _ = tokio::time::sleep(Duration::from_secs(2)) => {
                        let _ = child.kill().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = child.kill().await;
            }
            (-1, true)
        }
    };

    // Readers finish at pipe EOF once the process is gone.
    for reader in readers {
        let _ = reader.await;
    }

    let output = transcript.lock().await.join("\n");
    Ok(SpawnResult {
        exit_code,
        timed_out,
        duration_ms: start.elapsed().as_millis() as u64,
        output,
    })
}

async fn watch_stream<R: AsyncRead + Unpin>(
    stream: R,
    log: Arc<dyn ProgressLog>,
    transcript: Arc<tokio::sync::Mutex<Vec<String>>>,
) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log.write(&line);
        transcript.lock().await.push(line);
    }
}
