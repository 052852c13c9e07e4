//! fio process execution.
//!
//! Spawns one fio run, hands every stdout line to a callback as soon as it
//! is read, and drains stderr on a separate task so a chatty fio cannot
//! block on a full pipe. Stderr is only surfaced when the run fails.

use fio_exporter_common::BenchmarkProfile;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

/// Errors that end a run. All of them are fatal to the exporter.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read fio output: {0}")]
    Io(#[from] std::io::Error),

    #[error("fio command failed with exit code {exit_code}\n{stderr}")]
    Failed { exit_code: i32, stderr: String },
}

/// One concrete fio command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInvocation {
    program: PathBuf,
    args: Vec<String>,
}

impl RunInvocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Resolve the command line for a validated profile.
    pub fn for_profile(fio_binary: &Path, profile: &BenchmarkProfile) -> Self {
        Self::new(fio_binary, profile.command_args())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for RunInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Lines read from stdout.
    pub lines: usize,
}

/// Execute the invocation, calling `on_line` for every stdout line.
///
/// Returns once stdout is closed and the process has exited.
pub async fn run<F>(invocation: &RunInvocation, mut on_line: F) -> Result<RunSummary, RunError>
where
    F: FnMut(&str),
{
    info!("Running fio: {}", invocation);

    let mut child = Command::new(invocation.program())
        .args(invocation.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: invocation.program().display().to_string(),
            source,
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("fio stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("fio stderr was not captured"))?;

    let stderr_task = tokio::spawn(drain(stderr));

    let mut summary = RunSummary::default();
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        summary.lines += 1;
        on_line(line);
    }

    let status = child.wait().await?;
    let stderr = stderr_task.await.unwrap_or_default();

    if status.success() {
        debug!(lines = summary.lines, "fio completed successfully");
        Ok(summary)
    } else {
        let exit_code = status.code().unwrap_or(-1);
        error!("fio failed with exit code: {}", exit_code);
        Err(RunError::Failed { exit_code, stderr })
    }
}

async fn drain<R>(stream: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut reader = BufReader::new(stream);
    if let Err(e) = reader.read_to_end(&mut bytes).await {
        debug!("stopped reading fio stderr: {}", e);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use fio_exporter_common::{BenchmarkKind, ProfileSettings};

    fn sh(script: &str) -> RunInvocation {
        RunInvocation::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_invocation_display() {
        let profile = BenchmarkProfile::new(ProfileSettings {
            kind: BenchmarkKind::Latency,
            custom_flags: None,
            directory: PathBuf::from("/tmp"),
            file_size: "1G".to_string(),
            runtime_secs: 60,
            status_interval_secs: None,
        })
        .unwrap();
        let invocation = RunInvocation::for_profile(Path::new("fio"), &profile);
        let rendered = invocation.to_string();
        assert!(rendered.starts_with("fio --name=latency --numjobs=1"));
        assert!(rendered.ends_with("--group_reporting"));
    }

    #[tokio::test]
    async fn test_lines_are_streamed_in_order() {
        let mut seen = Vec::new();
        let summary = run(&sh("printf 'one\\ntwo\\r\\nthree'"), |line| {
            seen.push(line.to_string())
        })
        .await
        .unwrap();

        assert_eq!(summary.lines, 3);
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let invocation = RunInvocation::new("/nonexistent/fio", vec![]);
        let err = run(&invocation, |_| {}).await.unwrap_err();
        assert!(matches!(err, RunError::Spawn { ref program, .. } if program == "/nonexistent/fio"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_surfaces_stderr() {
        let mut seen = 0;
        let err = run(&sh("echo partial; echo 'fio: disk full' >&2; exit 3"), |_| {
            seen += 1
        })
        .await
        .unwrap_err();

        assert_eq!(seen, 1);
        match err {
            RunError::Failed { exit_code, stderr } => {
                assert_eq!(exit_code, 3);
                assert!(stderr.contains("fio: disk full"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_large_stderr_does_not_block() {
        // Well past a 64 KiB pipe buffer.
        let script = "i=0; while [ $i -lt 4000 ]; do \
                      echo 'stderr noise line padded to make it long enough' >&2; \
                      i=$((i+1)); done; echo done";
        let mut seen = Vec::new();
        let summary = run(&sh(script), |line| seen.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(summary.lines, 1);
        assert_eq!(seen, vec!["done"]);
    }
}
