use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SidecarError;

/// Deadline applied when neither the command nor the runner sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One helper invocation: program, arguments, environment and deadline.
#[derive(Debug, Clone)]
pub struct SidecarCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl SidecarCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Overrides the runner's default deadline for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Captured result of a finished helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl SidecarOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Returns `Err(self)` on a non-zero exit so callers can classify it.
    pub fn into_success(self) -> Result<Self, Self> {
        if self.success() { Ok(self) } else { Err(self) }
    }
}

/// Stateless executor for helper processes.
///
/// Every child is started with `kill_on_drop`, so dropping an in-flight
/// call (e.g. on cancellation) terminates the process.
#[derive(Debug, Clone)]
pub struct SidecarRunner {
    default_timeout: Duration,
}

impl Default for SidecarRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl SidecarRunner {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Runs the command to completion and captures its output.
    ///
    /// On timeout the child is killed and reaped before the error is
    /// returned.
    pub async fn run(&self, cmd: &SidecarCommand) -> Result<SidecarOutput, SidecarError> {
        self.execute(cmd, None).await
    }

    /// Like [`run`](Self::run), but forwards every stdout and stderr line to
    /// `lines` as it arrives. The full text is still captured.
    pub async fn run_streaming(
        &self,
        cmd: &SidecarCommand,
        lines: mpsc::Sender<String>,
    ) -> Result<SidecarOutput, SidecarError> {
        self.execute(cmd, Some(&lines)).await
    }

    /// Starts the command without waiting for it and returns its pid.
    ///
    /// Used for game launches: the child outlives the call and is reaped by
    /// a background task.
    pub async fn spawn_detached(&self, cmd: &SidecarCommand) -> Result<Option<u32>, SidecarError> {
        let program = cmd.program_name();
        let mut child = cmd
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SidecarError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pid = child.id();
        debug!(program = %program, pid, "detached process started");

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(program = %program, pid, %status, "detached process exited"),
                Err(e) => warn!(program = %program, pid, error = %e, "failed to reap detached process"),
            }
        });

        Ok(pid)
    }

    /// Checks that `program --version` runs and exits cleanly.
    pub async fn probe(&self, program: &Path) -> bool {
        let cmd = SidecarCommand::new(program)
            .arg("--version")
            .timeout(PROBE_TIMEOUT);
        match self.run(&cmd).await {
            Ok(out) => out.success(),
            Err(e) => {
                debug!(program = %program.display(), error = %e, "probe failed");
                false
            }
        }
    }

    async fn execute(
        &self,
        cmd: &SidecarCommand,
        lines: Option<&mpsc::Sender<String>>,
    ) -> Result<SidecarOutput, SidecarError> {
        let program = cmd.program_name();
        let deadline = cmd.timeout.unwrap_or(self.default_timeout);
        debug!(program = %program, args = ?cmd.args, timeout_secs = deadline.as_secs(), "running sidecar");

        let started = Instant::now();
        let mut child = cmd
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SidecarError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let result = {
            let work = async {
                tokio::try_join!(
                    pump(stdout, lines),
                    pump(stderr, lines),
                    child.wait()
                )
            };
            tokio::time::timeout(deadline, work).await
        };

        match result {
            Ok(Ok((stdout, stderr, status))) => {
                let output = SidecarOutput {
                    stdout,
                    stderr,
                    exit_code: status.code(),
                    duration: started.elapsed(),
                };
                if !output.stderr.trim().is_empty() {
                    debug!(program = %program, stderr = %output.stderr.trim(), "sidecar stderr");
                }
                debug!(
                    program = %program,
                    exit_code = ?output.exit_code,
                    elapsed_ms = u64::try_from(output.duration.as_millis()).unwrap_or(u64::MAX),
                    "sidecar finished"
                );
                Ok(output)
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                Err(SidecarError::Io(e))
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(program = %program, pid, error = %e, "failed to kill timed out sidecar");
                }
                warn!(program = %program, pid, timeout_secs = deadline.as_secs(), "sidecar timed out");
                Err(SidecarError::Timeout {
                    program,
                    after: deadline,
                    pid,
                })
            }
        }
    }
}

/// Drains one output stream, forwarding complete lines when asked to.
async fn pump<R>(reader: Option<R>, lines: Option<&mpsc::Sender<String>>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(reader) = reader else {
        return Ok(collected);
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        collected.push_str(&line);
        if let Some(tx) = lines {
            // Receiver gone is fine; keep draining so the child can't block.
            let _ = tx
                .send(line.trim_end_matches(['\n', '\r']).to_string())
                .await;
        }
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> SidecarCommand {
        SidecarCommand::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let runner = SidecarRunner::default();
        let out = runner
            .run(&sh("echo hello; echo oops >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert!(out.into_success().is_err());
    }

    #[tokio::test]
    async fn passes_environment() {
        let runner = SidecarRunner::default();
        let cmd = sh("printf %s \"$PIXXIDEN_PROBE\"").env("PIXXIDEN_PROBE", "/cfg/legendary");
        let out = runner.run(&cmd).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "/cfg/legendary");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let runner = SidecarRunner::default();
        let err = runner
            .run(&SidecarCommand::new("/nonexistent/pixxiden-helper"))
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::Spawn { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let runner = SidecarRunner::default();
        let cmd = SidecarCommand::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(300));

        let started = Instant::now();
        let err = runner.run(&cmd).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));

        let SidecarError::Timeout { after, pid, .. } = err else {
            panic!("expected timeout, got {err:?}");
        };
        assert_eq!(after, Duration::from_millis(300));
        let pid = pid.expect("child pid");

        #[cfg(target_os = "linux")]
        assert!(
            !std::path::Path::new(&format!("/proc/{pid}")).exists(),
            "child {pid} still alive after timeout"
        );
        let _ = pid;
    }

    #[tokio::test]
    async fn timeout_error_message() {
        let err = SidecarError::Timeout {
            program: "legendary".into(),
            after: Duration::from_secs(120),
            pid: Some(42),
        };
        assert_eq!(err.to_string(), "timed out after 120s");
    }

    #[tokio::test]
    async fn streaming_forwards_both_streams() {
        let runner = SidecarRunner::default();
        let (tx, mut rx) = mpsc::channel(16);
        let out = runner
            .run_streaming(&sh("echo a; echo b >&2; echo c"), tx)
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Some(line) = rx.recv().await {
            seen.push(line);
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(out.stdout, "a\nc\n");
        assert_eq!(out.stderr, "b\n");
    }

    #[tokio::test]
    async fn streaming_survives_dropped_receiver() {
        let runner = SidecarRunner::default();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let out = runner.run_streaming(&sh("seq 1 50"), tx).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.ends_with("50\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_checks_version_flag() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-tool");
        std::fs::write(
            &tool,
            "#!/bin/sh\n[ \"$1\" = \"--version\" ] && { echo 1.0; exit 0; }\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = SidecarRunner::default();
        assert!(runner.probe(&tool).await);
        assert!(!runner.probe(&dir.path().join("missing")).await);
    }

    #[tokio::test]
    async fn detached_returns_pid() {
        let runner = SidecarRunner::default();
        let pid = runner
            .spawn_detached(&SidecarCommand::new("true"))
            .await
            .unwrap();
        assert!(pid.is_some());
    }
}
