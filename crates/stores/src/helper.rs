//! Shared plumbing for adapters that drive a helper CLI.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

use pixxiden_sidecar::{SidecarCommand, SidecarOutput, SidecarRunner};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapter::InstallProgress;
use crate::error::StoreError;
use crate::locate;
use crate::progress::parse_progress;

/// Installs can take hours; they get their own deadline.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// A resolved helper binary plus the environment every call needs.
#[derive(Debug, Clone)]
pub(crate) struct Helper {
    tool: &'static str,
    runner: SidecarRunner,
    binary: Option<PathBuf>,
    envs: Vec<(&'static str, PathBuf)>,
}

impl Helper {
    pub fn new(tool: &'static str, runner: SidecarRunner, binary: Option<PathBuf>) -> Self {
        Self {
            tool,
            runner,
            binary,
            envs: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &'static str, value: impl Into<PathBuf>) -> Self {
        self.envs.push((key, value.into()));
        self
    }

    pub fn is_available(&self) -> bool {
        self.binary.as_deref().is_some_and(locate::is_executable)
    }

    pub fn command<I, S>(&self, args: I) -> Result<SidecarCommand, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| StoreError::Spawn(format!("{} not found", self.tool)))?;
        let mut cmd = SidecarCommand::new(binary).args(args);
        for (k, v) in &self.envs {
            cmd = cmd.env(k, v);
        }
        Ok(cmd)
    }

    /// Runs and returns the output whatever the exit status.
    pub async fn output(&self, cmd: &SidecarCommand) -> Result<SidecarOutput, StoreError> {
        Ok(self.runner.run(cmd).await?)
    }

    /// Runs and requires a zero exit status.
    pub async fn run_ok(&self, cmd: &SidecarCommand) -> Result<SidecarOutput, StoreError> {
        self.output(cmd).await?.into_success().map_err(|out| {
            warn!(tool = self.tool, exit_code = ?out.exit_code, stderr = %out.stderr.trim(), "helper failed");
            StoreError::helper_failed(&out)
        })
    }

    /// Runs, requires success and parses stdout as JSON.
    pub async fn run_json<T: DeserializeOwned>(&self, cmd: &SidecarCommand) -> Result<T, StoreError> {
        let out = self.run_ok(cmd).await?;
        parse_json(self.tool, &out.stdout)
    }

    /// Runs a long install, forwarding parsed progress lines.
    pub async fn run_install(
        &self,
        cmd: SidecarCommand,
        app_id: &str,
        progress: Option<mpsc::Sender<InstallProgress>>,
    ) -> Result<(), StoreError> {
        let cmd = cmd.timeout(INSTALL_TIMEOUT);
        let (tx, mut rx) = mpsc::channel::<String>(64);

        let run = self.runner.run_streaming(&cmd, tx);
        let forward = async {
            while let Some(line) = rx.recv().await {
                let Some(p) = parse_progress(app_id, &line) else {
                    continue;
                };
                if let Some(sink) = &progress {
                    let _ = sink.send(p).await;
                }
            }
        };

        let (result, ()) = tokio::join!(run, forward);
        let out = result?;
        if !out.success() {
            warn!(tool = self.tool, app_id, exit_code = ?out.exit_code, "install failed");
            return Err(StoreError::helper_failed(&out));
        }
        debug!(tool = self.tool, app_id, "install finished");
        Ok(())
    }

    /// Starts a helper-driven game launch without waiting for it.
    pub async fn launch_detached(&self, cmd: &SidecarCommand) -> Result<(), StoreError> {
        let pid = self.runner.spawn_detached(cmd).await?;
        debug!(tool = self.tool, pid, "launch delegated");
        Ok(())
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(tool: &str, text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text.trim()).map_err(|e| {
        warn!(tool, error = %e, "unparsable helper output");
        StoreError::malformed(format!("{tool}: {e}"))
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::{Path, PathBuf};

    /// Writes an executable shell script standing in for a helper tool.
    #[cfg(unix)]
    pub fn fake_helper(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
