//! OS-process workers
//!
//! Each worker is a child process running this same binary with the
//! `worker` subcommand. Its [`WorkerSpec`] is written to the child's stdin as
//! JSON, so credentials never show up in the process table.
//!
//! On unix each worker leads its own process group. Stopping a worker kills
//! the whole group, so capture processes it started (ffmpeg) go with it and
//! release the device.

use super::{WorkerProcess, WorkerSpawner, WorkerSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

/// How long a killed worker gets to be reaped
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns workers as child processes
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-run the current executable as `<exe> worker`
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, vec!["worker".to_string()]))
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self, spec: &WorkerSpec) -> Result<Box<dyn WorkerProcess>> {
        let payload = serde_json::to_vec(spec)?;

        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::piped()).kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            Error::Internal(format!("spawn {} failed: {}", self.program.display(), e))
        })?;

        // the child leads a new group whose id is its pid
        let group = child.id();
        let mut worker = ChildWorker { child, group };

        // closing stdin (drop) marks the end of the spec
        if let Some(mut stdin) = worker.child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload).await {
                worker.start_kill().ok();
                return Err(Error::Internal(format!("failed to hand over worker spec: {}", e)));
            }
        }

        Ok(Box::new(worker))
    }
}

struct ChildWorker {
    child: Child,
    /// Process group still to be signalled; cleared once killed
    group: Option<u32>,
}

impl ChildWorker {
    #[cfg(unix)]
    fn kill_group(&mut self) -> Result<()> {
        let Some(group) = self.group.take() else {
            return Ok(());
        };
        let pgid = libc::pid_t::try_from(group)
            .map_err(|_| Error::Internal(format!("process group {} out of range", group)))?;

        if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
            let err = std::io::Error::last_os_error();
            // ESRCH: every member already gone
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err.into());
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) -> Result<()> {
        self.group = None;
        Ok(())
    }
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn start_kill(&mut self) -> Result<()> {
        // group first: the leader's pid is not reaped yet, so the id is still ours
        self.kill_group()?;
        if self.child.try_wait()?.is_none() {
            self.child.start_kill()?;
        }
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        self.start_kill()?;

        let status = tokio::time::timeout(REAP_TIMEOUT, self.child.wait())
            .await
            .map_err(|_| {
                Error::Internal(format!(
                    "worker did not exit within {}s of being killed",
                    REAP_TIMEOUT.as_secs()
                ))
            })??;

        tracing::debug!(status = %status, "Worker process reaped");
        Ok(())
    }
}
