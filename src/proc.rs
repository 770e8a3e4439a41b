//! Subprocess spawn and graceful, escalating-signal shutdown — the
//! workload (autopilot) process and any other child process the
//! orchestrator owns for the lifetime of one run.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{info, warn};

pub struct ManagedProcess {
    label: String,
    child: Option<Child>,
}

impl ManagedProcess {
    /// Spawns `cmd` (already expanded, e.g. the `--workload.cmd` template
    /// with `{{.AutopilotName}}` substituted), forwarding its stdout and
    /// stderr into `tracing`.
    pub fn spawn(label: impl Into<String>, cmd: &str) -> anyhow::Result<Self> {
        let label = label.into();
        let mut parts = cmd.split_whitespace();
        let program = parts.next().ok_or_else(|| anyhow::anyhow!("empty workload command"))?;
        let mut command = Command::new(program);
        command.args(parts).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn()?;
        forward_stream(&label, "stdout", child.stdout.take());
        forward_stream(&label, "stderr", child.stderr.take());

        Ok(Self { label, child: Some(child) })
    }

    /// Escalating SIGINT -> SIGTERM -> SIGKILL, 1 s grace at each stage.
    pub async fn stop(&mut self, grace: Duration) -> anyhow::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let Some(pid) = child.id() else {
            return Ok(());
        };
        let pid = pid as i32;

        send_signal(pid, libc::SIGINT);
        if timeout(grace, child.wait()).await.is_ok() {
            return Ok(());
        }

        send_signal(pid, libc::SIGTERM);
        if timeout(grace, child.wait()).await.is_ok() {
            return Ok(());
        }

        send_signal(pid, libc::SIGKILL);
        let status = child.wait().await?;
        if !status.success() {
            warn!("{}: exited abnormally after SIGKILL: {status}", self.label);
        }
        Ok(())
    }
}

fn send_signal(pid: i32, signal: i32) {
    // SAFETY: `pid` is a live child pid owned by this process; sending a
    // signal to it cannot affect memory safety.
    unsafe {
        libc::kill(pid, signal);
    }
}

fn forward_stream<R: tokio::io::AsyncRead + Unpin + Send + 'static>(
    label: &str,
    stream_name: &'static str,
    stream: Option<R>,
) {
    let Some(stream) = stream else { return };
    let label = label.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!("[{label}:{stream_name}] {line}");
        }
    });
}
