//! Supervision of the API process the proxy forwards to.

use log::{info, warn};
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

#[derive(Debug)]
pub struct Upstream {
    command: String,
    child: Child,
}

impl Upstream {
    /// Starts `command_line` (whitespace-separated, no shell) with its
    /// output relayed to the log. The child is killed if this is dropped.
    pub fn spawn(command_line: &str) -> io::Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Upstream command is empty")
        })?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(relay_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_lines(stderr, "stderr"));
        }

        let upstream = Self {
            command: command_line.to_string(),
            child,
        };
        info!("Started upstream (pid {}): {}", upstream.pid(), upstream.command());

        Ok(upstream)
    }

    fn pid(&self) -> String {
        self.id().map_or_else(|| "?".to_string(), |id| id.to_string())
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Whether the process is still running.
    pub fn is_running(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_none())
    }

    /// Kills the process unless it already exited, and reaps it.
    pub async fn shutdown(mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            warn!("Upstream had already exited with {}", status);
            return Ok(status);
        }

        info!("Stopping upstream (pid {}): {}", self.pid(), self.command());
        self.child.kill().await?;
        let status = self.child.wait().await?;
        info!("Upstream stopped ({})", status);
        Ok(status)
    }
}

async fn relay_lines<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: "upstream", "[{}] {}", stream, line),
            Ok(None) => break,
            Err(e) => {
                warn!(target: "upstream", "[{}] read failed: {}", stream, e);
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let err = Upstream::spawn("   ").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let err = Upstream::spawn("definitely-not-a-real-binary-4242 --flag").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_shutdown_kills_running_process() {
        let mut upstream = Upstream::spawn("sleep 30").unwrap();
        assert_eq!(upstream.command(), "sleep 30");
        assert!(upstream.id().is_some());
        assert!(upstream.is_running().unwrap());

        let status = upstream.shutdown().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_shutdown_after_exit_reports_status() {
        let mut upstream = Upstream::spawn("true").unwrap();
        for _ in 0..50 {
            if !upstream.is_running().unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let status = upstream.shutdown().await.unwrap();
        assert!(status.success());
    }
}
