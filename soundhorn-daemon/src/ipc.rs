//! Unix socket control interface
//!
//! One plain-text command per connection: `start`, `stop`, `toggle`,
//! `status` or `quit`. The reply is a single line; `status` replies JSON.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use soundhorn_audio::{IngestStatus, LevelHandle};

use crate::automation::{AutomationHandle, AutomationState};
use crate::socket_utils::secure_socket_permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcCommand {
    Start,
    Stop,
    Toggle,
    Status,
    Quit,
}

impl IpcCommand {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "toggle" => Ok(Self::Toggle),
            "status" => Ok(Self::Status),
            "quit" | "exit" | "shutdown" => Ok(Self::Quit),
            _ => anyhow::bail!("Unknown command: {}", s.trim()),
        }
    }
}

/// Reply to `status`
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: AutomationState,
    pub level_db: f32,
    pub dropped_frames: u64,
    pub queued_matches: usize,
}

/// Shared state the server answers from
pub struct IpcContext {
    pub automation: AutomationHandle,
    pub level: LevelHandle,
    pub capture: Arc<IngestStatus>,
    pub queued_matches: Box<dyn Fn() -> usize + Send + Sync>,
    /// Notified on `quit`
    pub shutdown: Arc<Notify>,
}

impl IpcContext {
    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.automation.state(),
            level_db: self.level.level_db(),
            dropped_frames: self.capture.dropped_frames(),
            queued_matches: (self.queued_matches)(),
        }
    }

    /// Execute one command and produce the reply
    pub fn dispatch(&self, command: IpcCommand) -> String {
        let result = match command {
            IpcCommand::Start => self.automation.start().map(|_| "Automation started".to_string()),
            IpcCommand::Stop => self.automation.stop().map(|_| "Automation stopped".to_string()),
            IpcCommand::Toggle => self.automation.toggle(),
            IpcCommand::Status => serde_json::to_string(&self.status()).context("Failed to encode status"),
            IpcCommand::Quit => {
                info!("Received quit command");
                self.shutdown.notify_one();
                Ok("Shutting down".to_string())
            }
        };
        result.unwrap_or_else(|e| format!("Error: {}", e))
    }
}

pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    context: Arc<IpcContext>,
}

impl IpcServer {
    pub fn new(socket_path: &Path, context: Arc<IpcContext>) -> Result<Self> {
        // Stale socket from a previous run
        let _ = std::fs::remove_file(socket_path);

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket {}", socket_path.display()))?;
        secure_socket_permissions(socket_path)?;

        info!("IPC server listening on {}", socket_path.display());

        Ok(Self {
            listener,
            path: socket_path.to_path_buf(),
            context,
        })
    }

    /// Accept connections forever, one task per client
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, _) = self.listener.accept().await
                .context("Failed to accept connection")?;
            let context = Arc::clone(&self.context);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, context).await {
                    warn!("IPC connection error: {}", e);
                }
            });
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn handle_connection(mut stream: UnixStream, context: Arc<IpcContext>) -> Result<()> {
    let mut buffer = [0u8; 256];
    let n = stream.read(&mut buffer).await?;
    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    debug!("Received IPC command: {}", request.trim());

    let response = match IpcCommand::parse(&request) {
        Ok(command) => context.dispatch(command),
        Err(e) => format!("Error: {}", e),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;
    Ok(())
}

/// Send one command to a running instance and return its reply
pub async fn send_command(socket_path: &Path, command: &str) -> Result<String> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Is soundhorn running? Could not connect to {}", socket_path.display()))?;

    stream.write_all(command.as_bytes()).await?;
    stream.shutdown().await?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply).await?;
    Ok(reply.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(IpcCommand::parse("start\n").unwrap(), IpcCommand::Start);
        assert_eq!(IpcCommand::parse(" STOP ").unwrap(), IpcCommand::Stop);
        assert_eq!(IpcCommand::parse("toggle").unwrap(), IpcCommand::Toggle);
        assert_eq!(IpcCommand::parse("status").unwrap(), IpcCommand::Status);
        assert_eq!(IpcCommand::parse("exit").unwrap(), IpcCommand::Quit);
        assert!(IpcCommand::parse("reel").is_err());
    }
}
