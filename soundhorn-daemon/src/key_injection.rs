//! Key events and the sinks that deliver them

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::process::Command;
use tracing::{debug, info};

use crate::display_server::{detect_available_tools, detect_display_server, select_key_tool, KeyTool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Cast,
    Catch,
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cast => write!(f, "cast"),
            Self::Catch => write!(f, "catch"),
        }
    }
}

/// One simulated key press
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyEvent {
    pub key: String,
    pub action: KeyAction,
    pub fired_at: DateTime<Utc>,
}

impl KeyEvent {
    pub fn new<S: Into<String>>(key: S, action: KeyAction) -> Self {
        Self {
            key: key.into(),
            action,
            fired_at: Utc::now(),
        }
    }
}

/// Destination for key events. Delivery is attempted once; callers log
/// failures and carry on.
pub trait KeySink: Send + Sync {
    fn emit(&self, event: &KeyEvent) -> Result<()>;
}

/// Logs key events without pressing anything
pub struct LogKeySink;

impl KeySink for LogKeySink {
    fn emit(&self, event: &KeyEvent) -> Result<()> {
        info!("Key event: {} '{}' at {}", event.action, event.key, event.fired_at.format("%H:%M:%S%.3f"));
        Ok(())
    }
}

/// Presses keys through xdotool, wtype or ydotool
pub struct CommandKeySink {
    tool: KeyTool,
}

impl CommandKeySink {
    /// Detect the display server and pick an installed tool
    pub fn new() -> Result<Self> {
        let info = detect_display_server();
        let tool = select_key_tool(&info, &detect_available_tools())?;
        Ok(Self { tool })
    }

    pub fn with_tool(tool: KeyTool) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> KeyTool {
        self.tool
    }
}

impl KeySink for CommandKeySink {
    fn emit(&self, event: &KeyEvent) -> Result<()> {
        let output = Command::new(self.tool.command())
            .args(self.tool.key_args(&event.key))
            .output()
            .with_context(|| format!("Failed to run {}", self.tool.command()))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.tool.command(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        debug!("Pressed '{}' ({}) via {}", event.key, event.action, self.tool.command());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_event_serializes_action() {
        let event = KeyEvent::new("f", KeyAction::Cast);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["key"], "f");
        assert_eq!(json["action"], "cast");
    }

    #[test]
    fn test_log_sink_never_fails() {
        assert!(LogKeySink.emit(&KeyEvent::new("g", KeyAction::Catch)).is_ok());
    }
}
