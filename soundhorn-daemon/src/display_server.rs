//! Display server detection and key tool selection
//!
//! Tool compatibility:
//! - xdotool: X11 only
//! - wtype: Wayland compositors with the virtual-keyboard protocol (not GNOME)
//! - ydotool: anywhere, via kernel uinput

use anyhow::{anyhow, Result};
use std::process::Command;
use tracing::{debug, info, warn};

/// Environment variable access, swappable in tests
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment
pub struct SystemEnv;

impl EnvProvider for SystemEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    X11,
    Wayland,
    Unknown,
}

/// External program used to press keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTool {
    Xdotool,
    Wtype,
    Ydotool,
}

impl KeyTool {
    pub fn command(&self) -> &'static str {
        match self {
            Self::Xdotool => "xdotool",
            Self::Wtype => "wtype",
            Self::Ydotool => "ydotool",
        }
    }

    /// Arguments that tap `key` once
    pub fn key_args(&self, key: &str) -> Vec<String> {
        match self {
            Self::Xdotool => vec!["key".into(), "--clearmodifiers".into(), key.into()],
            Self::Wtype => vec!["-k".into(), key.into()],
            // ydotool key wants raw keycodes; typing the character is portable
            Self::Ydotool => vec!["type".into(), "--".into(), key.into()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisplayServerInfo {
    pub server_type: DisplayServer,
    /// e.g. "GNOME", "KDE", "sway"
    pub desktop_environment: Option<String>,
    pub is_gnome_wayland: bool,
}

pub fn detect_display_server() -> DisplayServerInfo {
    detect_display_server_with_env(&SystemEnv)
}

/// XDG_SESSION_TYPE outweighs WAYLAND_DISPLAY, which outweighs DISPLAY
/// (DISPLAY is also set under XWayland).
pub fn detect_display_server_with_env(env: &dyn EnvProvider) -> DisplayServerInfo {
    let session_type = env.get("XDG_SESSION_TYPE");
    let desktop = env.get("XDG_CURRENT_DESKTOP");

    let mut x11_score = 0;
    let mut wayland_score = 0;

    match session_type.as_deref() {
        Some("x11") => x11_score += 4,
        Some("wayland") => wayland_score += 4,
        _ => {}
    }
    if env.get("WAYLAND_DISPLAY").is_some() {
        wayland_score += 2;
    }
    if env.get("DISPLAY").is_some() {
        x11_score += 1;
    }

    let server_type = match wayland_score.cmp(&x11_score) {
        std::cmp::Ordering::Greater => DisplayServer::Wayland,
        std::cmp::Ordering::Less => DisplayServer::X11,
        std::cmp::Ordering::Equal => DisplayServer::Unknown,
    };

    let is_gnome_wayland = server_type == DisplayServer::Wayland
        && desktop
            .as_deref()
            .map(|d| d.to_lowercase().contains("gnome"))
            .unwrap_or(false);

    debug!(
        "Display server scores: x11={}, wayland={} (desktop {:?})",
        x11_score, wayland_score, desktop
    );

    DisplayServerInfo {
        server_type,
        desktop_environment: desktop,
        is_gnome_wayland,
    }
}

pub fn is_tool_available(tool: KeyTool) -> bool {
    Command::new("which")
        .arg(tool.command())
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn detect_available_tools() -> Vec<KeyTool> {
    let tools: Vec<KeyTool> = [KeyTool::Xdotool, KeyTool::Wtype, KeyTool::Ydotool]
        .into_iter()
        .filter(|t| is_tool_available(*t))
        .collect();
    debug!("Available key tools: {:?}", tools);
    tools
}

/// Pick the key tool for this session.
///
/// X11 prefers xdotool, GNOME Wayland needs ydotool, other Wayland prefers
/// wtype. Unknown sessions try ydotool first.
pub fn select_key_tool(info: &DisplayServerInfo, available: &[KeyTool]) -> Result<KeyTool> {
    let preference: &[KeyTool] = match info.server_type {
        DisplayServer::X11 => &[KeyTool::Xdotool, KeyTool::Ydotool],
        DisplayServer::Wayland if info.is_gnome_wayland => &[KeyTool::Ydotool],
        DisplayServer::Wayland => &[KeyTool::Wtype, KeyTool::Ydotool],
        DisplayServer::Unknown => &[KeyTool::Ydotool, KeyTool::Xdotool, KeyTool::Wtype],
    };

    let tool = preference
        .iter()
        .copied()
        .find(|t| available.contains(t))
        .ok_or_else(|| {
            anyhow!(
                "No key injection tool for {:?}{}; install one of: {}",
                info.server_type,
                if info.is_gnome_wayland { " (GNOME)" } else { "" },
                preference
                    .iter()
                    .map(|t| t.command())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;

    if Some(&tool) != preference.first() {
        warn!("Falling back to {} for {:?}", tool.command(), info.server_type);
    } else {
        info!("Using {} for key injection ({:?})", tool.command(), info.server_type);
    }
    Ok(tool)
}
