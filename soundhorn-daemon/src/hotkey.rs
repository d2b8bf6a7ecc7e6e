//! Global start/stop hotkey
//!
//! Uses the global-hotkey crate where key grabbing is possible (X11, Windows,
//! macOS). Wayland compositors do not allow it; there the user binds
//! `soundhorn ctl toggle` in the compositor instead.

use anyhow::{bail, Context, Result};
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::HotkeyConfig;
use crate::display_server::{detect_display_server, DisplayServer};

const LETTERS: [Code; 26] = [
    Code::KeyA, Code::KeyB, Code::KeyC, Code::KeyD, Code::KeyE, Code::KeyF, Code::KeyG,
    Code::KeyH, Code::KeyI, Code::KeyJ, Code::KeyK, Code::KeyL, Code::KeyM, Code::KeyN,
    Code::KeyO, Code::KeyP, Code::KeyQ, Code::KeyR, Code::KeyS, Code::KeyT, Code::KeyU,
    Code::KeyV, Code::KeyW, Code::KeyX, Code::KeyY, Code::KeyZ,
];

const DIGITS: [Code; 10] = [
    Code::Digit0, Code::Digit1, Code::Digit2, Code::Digit3, Code::Digit4,
    Code::Digit5, Code::Digit6, Code::Digit7, Code::Digit8, Code::Digit9,
];

const FUNCTION_KEYS: [Code; 12] = [
    Code::F1, Code::F2, Code::F3, Code::F4, Code::F5, Code::F6,
    Code::F7, Code::F8, Code::F9, Code::F10, Code::F11, Code::F12,
];

/// Registered toggle hotkey; unregistered on drop
pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    toggle: HotKey,
    rx: mpsc::UnboundedReceiver<()>,
}

impl HotkeyManager {
    /// Register the toggle hotkey. Returns None where global hotkeys are
    /// unavailable or disabled.
    pub fn new(config: &HotkeyConfig) -> Result<Option<Self>> {
        if !config.enabled {
            info!("Global hotkey disabled in config");
            return Ok(None);
        }

        if cfg!(target_os = "linux") {
            match detect_display_server().server_type {
                DisplayServer::X11 => {}
                DisplayServer::Wayland => {
                    warn!("Wayland does not allow global key grabs");
                    warn!("Bind a compositor shortcut to: soundhorn ctl toggle");
                    return Ok(None);
                }
                DisplayServer::Unknown => {
                    warn!("No display server detected, hotkey disabled (use soundhorn ctl)");
                    return Ok(None);
                }
            }
        }

        let manager = match GlobalHotKeyManager::new() {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to initialize global hotkey manager: {}", e);
                return Ok(None);
            }
        };

        let toggle = parse_hotkey(&config.toggle).context("Invalid toggle hotkey")?;
        manager
            .register(toggle.clone())
            .with_context(|| format!("Failed to register hotkey {}", config.toggle))?;
        info!("Toggle hotkey: {}", config.toggle);

        let (tx, rx) = mpsc::unbounded_channel();
        let toggle_id = toggle.id();
        std::thread::spawn(move || {
            while let Ok(event) = GlobalHotKeyEvent::receiver().recv() {
                if event.id == toggle_id && event.state == HotKeyState::Pressed && tx.send(()).is_err() {
                    break;
                }
            }
        });

        Ok(Some(Self { manager, toggle, rx }))
    }

    /// Wait for the next toggle press
    pub async fn next_toggle(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        let _ = self.manager.unregister(self.toggle.clone());
    }
}

/// Parse a hotkey string like "Ctrl+Shift+H"
pub fn parse_hotkey(s: &str) -> Result<HotKey> {
    let mut modifiers = Modifiers::empty();
    let mut key_code = None;

    for part in s.split('+').map(str::trim).filter(|p| !p.is_empty()) {
        match part.to_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "shift" => modifiers |= Modifiers::SHIFT,
            "alt" => modifiers |= Modifiers::ALT,
            "super" | "win" | "cmd" | "meta" => modifiers |= Modifiers::SUPER,
            key => {
                if key_code.is_some() {
                    bail!("More than one key in hotkey '{}'", s);
                }
                key_code = Some(parse_key_code(key)?);
            }
        }
    }

    let key_code = key_code.with_context(|| format!("No key in hotkey '{}'", s))?;
    Ok(HotKey::new(Some(modifiers), key_code))
}

fn parse_key_code(s: &str) -> Result<Code> {
    let key = s.to_lowercase();

    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() {
            return Ok(LETTERS[(c as u8 - b'a') as usize]);
        }
        if c.is_ascii_digit() {
            return Ok(DIGITS[(c as u8 - b'0') as usize]);
        }
    }

    if let Some(n) = key.strip_prefix('f').and_then(|n| n.parse::<usize>().ok()) {
        if (1..=FUNCTION_KEYS.len()).contains(&n) {
            return Ok(FUNCTION_KEYS[n - 1]);
        }
    }

    let code = match key.as_str() {
        "space" => Code::Space,
        "enter" | "return" => Code::Enter,
        "tab" => Code::Tab,
        "backspace" => Code::Backspace,
        "escape" | "esc" => Code::Escape,
        _ => bail!("Unknown key: {}", s),
    };
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hotkey() {
        let hotkey = parse_hotkey("Ctrl+Shift+H").unwrap();
        assert!(hotkey.mods.contains(Modifiers::CONTROL));
        assert!(hotkey.mods.contains(Modifiers::SHIFT));
        assert_eq!(hotkey.key, Code::KeyH);

        let hotkey = parse_hotkey("Alt+F9").unwrap();
        assert!(hotkey.mods.contains(Modifiers::ALT));
        assert_eq!(hotkey.key, Code::F9);
    }

    #[test]
    fn test_parse_key_code() {
        assert_eq!(parse_key_code("q").unwrap(), Code::KeyQ);
        assert_eq!(parse_key_code("7").unwrap(), Code::Digit7);
        assert_eq!(parse_key_code("F12").unwrap(), Code::F12);
        assert_eq!(parse_key_code("esc").unwrap(), Code::Escape);
        assert!(parse_key_code("f13").is_err());
        assert!(parse_key_code("hyper").is_err());
    }

    #[test]
    fn test_rejects_two_keys() {
        assert!(parse_hotkey("Ctrl+A+B").is_err());
        assert!(parse_hotkey("Ctrl+Shift").is_err());
    }
}
