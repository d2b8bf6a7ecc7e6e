//! Display server detection and key tool selection
//!
//! GNOME Wayland matters most: wtype does not work there, so cast/catch
//! presses must go through ydotool.

mod test_helpers;

use std::collections::HashMap;
use test_helpers::*;

use soundhorn_daemon::display_server::{select_key_tool, DisplayServer, KeyTool};

const ALL_TOOLS: [KeyTool; 3] = [KeyTool::Xdotool, KeyTool::Wtype, KeyTool::Ydotool];

#[test]
fn test_x11_pure_detection() {
    let info = detect_with_env(x11_env());

    assert_eq!(info.server_type, DisplayServer::X11);
    assert!(!info.is_gnome_wayland);
    assert_eq!(select_key_tool(&info, &ALL_TOOLS).unwrap(), KeyTool::Xdotool);
}

#[test]
fn test_wayland_kde_detection() {
    let info = detect_with_env(wayland_kde_env());

    assert_eq!(info.server_type, DisplayServer::Wayland);
    assert_eq!(info.desktop_environment.as_deref(), Some("KDE"));
    assert!(!info.is_gnome_wayland);
    assert_eq!(select_key_tool(&info, &ALL_TOOLS).unwrap(), KeyTool::Wtype);
}

#[test]
fn test_wayland_gnome_detection() {
    let info = detect_with_env(wayland_gnome_env());

    assert_eq!(info.server_type, DisplayServer::Wayland);
    assert!(info.is_gnome_wayland);
    assert_eq!(select_key_tool(&info, &ALL_TOOLS).unwrap(), KeyTool::Ydotool);
    assert!(select_key_tool(&info, &[KeyTool::Wtype, KeyTool::Xdotool]).is_err());
}

#[test]
fn test_xwayland_detection() {
    // DISPLAY is set for XWayland clients but the session is Wayland
    let info = detect_with_env(xwayland_env());

    assert_eq!(info.server_type, DisplayServer::Wayland);
    assert!(info.is_gnome_wayland);
}

#[test]
fn test_sway_detection() {
    let info = detect_with_env(sway_env());

    assert_eq!(info.server_type, DisplayServer::Wayland);
    assert!(!info.is_gnome_wayland);
}

#[test]
fn test_headless_detection() {
    let info = detect_with_env(headless_env());

    assert_eq!(info.server_type, DisplayServer::Unknown);
    assert!(!info.is_gnome_wayland);
    assert_eq!(select_key_tool(&info, &ALL_TOOLS).unwrap(), KeyTool::Ydotool);
    assert!(select_key_tool(&info, &[]).is_err());
}

#[test]
fn test_ambiguous_old_system() {
    let info = detect_with_env(ambiguous_env());

    assert_eq!(info.server_type, DisplayServer::X11);
}

#[test]
fn test_gnome_variations() {
    for desktop in ["GNOME", "ubuntu:GNOME", "GNOME:GNOME", "gnome", "Gnome", "Ubuntu:gnome"] {
        let mut env = wayland_kde_env();
        env.insert("XDG_CURRENT_DESKTOP".to_string(), desktop.to_string());

        let info = detect_with_env(env);
        assert!(info.is_gnome_wayland, "Failed to detect GNOME for {}", desktop);
    }
}

#[test]
fn test_desktop_environment_parsing() {
    let cases = [
        ("KDE", false),
        ("GNOME", true),
        ("ubuntu:GNOME", true),
        ("XFCE", false),
        ("Hyprland", false),
        ("sway", false),
        ("i3", false),
    ];

    for (desktop, should_be_gnome) in cases {
        let mut env = wayland_kde_env();
        env.insert("XDG_CURRENT_DESKTOP".to_string(), desktop.to_string());

        let info = detect_with_env(env);
        assert_eq!(info.is_gnome_wayland, should_be_gnome, "Incorrect GNOME detection for {}", desktop);
    }
}

#[test]
fn test_wayland_without_xdg_session_type() {
    let mut env = HashMap::new();
    env.insert("WAYLAND_DISPLAY".to_string(), "wayland-0".to_string());

    assert_eq!(detect_with_env(env).server_type, DisplayServer::Wayland);
}

#[test]
fn test_wayland_display_outweighs_display() {
    let mut env = HashMap::new();
    env.insert("DISPLAY".to_string(), ":0".to_string());
    env.insert("WAYLAND_DISPLAY".to_string(), "wayland-0".to_string());

    assert_eq!(detect_with_env(env).server_type, DisplayServer::Wayland);
}

#[test]
fn test_session_type_outweighs_variables() {
    // Session says x11 even though a Wayland socket is advertised
    let mut env = HashMap::new();
    env.insert("XDG_SESSION_TYPE".to_string(), "x11".to_string());
    env.insert("WAYLAND_DISPLAY".to_string(), "wayland-0".to_string());

    assert_eq!(detect_with_env(env).server_type, DisplayServer::X11);
}

#[test]
fn test_gnome_on_x11() {
    let mut env = x11_env();
    env.insert("XDG_CURRENT_DESKTOP".to_string(), "GNOME".to_string());

    let info = detect_with_env(env);
    assert_eq!(info.server_type, DisplayServer::X11);
    assert!(!info.is_gnome_wayland);
}
