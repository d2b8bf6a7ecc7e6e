//! Environment fixtures for display server detection tests
//!
//! Detection reads variables through `EnvProvider`, so tests hand it a map
//! instead of touching the process environment (tests run in parallel).

#![allow(dead_code)]

use std::collections::HashMap;

use soundhorn_daemon::display_server::{detect_display_server_with_env, DisplayServerInfo, EnvProvider};

pub struct MockEnv {
    vars: HashMap<String, String>,
}

impl MockEnv {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

impl EnvProvider for MockEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn detect_with_env(env: HashMap<String, String>) -> DisplayServerInfo {
    detect_display_server_with_env(&MockEnv::new(env))
}

fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn x11_env() -> HashMap<String, String> {
    env_of(&[("DISPLAY", ":0"), ("XDG_SESSION_TYPE", "x11")])
}

pub fn wayland_kde_env() -> HashMap<String, String> {
    env_of(&[
        ("WAYLAND_DISPLAY", "wayland-0"),
        ("XDG_SESSION_TYPE", "wayland"),
        ("XDG_CURRENT_DESKTOP", "KDE"),
    ])
}

pub fn wayland_gnome_env() -> HashMap<String, String> {
    env_of(&[
        ("WAYLAND_DISPLAY", "wayland-0"),
        ("XDG_SESSION_TYPE", "wayland"),
        ("XDG_CURRENT_DESKTOP", "GNOME"),
    ])
}

pub fn sway_env() -> HashMap<String, String> {
    env_of(&[
        ("SWAYSOCK", "/run/user/1000/sway-ipc.sock"),
        ("WAYLAND_DISPLAY", "wayland-0"),
        ("XDG_SESSION_TYPE", "wayland"),
        ("XDG_CURRENT_DESKTOP", "sway"),
    ])
}

/// X11 apps on a GNOME Wayland session
pub fn xwayland_env() -> HashMap<String, String> {
    env_of(&[
        ("DISPLAY", ":0"),
        ("WAYLAND_DISPLAY", "wayland-0"),
        ("XDG_SESSION_TYPE", "wayland"),
        ("XDG_CURRENT_DESKTOP", "GNOME"),
    ])
}

pub fn headless_env() -> HashMap<String, String> {
    HashMap::new()
}

/// DISPLAY only, no XDG_SESSION_TYPE (older systems)
pub fn ambiguous_env() -> HashMap<String, String> {
    env_of(&[("DISPLAY", ":0")])
}
