//! soundhorn daemon library
//!
//! Everything the `soundhorn` binary wires together, exported for
//! integration testing.

pub mod automation;
pub mod config;
pub mod display;
pub mod display_server;
pub mod hotkey;
pub mod ipc;
pub mod key_injection;
pub mod line_test;
pub mod pipeline;
pub mod socket_utils;
