//! Where loudness readings and status changes are shown

use tracing::info;

use crate::automation::AutomationState;

/// UI collaborator. Called from the meter task and the automation task,
/// never from the capture thread.
pub trait DisplaySink: Send + Sync {
    fn on_loudness_update(&self, db: f32);
    fn on_status_change(&self, state: AutomationState, message: &str);
}

/// Writes everything through tracing
pub struct LogDisplaySink;

impl DisplaySink for LogDisplaySink {
    fn on_loudness_update(&self, db: f32) {
        info!("Level: {:.2} dB", db);
    }

    fn on_status_change(&self, state: AutomationState, message: &str) {
        info!("[{}] {}", state, message);
    }
}
