//! Cast / listen / catch state machine
//!
//! ```text
//! Idle --Start--> Casting --> Listening --match--> WaitingToCatch --delay--> Catching
//!                    ^            |                                              |
//!                    +--timeout---+                                              |
//!                    +------------------------cooldown---------------------------+
//! any --Stop--> Idle
//! ```
//!
//! Runs as one tokio task. The only pending timer is a deadline checked in
//! the task's `select!`, so clearing it on Stop cancels it outright.

use anyhow::{anyhow, Result};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use soundhorn_detect::{ListenGate, MatchEvent, MatchQueue};

use crate::display::DisplaySink;
use crate::key_injection::{KeyAction, KeyEvent, KeySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AutomationState {
    Idle,
    Casting,
    Listening,
    WaitingToCatch,
    Catching,
}

impl fmt::Display for AutomationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Casting => "casting",
            Self::Listening => "listening",
            Self::WaitingToCatch => "waiting_to_catch",
            Self::Catching => "catching",
        };
        f.write_str(name)
    }
}

/// Timing and key bindings for one automation loop
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub cast_key: String,
    pub catch_key: String,
    pub listen_timeout: Duration,
    pub catch_delay_min: Duration,
    pub catch_delay_max: Duration,
    pub cooldown: Duration,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            cast_key: "f".to_string(),
            catch_key: "g".to_string(),
            listen_timeout: Duration::from_secs(30),
            catch_delay_min: Duration::from_millis(300),
            catch_delay_max: Duration::from_millis(900),
            cooldown: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationCommand {
    Start,
    Stop,
    Shutdown,
}

/// Control side of a running automation task
#[derive(Clone)]
pub struct AutomationHandle {
    commands: mpsc::UnboundedSender<AutomationCommand>,
    state: watch::Receiver<AutomationState>,
}

impl AutomationHandle {
    fn send(&self, command: AutomationCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("Automation task is not running"))
    }

    pub fn start(&self) -> Result<()> {
        self.send(AutomationCommand::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(AutomationCommand::Stop)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(AutomationCommand::Shutdown)
    }

    /// Start when idle, stop otherwise. Returns a short description.
    pub fn toggle(&self) -> Result<String> {
        if self.state() == AutomationState::Idle {
            self.start()?;
            Ok("Automation started".to_string())
        } else {
            self.stop()?;
            Ok("Automation stopped".to_string())
        }
    }

    pub fn state(&self) -> AutomationState {
        *self.state.borrow()
    }

    /// Receiver that sees every state change
    pub fn subscribe(&self) -> watch::Receiver<AutomationState> {
        self.state.clone()
    }
}

/// Spawn the automation task on the current runtime
pub fn spawn(
    config: AutomationConfig,
    queue: MatchQueue,
    gate: Arc<ListenGate>,
    keys: Arc<dyn KeySink>,
    display: Arc<dyn DisplaySink>,
) -> (AutomationHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(AutomationState::Idle);

    let automation = Automation {
        config,
        queue,
        gate,
        keys,
        display,
        commands: command_rx,
        state: state_tx,
        deadline: None,
        listen_generation: 0,
    };
    let task = tokio::spawn(automation.run());

    (
        AutomationHandle {
            commands: command_tx,
            state: state_rx,
        },
        task,
    )
}

struct Automation {
    config: AutomationConfig,
    queue: MatchQueue,
    gate: Arc<ListenGate>,
    keys: Arc<dyn KeySink>,
    display: Arc<dyn DisplaySink>,
    commands: mpsc::UnboundedReceiver<AutomationCommand>,
    state: watch::Sender<AutomationState>,
    /// When the current state's timer fires
    deadline: Option<Instant>,
    /// Gate generation of the open listen window
    listen_generation: u64,
}

impl Automation {
    async fn run(mut self) {
        debug!("Automation task started");

        loop {
            let listening = self.current() == AutomationState::Listening;
            let deadline = self.deadline;

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(AutomationCommand::Start) => self.start(),
                    Some(AutomationCommand::Stop) => self.halt("Stopped"),
                    Some(AutomationCommand::Shutdown) | None => {
                        self.halt("Shutting down");
                        break;
                    }
                },
                event = self.queue.recv(), if listening => self.on_match(event),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.on_timer();
                }
            }
        }

        debug!("Automation task finished");
    }

    fn current(&self) -> AutomationState {
        *self.state.borrow()
    }

    fn set_state(&mut self, state: AutomationState, message: &str) {
        self.state.send_replace(state);
        self.display.on_status_change(state, message);
    }

    fn start(&mut self) {
        if self.current() != AutomationState::Idle {
            info!("Start ignored, automation already running ({})", self.current());
            return;
        }
        let stale = self.queue.clear();
        if stale > 0 {
            debug!("Discarded {} queued matches from before start", stale);
        }
        self.cast();
    }

    fn halt(&mut self, message: &str) {
        self.gate.disarm();
        self.deadline = None;
        if self.current() != AutomationState::Idle {
            self.set_state(AutomationState::Idle, message);
        }
    }

    fn cast(&mut self) {
        self.set_state(AutomationState::Casting, "Casting");
        self.press(KeyAction::Cast);

        self.listen_generation = self.gate.arm();
        self.deadline = Some(Instant::now() + self.config.listen_timeout);
        let message = format!(
            "Listening for up to {:.1}s",
            self.config.listen_timeout.as_secs_f32()
        );
        self.set_state(AutomationState::Listening, &message);
    }

    fn on_match(&mut self, event: MatchEvent) {
        if event.generation != self.listen_generation {
            debug!(
                "Discarding stale match for '{}' (generation {} != {})",
                event.template, event.generation, self.listen_generation
            );
            return;
        }

        self.gate.disarm();
        let delay = self.catch_delay();
        self.deadline = Some(Instant::now() + delay);
        let message = format!(
            "Matched '{}' ({:.2}), catching in {} ms",
            event.template,
            event.confidence,
            delay.as_millis()
        );
        self.set_state(AutomationState::WaitingToCatch, &message);
    }

    fn on_timer(&mut self) {
        match self.current() {
            AutomationState::Listening => {
                self.gate.disarm();
                info!("No match within listen timeout, casting again");
                self.cast();
            }
            AutomationState::WaitingToCatch => {
                self.set_state(AutomationState::Catching, "Catching");
                self.press(KeyAction::Catch);
                self.deadline = Some(Instant::now() + self.config.cooldown);
            }
            AutomationState::Catching => self.cast(),
            AutomationState::Idle | AutomationState::Casting => {}
        }
    }

    fn catch_delay(&self) -> Duration {
        let min = self.config.catch_delay_min.as_millis() as u64;
        let max = (self.config.catch_delay_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn press(&self, action: KeyAction) {
        let key = match action {
            KeyAction::Cast => &self.config.cast_key,
            KeyAction::Catch => &self.config.catch_key,
        };
        let event = KeyEvent::new(key.as_str(), action);
        if let Err(e) = self.keys.emit(&event) {
            warn!("Failed to send {} key '{}': {:#}", action, key, e);
        }
    }
}
