//! Automation state machine tests
//!
//! Time is paused, so timers fire as soon as every task is idle and the
//! listen timeout, catch delay and cooldown resolve instantly and in order.

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use soundhorn_daemon::automation::{self, AutomationConfig, AutomationHandle, AutomationState};
use soundhorn_daemon::display::DisplaySink;
use soundhorn_daemon::key_injection::{KeyAction, KeyEvent, KeySink};
use soundhorn_detect::{ListenGate, MatchEvent, MatchQueue};

#[derive(Default)]
struct SpyKeys {
    presses: Mutex<Vec<KeyAction>>,
    fail: bool,
}

impl SpyKeys {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn presses(&self) -> Vec<KeyAction> {
        self.presses.lock().unwrap().clone()
    }
}

impl KeySink for SpyKeys {
    fn emit(&self, event: &KeyEvent) -> Result<()> {
        self.presses.lock().unwrap().push(event.action);
        if self.fail {
            bail!("no key tool");
        }
        Ok(())
    }
}

#[derive(Default)]
struct SpyDisplay {
    statuses: Mutex<Vec<(AutomationState, String)>>,
}

impl DisplaySink for SpyDisplay {
    fn on_loudness_update(&self, _db: f32) {}

    fn on_status_change(&self, state: AutomationState, message: &str) {
        self.statuses.lock().unwrap().push((state, message.to_string()));
    }
}

struct Harness {
    handle: AutomationHandle,
    task: JoinHandle<()>,
    states: watch::Receiver<AutomationState>,
    queue: MatchQueue,
    gate: Arc<ListenGate>,
    keys: Arc<SpyKeys>,
    display: Arc<SpyDisplay>,
}

impl Harness {
    fn new(keys: SpyKeys) -> Self {
        let config = AutomationConfig {
            cast_key: "f".to_string(),
            catch_key: "g".to_string(),
            listen_timeout: Duration::from_secs(1),
            catch_delay_min: Duration::from_millis(100),
            catch_delay_max: Duration::from_millis(200),
            cooldown: Duration::from_millis(500),
        };
        let queue = MatchQueue::new(4);
        let gate = ListenGate::new(None);
        let keys = Arc::new(keys);
        let display = Arc::new(SpyDisplay::default());

        let (handle, task) = automation::spawn(
            config,
            queue.clone(),
            Arc::clone(&gate),
            Arc::clone(&keys) as Arc<dyn KeySink>,
            Arc::clone(&display) as Arc<dyn DisplaySink>,
        );
        let states = handle.subscribe();

        Self {
            handle,
            task,
            states,
            queue,
            gate,
            keys,
            display,
        }
    }

    async fn wait_for(&mut self, state: AutomationState) {
        self.states.wait_for(|s| *s == state).await.unwrap();
    }

    async fn start_listening(&mut self) {
        self.handle.start().unwrap();
        self.wait_for(AutomationState::Listening).await;
    }

    fn push_match(&self, generation: u64) {
        self.queue.push(MatchEvent {
            template: "bobber".to_string(),
            template_index: 0,
            confidence: 0.93,
            seq: 42,
            generation,
        });
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_start_casts_and_arms_gate() {
    let mut h = Harness::new(SpyKeys::default());
    h.start_listening().await;

    assert_eq!(h.keys.presses(), vec![KeyAction::Cast]);
    assert!(h.gate.is_armed());
    assert_eq!(h.gate.generation(), 1);

    let statuses = h.display.statuses.lock().unwrap().clone();
    assert_eq!(statuses[0].0, AutomationState::Casting);
    assert_eq!(statuses[1].0, AutomationState::Listening);
}

#[tokio::test(start_paused = true)]
async fn test_listen_timeout_recasts() {
    let mut h = Harness::new(SpyKeys::default());
    h.start_listening().await;

    advance(1_500).await;

    assert_eq!(h.keys.presses(), vec![KeyAction::Cast, KeyAction::Cast]);
    assert_eq!(h.handle.state(), AutomationState::Listening);
    assert_eq!(h.gate.generation(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_match_catches_then_recasts_after_cooldown() {
    let mut h = Harness::new(SpyKeys::default());
    h.start_listening().await;

    h.push_match(h.gate.generation());
    h.wait_for(AutomationState::WaitingToCatch).await;
    assert!(!h.gate.is_armed());

    // Catch delay is at most 200 ms
    advance(250).await;
    assert_eq!(h.handle.state(), AutomationState::Catching);
    assert_eq!(h.keys.presses(), vec![KeyAction::Cast, KeyAction::Catch]);

    // Cooldown of 500 ms, then the next cast
    advance(600).await;
    assert_eq!(h.handle.state(), AutomationState::Listening);
    assert_eq!(h.keys.presses(), vec![KeyAction::Cast, KeyAction::Catch, KeyAction::Cast]);
    assert_eq!(h.gate.generation(), 2);

    let statuses = h.display.statuses.lock().unwrap().clone();
    assert!(statuses
        .iter()
        .any(|(state, message)| *state == AutomationState::WaitingToCatch && message.contains("bobber")));
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_waiting_cancels_catch() {
    let mut h = Harness::new(SpyKeys::default());
    h.start_listening().await;

    h.push_match(h.gate.generation());
    h.wait_for(AutomationState::WaitingToCatch).await;

    h.handle.stop().unwrap();
    h.wait_for(AutomationState::Idle).await;

    advance(5_000).await;
    assert_eq!(h.keys.presses(), vec![KeyAction::Cast]);
    assert_eq!(h.handle.state(), AutomationState::Idle);
    assert!(!h.gate.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_listening_disarms() {
    let mut h = Harness::new(SpyKeys::default());
    h.start_listening().await;

    h.handle.stop().unwrap();
    h.wait_for(AutomationState::Idle).await;
    assert!(!h.gate.is_armed());

    advance(3_000).await;
    assert_eq!(h.keys.presses(), vec![KeyAction::Cast]);
}

#[tokio::test(start_paused = true)]
async fn test_stale_generation_is_ignored() {
    let mut h = Harness::new(SpyKeys::default());
    h.start_listening().await;

    h.push_match(h.gate.generation() - 1);
    advance(10).await;

    assert_eq!(h.handle.state(), AutomationState::Listening);
    assert!(h.queue.is_empty());
    assert_eq!(h.keys.presses(), vec![KeyAction::Cast]);
}

#[tokio::test(start_paused = true)]
async fn test_start_discards_matches_queued_while_idle() {
    let mut h = Harness::new(SpyKeys::default());

    // Would carry the generation the first listen window gets
    h.push_match(1);
    h.start_listening().await;
    advance(10).await;

    assert_eq!(h.handle.state(), AutomationState::Listening);
    assert_eq!(h.keys.presses(), vec![KeyAction::Cast]);
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_ignored() {
    let mut h = Harness::new(SpyKeys::default());
    h.start_listening().await;

    h.handle.start().unwrap();
    advance(10).await;

    assert_eq!(h.keys.presses(), vec![KeyAction::Cast]);
    assert_eq!(h.gate.generation(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_key_failure_does_not_stop_loop() {
    let mut h = Harness::new(SpyKeys::failing());
    h.start_listening().await;

    h.push_match(h.gate.generation());
    h.wait_for(AutomationState::WaitingToCatch).await;
    advance(250).await;

    assert_eq!(h.handle.state(), AutomationState::Catching);
    assert_eq!(h.keys.presses(), vec![KeyAction::Cast, KeyAction::Catch]);
}

#[tokio::test(start_paused = true)]
async fn test_toggle() {
    let mut h = Harness::new(SpyKeys::default());

    assert_eq!(h.handle.toggle().unwrap(), "Automation started");
    h.wait_for(AutomationState::Listening).await;

    assert_eq!(h.handle.toggle().unwrap(), "Automation stopped");
    h.wait_for(AutomationState::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_ends_task() {
    let mut h = Harness::new(SpyKeys::default());
    h.start_listening().await;

    h.handle.shutdown().unwrap();
    (&mut h.task).await.unwrap();

    assert_eq!(h.handle.state(), AutomationState::Idle);
    assert!(!h.gate.is_armed());
    assert!(h.handle.start().is_err());
}
