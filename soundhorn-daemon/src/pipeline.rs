//! Capture → {meter, recorder, matcher} wiring and the tasks around it

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use soundhorn_audio::{
    AudioCapture, AudioError, AudioFrame, CaptureStream, FrameConsumer, IngestStatus, LevelHandle,
    LoudnessMeter, Recorder, Recording, RecordingStatus,
};
use soundhorn_detect::{ListenGate, MatchForwarder, MatchQueue, SoundTemplate, TemplateMatcher};

use crate::config::HornConfig;
use crate::display::DisplaySink;

/// Everything that runs on the capture callback for one frame
pub struct HornStage {
    meter: LoudnessMeter,
    recorder: Recorder,
    forwarder: Option<MatchForwarder>,
}

impl HornStage {
    pub fn new(meter: LoudnessMeter, recorder: Recorder, forwarder: Option<MatchForwarder>) -> Self {
        Self {
            meter,
            recorder,
            forwarder,
        }
    }
}

impl FrameConsumer for HornStage {
    fn on_frame(&mut self, frame: &AudioFrame) {
        self.meter.process(frame);
        self.recorder.append(frame);
        if let Some(forwarder) = self.forwarder.as_mut() {
            forwarder.forward(frame);
        }
    }
}

/// Load every configured template at the capture rate
pub fn load_templates(config: &HornConfig) -> Result<Vec<SoundTemplate>> {
    config
        .templates
        .iter()
        .map(|entry| {
            SoundTemplate::load(entry.name.as_str(), &entry.path, config.sample_rate)
                .with_context(|| format!("Failed to load template '{}'", entry.name))
        })
        .collect()
}

/// A running capture with its shared handles
pub struct Pipeline {
    capture: CaptureStream,
    level: LevelHandle,
    recorder: Recorder,
    queue: MatchQueue,
    gate: Arc<ListenGate>,
}

impl Pipeline {
    /// Open the device and start feeding frames to the stage.
    ///
    /// With no templates the matcher is left out entirely.
    pub fn open(config: &HornConfig, templates: Vec<SoundTemplate>) -> Result<Self> {
        config.validate()?;

        let meter = LoudnessMeter::new(config.loudness_clamp());
        let level = meter.handle();
        let recorder = Recorder::new(config.sample_rate);
        let queue = MatchQueue::new(config.match_queue_capacity);
        let gate = ListenGate::new(config.expected_template.clone());

        let forwarder = if templates.is_empty() {
            None
        } else {
            let matcher = TemplateMatcher::new(config.matcher_config(), templates)
                .context("Failed to build template matcher")?;
            info!(
                "Matching {} template(s): {}",
                matcher.template_count(),
                matcher.template_names().collect::<Vec<_>>().join(", ")
            );
            Some(MatchForwarder::new(matcher, Arc::clone(&gate), queue.clone()))
        };

        let stage = HornStage::new(meter, recorder.clone(), forwarder);
        let capture = AudioCapture::open(&config.audio_config(), stage)
            .context("Failed to start audio capture")?;

        Ok(Self {
            capture,
            level,
            recorder,
            queue,
            gate,
        })
    }

    pub fn level(&self) -> LevelHandle {
        self.level.clone()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn queue(&self) -> MatchQueue {
        self.queue.clone()
    }

    pub fn gate(&self) -> Arc<ListenGate> {
        Arc::clone(&self.gate)
    }

    pub fn capture_status(&self) -> Arc<IngestStatus> {
        self.capture.status()
    }

    pub fn device_name(&self) -> &str {
        self.capture.device_name()
    }

    pub fn close(self) {
        self.capture.close();
    }
}

/// Push the latest loudness to the display at a fixed cadence
pub fn spawn_meter_task(
    level: LevelHandle,
    display: Arc<dyn DisplaySink>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            display.on_loudness_update(level.level_db());
        }
    })
}

/// Resolve once the capture stream has stopped, with the reason
pub async fn capture_failure(status: Arc<IngestStatus>) -> AudioError {
    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        poll.tick().await;
        if status.is_stopped() {
            return status
                .take_error()
                .unwrap_or_else(|| AudioError::device("Audio stream stopped"));
        }
    }
}

/// Stop recording and write the take on the blocking pool.
///
/// If the write fails the audio is kept and written to a recovery file in
/// the temp directory instead.
pub async fn save_recording(recorder: &Recorder, path: PathBuf) -> Result<RecordingStatus> {
    let recording = recorder.stop().context("Recorder was not active")?;

    tokio::task::spawn_blocking(move || save_with_fallback(&recording, &path))
        .await
        .context("Recording save task panicked")?
}

fn save_with_fallback(recording: &Recording, path: &Path) -> Result<RecordingStatus> {
    match recording.save(path) {
        Ok(status) => Ok(status),
        Err(e) => {
            error!("Failed to save recording to {}: {}", path.display(), e);
            let fallback = std::env::temp_dir().join(format!(
                "soundhorn-recovered-{}.wav",
                chrono::Local::now().format("%Y%m%d-%H%M%S")
            ));
            warn!("Retrying at {}", fallback.display());
            recording
                .save(&fallback)
                .with_context(|| format!("Failed to save recording to {}", fallback.display()))
        }
    }
}
