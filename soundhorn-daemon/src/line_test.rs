//! Fixed-length capture from one device to check the input line

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use soundhorn_audio::{AudioCapture, AudioConfig, DeviceInfo, Recorder, Recording, RecordingStatus, DEFAULT_SAMPLE_RATE};

pub struct LineTestReport {
    pub device: DeviceInfo,
    pub status: RecordingStatus,
    pub max_amplitude: u16,
}

impl LineTestReport {
    pub fn has_signal(&self) -> bool {
        self.max_amplitude > 0
    }
}

impl fmt::Display for LineTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RecordingStatus::Saved { path, samples } => {
                writeln!(f, "Audio saved to {} ({} samples)", path.display(), samples)?
            }
            RecordingStatus::NothingRecorded => writeln!(f, "No audio recorded")?,
        }
        if self.has_signal() {
            write!(f, "Audio detected. Max amplitude: {}", self.max_amplitude)
        } else {
            write!(f, "No significant audio detected. Check if the device is receiving audio.")
        }
    }
}

/// Largest absolute sample value in the take
pub fn peak_amplitude(recording: &Recording) -> u16 {
    recording.samples().map(i16::unsigned_abs).max().unwrap_or(0)
}

/// Record `duration` from device `device_index` at its native rate and save
/// it to `output` (default `audio_test_{index}.wav`).
pub async fn run_line_test(
    device_index: usize,
    duration: Duration,
    output: Option<PathBuf>,
) -> Result<LineTestReport> {
    let device = AudioCapture::list_devices()?
        .into_iter()
        .find(|d| d.index == device_index && d.max_input_channels > 0)
        .with_context(|| format!("No input device with index {}", device_index))?;

    let sample_rate = match device.default_sample_rate {
        0 => DEFAULT_SAMPLE_RATE,
        rate => rate,
    };
    let config = AudioConfig {
        sample_rate,
        channels: device.max_input_channels.min(2),
        device_index: Some(device_index),
        ..Default::default()
    };

    let recorder = Recorder::new(sample_rate);
    recorder.start();
    let capture = AudioCapture::open(&config, recorder.clone())
        .with_context(|| format!("Failed to open {}", device.name))?;

    info!("Recording {:.1} seconds from {}...", duration.as_secs_f32(), device.name);
    tokio::time::sleep(duration).await;
    let capture_error = capture.take_error();
    capture.close();
    if let Some(e) = capture_error {
        return Err(e).context("Capture failed during line test");
    }

    let recording = recorder.stop()?;
    let max_amplitude = peak_amplitude(&recording);
    let path = output.unwrap_or_else(|| PathBuf::from(format!("audio_test_{}.wav", device_index)));

    let status = tokio::task::spawn_blocking(move || recording.save(&path))
        .await
        .context("Save task panicked")??;

    Ok(LineTestReport {
        device,
        status,
        max_amplitude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundhorn_audio::AudioFrame;

    fn recording_of(samples: Vec<i16>) -> Recording {
        let recorder = Recorder::new(8_000);
        recorder.start();
        recorder.append(&AudioFrame::from_samples(0, samples));
        recorder.stop().unwrap()
    }

    fn device() -> DeviceInfo {
        DeviceInfo {
            index: 2,
            name: "Line In".to_string(),
            is_default: false,
            max_input_channels: 2,
            default_sample_rate: 48_000,
        }
    }

    #[test]
    fn test_peak_handles_negative_extreme() {
        assert_eq!(peak_amplitude(&recording_of(vec![3, -7, 5])), 7);
        assert_eq!(peak_amplitude(&recording_of(vec![i16::MIN, 0])), 32_768);
    }

    #[test]
    fn test_report_wording() {
        let silent = LineTestReport {
            device: device(),
            status: RecordingStatus::Saved {
                path: PathBuf::from("audio_test_2.wav"),
                samples: 240_000,
            },
            max_amplitude: 0,
        };
        let text = silent.to_string();
        assert!(text.contains("audio_test_2.wav"));
        assert!(text.contains("No significant audio detected"));

        let live = LineTestReport {
            max_amplitude: 1_234,
            ..silent
        };
        assert!(live.to_string().contains("Max amplitude: 1234"));
    }
}
