//! Audio capture with cpal
//!
//! Opens one input device, converts whatever it delivers into fixed-size mono
//! PCM16 frames and fans them out inline on the device callback thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AudioError, Result};
use crate::frame::{f32_to_i16, u16_to_i16, FrameAssembler};
use crate::ingest::{FrameConsumer, FrameIngestor, IngestState, IngestStatus};
use crate::AudioConfig;

/// Audio device information
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
}

/// Everything that runs on the device callback: assemble, ingest, fan out.
///
/// Exposed so offline sources (files, tests) can drive the exact same path
/// the live stream uses.
pub struct BlockIngest<C> {
    assembler: FrameAssembler,
    ingestor: FrameIngestor,
    consumer: C,
}

impl<C: FrameConsumer> BlockIngest<C> {
    pub fn new(frame_size: usize, ring_capacity: usize, consumer: C) -> Self {
        Self::with_status(frame_size, ring_capacity, consumer, IngestStatus::new())
    }

    pub fn with_status(
        frame_size: usize,
        ring_capacity: usize,
        consumer: C,
        status: Arc<IngestStatus>,
    ) -> Self {
        Self {
            assembler: FrameAssembler::new(frame_size),
            ingestor: FrameIngestor::with_status(ring_capacity, status),
            consumer,
        }
    }

    /// Feed one interleaved device block. Returns frames delivered to the consumer.
    pub fn push_block<T, F>(&mut self, data: &[T], channels: usize, convert: F) -> usize
    where
        T: Copy,
        F: FnMut(T) -> i16,
    {
        if self.ingestor.state() == IngestState::Stopped {
            return 0;
        }

        let ingestor = &mut self.ingestor;
        self.assembler.push(data, channels, convert, |frame| {
            ingestor.push(frame);
        });
        self.ingestor.dispatch(&mut self.consumer)
    }

    pub fn status(&self) -> Arc<IngestStatus> {
        self.ingestor.status()
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }
}

/// Device enumeration and stream opening
pub struct AudioCapture;

impl AudioCapture {
    /// List all input-capable audio devices
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        for (index, device) in host
            .input_devices()
            .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?
            .enumerate()
        {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Unknown Device {}", index));

            let (max_input_channels, default_sample_rate) = match device.default_input_config() {
                Ok(config) => (config.channels(), config.sample_rate().0),
                Err(_) => (0, 0),
            };

            devices.push(DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                max_input_channels,
                default_sample_rate,
            });
        }

        Ok(devices)
    }

    /// Print device list in formatted output
    pub fn print_devices() -> Result<()> {
        let devices = Self::list_devices()?;

        println!("\n{}", "=".repeat(78));
        println!("Available Input Devices:");
        println!("{}\n", "=".repeat(78));

        for device in devices.iter().filter(|d| d.max_input_channels > 0) {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("{:3}: {}{}", device.index, device.name, default_marker);
            println!("     Input channels: {}", device.max_input_channels);
            println!("     Sample Rate: {} Hz\n", device.default_sample_rate);
        }

        println!("{}", "=".repeat(78));
        Ok(())
    }

    /// Open the configured device and start streaming frames into `consumer`.
    ///
    /// The consumer runs on the real-time callback thread and must stay
    /// bounded and non-blocking.
    pub fn open<C>(config: &AudioConfig, consumer: C) -> Result<CaptureStream>
    where
        C: FrameConsumer + Send + 'static,
    {
        config.validate()?;

        let host = cpal::default_host();
        let device = select_device(&host, config.device_index)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let (stream_config, format) = select_stream_config(&device, config)?;
        let channels = stream_config.channels as usize;

        info!("=== Starting Audio Capture ===");
        info!("Device: {}", device_name);
        info!(
            "Sample Rate: {} Hz, Channels: {} -> 1, Format: {:?}",
            stream_config.sample_rate.0, channels, format
        );
        info!(
            "Frame size: {} samples ({:.1} ms)",
            config.frame_size,
            config.frame_period().as_secs_f64() * 1000.0
        );

        let status = IngestStatus::new();
        let core = BlockIngest::with_status(
            config.frame_size,
            config.ring_capacity,
            consumer,
            Arc::clone(&status),
        );

        let stream = match format {
            SampleFormat::I16 => {
                build_stream::<i16, _, _>(&device, &stream_config, channels, core, |s| s, &status)?
            }
            SampleFormat::F32 => {
                build_stream::<f32, _, _>(&device, &stream_config, channels, core, f32_to_i16, &status)?
            }
            SampleFormat::U16 => {
                build_stream::<u16, _, _>(&device, &stream_config, channels, core, u16_to_i16, &status)?
            }
            other => {
                return Err(AudioError::device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::stream(format!("Failed to start stream: {}", e)))?;

        info!("✓ Audio capture started (cpal backend)");

        Ok(CaptureStream {
            stream: Some(stream),
            status,
            device_name,
            sample_rate: stream_config.sample_rate.0,
        })
    }
}

fn select_device(host: &cpal::Host, device_index: Option<usize>) -> Result<Device> {
    match device_index {
        Some(index) => {
            debug!("Selecting device index: {}", index);
            let mut devices = host
                .input_devices()
                .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?;
            devices
                .nth(index)
                .ok_or_else(|| AudioError::invalid_config(format!("Device index {} not found", index)))
        }
        None => {
            debug!("Using default input device");
            host.default_input_device()
                .ok_or_else(|| AudioError::device("No default input device found"))
        }
    }
}

/// Pick a device configuration that supports the requested rate.
///
/// Prefers the requested channel count, then PCM16, then f32.
fn select_stream_config(device: &Device, config: &AudioConfig) -> Result<(StreamConfig, SampleFormat)> {
    let rate = SampleRate(config.sample_rate);
    let ranges = device
        .supported_input_configs()
        .map_err(|e| AudioError::device(format!("Failed to query device configs: {}", e)))?;

    let format_rank = |f: SampleFormat| match f {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        SampleFormat::U16 => 2,
        _ => 3,
    };

    let best = ranges
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter(|r| format_rank(r.sample_format()) < 3)
        .min_by_key(|r| (r.channels() != config.channels, format_rank(r.sample_format())))
        .ok_or_else(|| {
            AudioError::device(format!(
                "Device does not support {} Hz capture",
                config.sample_rate
            ))
        })?;

    let supported = best.with_sample_rate(rate);
    let format = supported.sample_format();
    Ok((supported.into(), format))
}

fn build_stream<T, F, C>(
    device: &Device,
    stream_config: &StreamConfig,
    channels: usize,
    mut core: BlockIngest<C>,
    convert: F,
    status: &Arc<IngestStatus>,
) -> Result<Stream>
where
    T: SizedSample,
    F: Fn(T) -> i16 + Send + 'static,
    C: FrameConsumer + Send + 'static,
{
    let err_status = Arc::clone(status);
    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                core.push_block(data, channels, &convert);
            },
            move |err| {
                err_status.fail(format!("Audio stream error: {}", err));
            },
            None,
        )
        .map_err(|e| AudioError::stream(format!("Failed to build stream: {}", e)))
}

/// Exclusively owned live input stream.
///
/// Closed exactly once, by `close()` or on drop.
pub struct CaptureStream {
    stream: Option<Stream>,
    status: Arc<IngestStatus>,
    device_name: String,
    sample_rate: u32,
}

impl CaptureStream {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn status(&self) -> Arc<IngestStatus> {
        Arc::clone(&self.status)
    }

    pub fn is_stopped(&self) -> bool {
        self.status.is_stopped()
    }

    /// Fatal capture error, reported once
    pub fn take_error(&self) -> Option<AudioError> {
        self.status.take_error()
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause audio stream: {}", e);
            }
            drop(stream);
            info!(
                "Audio capture closed ({} frames, {} dropped)",
                self.status.pushed_frames(),
                self.status.dropped_frames()
            );
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
