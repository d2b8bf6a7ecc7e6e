//! Configuration management

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use soundhorn_audio::{AudioConfig, DEFAULT_FRAME_SIZE, DEFAULT_RING_CAPACITY, DEFAULT_SAMPLE_RATE};
use soundhorn_detect::{MatcherConfig, DEFAULT_DECIMATION, DEFAULT_MATCH_QUEUE_CAPACITY};

use crate::automation::AutomationConfig;

/// Hotkey configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeyConfig {
    /// Register a global hotkey at all
    pub enabled: bool,

    /// Start/stop the automation loop (default: "Ctrl+Shift+H")
    pub toggle: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            toggle: "Ctrl+Shift+H".to_string(),
        }
    }
}

/// A reference clip to load at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateEntry {
    pub name: String,
    pub path: PathBuf,
}

/// How key events leave the process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyBackend {
    /// Log only, inject nothing
    Log,
    /// xdotool / wtype / ydotool, picked by display server
    #[default]
    Command,
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HornConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Unix socket path for IPC (empty = $XDG_RUNTIME_DIR/soundhorn.sock)
    pub socket_path: String,

    /// Audio device index (None = default device)
    pub device_index: Option<usize>,

    /// Capture sample rate (Hz)
    pub sample_rate: u32,

    /// Samples per frame
    pub frame_size: usize,

    /// Frames buffered before the oldest is dropped
    pub ring_capacity: usize,

    /// Similarity at or above which a template matches (0.0 to 1.0]
    pub match_threshold: f32,

    /// Block-mean decimation factor for matching
    pub decimation: usize,

    /// Pending match events kept before the oldest is dropped
    pub match_queue_capacity: usize,

    /// Only this template ends a listen window (None = any template)
    pub expected_template: Option<String>,

    /// How long to listen before casting again (ms)
    pub listen_timeout_ms: u64,

    /// Random delay between a match and the catch, inclusive [min, max] (ms)
    pub catch_delay_range_ms: [u64; 2],

    /// Pause after a catch before the next cast (ms)
    pub cooldown_ms: u64,

    /// Wait before the first cast of `run` (ms)
    pub start_delay_ms: u64,

    /// Key pressed to cast
    pub cast_key: String,

    /// Key pressed to catch
    pub catch_key: String,

    /// Key injection backend
    pub key_backend: KeyBackend,

    /// Optional display range for loudness readings [min_db, max_db]
    pub loudness_clamp: Option<[f32; 2]>,

    /// Loudness display cadence (ms)
    pub meter_interval_ms: u64,

    /// Reference clips
    pub templates: Vec<TemplateEntry>,

    /// Hotkey configuration
    pub hotkeys: HotkeyConfig,
}

impl Default for HornConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            socket_path: String::new(),
            device_index: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            ring_capacity: DEFAULT_RING_CAPACITY,
            match_threshold: 0.6,
            decimation: DEFAULT_DECIMATION,
            match_queue_capacity: DEFAULT_MATCH_QUEUE_CAPACITY,
            expected_template: None,
            listen_timeout_ms: 30_000,
            catch_delay_range_ms: [300, 900],
            cooldown_ms: 2_000,
            start_delay_ms: 5_000,
            cast_key: "f".to_string(),
            catch_key: "g".to_string(),
            key_backend: KeyBackend::Command,
            loudness_clamp: None,
            meter_interval_ms: 100,
            templates: Vec::new(),
            hotkeys: HotkeyConfig::default(),
        }
    }
}

impl HornConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_config_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref().to_path_buf();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let mut config: HornConfig = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save()
                .context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.frame_size == 0 {
            bail!("frame_size must be positive");
        }
        if self.ring_capacity == 0 {
            bail!("ring_capacity must be positive");
        }
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            bail!("match_threshold must be in (0.0, 1.0], got {}", self.match_threshold);
        }
        if self.decimation == 0 {
            bail!("decimation must be at least 1");
        }
        let [min, max] = self.catch_delay_range_ms;
        if min > max {
            bail!("catch_delay_range_ms min ({}) exceeds max ({})", min, max);
        }
        if self.listen_timeout_ms == 0 {
            bail!("listen_timeout_ms must be positive");
        }
        if self.meter_interval_ms == 0 {
            bail!("meter_interval_ms must be positive");
        }
        if let Some([lo, hi]) = self.loudness_clamp {
            if lo > hi {
                bail!("loudness_clamp min ({}) exceeds max ({})", lo, hi);
            }
        }
        if let Some(expected) = &self.expected_template {
            if !self.templates.iter().any(|t| &t.name == expected) {
                bail!("expected_template '{}' is not in the template list", expected);
            }
        }
        Ok(())
    }

    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            sample_rate: self.sample_rate,
            channels: 1,
            frame_size: self.frame_size,
            ring_capacity: self.ring_capacity,
            device_index: self.device_index,
        }
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig::with_sample_rate(self.sample_rate)
            .threshold(self.match_threshold)
            .decimation(self.decimation)
    }

    pub fn automation_config(&self) -> AutomationConfig {
        let [min, max] = self.catch_delay_range_ms;
        AutomationConfig {
            cast_key: self.cast_key.clone(),
            catch_key: self.catch_key.clone(),
            listen_timeout: Duration::from_millis(self.listen_timeout_ms),
            catch_delay_min: Duration::from_millis(min),
            catch_delay_max: Duration::from_millis(max),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }

    pub fn loudness_clamp(&self) -> Option<(f32, f32)> {
        self.loudness_clamp.map(|[lo, hi]| (lo, hi))
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("soundhorn")
            .join("config.toml")
    }
}
