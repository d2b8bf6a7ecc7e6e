//! soundhorn - audio monitor and cast/catch automation
//!
//! `run` keeps the capture stream and templates loaded and drives the
//! automation loop. It is controlled over a Unix socket (`soundhorn ctl`)
//! or a global hotkey.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use soundhorn_audio::{AudioCapture, RecordingStatus};
use soundhorn_daemon::automation;
use soundhorn_daemon::config::{HornConfig, KeyBackend};
use soundhorn_daemon::display::{DisplaySink, LogDisplaySink};
use soundhorn_daemon::hotkey::HotkeyManager;
use soundhorn_daemon::ipc::{send_command, IpcContext, IpcServer};
use soundhorn_daemon::key_injection::{CommandKeySink, KeySink, LogKeySink};
use soundhorn_daemon::line_test::run_line_test;
use soundhorn_daemon::pipeline::{capture_failure, load_templates, save_recording, spawn_meter_task, Pipeline};
use soundhorn_daemon::socket_utils::resolve_socket_path;

#[derive(Parser)]
#[command(name = "soundhorn", version, about = "Audio monitor and cast/catch automation")]
struct Cli {
    /// Config file (default: ~/.config/soundhorn/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List input devices
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Record a few seconds from one device and report the peak
    LineTest {
        /// Device index from `soundhorn devices`
        #[arg(long)]
        device: usize,

        #[arg(long, default_value_t = 5)]
        seconds: u64,

        /// Output file (default: audio_test_{device}.wav)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Live loudness meter, optionally recording until Ctrl-C
    Monitor {
        #[arg(long)]
        device: Option<usize>,

        /// Save everything heard to this WAV file on exit
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Run the cast/listen/catch loop
    Run {
        #[arg(long)]
        device: Option<usize>,

        /// Wait before the first cast (ms)
        #[arg(long)]
        start_delay_ms: Option<u64>,

        /// Do not register the global hotkey
        #[arg(long)]
        no_hotkey: bool,

        /// Log key events instead of pressing keys
        #[arg(long)]
        log_keys: bool,
    },

    /// Send a command to a running instance (start, stop, toggle, status, quit)
    Ctl { command: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_level(true)
        .init();

    match cli.command {
        Command::Devices { json } => list_devices(json),
        Command::LineTest { device, seconds, output } => {
            let report = run_line_test(device, Duration::from_secs(seconds), output).await?;
            println!("{}", report);
            Ok(())
        }
        Command::Monitor { device, record } => {
            let mut config = load_config(cli.config)?;
            if device.is_some() {
                config.device_index = device;
            }
            monitor(config, record).await
        }
        Command::Run {
            device,
            start_delay_ms,
            no_hotkey,
            log_keys,
        } => {
            let mut config = load_config(cli.config)?;
            if device.is_some() {
                config.device_index = device;
            }
            if let Some(delay) = start_delay_ms {
                config.start_delay_ms = delay;
            }
            if no_hotkey {
                config.hotkeys.enabled = false;
            }
            if log_keys {
                config.key_backend = KeyBackend::Log;
            }
            run(config).await
        }
        Command::Ctl { command } => {
            let config = load_config(cli.config)?;
            let socket_path = resolve_socket_path(&config.socket_path)?;
            println!("{}", send_command(&socket_path, &command).await?);
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<HornConfig> {
    let config = match path {
        Some(path) => HornConfig::load_from(path),
        None => HornConfig::load(),
    }
    .context("Failed to load configuration")?;

    info!("Configuration loaded from {}", config.config_path.display());
    Ok(config)
}

fn list_devices(json: bool) -> Result<()> {
    if json {
        let devices = AudioCapture::list_devices()?;
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        AudioCapture::print_devices()?;
    }
    Ok(())
}

async fn monitor(config: HornConfig, record: Option<PathBuf>) -> Result<()> {
    let pipeline = Pipeline::open(&config, Vec::new())?;
    if record.is_some() {
        pipeline.recorder().start();
    }

    let display: Arc<dyn DisplaySink> = Arc::new(LogDisplaySink);
    let meter = spawn_meter_task(
        pipeline.level(),
        display,
        Duration::from_millis(config.meter_interval_ms),
    );
    info!("Monitoring {} (Ctrl-C to stop)", pipeline.device_name());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Stopping monitor"),
        e = capture_failure(pipeline.capture_status()) => error!("Capture stopped: {}", e),
    }
    meter.abort();

    if let Some(path) = record {
        match save_recording(pipeline.recorder(), path).await? {
            RecordingStatus::Saved { path, samples } => {
                info!("Recording saved to {} ({} samples)", path.display(), samples)
            }
            RecordingStatus::NothingRecorded => info!("No audio recorded"),
        }
    }

    pipeline.close();
    Ok(())
}

async fn run(config: HornConfig) -> Result<()> {
    info!("Starting soundhorn v{}", env!("CARGO_PKG_VERSION"));

    if config.templates.is_empty() {
        bail!("No templates configured in {}", config.config_path.display());
    }
    let templates = load_templates(&config)?;
    let pipeline = Pipeline::open(&config, templates)?;
    info!("Capturing from {}", pipeline.device_name());

    let keys: Arc<dyn KeySink> = match config.key_backend {
        KeyBackend::Log => Arc::new(LogKeySink),
        KeyBackend::Command => match CommandKeySink::new() {
            Ok(sink) => {
                info!("Pressing keys with {}", sink.tool().command());
                Arc::new(sink)
            }
            Err(e) => {
                warn!("No key injection tool available ({:#}), logging key events only", e);
                Arc::new(LogKeySink)
            }
        },
    };
    let display: Arc<dyn DisplaySink> = Arc::new(LogDisplaySink);

    let (automation, automation_task) = automation::spawn(
        config.automation_config(),
        pipeline.queue(),
        pipeline.gate(),
        keys,
        Arc::clone(&display),
    );

    let meter = spawn_meter_task(
        pipeline.level(),
        display,
        Duration::from_millis(config.meter_interval_ms),
    );

    let shutdown = Arc::new(Notify::new());
    let queue = pipeline.queue();
    let context = Arc::new(IpcContext {
        automation: automation.clone(),
        level: pipeline.level(),
        capture: pipeline.capture_status(),
        queued_matches: Box::new(move || queue.len()),
        shutdown: Arc::clone(&shutdown),
    });
    let socket_path = resolve_socket_path(&config.socket_path)?;
    let ipc_server = IpcServer::new(&socket_path, context).context("Failed to start IPC server")?;
    let ipc_task = tokio::spawn(async move {
        if let Err(e) = ipc_server.run().await {
            error!("IPC server error: {}", e);
        }
    });

    let mut hotkey = HotkeyManager::new(&config.hotkeys)?;

    let start_delay = Duration::from_millis(config.start_delay_ms);
    let starter = automation.clone();
    tokio::spawn(async move {
        if !start_delay.is_zero() {
            info!("Starting in {:.1}s", start_delay.as_secs_f32());
            tokio::time::sleep(start_delay).await;
        }
        if let Err(e) = starter.start() {
            warn!("Failed to start automation: {}", e);
        }
    });

    info!("soundhorn ready, control with `soundhorn ctl <start|stop|toggle|status|quit>`");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = shutdown.notified() => break,
            e = capture_failure(pipeline.capture_status()) => {
                error!("Capture stopped: {}", e);
                break;
            }
            Some(()) = next_hotkey(&mut hotkey) => match automation.toggle() {
                Ok(message) => info!("Hotkey: {}", message),
                Err(e) => warn!("Hotkey toggle failed: {}", e),
            },
        }
    }

    info!("Shutting down...");
    let _ = automation.shutdown();
    if let Err(e) = automation_task.await {
        warn!("Automation task ended abnormally: {}", e);
    }
    meter.abort();
    // Dropping the server removes the socket file
    ipc_task.abort();
    let _ = ipc_task.await;
    drop(hotkey);
    pipeline.close();
    info!("soundhorn stopped");

    Ok(())
}

async fn next_hotkey(hotkey: &mut Option<HotkeyManager>) -> Option<()> {
    match hotkey {
        Some(manager) => manager.next_toggle().await,
        None => std::future::pending().await,
    }
}
