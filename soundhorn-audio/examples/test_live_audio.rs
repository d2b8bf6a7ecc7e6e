//! Minimal live level test - print the meter every 0.5s for 10 seconds
//! Usage: cargo run --release --example test_live_audio [device_index]

use soundhorn_audio::{AudioCapture, AudioConfig, LoudnessMeter};
use std::env;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n=== Live Audio Level Test ===\n");

    AudioCapture::print_devices()?;

    let device_index = env::args().nth(1).and_then(|s| s.parse::<usize>().ok());

    let config = AudioConfig {
        device_index,
        ..Default::default()
    };

    let meter = LoudnessMeter::default();
    let level = meter.handle();
    let stream = AudioCapture::open(&config, meter)?;

    println!("\n▶️  Monitoring {} for 10 seconds...\n", stream.device_name());

    for i in 1..=20 {
        thread::sleep(Duration::from_millis(500));
        if stream.is_stopped() {
            break;
        }

        let db = level.level_db();
        let bars = (db.max(0.0) / 2.0) as usize;
        println!("[{:4.1}s] {:7.2} dB  {}", i as f32 * 0.5, db, "█".repeat(bars.min(50)));
    }

    if let Some(err) = stream.take_error() {
        println!("\n❌ {}", err);
    }
    stream.close();
    Ok(())
}
