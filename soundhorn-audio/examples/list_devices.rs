//! List available input devices

use soundhorn_audio::AudioCapture;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Input Devices on System:");
    AudioCapture::print_devices()?;
    Ok(())
}
