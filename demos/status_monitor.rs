//! Status Monitor Example
//!
//! Configures a probe with default imaging parameters and polls STATUS for a
//! few seconds, printing a line whenever readiness or the frame counter
//! changes. A CRC failure is retried; any fatal error ends the session.

use std::thread;
use std::time::{Duration, Instant};

use soundcath::{DriverConfig, DriverError, Interface, ParamId, ParameterSet};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), DriverError> {
    let driver = Interface::new(DriverConfig::default());
    driver.open("dev0")?;

    let parameters = ParameterSet::new()
        .with(ParamId::GAIN, 40)
        .with(ParamId::CENTER_FREQUENCY_KHZ, 8000)
        .with(ParamId::ASIC_MODE, 2)
        .with(ParamId::LNA_ENABLE, 1);
    driver.configure(&parameters)?;

    println!("{}", "-".repeat(60));
    println!("Monitoring status for 3 seconds...");
    println!("{}", "-".repeat(60));

    let start_time = Instant::now();
    let mut last: Option<(bool, u32)> = None;

    while start_time.elapsed() < Duration::from_secs(3) {
        let status = match driver.get_status() {
            Ok(status) => status,
            Err(DriverError::Crc) => {
                println!("corrupted status frame, retrying");
                continue;
            }
            Err(e) => {
                eprintln!("{}", driver.last_error());
                driver.close();
                return Err(e);
            }
        };

        let current = (status.ready, status.frame_count);
        if last != Some(current) {
            println!(
                "[{:5.2}s] State: {:12} Ready: {:5}  Frames: {}",
                start_time.elapsed().as_secs_f64(),
                status.state.name(),
                status.ready,
                status.frame_count
            );
            last = Some(current);
        }

        thread::sleep(Duration::from_millis(100));
    }

    driver.close();
    println!();
    println!("Monitoring complete");
    Ok(())
}
