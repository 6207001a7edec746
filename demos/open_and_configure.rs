//! Session Bring-up Example
//!
//! Opens a probe, applies a configuration and waits for the ASIC to report
//! ready:
//!
//! 1. USB_INIT - Handshake, firmware and hardware identification
//! 2. PARAMSET - Apply gain, center frequency and clock speed
//! 3. STATUS   - Confirm the ASIC is ready
//!
//! Usage: `cargo run --example open_and_configure -- [device]`

use soundcath::{DriverConfig, DriverError, Interface, ParamId, ParameterSet, UsbTransport};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {} ({})", e, e.code());
        std::process::exit(1);
    }
}

fn run() -> Result<(), DriverError> {
    let config = DriverConfig::default();
    let device = std::env::args().nth(1).unwrap_or_else(|| "dev0".to_string());

    let probes = UsbTransport::scan(&config.usb).map_err(|e| {
        eprintln!("USB scan failed: {}", e);
        DriverError::UsbInit
    })?;
    println!("Found {} probe(s)", probes.len());
    for (i, (bus, address)) in probes.iter().enumerate() {
        println!("  dev{}: bus {:03} address {:03}", i, bus, address);
    }
    println!();

    let driver = Interface::new(config);

    println!("=== Step 1: USB_INIT ===");
    let firmware = match driver.open(device.as_str()) {
        Ok(firmware) => firmware,
        Err(e) => {
            let detail = driver.last_error().internal;
            eprintln!("Open failed: {} ({})", e, detail);
            return Err(e);
        }
    };
    println!("{}", firmware);
    println!("FPGA: {}", driver.fpga_version()?);
    println!("ASIC serial: {}", driver.asic_serial_number()?);
    println!();

    println!("=== Step 2: PARAMSET ===");
    let parameters = ParameterSet::new()
        .with(ParamId::GAIN, 10)
        .with(ParamId::CENTER_FREQUENCY_KHZ, 5000)
        .with(ParamId::CLOCK_SPEED_MHZ, 50);
    driver.configure(&parameters)?;
    println!("Applied {}", driver.applied_parameters());
    println!();

    println!("=== Step 3: STATUS ===");
    let status = driver.get_status()?;
    println!("{}", status);
    println!();

    driver.close();
    println!("Session closed");
    Ok(())
}
