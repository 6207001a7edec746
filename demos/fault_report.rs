//! Fault Report Example
//!
//! Reads the raw ASIC and FPGA fault registers and prints every fault with
//! its diagnostic message, followed by the full error code tables.

use soundcath::{
    driver_error_message, internal_error_message, DriverConfig, DriverError, Interface,
    InternalError,
};

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

    println!("FPGA: {}", driver.fpga_description()?);
    let faults = driver.fault_status()?;
    println!("ASIC fault register: 0x{:02X}", faults.asic);
    println!("FPGA fault register: 0x{:08X}", faults.fpga);
    if faults.has_faults() {
        for fault in faults.faults() {
            println!("  [{:3}] {}", fault.code(), fault);
        }
    } else {
        println!("  no faults");
    }
    driver.close();

    println!();
    println!("Driver error codes:");
    for error in DriverError::ALL {
        println!("  0x{:05X}  {}", error.code(), driver_error_message(error));
    }
    println!();
    println!("Diagnostic codes:");
    for error in InternalError::ALL {
        println!("  {:3}  {}", error.code(), internal_error_message(error));
    }
    Ok(())
}
