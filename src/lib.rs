//! SoundCath Probe Driver for Rust
//!
//! This crate provides the driver core for SoundCath ultrasound-catheter
//! probes: USB transport, command framing with CRC validation, the ASIC
//! control state machine and a small, deterministic error taxonomy.
//!
//! # Features
//!
//! - Framed request/response protocol with configurable CRC-16/CRC-32
//! - All-or-nothing parameter configuration with local range checks
//! - Device state machine with a terminal error state for hardware faults
//! - ASIC/FPGA fault decoding into diagnostic codes
//! - Thread-safe facade over one session
//! - In-memory probe simulator for tests
//!
//! # Example
//!
//! ```no_run
//! use soundcath::{DriverConfig, DriverError, Interface, ParamId, ParameterSet};
//!
//! fn main() -> soundcath::Result<()> {
//!     let driver = Interface::new(DriverConfig::default());
//!     let firmware = driver.open("dev0")?;
//!     println!("{}", firmware);
//!
//!     // Gain 10, center frequency 5 MHz
//!     let parameters = ParameterSet::new()
//!         .with(ParamId::GAIN, 10)
//!         .with(ParamId::CENTER_FREQUENCY_KHZ, 5000);
//!     driver.configure(&parameters)?;
//!
//!     match driver.get_status() {
//!         Ok(status) => println!("{}", status),
//!         Err(DriverError::Crc) => println!("corrupted status frame, retry"),
//!         Err(e) => return Err(e),
//!     }
//!
//!     driver.close();
//!     Ok(())
//! }
//! ```
//!
//! # Testing without hardware
//!
//! [`mock::MockTransport`] simulates a probe and can inject faults:
//!
//! ```
//! use soundcath::mock::{MockFault, MockTransport};
//! use soundcath::{DeviceState, DriverConfig, DriverError, Interface};
//!
//! let probe = MockTransport::new();
//! let driver = Interface::with_transport(probe.clone(), DriverConfig::default());
//! driver.open("dev0")?;
//!
//! probe.inject(MockFault::ReceiveTimeout);
//! assert_eq!(driver.get_status(), Err(DriverError::UsbReceive));
//! assert_eq!(driver.state(), DeviceState::Error);
//! # Ok::<(), DriverError>(())
//! ```

pub mod asic;
pub mod classify;
pub mod command;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod interface;
pub mod mock;
pub mod structures;
pub mod transport;

// Re-export main types at crate root
pub use constants::{
    // Command type codes
    CMD_PARAM,
    CMD_PARAMSET,
    CMD_STATUS,
    CMD_USB_INIT,
    CMD_VENDOR_FIRST,
    CMD_VENDOR_LAST,
    // Vendor opcodes
    VENDOR_ASIC_SERIAL,
    VENDOR_FAULT_STATUS,
    VENDOR_FPGA_DESCRIPTION,
    VENDOR_FPGA_VERSION,
};

pub use asic::{AsicController, FaultStatus};
pub use classify::{classify, Classification, Signal};
pub use command::{Command, Response};
pub use config::{DriverConfig, UsbConfig};
pub use error::{
    driver_error_message, internal_error_message, DriverError, FrameError, InternalError,
    Result, TransportError,
};
pub use frame::{CrcAlgorithm, Frame, Framer};
pub use interface::Interface;
pub use mock::{MockFault, MockTransport};
pub use structures::{
    AsicMode, DeviceState, FirmwareInfo, HardwareId, ParamId, ParameterLimits, ParameterSet,
    StatusFrame,
};
pub use transport::{DeviceId, Transport, UsbTransport};
