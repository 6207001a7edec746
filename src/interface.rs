//! Public driver facade
//!
//! [`Interface`] is the entry point for calling software. It wraps one
//! [`AsicController`] in a mutex held for the whole request/response cycle,
//! so one instance can be shared between threads while commands on the
//! session never interleave.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::asic::{AsicController, FaultStatus};
use crate::classify::Classification;
use crate::command::{Command, Response};
use crate::config::DriverConfig;
use crate::error::{DriverError, InternalError, Result};
use crate::structures::{DeviceState, FirmwareInfo, ParamId, ParameterSet, StatusFrame};
use crate::transport::{DeviceId, Transport, UsbTransport};

/// SoundCath probe driver
///
/// # Example
///
/// ```no_run
/// use soundcath::{DriverConfig, Interface, ParamId, ParameterSet};
///
/// let driver = Interface::new(DriverConfig::default());
/// driver.open("dev0")?;
///
/// let parameters = ParameterSet::new()
///     .with(ParamId::GAIN, 10)
///     .with(ParamId::CENTER_FREQUENCY_KHZ, 5000);
/// driver.configure(&parameters)?;
///
/// let status = driver.get_status()?;
/// println!("{}", status);
///
/// driver.close();
/// # Ok::<(), soundcath::DriverError>(())
/// ```
pub struct Interface<T: Transport = UsbTransport> {
    controller: Mutex<AsicController<T>>,
}

impl Interface<UsbTransport> {
    /// Create a driver for a USB-attached probe
    pub fn new(config: DriverConfig) -> Self {
        let transport = UsbTransport::new(config.usb);
        Self::with_transport(transport, config)
    }

    /// Get the message for a driver error code
    pub fn driver_error_message(error: DriverError) -> &'static str {
        error.message()
    }

    /// Get the message for a diagnostic error code
    pub fn internal_error_message(error: InternalError) -> &'static str {
        error.message()
    }
}

impl Default for Interface<UsbTransport> {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl<T: Transport> Interface<T> {
    /// Create a driver on top of any transport
    pub fn with_transport(transport: T, config: DriverConfig) -> Self {
        Self {
            controller: Mutex::new(AsicController::new(transport, config)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AsicController<T>> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session with a probe
    ///
    /// # Arguments
    /// * `device` - `"devN"`, `"bus:address"`, a serial number, or a [`DeviceId`]
    pub fn open(&self, device: impl Into<DeviceId>) -> Result<FirmwareInfo> {
        self.lock().open(&device.into())
    }

    /// Apply a parameter set, all or nothing
    pub fn configure(&self, parameters: &ParameterSet) -> Result<()> {
        self.lock().configure(parameters)
    }

    /// Send one command and wait for its response
    pub fn send_command(&self, command: &Command) -> Result<Response> {
        self.lock().send_command(command)
    }

    /// Query device status
    pub fn get_status(&self) -> Result<StatusFrame> {
        self.lock().query_status()
    }

    /// Release the session; never fails
    pub fn close(&self) {
        self.lock().close()
    }

    /// Read one parameter from the device
    pub fn get_parameter(&self, id: ParamId) -> Result<u32> {
        self.lock().get_parameter(id)
    }

    /// Read the FPGA firmware version string
    pub fn fpga_version(&self) -> Result<String> {
        self.lock().fpga_version()
    }

    /// Read the FPGA description string
    pub fn fpga_description(&self) -> Result<String> {
        self.lock().fpga_description()
    }

    /// Read the ASIC serial number
    pub fn asic_serial_number(&self) -> Result<String> {
        self.lock().asic_serial_number()
    }

    /// Read the raw ASIC and FPGA fault registers
    pub fn fault_status(&self) -> Result<FaultStatus> {
        self.lock().fault_status()
    }

    /// Get the device state
    pub fn state(&self) -> DeviceState {
        self.lock().state()
    }

    /// Last failure, with its diagnostic code
    pub fn last_error(&self) -> Classification {
        self.lock().last_error()
    }

    /// Firmware reported by the USB_INIT handshake
    pub fn firmware_info(&self) -> Option<FirmwareInfo> {
        self.lock().firmware_info()
    }

    /// Configuration the device has accepted in this session
    pub fn applied_parameters(&self) -> ParameterSet {
        self.lock().applied_parameters().clone()
    }
}

impl<T: Transport> std::fmt::Debug for Interface<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use std::sync::Arc;
    use std::thread;

    fn assert_send_sync<S: Send + Sync>() {}

    #[test]
    fn test_interface_is_send_sync() {
        assert_send_sync::<Interface<MockTransport>>();
        assert_send_sync::<Interface<UsbTransport>>();
    }

    #[test]
    fn test_shared_between_threads() {
        let driver = Arc::new(Interface::with_transport(
            MockTransport::new(),
            DriverConfig::default(),
        ));
        driver.open("dev0").unwrap();

        let handles: Vec<_> = (0..4u32)
            .map(|i| {
                let driver = Arc::clone(&driver);
                thread::spawn(move || {
                    let parameters = ParameterSet::new().with(ParamId::GAIN, i * 10);
                    driver.configure(&parameters).unwrap();
                    driver.get_status().unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(driver.state(), DeviceState::Ready);
        assert_eq!(driver.applied_parameters().len(), 1);
    }

    #[test]
    fn test_message_lookups() {
        assert_eq!(Interface::driver_error_message(DriverError::Ok), "No error");
        assert!(!Interface::internal_error_message(InternalError::Ok).is_empty());
    }
}
