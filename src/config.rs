//! Driver configuration
//!
//! Values the hardware integration supplies: USB identifiers, the frame CRC
//! algorithm, transfer timeouts and the valid parameter ranges.

use std::time::Duration;

use crate::constants::*;
use crate::frame::CrcAlgorithm;
use crate::structures::ParameterLimits;

/// USB identifiers and endpoints of the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbConfig {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Interface number to claim
    pub interface: u8,
    /// Bulk OUT endpoint address
    pub endpoint_out: u8,
    /// Bulk IN endpoint address
    pub endpoint_in: u8,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: SOUNDCATH_VENDOR_ID,
            product_id: SOUNDCATH_PRODUCT_ID,
            interface: SOUNDCATH_INTERFACE,
            endpoint_out: SOUNDCATH_ENDPOINT_OUT,
            endpoint_in: SOUNDCATH_ENDPOINT_IN,
        }
    }
}

impl UsbConfig {
    /// Check if a device descriptor belongs to the probe
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

/// Driver configuration
///
/// # Example
///
/// ```
/// use soundcath::{CrcAlgorithm, DriverConfig};
/// use std::time::Duration;
///
/// let config = DriverConfig::default()
///     .with_crc(CrcAlgorithm::Crc32IsoHdlc)
///     .with_receive_timeout(Duration::from_millis(250));
/// assert_eq!(config.crc.width(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// USB identifiers and endpoints
    pub usb: UsbConfig,
    /// Frame CRC algorithm, must match the probe firmware
    pub crc: CrcAlgorithm,
    /// Bound on one frame write
    pub send_timeout: Duration,
    /// Bound on receiving one complete response
    pub receive_timeout: Duration,
    /// Valid parameter ranges
    pub limits: ParameterLimits,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            usb: UsbConfig::default(),
            crc: CrcAlgorithm::default(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            limits: ParameterLimits::default(),
        }
    }
}

impl DriverConfig {
    /// Set the USB identifiers
    pub fn with_usb(mut self, usb: UsbConfig) -> Self {
        self.usb = usb;
        self
    }

    /// Set the CRC algorithm
    pub fn with_crc(mut self, crc: CrcAlgorithm) -> Self {
        self.crc = crc;
        self
    }

    /// Set the write timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the response timeout
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Set the parameter limits
    pub fn with_limits(mut self, limits: ParameterLimits) -> Self {
        self.limits = limits;
        self
    }
}
