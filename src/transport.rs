//! USB transport
//!
//! The [`Transport`] trait is the narrow byte-level capability the driver
//! needs from the bus: init, send, receive, close. [`UsbTransport`] implements
//! it on top of libusb bulk transfers.

use std::str::FromStr;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use rusb::{Device, DeviceHandle, GlobalContext};

use crate::config::UsbConfig;
use crate::error::TransportError;

/// Byte-level link to one probe
///
/// Implementations own at most one open device at a time.
pub trait Transport {
    /// Open and claim the device
    fn init(&mut self, device: &DeviceId) -> Result<(), TransportError>;

    /// Write all of `bytes`
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Read exactly `expected_len` bytes
    fn receive(&mut self, expected_len: usize, timeout: Duration)
        -> Result<Vec<u8>, TransportError>;

    /// Release the device; calling it again is a no-op
    fn close(&mut self);

    /// Check if a device is open
    fn is_open(&self) -> bool;
}

/// Which probe to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceId {
    /// N-th matching probe in enumeration order
    Index(usize),
    /// Probe at a bus number and device address
    Address { bus: u8, address: u8 },
    /// Probe with this USB serial number
    Serial(String),
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    /// Parse `"devN"` / `"N"`, `"bus:address"`, or anything else as a serial
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = s.strip_prefix("dev").unwrap_or(s);
        if let Ok(index) = index.parse::<usize>() {
            return Ok(DeviceId::Index(index));
        }
        if let Some((bus, address)) = s.split_once(':') {
            if let (Ok(bus), Ok(address)) = (bus.parse(), address.parse()) {
                return Ok(DeviceId::Address { bus, address });
            }
        }
        Ok(DeviceId::Serial(s.to_string()))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceId::Index(index) => write!(f, "dev{}", index),
            DeviceId::Address { bus, address } => write!(f, "{:03}:{:03}", bus, address),
            DeviceId::Serial(serial) => write!(f, "serial {}", serial),
        }
    }
}

/// Kernel drivers are only detached on Linux/Unix
const DETACH_KERNEL_DRIVER: bool = cfg!(any(target_os = "linux", target_os = "macos"));

/// Interface operations needed to claim a probe
trait InterfaceClaim {
    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool>;
    fn detach_kernel_driver(&self, interface: u8) -> rusb::Result<()>;
    fn attach_kernel_driver(&self, interface: u8) -> rusb::Result<()>;
    fn claim_interface(&self, interface: u8) -> rusb::Result<()>;
}

impl InterfaceClaim for DeviceHandle<GlobalContext> {
    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool> {
        DeviceHandle::kernel_driver_active(self, interface)
    }

    fn detach_kernel_driver(&self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::detach_kernel_driver(self, interface)
    }

    fn attach_kernel_driver(&self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, interface)
    }

    fn claim_interface(&self, interface: u8) -> rusb::Result<()> {
        DeviceHandle::claim_interface(self, interface)
    }
}

/// Claim `interface`, detaching an active kernel driver first
///
/// Returns whether a kernel driver was detached. If the claim fails the
/// kernel driver is reattached before the error is returned.
fn claim<H: InterfaceClaim>(
    handle: &H,
    interface: u8,
    detach: bool,
) -> Result<bool, TransportError> {
    let detached = detach && handle.kernel_driver_active(interface).unwrap_or(false);
    if detached {
        handle
            .detach_kernel_driver(interface)
            .map_err(TransportError::from_open)?;
    }

    if let Err(e) = handle.claim_interface(interface) {
        if detached {
            if let Err(e) = handle.attach_kernel_driver(interface) {
                warn!("reattach of kernel driver on interface {} failed: {}", interface, e);
            }
        }
        return Err(TransportError::from_open(e));
    }
    Ok(detached)
}

/// libusb-backed transport
///
/// # Example
///
/// ```no_run
/// use soundcath::{DeviceId, Transport, UsbConfig, UsbTransport};
/// use std::time::Duration;
///
/// let mut usb = UsbTransport::new(UsbConfig::default());
/// usb.init(&DeviceId::from("dev0"))?;
/// usb.send(&[0x03, 0x00, 0x00, 0x4F, 0x4C], Duration::from_millis(100))?;
/// usb.close();
/// # Ok::<(), soundcath::TransportError>(())
/// ```
pub struct UsbTransport {
    config: UsbConfig,
    handle: Option<DeviceHandle<GlobalContext>>,
    /// Kernel driver detached on init, reattached on close
    detached_kernel_driver: bool,
}

impl UsbTransport {
    /// Create a closed transport
    pub fn new(config: UsbConfig) -> Self {
        Self {
            config,
            handle: None,
            detached_kernel_driver: false,
        }
    }

    /// List bus/address of every connected probe
    pub fn scan(config: &UsbConfig) -> Result<Vec<(u8, u8)>, TransportError> {
        Ok(Self::matching_devices(config)?
            .iter()
            .map(|d| (d.bus_number(), d.address()))
            .collect())
    }

    fn matching_devices(config: &UsbConfig) -> Result<Vec<Device<GlobalContext>>, TransportError> {
        let devices = rusb::devices().map_err(TransportError::Open)?;
        Ok(devices
            .iter()
            .filter(|device| match device.device_descriptor() {
                Ok(desc) => config.matches(desc.vendor_id(), desc.product_id()),
                Err(_) => false,
            })
            .collect())
    }

    fn serial_number(handle: &DeviceHandle<GlobalContext>) -> Option<String> {
        let desc = handle.device().device_descriptor().ok()?;
        let index = desc.serial_number_string_index()?;
        handle.read_string_descriptor_ascii(index).ok()
    }

    fn open_matching(&self, id: &DeviceId) -> Result<DeviceHandle<GlobalContext>, TransportError> {
        let devices = Self::matching_devices(&self.config)?;
        debug!("{} probe(s) on the bus, opening {}", devices.len(), id);

        match id {
            DeviceId::Index(index) => devices
                .get(*index)
                .ok_or(TransportError::DeviceNotFound)?
                .open()
                .map_err(TransportError::from_open),
            DeviceId::Address { bus, address } => devices
                .iter()
                .find(|d| d.bus_number() == *bus && d.address() == *address)
                .ok_or(TransportError::DeviceNotFound)?
                .open()
                .map_err(TransportError::from_open),
            DeviceId::Serial(serial) => {
                for device in &devices {
                    let handle = match device.open() {
                        Ok(handle) => handle,
                        Err(_) => continue,
                    };
                    if Self::serial_number(&handle).as_deref() == Some(serial.as_str()) {
                        return Ok(handle);
                    }
                }
                Err(TransportError::DeviceNotFound)
            }
        }
    }
}

impl Transport for UsbTransport {
    fn init(&mut self, device: &DeviceId) -> Result<(), TransportError> {
        if self.handle.is_some() {
            return Err(TransportError::Busy);
        }

        let handle = self.open_matching(device)?;
        let interface = self.config.interface;
        let detached = claim(&handle, interface, DETACH_KERNEL_DRIVER)?;

        info!(
            "claimed probe interface {} (bus {}, addr {})",
            interface,
            handle.device().bus_number(),
            handle.device().address()
        );
        self.handle = Some(handle);
        self.detached_kernel_driver = detached;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let handle = self.handle.as_ref().ok_or(TransportError::NotOpen)?;
        trace!("TX {:02X?}", bytes);

        let written = match handle.write_bulk(self.config.endpoint_out, bytes, timeout) {
            Ok(n) => n,
            Err(rusb::Error::Timeout) => return Err(TransportError::WriteTimeout),
            Err(e) => return Err(TransportError::Write(e)),
        };

        if written != bytes.len() {
            return Err(TransportError::PartialWrite {
                expected: bytes.len(),
                actual: written,
            });
        }
        Ok(())
    }

    fn receive(
        &mut self,
        expected_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let handle = self.handle.as_ref().ok_or(TransportError::NotOpen)?;
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; expected_len];
        let mut filled = 0;

        // A response may arrive split over several bulk packets
        while filled < expected_len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match handle.read_bulk(self.config.endpoint_in, &mut buf[filled..], remaining) {
                Ok(n) => filled += n,
                Err(rusb::Error::Timeout) => break,
                Err(e) => return Err(TransportError::Read(e)),
            }
        }

        match filled {
            n if n == expected_len => {
                trace!("RX {:02X?}", buf);
                Ok(buf)
            }
            0 => Err(TransportError::ReadTimeout),
            actual => Err(TransportError::ShortRead {
                expected: expected_len,
                actual,
            }),
        }
    }

    fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let interface = self.config.interface;
        if let Err(e) = handle.release_interface(interface) {
            warn!("release of interface {} failed: {}", interface, e);
        }
        if self.detached_kernel_driver {
            let _ = handle.attach_kernel_driver(interface);
            self.detached_kernel_driver = false;
        }
        info!("released probe interface {}", interface);
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

impl std::fmt::Debug for UsbTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbTransport")
            .field("vendor_id", &format_args!("0x{:04x}", self.config.vendor_id))
            .field("product_id", &format_args!("0x{:04x}", self.config.product_id))
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeHandle {
        driver_active: bool,
        claim_error: Option<rusb::Error>,
        attached: Cell<bool>,
        calls: RefCell<Vec<&'static str>>,
    }

    impl InterfaceClaim for FakeHandle {
        fn kernel_driver_active(&self, _interface: u8) -> rusb::Result<bool> {
            Ok(self.driver_active && self.attached.get())
        }

        fn detach_kernel_driver(&self, _interface: u8) -> rusb::Result<()> {
            self.calls.borrow_mut().push("detach");
            self.attached.set(false);
            Ok(())
        }

        fn attach_kernel_driver(&self, _interface: u8) -> rusb::Result<()> {
            self.calls.borrow_mut().push("attach");
            self.attached.set(true);
            Ok(())
        }

        fn claim_interface(&self, _interface: u8) -> rusb::Result<()> {
            self.calls.borrow_mut().push("claim");
            match self.claim_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn test_claim_detaches_kernel_driver() {
        let handle = FakeHandle {
            driver_active: true,
            attached: Cell::new(true),
            ..Default::default()
        };
        assert!(claim(&handle, 0, true).unwrap());
        assert_eq!(*handle.calls.borrow(), ["detach", "claim"]);
        assert!(!handle.attached.get());
    }

    #[test]
    fn test_failed_claim_reattaches_kernel_driver() {
        let handle = FakeHandle {
            driver_active: true,
            claim_error: Some(rusb::Error::Busy),
            attached: Cell::new(true),
            ..Default::default()
        };
        assert!(matches!(claim(&handle, 0, true), Err(TransportError::Busy)));
        assert_eq!(*handle.calls.borrow(), ["detach", "claim", "attach"]);
        assert!(handle.attached.get());
    }

    #[test]
    fn test_failed_claim_without_detach_leaves_driver_alone() {
        let handle = FakeHandle {
            claim_error: Some(rusb::Error::Access),
            ..Default::default()
        };
        assert!(matches!(
            claim(&handle, 0, true),
            Err(TransportError::AccessDenied)
        ));
        assert_eq!(*handle.calls.borrow(), ["claim"]);
    }

    #[test]
    fn test_device_id_parse() {
        assert_eq!(DeviceId::from("dev0"), DeviceId::Index(0));
        assert_eq!(DeviceId::from("3"), DeviceId::Index(3));
        assert_eq!(
            DeviceId::from("001:012"),
            DeviceId::Address { bus: 1, address: 12 }
        );
        assert_eq!(
            DeviceId::from("SC-0042"),
            DeviceId::Serial("SC-0042".to_string())
        );
    }

    #[test]
    fn test_device_id_display() {
        assert_eq!(DeviceId::Index(2).to_string(), "dev2");
        assert_eq!(DeviceId::Address { bus: 1, address: 5 }.to_string(), "001:005");
    }

    #[test]
    fn test_closed_transport_rejects_io() {
        let mut usb = UsbTransport::new(UsbConfig::default());
        assert!(!usb.is_open());
        assert!(matches!(
            usb.send(&[0], Duration::from_millis(1)),
            Err(TransportError::NotOpen)
        ));
        assert!(matches!(
            usb.receive(4, Duration::from_millis(1)),
            Err(TransportError::NotOpen)
        ));
        usb.close();
        usb.close();
    }
}
