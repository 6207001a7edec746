//! In-memory probe simulator
//!
//! [`MockTransport`] implements [`Transport`] without hardware. It decodes the
//! frames the driver sends, answers them like the probe firmware would, and
//! lets tests inject faults into the next exchange. Clones share the same
//! simulated device, so a test can keep a clone to inspect traffic after the
//! transport has been handed to a driver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;

use crate::command::{Command, Response};
use crate::constants::*;
use crate::error::TransportError;
use crate::frame::{CrcAlgorithm, Framer};
use crate::structures::{
    FirmwareInfo, HardwareId, ParamId, ParameterLimits, ParameterSet, StatusData,
};
use crate::transport::{DeviceId, Transport};

/// Fault applied to the next request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// Send times out, the request never reaches the device
    SendTimeout,
    /// Only part of the request is written
    PartialWrite,
    /// Nothing arrives before the receive deadline
    ReceiveTimeout,
    /// Only half of the response arrives
    ShortResponse,
    /// One payload byte of the response is flipped
    CorruptResponse,
    /// Response header declares a different payload length than it carries
    LengthMismatch,
    /// Response answers a different command
    WrongResponseType,
    /// Device answers with these status/detail fields without executing
    DeviceStatus { status: u32, detail: u32 },
}

/// I/O counters of the simulated device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Calls to `init`
    pub inits: usize,
    /// Calls to `send`
    pub sends: usize,
    /// Calls to `receive`
    pub receives: usize,
    /// Closes of an open transport
    pub closes: usize,
}

impl MockStats {
    /// Total number of transport calls that touch the bus
    pub fn io_calls(&self) -> usize {
        self.inits + self.sends + self.receives
    }
}

#[derive(Debug)]
struct MockDevice {
    present: bool,
    claimed_elsewhere: bool,
    open: bool,
    framer: Framer,
    limits: ParameterLimits,
    firmware: FirmwareInfo,
    params: ParameterSet,
    configured: bool,
    frame_count: u32,
    asic_faults: u8,
    fpga_faults: u32,
    faults: VecDeque<MockFault>,
    active: Option<MockFault>,
    pending: Option<Vec<u8>>,
    commands: Vec<Command>,
    stats: MockStats,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            present: true,
            claimed_elsewhere: false,
            open: false,
            framer: Framer::default(),
            limits: ParameterLimits::default(),
            firmware: FirmwareInfo {
                major: 1,
                minor: 4,
                hardware: HardwareId::HandleBoard,
                protocol_version: PROTOCOL_VERSION,
            },
            params: ParameterSet::new(),
            configured: false,
            frame_count: 0,
            asic_faults: 0,
            fpga_faults: 0,
            faults: VecDeque::new(),
            active: None,
            pending: None,
            commands: Vec::new(),
            stats: MockStats::default(),
        }
    }
}

impl MockDevice {
    fn execute(&mut self, command: &Command) -> Response {
        let code = command.type_code();
        let data_len = command.response_data_len();

        match command {
            Command::GetParam(id) => match self.params.get(*id) {
                Some(value) => Response::ok(code, value.to_le_bytes().to_vec()),
                None => Response::error(code, STATUS_PARAM, id.0 as u32, data_len),
            },
            Command::SetParam(id, value) => match self.limits.check(*id, *value) {
                Ok(()) => {
                    self.params.insert(*id, *value);
                    self.configured = true;
                    Response::ok(code, Vec::new())
                }
                Err(_) => Response::error(code, STATUS_PARAM, id.0 as u32, 0),
            },
            Command::ParamSet(set) => match self.limits.check_set(set) {
                Ok(()) if !set.is_empty() => {
                    self.params.merge(set);
                    self.configured = true;
                    Response::ok(code, Vec::new())
                }
                Ok(()) => Response::error(code, STATUS_PARAMSET, 0, 0),
                Err((id, _)) => Response::error(code, STATUS_PARAMSET, id.0 as u32, 0),
            },
            Command::Status => {
                let status = StatusData {
                    ready: self.configured,
                    mode: self.params.get(ParamId::ASIC_MODE).unwrap_or(1) as u8,
                    clock_mhz: self.params.get(ParamId::CLOCK_SPEED_MHZ).unwrap_or(25) as u8,
                    hardware_id: self.firmware.pack()[2],
                    frame_count: self.frame_count,
                };
                if self.configured {
                    self.frame_count = self.frame_count.wrapping_add(1);
                }
                Response::ok(code, status.pack().to_vec())
            }
            Command::UsbInit => {
                self.params.clear();
                self.configured = false;
                self.frame_count = 0;
                Response::ok(code, self.firmware.pack().to_vec())
            }
            Command::Vendor { opcode, .. } => {
                let data = match *opcode {
                    VENDOR_FPGA_VERSION => Some(format!(
                        "{}.{}.0",
                        self.firmware.major, self.firmware.minor
                    )
                    .into_bytes()),
                    VENDOR_FPGA_DESCRIPTION => Some(b"SoundCath handle FPGA".to_vec()),
                    VENDOR_ASIC_SERIAL => Some(b"SC-ASIC-0001".to_vec()),
                    VENDOR_FAULT_STATUS => {
                        let mut buf = vec![self.asic_faults, 0, 0, 0];
                        buf.extend_from_slice(&self.fpga_faults.to_le_bytes());
                        Some(buf)
                    }
                    _ => None,
                };
                match data {
                    Some(mut data) => {
                        data.resize(data_len, 0);
                        Response::ok(code, data)
                    }
                    None => Response::error(code, STATUS_NOT_IMPLEMENTED, 0, data_len),
                }
            }
        }
    }

    fn respond(&mut self, raw: &[u8]) -> Option<Vec<u8>> {
        let command = match self.framer.decode_request(raw) {
            Ok(command) => command,
            Err(e) => {
                debug!("mock probe rejected request: {}", e);
                let response = Response::error(raw.first().copied().unwrap_or(0), STATUS_CRC, 0, 0);
                return self.framer.encode_response(&response).ok();
            }
        };
        self.commands.push(command.clone());

        let mut response = match self.active {
            Some(MockFault::DeviceStatus { status, detail }) => Response::error(
                command.type_code(),
                status,
                detail,
                command.response_data_len(),
            ),
            _ => self.execute(&command),
        };
        if self.active == Some(MockFault::WrongResponseType) {
            response.command = if response.command == CMD_STATUS {
                CMD_PARAM
            } else {
                CMD_STATUS
            };
        }

        let mut bytes = self.framer.encode_response(&response).ok()?;
        match self.active {
            Some(MockFault::CorruptResponse) => bytes[FRAME_HEADER_LEN] ^= 0x5A,
            Some(MockFault::LengthMismatch) => bytes[1] = bytes[1].wrapping_add(1),
            _ => {}
        }
        Some(bytes)
    }
}

/// Simulated probe transport
///
/// # Example
///
/// ```
/// use soundcath::mock::{MockFault, MockTransport};
/// use soundcath::{DriverConfig, DriverError, Interface, ParamId, ParameterSet};
///
/// let probe = MockTransport::new();
/// let driver = Interface::with_transport(probe.clone(), DriverConfig::default());
/// driver.open("dev0")?;
///
/// probe.inject(MockFault::CorruptResponse);
/// let set = ParameterSet::new().with(ParamId::GAIN, 10);
/// assert_eq!(driver.configure(&set), Err(DriverError::Crc));
/// driver.configure(&set)?;
/// # Ok::<(), DriverError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    device: Arc<Mutex<MockDevice>>,
}

impl MockTransport {
    /// Create a simulated probe that is plugged in and idle
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&self) -> MutexGuard<'_, MockDevice> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Use a different CRC algorithm on the simulated firmware
    pub fn with_crc(self, algorithm: CrcAlgorithm) -> Self {
        self.device().framer = Framer::new(algorithm);
        self
    }

    /// Use different parameter limits on the simulated firmware
    pub fn with_limits(self, limits: ParameterLimits) -> Self {
        self.device().limits = limits;
        self
    }

    /// Report different firmware information on USB_INIT
    pub fn with_firmware(self, firmware: FirmwareInfo) -> Self {
        self.device().firmware = firmware;
        self
    }

    /// Remove or attach the probe
    pub fn set_present(&self, present: bool) {
        self.device().present = present;
    }

    /// Pretend another process holds the interface
    pub fn set_claimed_elsewhere(&self, claimed: bool) {
        self.device().claimed_elsewhere = claimed;
    }

    /// Set the raw ASIC and FPGA fault registers
    pub fn set_fault_registers(&self, asic: u8, fpga: u32) {
        let mut device = self.device();
        device.asic_faults = asic;
        device.fpga_faults = fpga;
    }

    /// Queue a fault for the next exchange
    pub fn inject(&self, fault: MockFault) {
        self.device().faults.push_back(fault);
    }

    /// I/O counters
    pub fn stats(&self) -> MockStats {
        self.device().stats
    }

    /// Parameters the simulated firmware has accepted
    pub fn device_parameters(&self) -> ParameterSet {
        self.device().params.clone()
    }

    /// Every command the simulated firmware has decoded
    pub fn commands(&self) -> Vec<Command> {
        self.device().commands.clone()
    }
}

impl Transport for MockTransport {
    fn init(&mut self, id: &DeviceId) -> Result<(), TransportError> {
        let mut device = self.device();
        device.stats.inits += 1;

        if !device.present || matches!(id, DeviceId::Index(n) if *n > 0) {
            return Err(TransportError::DeviceNotFound);
        }
        if device.claimed_elsewhere || device.open {
            return Err(TransportError::Busy);
        }
        device.open = true;
        device.pending = None;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        let mut device = self.device();
        device.stats.sends += 1;

        if !device.open {
            return Err(TransportError::NotOpen);
        }
        if !device.present {
            return Err(TransportError::Write(rusb::Error::NoDevice));
        }

        device.active = device.faults.pop_front();
        match device.active {
            Some(MockFault::SendTimeout) => return Err(TransportError::WriteTimeout),
            Some(MockFault::PartialWrite) => {
                return Err(TransportError::PartialWrite {
                    expected: bytes.len(),
                    actual: bytes.len() / 2,
                })
            }
            _ => {}
        }

        device.pending = device.respond(bytes);
        Ok(())
    }

    fn receive(
        &mut self,
        expected_len: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut device = self.device();
        device.stats.receives += 1;

        if !device.open {
            return Err(TransportError::NotOpen);
        }
        let active = device.active.take();
        let Some(pending) = device.pending.take() else {
            return Err(TransportError::ReadTimeout);
        };

        match active {
            Some(MockFault::ReceiveTimeout) => Err(TransportError::ReadTimeout),
            Some(MockFault::ShortResponse) => Err(TransportError::ShortRead {
                expected: expected_len,
                actual: pending.len() / 2,
            }),
            _ if pending.len() < expected_len => Err(TransportError::ShortRead {
                expected: expected_len,
                actual: pending.len(),
            }),
            _ if pending.len() > expected_len => Err(TransportError::Read(rusb::Error::Overflow)),
            _ => Ok(pending),
        }
    }

    fn close(&mut self) {
        let mut device = self.device();
        if device.open {
            device.open = false;
            device.pending = None;
            device.active = None;
            device.stats.closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.device().open
    }
}
