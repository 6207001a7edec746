//! Error types for the SoundCath driver
//!
//! This module defines the public [`DriverError`] taxonomy, the finer grained
//! [`InternalError`] diagnostic codes, and the raw failure signals produced by
//! the USB transport and the framer before they are classified.

use std::fmt;

use thiserror::Error;

/// Result type alias for public driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Public driver error codes
///
/// The discriminants are the bit values the probe firmware reports in the
/// status field of a response. `Ok` exists for code-style callers and for
/// message lookup; a public operation never returns `Err(DriverError::Ok)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DriverError {
    /// No error
    Ok = 0,
    /// Generic failure or call made in the wrong state
    Failed = 1,
    /// A parameter was rejected
    Param = 1 << 1,
    /// A parameter set was rejected
    ParamSet = 1 << 2,
    /// The status query failed
    Status = 1 << 3,
    /// USB session could not be initialized
    UsbInit = 1 << 4,
    /// USB receive failed
    UsbReceive = 1 << 5,
    /// USB send failed
    UsbSend = 1 << 6,
    /// Operation not implemented
    NotImplemented = 1 << 7,
    /// Frame integrity check failed
    Crc = 1 << 8,
    /// FPGA reported a fault
    Fpga = 1 << 9,
    /// Driver internal inconsistency
    SwInternal = 1 << 10,
    /// ASIC reported a fault
    AsicError = 1 << 16,
}

impl DriverError {
    /// Every driver error code, `Ok` first
    pub const ALL: [DriverError; 13] = [
        DriverError::Ok,
        DriverError::Failed,
        DriverError::Param,
        DriverError::ParamSet,
        DriverError::Status,
        DriverError::UsbInit,
        DriverError::UsbReceive,
        DriverError::UsbSend,
        DriverError::NotImplemented,
        DriverError::Crc,
        DriverError::Fpga,
        DriverError::SwInternal,
        DriverError::AsicError,
    ];

    /// Numeric code (device status bit)
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Look up a driver error from its numeric code
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    /// Collapse a result into a single code, `Ok` on success
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => DriverError::Ok,
            Err(e) => *e,
        }
    }

    /// Human-readable message
    pub fn message(self) -> &'static str {
        match self {
            DriverError::Ok => "No error",
            DriverError::Failed => "Operation failed",
            DriverError::Param => "Bad parameter",
            DriverError::ParamSet => "Bad parameter set",
            DriverError::Status => "Status query failed",
            DriverError::UsbInit => "USB not initialized",
            DriverError::UsbReceive => "USB data not received",
            DriverError::UsbSend => "USB did not send the data",
            DriverError::NotImplemented => "Function or feature not implemented",
            DriverError::Crc => "CRC error, frame integrity check failed",
            DriverError::Fpga => "FPGA error, query the fault status for details",
            DriverError::SwInternal => "Internal driver error",
            DriverError::AsicError => "Error returned from the ASIC",
        }
    }

    /// Check if the session survives this error
    ///
    /// Recoverable errors leave device state and configuration untouched and
    /// the same operation may be retried.
    pub fn is_recoverable(self) -> bool {
        !matches!(
            self,
            DriverError::Fpga
                | DriverError::AsicError
                | DriverError::SwInternal
                | DriverError::UsbSend
                | DriverError::UsbReceive
        )
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for DriverError {}

/// Get the message for a driver error code
pub fn driver_error_message(error: DriverError) -> &'static str {
    error.message()
}

/// Diagnostic error codes
///
/// Carries the detail the classifier knows about a failure before it is
/// collapsed to a [`DriverError`]. Only exposed for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum InternalError {
    Ok = 0,

    // Session preconditions
    NotOpen = 1,
    AlreadyOpen = 2,
    InvalidState = 3,

    // Session bring-up
    DeviceNotFound = 10,
    AccessDenied = 11,
    DeviceBusy = 12,
    OpenFailed = 13,
    ProtocolMismatch = 14,

    // Sending
    WriteTimeout = 20,
    PartialWrite = 21,
    WriteFailed = 22,
    WriteDisconnected = 23,

    // Receiving
    ReadTimeout = 30,
    ShortRead = 31,
    ReadFailed = 32,
    ReadDisconnected = 33,

    // Framing
    CrcMismatch = 40,
    LengthMismatch = 41,
    TruncatedFrame = 42,
    PayloadTooLarge = 43,
    UnknownCommand = 44,
    UnexpectedResponse = 45,
    MalformedPayload = 46,

    // Configuration
    ParameterOutOfRange = 50,
    UnknownParameter = 51,
    ParameterRejected = 52,
    ParameterSetRejected = 53,
    EmptyParameterSet = 54,

    // Status
    StatusRejected = 60,
    MalformedStatus = 61,

    // ASIC faults
    AsicUnknownCommand = 70,
    AsicInvalidData = 71,
    AsicChecksum = 72,
    AsicBusy = 73,
    AsicLocked = 74,
    AsicExternal = 75,
    AsicUnspecified = 76,

    // FPGA faults
    FpgaQspi = 80,
    FpgaClock = 81,
    FpgaPower = 82,
    FpgaHighVoltage = 83,
    FpgaLowVoltage = 84,
    FpgaPowerFailure = 85,
    FpgaInvalidCommand = 86,
    FpgaTrigger = 87,
    FpgaClockBusy = 88,
    FpgaOverfull = 89,
    FpgaFrameError = 90,
    FpgaUnspecified = 91,

    // Reported by the firmware without further detail
    DeviceFailed = 100,
    DeviceNotImplemented = 101,
    DeviceInternal = 102,
    DeviceCrc = 103,
    DeviceUsb = 104,
    UnknownDeviceStatus = 105,

    // Host side
    Unsupported = 110,
    Inconsistent = 111,
}

impl InternalError {
    /// Every internal error code, `Ok` first
    pub const ALL: [InternalError; 58] = [
        InternalError::Ok,
        InternalError::NotOpen,
        InternalError::AlreadyOpen,
        InternalError::InvalidState,
        InternalError::DeviceNotFound,
        InternalError::AccessDenied,
        InternalError::DeviceBusy,
        InternalError::OpenFailed,
        InternalError::ProtocolMismatch,
        InternalError::WriteTimeout,
        InternalError::PartialWrite,
        InternalError::WriteFailed,
        InternalError::WriteDisconnected,
        InternalError::ReadTimeout,
        InternalError::ShortRead,
        InternalError::ReadFailed,
        InternalError::ReadDisconnected,
        InternalError::CrcMismatch,
        InternalError::LengthMismatch,
        InternalError::TruncatedFrame,
        InternalError::PayloadTooLarge,
        InternalError::UnknownCommand,
        InternalError::UnexpectedResponse,
        InternalError::MalformedPayload,
        InternalError::ParameterOutOfRange,
        InternalError::UnknownParameter,
        InternalError::ParameterRejected,
        InternalError::ParameterSetRejected,
        InternalError::EmptyParameterSet,
        InternalError::StatusRejected,
        InternalError::MalformedStatus,
        InternalError::AsicUnknownCommand,
        InternalError::AsicInvalidData,
        InternalError::AsicChecksum,
        InternalError::AsicBusy,
        InternalError::AsicLocked,
        InternalError::AsicExternal,
        InternalError::AsicUnspecified,
        InternalError::FpgaQspi,
        InternalError::FpgaClock,
        InternalError::FpgaPower,
        InternalError::FpgaHighVoltage,
        InternalError::FpgaLowVoltage,
        InternalError::FpgaPowerFailure,
        InternalError::FpgaInvalidCommand,
        InternalError::FpgaTrigger,
        InternalError::FpgaClockBusy,
        InternalError::FpgaOverfull,
        InternalError::FpgaFrameError,
        InternalError::FpgaUnspecified,
        InternalError::DeviceFailed,
        InternalError::DeviceNotImplemented,
        InternalError::DeviceInternal,
        InternalError::DeviceCrc,
        InternalError::DeviceUsb,
        InternalError::UnknownDeviceStatus,
        InternalError::Unsupported,
        InternalError::Inconsistent,
    ];

    /// Numeric diagnostic code
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Human-readable message
    pub fn message(self) -> &'static str {
        use InternalError::*;
        match self {
            Ok => "No error occurred",
            NotOpen => "No session is open",
            AlreadyOpen => "A session is already open",
            InvalidState => "Operation not allowed in the current device state",
            DeviceNotFound => "Probe not found on the USB bus",
            AccessDenied => "Permission denied opening the probe",
            DeviceBusy => "Probe interface is already claimed",
            OpenFailed => "Opening the probe failed",
            ProtocolMismatch => "Probe speaks an unsupported protocol version",
            WriteTimeout => "USB write timed out",
            PartialWrite => "USB write transferred fewer bytes than requested",
            WriteFailed => "USB write failed",
            WriteDisconnected => "Probe disconnected during write",
            ReadTimeout => "USB read timed out",
            ShortRead => "USB read returned fewer bytes than expected",
            ReadFailed => "USB read failed",
            ReadDisconnected => "Probe disconnected during read",
            CrcMismatch => "Frame CRC does not match its contents",
            LengthMismatch => "Declared payload length disagrees with the received frame",
            TruncatedFrame => "Frame is shorter than header and trailer",
            PayloadTooLarge => "Payload exceeds the maximum frame size",
            UnknownCommand => "Unknown command type in frame",
            UnexpectedResponse => "Response does not answer the pending request",
            MalformedPayload => "Frame payload has an invalid layout",
            ParameterOutOfRange => "Parameter value outside the device range",
            UnknownParameter => "Unknown parameter identifier",
            ParameterRejected => "Device rejected the parameter",
            ParameterSetRejected => "Device rejected the parameter set",
            EmptyParameterSet => "Parameter set is empty",
            StatusRejected => "Device rejected the status query",
            MalformedStatus => "Status response has an invalid layout",
            AsicUnknownCommand => "ASIC: unknown command sent",
            AsicInvalidData => "ASIC: invalid data sent",
            AsicChecksum => "ASIC: checksum error",
            AsicBusy => "ASIC: busy, try again later",
            AsicLocked => "ASIC: in a locked state",
            AsicExternal => "ASIC: external error detected",
            AsicUnspecified => "ASIC: unspecified error",
            FpgaQspi => "FPGA: error on the quad SPI bus",
            FpgaClock => "FPGA: internal clock error",
            FpgaPower => "FPGA: power not properly initialized",
            FpgaHighVoltage => "FPGA: high voltage power not configured",
            FpgaLowVoltage => "FPGA: low voltage power not configured",
            FpgaPowerFailure => "FPGA: power failure within the system",
            FpgaInvalidCommand => "FPGA: invalid command",
            FpgaTrigger => "FPGA: invalid or misconfigured trigger",
            FpgaClockBusy => "FPGA: clock is busy",
            FpgaOverfull => "FPGA: memory buffer overfilled",
            FpgaFrameError => "FPGA: memory frame error",
            FpgaUnspecified => "FPGA: unspecified error",
            DeviceFailed => "Firmware reported a failed command",
            DeviceNotImplemented => "Firmware does not implement the command",
            DeviceInternal => "Firmware reported an internal error",
            DeviceCrc => "Firmware detected a corrupted request",
            DeviceUsb => "Firmware reported a USB error",
            UnknownDeviceStatus => "Firmware reported an unknown status code",
            Unsupported => "Operation not supported by the driver",
            Inconsistent => "Driver internal state is inconsistent",
        }
    }
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for InternalError {}

/// Get the message for an internal error code
pub fn internal_error_message(error: InternalError) -> &'static str {
    error.message()
}

/// Raw failure from a transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// No matching probe found
    #[error("No SoundCath probe found")]
    DeviceNotFound,

    /// OS refused access to the device
    #[error("Permission denied opening the probe")]
    AccessDenied,

    /// Interface already claimed by another process or session
    #[error("Probe interface is busy")]
    Busy,

    /// Any other failure while opening
    #[error("Failed to open probe: {0}")]
    Open(rusb::Error),

    /// Transport used without a successful init
    #[error("Transport is not open")]
    NotOpen,

    /// Write did not complete in time
    #[error("Write timeout")]
    WriteTimeout,

    /// Fewer bytes written than requested
    #[error("Partial write: expected {expected} bytes, wrote {actual}")]
    PartialWrite { expected: usize, actual: usize },

    /// Bulk write failed
    #[error("Bulk write failed: {0}")]
    Write(rusb::Error),

    /// No data before the deadline
    #[error("Read timeout")]
    ReadTimeout,

    /// Deadline passed with part of the data received
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Bulk read failed
    #[error("Bulk read failed: {0}")]
    Read(rusb::Error),
}

impl TransportError {
    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransportError::WriteTimeout
                | TransportError::ReadTimeout
                | TransportError::ShortRead { .. }
                | TransportError::Write(rusb::Error::Timeout)
                | TransportError::Read(rusb::Error::Timeout)
        )
    }

    /// Map a libusb open/claim failure
    pub fn from_open(err: rusb::Error) -> Self {
        match err {
            rusb::Error::NotFound | rusb::Error::NoDevice => TransportError::DeviceNotFound,
            rusb::Error::Access => TransportError::AccessDenied,
            rusb::Error::Busy => TransportError::Busy,
            other => TransportError::Open(other),
        }
    }
}

/// Raw failure from the framer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than header plus trailer
    #[error("Truncated frame: {len} bytes")]
    Truncated { len: usize },

    /// Declared payload length disagrees with the bytes present
    #[error("Length mismatch: header declares {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Recomputed CRC differs from the trailer
    #[error("CRC mismatch: trailer 0x{received:08X}, computed 0x{computed:08X}")]
    CrcMismatch { received: u32, computed: u32 },

    /// Payload longer than a frame can carry
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// Type byte is not a known command
    #[error("Unknown command type 0x{0:02X}")]
    UnknownCommand(u8),

    /// Response type does not answer the request
    #[error("Unexpected response type 0x{actual:02X} (expected 0x{expected:02X})")]
    UnexpectedResponse { expected: u8, actual: u8 },

    /// Payload layout invalid for its command
    #[error("Malformed payload for command 0x{command:02X}")]
    MalformedPayload { command: u8 },
}
