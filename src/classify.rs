//! Error classification
//!
//! Single place where raw failures from the transport, the framer, the
//! parameter checks and device status reports become a public
//! [`DriverError`] plus a diagnostic [`InternalError`].

use crate::constants::*;
use crate::error::{DriverError, FrameError, InternalError, TransportError};

/// Raw failure signal awaiting classification
#[derive(Debug)]
pub enum Signal<'a> {
    /// Failure while opening the session
    Init(&'a TransportError),
    /// Failure during a request/response exchange
    Transport(&'a TransportError),
    /// Frame failed to encode or decode
    Frame(&'a FrameError),
    /// Status and detail fields of a device response
    Device { status: u32, detail: u32 },
    /// Host-side parameter check failed
    Parameter { error: InternalError, batch: bool },
    /// Host-side precondition or consistency failure
    Host(InternalError),
}

/// Result of classifying a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Code reported to the caller
    pub driver: DriverError,
    /// Diagnostic detail
    pub internal: InternalError,
}

impl Classification {
    /// Classification of a successful call
    pub const OK: Classification = Classification {
        driver: DriverError::Ok,
        internal: InternalError::Ok,
    };

    /// Create a new classification
    pub fn new(driver: DriverError, internal: InternalError) -> Self {
        Self { driver, internal }
    }

    /// Check if this classification is a success
    pub fn is_ok(&self) -> bool {
        self.driver == DriverError::Ok
    }

    /// Check if the session must be torn down
    pub fn is_fatal(&self) -> bool {
        !self.is_ok() && !self.driver.is_recoverable()
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, internal {})",
            self.driver.message(),
            self.internal.message(),
            self.internal.code()
        )
    }
}

/// Device status bits in reporting priority order
///
/// Hardware faults win over everything else since they decide whether the
/// session survives.
const DEVICE_STATUS: [(u32, DriverError, InternalError); 12] = [
    (STATUS_ASICERROR, DriverError::AsicError, InternalError::AsicUnspecified),
    (STATUS_FPGA, DriverError::Fpga, InternalError::FpgaUnspecified),
    (STATUS_SWINTERNAL, DriverError::SwInternal, InternalError::DeviceInternal),
    (STATUS_FAILED, DriverError::Failed, InternalError::DeviceFailed),
    (STATUS_PARAM, DriverError::Param, InternalError::ParameterRejected),
    (STATUS_PARAMSET, DriverError::ParamSet, InternalError::ParameterSetRejected),
    (STATUS_STATUS, DriverError::Status, InternalError::StatusRejected),
    (STATUS_USB_INIT, DriverError::UsbInit, InternalError::DeviceUsb),
    (STATUS_USB_RECEIVE, DriverError::UsbReceive, InternalError::DeviceUsb),
    (STATUS_USB_SEND, DriverError::UsbSend, InternalError::DeviceUsb),
    (STATUS_NOT_IMPLEMENTED, DriverError::NotImplemented, InternalError::DeviceNotImplemented),
    (STATUS_CRC, DriverError::Crc, InternalError::DeviceCrc),
];

/// ASIC fault bits (detail low byte) in reporting order
const ASIC_FAULTS: [(u8, InternalError); 6] = [
    (ASIC_FAULT_UNKNOWN_CMD, InternalError::AsicUnknownCommand),
    (ASIC_FAULT_VALID_ERROR, InternalError::AsicInvalidData),
    (ASIC_FAULT_CHKSUM_ERROR, InternalError::AsicChecksum),
    (ASIC_FAULT_BUSY, InternalError::AsicBusy),
    (ASIC_FAULT_LOCKED, InternalError::AsicLocked),
    (ASIC_FAULT_EXTERNAL, InternalError::AsicExternal),
];

/// FPGA fault bits (detail) in reporting order
const FPGA_FAULTS: [(u32, InternalError); 11] = [
    (FPGA_FAULT_QSPI, InternalError::FpgaQspi),
    (FPGA_FAULT_CLOCK, InternalError::FpgaClock),
    (FPGA_FAULT_FPGA_POW, InternalError::FpgaPower),
    (FPGA_FAULT_HV_POW, InternalError::FpgaHighVoltage),
    (FPGA_FAULT_LV_POW, InternalError::FpgaLowVoltage),
    (FPGA_FAULT_POW_FAIL, InternalError::FpgaPowerFailure),
    (FPGA_FAULT_CMD, InternalError::FpgaInvalidCommand),
    (FPGA_FAULT_TRIGGER, InternalError::FpgaTrigger),
    (FPGA_FAULT_CLKBUSY, InternalError::FpgaClockBusy),
    (FPGA_FAULT_OVERFULL, InternalError::FpgaOverfull),
    (FPGA_FAULT_FRAME_ERROR, InternalError::FpgaFrameError),
];

/// Classify a raw signal
///
/// Total: every signal maps to exactly one classification.
pub fn classify(signal: &Signal<'_>) -> Classification {
    match signal {
        Signal::Init(err) => classify_init(err),
        Signal::Transport(err) => classify_transport(err),
        Signal::Frame(err) => classify_frame(err),
        Signal::Device { status, detail } => classify_device(*status, *detail),
        Signal::Parameter { error, batch } => {
            let driver = if *batch {
                DriverError::ParamSet
            } else {
                DriverError::Param
            };
            Classification::new(driver, *error)
        }
        Signal::Host(internal) => classify_host(*internal),
    }
}

fn classify_init(err: &TransportError) -> Classification {
    let internal = match err {
        TransportError::DeviceNotFound => InternalError::DeviceNotFound,
        TransportError::AccessDenied => InternalError::AccessDenied,
        TransportError::Busy => InternalError::DeviceBusy,
        TransportError::Open(_) => InternalError::OpenFailed,
        // Handshake exchange failures keep their transport detail
        other => return Classification::new(DriverError::UsbInit, classify_transport(other).internal),
    };
    Classification::new(DriverError::UsbInit, internal)
}

fn classify_transport(err: &TransportError) -> Classification {
    use InternalError::*;
    match err {
        TransportError::DeviceNotFound
        | TransportError::AccessDenied
        | TransportError::Busy
        | TransportError::Open(_) => classify_init(err),
        TransportError::NotOpen => Classification::new(DriverError::SwInternal, Inconsistent),
        TransportError::WriteTimeout | TransportError::Write(rusb::Error::Timeout) => {
            Classification::new(DriverError::UsbSend, WriteTimeout)
        }
        TransportError::PartialWrite { .. } => Classification::new(DriverError::UsbSend, PartialWrite),
        TransportError::Write(rusb::Error::NoDevice) => {
            Classification::new(DriverError::UsbSend, WriteDisconnected)
        }
        TransportError::Write(_) => Classification::new(DriverError::UsbSend, WriteFailed),
        TransportError::ReadTimeout | TransportError::Read(rusb::Error::Timeout) => {
            Classification::new(DriverError::UsbReceive, ReadTimeout)
        }
        TransportError::ShortRead { .. } => Classification::new(DriverError::UsbReceive, ShortRead),
        TransportError::Read(rusb::Error::NoDevice) => {
            Classification::new(DriverError::UsbReceive, ReadDisconnected)
        }
        TransportError::Read(_) => Classification::new(DriverError::UsbReceive, ReadFailed),
    }
}

fn classify_frame(err: &FrameError) -> Classification {
    use InternalError::*;
    match err {
        FrameError::CrcMismatch { .. } => Classification::new(DriverError::Crc, CrcMismatch),
        // The byte count matched but the content shape did not
        FrameError::LengthMismatch { .. } => Classification::new(DriverError::Crc, LengthMismatch),
        FrameError::Truncated { .. } => Classification::new(DriverError::Crc, TruncatedFrame),
        FrameError::MalformedPayload { .. } => Classification::new(DriverError::Crc, MalformedPayload),
        FrameError::UnknownCommand(_) => Classification::new(DriverError::Crc, UnknownCommand),
        FrameError::UnexpectedResponse { .. } => {
            Classification::new(DriverError::SwInternal, UnexpectedResponse)
        }
        FrameError::PayloadTooLarge { .. } => Classification::new(DriverError::Failed, PayloadTooLarge),
    }
}

fn classify_device(status: u32, detail: u32) -> Classification {
    if status == 0 {
        return Classification::OK;
    }

    let Some(&(bit, driver, fallback)) = DEVICE_STATUS.iter().find(|(bit, ..)| status & bit != 0)
    else {
        return Classification::new(DriverError::SwInternal, InternalError::UnknownDeviceStatus);
    };

    let internal = match bit {
        STATUS_ASICERROR => ASIC_FAULTS
            .iter()
            .find(|(fault, _)| (detail as u8) & fault != 0)
            .map_or(fallback, |(_, internal)| *internal),
        STATUS_FPGA => FPGA_FAULTS
            .iter()
            .find(|(fault, _)| detail & fault != 0)
            .map_or(fallback, |(_, internal)| *internal),
        _ => fallback,
    };

    Classification::new(driver, internal)
}

fn classify_host(internal: InternalError) -> Classification {
    use InternalError::*;
    let driver = match internal {
        Ok => DriverError::Ok,
        NotOpen | AlreadyOpen | InvalidState | PayloadTooLarge => DriverError::Failed,
        ParameterOutOfRange | UnknownParameter | ParameterRejected => DriverError::Param,
        ParameterSetRejected | EmptyParameterSet => DriverError::ParamSet,
        StatusRejected | MalformedStatus => DriverError::Status,
        DeviceNotFound | AccessDenied | DeviceBusy | OpenFailed | ProtocolMismatch => {
            DriverError::UsbInit
        }
        Unsupported | DeviceNotImplemented => DriverError::NotImplemented,
        CrcMismatch | LengthMismatch | TruncatedFrame | UnknownCommand | MalformedPayload
        | DeviceCrc => DriverError::Crc,
        WriteTimeout | PartialWrite | WriteFailed | WriteDisconnected => DriverError::UsbSend,
        ReadTimeout | ShortRead | ReadFailed | ReadDisconnected | DeviceUsb => {
            DriverError::UsbReceive
        }
        AsicUnknownCommand | AsicInvalidData | AsicChecksum | AsicBusy | AsicLocked
        | AsicExternal | AsicUnspecified => DriverError::AsicError,
        FpgaQspi | FpgaClock | FpgaPower | FpgaHighVoltage | FpgaLowVoltage | FpgaPowerFailure
        | FpgaInvalidCommand | FpgaTrigger | FpgaClockBusy | FpgaOverfull | FpgaFrameError
        | FpgaUnspecified => DriverError::Fpga,
        DeviceFailed => DriverError::Failed,
        UnexpectedResponse | DeviceInternal | UnknownDeviceStatus | Inconsistent => {
            DriverError::SwInternal
        }
    };
    Classification::new(driver, internal)
}

/// Decode raw ASIC and FPGA fault registers into every fault they report
pub fn decode_faults(asic: u8, fpga: u32) -> Vec<InternalError> {
    let asic_faults = ASIC_FAULTS
        .iter()
        .filter(|(bit, _)| asic & bit != 0)
        .map(|(_, internal)| *internal);
    let fpga_faults = FPGA_FAULTS
        .iter()
        .filter(|(bit, _)| fpga & bit != 0)
        .map(|(_, internal)| *internal);
    asic_faults.chain(fpga_faults).collect()
}
