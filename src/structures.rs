//! SoundCath protocol structures
//!
//! This module contains the data structures exchanged with the probe:
//! parameter identifiers and sets, parameter limits, the status frame and
//! firmware information, plus the driver's device state.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::constants::{STATUS_DATA_LEN, USB_INIT_DATA_LEN};
use crate::error::InternalError;

/// ASIC parameter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamId(pub u16);

impl ParamId {
    /// Receive gain in dB
    pub const GAIN: ParamId = ParamId(0x0001);
    /// Transmit center frequency in kHz
    pub const CENTER_FREQUENCY_KHZ: ParamId = ParamId(0x0002);
    /// ASIC clock speed in MHz
    pub const CLOCK_SPEED_MHZ: ParamId = ParamId(0x0003);
    /// ASIC operating mode (see [`AsicMode`])
    pub const ASIC_MODE: ParamId = ParamId(0x0004);
    /// Pulse length/gain subtype
    pub const PULSE_SUBTYPE: ParamId = ParamId(0x0005);

    /// LNA current setting
    pub const ISEL_LNA: ParamId = ParamId(0x0010);
    /// Output driver current setting
    pub const ISEL_ODRV: ParamId = ParamId(0x0011);
    /// TGC current setting
    pub const ISEL_RES_CTRL: ParamId = ParamId(0x0012);
    /// Discharge to ground current setting
    pub const ISEL_DC_GND: ParamId = ParamId(0x0013);
    /// LNA bias resistor calibration current
    pub const RES_CAL: ParamId = ParamId(0x0014);

    /// Enable the LNA
    pub const LNA_ENABLE: ParamId = ParamId(0x0020);
    /// Enable biasing
    pub const BIAS_ENABLE: ParamId = ParamId(0x0021);
    /// Enable the output driver
    pub const ODRV_ENABLE: ParamId = ParamId(0x0022);
    /// Keep reception always enabled
    pub const RX_ALWAYS_ENABLE: ParamId = ParamId(0x0023);
    /// Continuous wave mode
    pub const CW_ENABLE: ParamId = ParamId(0x0024);

    /// DRV bias setting
    pub const DRV_BIAS: ParamId = ParamId(0x0030);

    /// Get a human-readable name for the parameter
    pub fn name(self) -> &'static str {
        match self {
            ParamId::GAIN => "gain",
            ParamId::CENTER_FREQUENCY_KHZ => "freq",
            ParamId::CLOCK_SPEED_MHZ => "clock_speed",
            ParamId::ASIC_MODE => "asic_mode",
            ParamId::PULSE_SUBTYPE => "pulse_subtype",
            ParamId::ISEL_LNA => "isel_lna",
            ParamId::ISEL_ODRV => "isel_odrv",
            ParamId::ISEL_RES_CTRL => "isel_res_ctrl",
            ParamId::ISEL_DC_GND => "isel_dc_gnd",
            ParamId::RES_CAL => "res_cal",
            ParamId::LNA_ENABLE => "lna_en",
            ParamId::BIAS_ENABLE => "bias_en",
            ParamId::ODRV_ENABLE => "odrv_en",
            ParamId::RX_ALWAYS_ENABLE => "rx_always_en",
            ParamId::CW_ENABLE => "cw_en",
            ParamId::DRV_BIAS => "drv_bias",
            _ => "unknown",
        }
    }
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(0x{:04x})", self.name(), self.0)
    }
}

/// Mapping from parameter identifier to value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<ParamId, u32>,
}

impl ParameterSet {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, id: ParamId, value: u32) -> Self {
        self.values.insert(id, value);
        self
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, id: ParamId, value: u32) -> Option<u32> {
        self.values.insert(id, value)
    }

    /// Get the value of a parameter
    pub fn get(&self, id: ParamId) -> Option<u32> {
        self.values.get(&id).copied()
    }

    /// Number of parameters in the set
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over parameters in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (ParamId, u32)> + '_ {
        self.values.iter().map(|(id, value)| (*id, *value))
    }

    /// Overwrite this set with every entry of `other`
    pub fn merge(&mut self, other: &ParameterSet) {
        for (id, value) in other.iter() {
            self.values.insert(id, value);
        }
    }

    /// Clear all parameters
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl FromIterator<(ParamId, u32)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (ParamId, u32)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (id, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", id.name(), value)?;
        }
        write!(f, "}}")
    }
}

/// Valid value range for each known parameter
///
/// The defaults follow the ASIC documentation; a hardware integration with
/// different firmware limits supplies its own table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLimits {
    ranges: BTreeMap<ParamId, RangeInclusive<u32>>,
}

impl ParameterLimits {
    /// Create an empty table that accepts no parameters
    pub fn empty() -> Self {
        Self {
            ranges: BTreeMap::new(),
        }
    }

    /// Builder-style range setter
    pub fn with(mut self, id: ParamId, range: RangeInclusive<u32>) -> Self {
        self.ranges.insert(id, range);
        self
    }

    /// Get the valid range of a parameter
    pub fn range(&self, id: ParamId) -> Option<&RangeInclusive<u32>> {
        self.ranges.get(&id)
    }

    /// Check a single value
    pub fn check(&self, id: ParamId, value: u32) -> std::result::Result<(), InternalError> {
        match self.ranges.get(&id) {
            None => Err(InternalError::UnknownParameter),
            Some(range) if !range.contains(&value) => Err(InternalError::ParameterOutOfRange),
            Some(_) => Ok(()),
        }
    }

    /// Check every value of a set, returning the first offending parameter
    pub fn check_set(
        &self,
        set: &ParameterSet,
    ) -> std::result::Result<(), (ParamId, InternalError)> {
        for (id, value) in set.iter() {
            self.check(id, value).map_err(|e| (id, e))?;
        }
        Ok(())
    }
}

impl Default for ParameterLimits {
    fn default() -> Self {
        Self::empty()
            .with(ParamId::GAIN, 0..=100)
            .with(ParamId::CENTER_FREQUENCY_KHZ, 1_000..=20_000)
            .with(ParamId::CLOCK_SPEED_MHZ, 25..=100)
            .with(ParamId::ASIC_MODE, 0..=2)
            .with(ParamId::PULSE_SUBTYPE, 0..=11)
            .with(ParamId::ISEL_LNA, 0..=15)
            .with(ParamId::ISEL_ODRV, 0..=15)
            .with(ParamId::ISEL_RES_CTRL, 0..=15)
            .with(ParamId::ISEL_DC_GND, 0..=15)
            .with(ParamId::RES_CAL, 0..=7)
            .with(ParamId::LNA_ENABLE, 0..=1)
            .with(ParamId::BIAS_ENABLE, 0..=1)
            .with(ParamId::ODRV_ENABLE, 0..=1)
            .with(ParamId::RX_ALWAYS_ENABLE, 0..=1)
            .with(ParamId::CW_ENABLE, 0..=1)
            .with(ParamId::DRV_BIAS, 0..=7)
    }
}

/// Driver-side device state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    /// No session
    #[default]
    Uninitialized,
    /// USB session up, no configuration applied
    Initialized,
    /// Configuration applied, readiness not yet confirmed
    Configured,
    /// Status confirmed the ASIC is ready to stream
    Ready,
    /// Unrecoverable fault, only Close is accepted
    Error,
}

impl DeviceState {
    /// Get human-readable state name
    pub fn name(self) -> &'static str {
        match self {
            DeviceState::Uninitialized => "UNINITIALIZED",
            DeviceState::Initialized => "INITIALIZED",
            DeviceState::Configured => "CONFIGURED",
            DeviceState::Ready => "READY",
            DeviceState::Error => "ERROR",
        }
    }

    /// Check if a session is open and healthy
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DeviceState::Initialized | DeviceState::Configured | DeviceState::Ready
        )
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// ASIC operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsicMode {
    /// Continuous wave
    Cw,
    /// Normal pulsed operation
    Normal,
    /// B-mode beamforming
    BMode,
    /// Value not known to this driver
    Unknown(u8),
}

impl From<u8> for AsicMode {
    fn from(value: u8) -> Self {
        match value {
            0 => AsicMode::Cw,
            1 => AsicMode::Normal,
            2 => AsicMode::BMode,
            other => AsicMode::Unknown(other),
        }
    }
}

/// Board the FPGA identifies itself as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareId {
    /// Bench test board
    TestBoard,
    /// Catheter handle board
    HandleBoard,
    /// Value not known to this driver
    Unknown(u8),
}

impl From<u8> for HardwareId {
    fn from(value: u8) -> Self {
        match value {
            0 => HardwareId::TestBoard,
            1 => HardwareId::HandleBoard,
            other => HardwareId::Unknown(other),
        }
    }
}

/// Firmware information from the USB_INIT handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Firmware major version
    pub major: u8,
    /// Firmware minor version
    pub minor: u8,
    /// Board identifier
    pub hardware: HardwareId,
    /// Protocol version spoken by the firmware
    pub protocol_version: u8,
}

impl FirmwareInfo {
    /// Unpack from USB_INIT response data
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() < USB_INIT_DATA_LEN {
            return None;
        }
        Some(Self {
            major: data[0],
            minor: data[1],
            hardware: HardwareId::from(data[2]),
            protocol_version: data[3],
        })
    }

    /// Pack into USB_INIT response data
    pub fn pack(&self) -> [u8; USB_INIT_DATA_LEN] {
        let hardware = match self.hardware {
            HardwareId::TestBoard => 0,
            HardwareId::HandleBoard => 1,
            HardwareId::Unknown(v) => v,
        };
        [self.major, self.minor, hardware, self.protocol_version]
    }
}

impl std::fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FW Version: {}.{}\nHardware: {:?}\nProtocol: {}",
            self.major, self.minor, self.hardware, self.protocol_version
        )
    }
}

/// Device status as reported by a STATUS query
///
/// Combines the probe's answer with the driver state after the query and the
/// last configuration the device accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFrame {
    /// Driver state after the query
    pub state: DeviceState,
    /// ASIC reports it is ready to acquire
    pub ready: bool,
    /// ASIC operating mode
    pub mode: AsicMode,
    /// ASIC clock in MHz
    pub clock_mhz: u8,
    /// Board identifier
    pub hardware: HardwareId,
    /// Acquisitions since the ASIC was started
    pub frame_count: u32,
    /// Last applied configuration
    pub parameters: ParameterSet,
}

/// Raw STATUS response data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusData {
    /// ASIC ready flag (0 or 1 on the wire)
    pub ready: bool,
    /// Raw ASIC mode
    pub mode: u8,
    /// ASIC clock in MHz
    pub clock_mhz: u8,
    /// Raw board identifier
    pub hardware_id: u8,
    /// Acquisitions since the ASIC was started
    pub frame_count: u32,
}

impl StatusData {
    /// Unpack from STATUS response data (8 bytes)
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() != STATUS_DATA_LEN || data[0] > 1 {
            return None;
        }
        Some(Self {
            ready: data[0] == 1,
            mode: data[1],
            clock_mhz: data[2],
            hardware_id: data[3],
            frame_count: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    /// Pack into STATUS response data
    pub fn pack(&self) -> [u8; STATUS_DATA_LEN] {
        let mut buf = [0u8; STATUS_DATA_LEN];
        buf[0] = self.ready as u8;
        buf[1] = self.mode;
        buf[2] = self.clock_mhz;
        buf[3] = self.hardware_id;
        buf[4..8].copy_from_slice(&self.frame_count.to_le_bytes());
        buf
    }

    /// Build the public status frame
    pub fn into_frame(self, state: DeviceState, parameters: ParameterSet) -> StatusFrame {
        StatusFrame {
            state,
            ready: self.ready,
            mode: AsicMode::from(self.mode),
            clock_mhz: self.clock_mhz,
            hardware: HardwareId::from(self.hardware_id),
            frame_count: self.frame_count,
            parameters,
        }
    }
}

impl std::fmt::Display for StatusFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "State: {}\nReady: {}\nMode: {:?}\nClock: {} MHz\nHardware: {:?}\nFrames: {}\nParameters: {}",
            self.state,
            self.ready,
            self.mode,
            self.clock_mhz,
            self.hardware,
            self.frame_count,
            self.parameters
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_set_merge_overwrites() {
        let mut applied = ParameterSet::new()
            .with(ParamId::GAIN, 10)
            .with(ParamId::CENTER_FREQUENCY_KHZ, 5000);
        applied.merge(&ParameterSet::new().with(ParamId::GAIN, 20));
        assert_eq!(applied.get(ParamId::GAIN), Some(20));
        assert_eq!(applied.get(ParamId::CENTER_FREQUENCY_KHZ), Some(5000));
        assert_eq!(applied.len(), 2);
    }

    #[test]
    fn test_parameter_set_display() {
        let set = ParameterSet::new()
            .with(ParamId::CENTER_FREQUENCY_KHZ, 5000)
            .with(ParamId::GAIN, 10);
        assert_eq!(set.to_string(), "{gain: 10, freq: 5000}");
    }

    #[test]
    fn test_default_limits() {
        let limits = ParameterLimits::default();
        assert_eq!(limits.check(ParamId::GAIN, 10), Ok(()));
        assert_eq!(
            limits.check(ParamId::GAIN, 999_999),
            Err(InternalError::ParameterOutOfRange)
        );
        assert_eq!(
            limits.check(ParamId(0xBEEF), 1),
            Err(InternalError::UnknownParameter)
        );
        assert_eq!(limits.check(ParamId::RES_CAL, 8), Err(InternalError::ParameterOutOfRange));
    }

    #[test]
    fn test_check_set_reports_first_offender() {
        let limits = ParameterLimits::default();
        let set = ParameterSet::new()
            .with(ParamId::GAIN, 10)
            .with(ParamId::ISEL_LNA, 16);
        assert_eq!(
            limits.check_set(&set),
            Err((ParamId::ISEL_LNA, InternalError::ParameterOutOfRange))
        );
    }

    #[test]
    fn test_status_data_unpack() {
        let data = [1, 2, 25, 1, 0x10, 0, 0, 0];
        let status = StatusData::unpack(&data).unwrap();
        assert!(status.ready);
        assert_eq!(status.frame_count, 16);
        let frame = status.into_frame(DeviceState::Ready, ParameterSet::new());
        assert_eq!(frame.mode, AsicMode::BMode);
        assert_eq!(frame.hardware, HardwareId::HandleBoard);
    }

    #[test]
    fn test_status_data_rejects_bad_layout() {
        assert!(StatusData::unpack(&[1, 0, 25]).is_none());
        assert!(StatusData::unpack(&[7, 0, 25, 0, 0, 0, 0, 0]).is_none());
    }

    #[test]
    fn test_firmware_info_unpack() {
        let info = FirmwareInfo::unpack(&[2, 3, 0, 1]).unwrap();
        assert_eq!(info.major, 2);
        assert_eq!(info.minor, 3);
        assert_eq!(info.hardware, HardwareId::TestBoard);
        assert_eq!(info.protocol_version, 1);
        assert!(FirmwareInfo::unpack(&[2, 3]).is_none());
    }
}
