//! SoundCath probe protocol constants
//!
//! This module contains the constants of the probe wire protocol, including
//! command type codes, frame layout sizes, device status bits, ASIC/FPGA fault
//! bits and the USB identifiers used to find the probe.

use std::time::Duration;

// ============================================================================
// Command Type Codes (first byte of every frame)
// ============================================================================

/// Get or set a single parameter
pub const CMD_PARAM: u8 = 0x01;
/// Apply a batch of parameters
pub const CMD_PARAMSET: u8 = 0x02;
/// Query device/ASIC status
pub const CMD_STATUS: u8 = 0x03;
/// Session bring-up handshake
pub const CMD_USB_INIT: u8 = 0x04;

/// First opcode of the vendor-specific ASIC/FPGA command range
pub const CMD_VENDOR_FIRST: u8 = 0x40;
/// Last opcode of the vendor-specific ASIC/FPGA command range
pub const CMD_VENDOR_LAST: u8 = 0x7F;

/// Set on the type byte of every response frame
pub const RESPONSE_FLAG: u8 = 0x80;

// ============================================================================
// Vendor Opcodes
// ============================================================================

/// Read the FPGA firmware version string
pub const VENDOR_FPGA_VERSION: u8 = 0x40;
/// Read the FPGA description string
pub const VENDOR_FPGA_DESCRIPTION: u8 = 0x41;
/// Read the ASIC serial number string
pub const VENDOR_ASIC_SERIAL: u8 = 0x42;
/// Read the raw ASIC and FPGA fault registers
pub const VENDOR_FAULT_STATUS: u8 = 0x43;

/// Response size of the text vendor queries (zero padded)
pub const VENDOR_TEXT_LEN: usize = 32;
/// Response size of the fault status query: asic (1) + reserved (3) + fpga (4)
pub const VENDOR_FAULT_STATUS_LEN: usize = 8;

// ============================================================================
// PARAM Sub-operations
// ============================================================================

/// Read one parameter
pub const PARAM_OP_GET: u8 = 0x00;
/// Write one parameter
pub const PARAM_OP_SET: u8 = 0x01;

// ============================================================================
// Frame Layout
// ============================================================================

/// Header size: type (1) + payload length (2)
pub const FRAME_HEADER_LEN: usize = 3;
/// Largest payload a frame may carry
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Response prefix: device status (4) + detail (4)
pub const RESPONSE_PREFIX_LEN: usize = 8;

/// Largest vendor argument block: payload minus the response length prefix (2)
pub const VENDOR_MAX_ARGS_LEN: usize = MAX_PAYLOAD_LEN - 2;
/// Largest vendor response data length
pub const VENDOR_MAX_RESPONSE_LEN: usize = MAX_PAYLOAD_LEN - RESPONSE_PREFIX_LEN;

/// Size of one PARAMSET entry: id (2) + value (4)
pub const PARAM_ENTRY_LEN: usize = 6;

/// Data size of a PARAM get response
pub const PARAM_VALUE_LEN: usize = 4;
/// Data size of a STATUS response
pub const STATUS_DATA_LEN: usize = 8;
/// Data size of a USB_INIT response
pub const USB_INIT_DATA_LEN: usize = 4;

/// Protocol version negotiated during USB_INIT
pub const PROTOCOL_VERSION: u8 = 1;

// ============================================================================
// Device Status Bits (response status field)
// ============================================================================

/// Command failed
pub const STATUS_FAILED: u32 = 1;
/// Bad parameter
pub const STATUS_PARAM: u32 = 1 << 1;
/// Bad parameter set
pub const STATUS_PARAMSET: u32 = 1 << 2;
/// Status query failed
pub const STATUS_STATUS: u32 = 1 << 3;
/// USB not initialized
pub const STATUS_USB_INIT: u32 = 1 << 4;
/// USB receive failure on the device side
pub const STATUS_USB_RECEIVE: u32 = 1 << 5;
/// USB send failure on the device side
pub const STATUS_USB_SEND: u32 = 1 << 6;
/// Function not implemented by the firmware
pub const STATUS_NOT_IMPLEMENTED: u32 = 1 << 7;
/// Device detected a CRC error on the request
pub const STATUS_CRC: u32 = 1 << 8;
/// FPGA fault, details in the detail field
pub const STATUS_FPGA: u32 = 1 << 9;
/// Firmware internal error
pub const STATUS_SWINTERNAL: u32 = 1 << 10;
/// ASIC fault, details in the detail field
pub const STATUS_ASICERROR: u32 = 1 << 16;

// ============================================================================
// ASIC Fault Bits (low byte of the detail field)
// ============================================================================

/// Unknown command sent to the ASIC
pub const ASIC_FAULT_UNKNOWN_CMD: u8 = 1 << 0;
/// Invalid data sent to the ASIC
pub const ASIC_FAULT_VALID_ERROR: u8 = 1 << 1;
/// ASIC checksum error
pub const ASIC_FAULT_CHKSUM_ERROR: u8 = 1 << 2;
/// ASIC is busy
pub const ASIC_FAULT_BUSY: u8 = 1 << 3;
/// ASIC is locked
pub const ASIC_FAULT_LOCKED: u8 = 1 << 6;
/// External error detected by the ASIC
pub const ASIC_FAULT_EXTERNAL: u8 = 1 << 7;

// ============================================================================
// FPGA Fault Bits (detail field)
// ============================================================================

/// Quad SPI bus error
pub const FPGA_FAULT_QSPI: u32 = 1 << 0;
/// Internal clock error
pub const FPGA_FAULT_CLOCK: u32 = 1 << 1;
/// FPGA power not initialized
pub const FPGA_FAULT_FPGA_POW: u32 = 1 << 2;
/// High voltage power not configured
pub const FPGA_FAULT_HV_POW: u32 = 1 << 3;
/// Low voltage power not configured
pub const FPGA_FAULT_LV_POW: u32 = 1 << 4;
/// Power failure
pub const FPGA_FAULT_POW_FAIL: u32 = 1 << 5;
/// Invalid FPGA command
pub const FPGA_FAULT_CMD: u32 = 1 << 6;
/// Invalid or misconfigured trigger
pub const FPGA_FAULT_TRIGGER: u32 = 1 << 7;
/// Clock busy
pub const FPGA_FAULT_CLKBUSY: u32 = 1 << 8;
/// Buffer overfill
pub const FPGA_FAULT_OVERFULL: u32 = 1 << 9;
/// Memory frame error
pub const FPGA_FAULT_FRAME_ERROR: u32 = 1 << 10;

// ============================================================================
// USB Identifiers
// ============================================================================

/// Default probe vendor ID (pid.codes test VID, override per hardware revision)
pub const SOUNDCATH_VENDOR_ID: u16 = 0x1209;
/// Default probe product ID
pub const SOUNDCATH_PRODUCT_ID: u16 = 0x5C47;

/// Interface claimed for the session
pub const SOUNDCATH_INTERFACE: u8 = 0;

/// Bulk OUT endpoint (host to device)
pub const SOUNDCATH_ENDPOINT_OUT: u8 = 0x01;
/// Bulk IN endpoint (device to host)
pub const SOUNDCATH_ENDPOINT_IN: u8 = 0x81;

// ============================================================================
// Timeouts
// ============================================================================

/// Default bound on a single bulk write
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default bound on receiving one complete response
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(1000);
