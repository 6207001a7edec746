//! Probe commands and responses
//!
//! A [`Command`] is what the host asks of the probe; a [`Response`] is the
//! probe's answer. Both convert to and from [`Frame`]s.

use crate::constants::*;
use crate::error::FrameError;
use crate::frame::Frame;
use crate::structures::{ParamId, ParameterSet};

/// Command sent to the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read one parameter
    GetParam(ParamId),
    /// Write one parameter
    SetParam(ParamId, u32),
    /// Apply a batch of parameters atomically
    ParamSet(ParameterSet),
    /// Query device/ASIC status
    Status,
    /// Session bring-up handshake
    UsbInit,
    /// Vendor-specific ASIC/FPGA command
    Vendor {
        /// Opcode in `CMD_VENDOR_FIRST..=CMD_VENDOR_LAST`
        opcode: u8,
        /// Command arguments, at most `VENDOR_MAX_ARGS_LEN` bytes
        payload: Vec<u8>,
        /// Exact data length of the response, at most `VENDOR_MAX_RESPONSE_LEN`
        response_len: u16,
    },
}

impl Command {
    /// Create a vendor command
    ///
    /// On the wire the arguments follow a 2-byte `response_len` prefix.
    pub fn vendor(opcode: u8, payload: &[u8], response_len: u16) -> Self {
        Command::Vendor {
            opcode,
            payload: payload.to_vec(),
            response_len,
        }
    }

    /// Wire type code
    pub fn type_code(&self) -> u8 {
        match self {
            Command::GetParam(_) | Command::SetParam(..) => CMD_PARAM,
            Command::ParamSet(_) => CMD_PARAMSET,
            Command::Status => CMD_STATUS,
            Command::UsbInit => CMD_USB_INIT,
            Command::Vendor { opcode, .. } => *opcode,
        }
    }

    /// Check if the opcode of a vendor command lies in the vendor range
    pub fn is_supported(&self) -> bool {
        match self {
            Command::Vendor { opcode, .. } => (CMD_VENDOR_FIRST..=CMD_VENDOR_LAST).contains(opcode),
            _ => true,
        }
    }

    /// Data length of the response, after the status/detail prefix
    pub fn response_data_len(&self) -> usize {
        match self {
            Command::GetParam(_) => PARAM_VALUE_LEN,
            Command::SetParam(..) | Command::ParamSet(_) => 0,
            Command::Status => STATUS_DATA_LEN,
            Command::UsbInit => USB_INIT_DATA_LEN,
            Command::Vendor { response_len, .. } => *response_len as usize,
        }
    }

    /// Serialize the request payload
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::GetParam(id) => {
                let mut buf = vec![PARAM_OP_GET];
                buf.extend_from_slice(&id.0.to_le_bytes());
                buf
            }
            Command::SetParam(id, value) => {
                let mut buf = vec![PARAM_OP_SET];
                buf.extend_from_slice(&id.0.to_le_bytes());
                buf.extend_from_slice(&value.to_le_bytes());
                buf
            }
            Command::ParamSet(set) => {
                let mut buf = Vec::with_capacity(2 + set.len() * PARAM_ENTRY_LEN);
                buf.extend_from_slice(&(set.len() as u16).to_le_bytes());
                for (id, value) in set.iter() {
                    buf.extend_from_slice(&id.0.to_le_bytes());
                    buf.extend_from_slice(&value.to_le_bytes());
                }
                buf
            }
            Command::Status => Vec::new(),
            Command::UsbInit => vec![PROTOCOL_VERSION],
            Command::Vendor {
                payload,
                response_len,
                ..
            } => {
                let mut buf = Vec::with_capacity(2 + payload.len());
                buf.extend_from_slice(&response_len.to_le_bytes());
                buf.extend_from_slice(payload);
                buf
            }
        }
    }

    /// Build the request frame
    pub fn to_frame(&self) -> Frame {
        Frame::new(self.type_code(), self.payload())
    }

    /// Parse a request frame
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let p = &frame.payload;
        let malformed = FrameError::MalformedPayload {
            command: frame.command,
        };

        match frame.command {
            CMD_PARAM => match (p.first().copied(), p.len()) {
                (Some(PARAM_OP_GET), 3) => Ok(Command::GetParam(ParamId(u16::from_le_bytes([
                    p[1], p[2],
                ])))),
                (Some(PARAM_OP_SET), 7) => Ok(Command::SetParam(
                    ParamId(u16::from_le_bytes([p[1], p[2]])),
                    u32::from_le_bytes([p[3], p[4], p[5], p[6]]),
                )),
                _ => Err(malformed),
            },
            CMD_PARAMSET => {
                if p.len() < 2 {
                    return Err(malformed);
                }
                let count = u16::from_le_bytes([p[0], p[1]]) as usize;
                if p.len() != 2 + count * PARAM_ENTRY_LEN {
                    return Err(malformed);
                }
                let set = p[2..]
                    .chunks_exact(PARAM_ENTRY_LEN)
                    .map(|e| {
                        (
                            ParamId(u16::from_le_bytes([e[0], e[1]])),
                            u32::from_le_bytes([e[2], e[3], e[4], e[5]]),
                        )
                    })
                    .collect::<ParameterSet>();
                // Duplicate ids would collapse silently
                if set.len() != count {
                    return Err(malformed);
                }
                Ok(Command::ParamSet(set))
            }
            CMD_STATUS if p.is_empty() => Ok(Command::Status),
            CMD_USB_INIT if p.len() == 1 => Ok(Command::UsbInit),
            CMD_VENDOR_FIRST..=CMD_VENDOR_LAST => {
                if p.len() < 2 {
                    return Err(malformed);
                }
                Ok(Command::Vendor {
                    opcode: frame.command,
                    payload: p[2..].to_vec(),
                    response_len: u16::from_le_bytes([p[0], p[1]]),
                })
            }
            CMD_STATUS | CMD_USB_INIT => Err(malformed),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

/// Response received from the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Type code of the request this answers (without `RESPONSE_FLAG`)
    pub command: u8,
    /// Device status bits, 0 on success
    pub status: u32,
    /// Device detail (offending parameter, fault bits)
    pub detail: u32,
    /// Response data
    pub data: Vec<u8>,
}

impl Response {
    /// Create a successful response
    pub fn ok(command: u8, data: Vec<u8>) -> Self {
        Self {
            command,
            status: 0,
            detail: 0,
            data,
        }
    }

    /// Create a failed response with zero-filled data
    pub fn error(command: u8, status: u32, detail: u32, data_len: usize) -> Self {
        Self {
            command,
            status,
            detail,
            data: vec![0u8; data_len],
        }
    }

    /// Check if the device reported success
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Check if this response answers `request`
    pub fn answers(&self, request: &Command) -> bool {
        self.command == request.type_code()
    }

    /// Build the response frame
    pub fn to_frame(&self) -> Frame {
        let mut payload = Vec::with_capacity(RESPONSE_PREFIX_LEN + self.data.len());
        payload.extend_from_slice(&self.status.to_le_bytes());
        payload.extend_from_slice(&self.detail.to_le_bytes());
        payload.extend_from_slice(&self.data);
        Frame::new(self.command | RESPONSE_FLAG, payload)
    }

    /// Parse a response frame
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        if frame.command & RESPONSE_FLAG == 0 {
            return Err(FrameError::UnexpectedResponse {
                expected: frame.command | RESPONSE_FLAG,
                actual: frame.command,
            });
        }
        let p = &frame.payload;
        if p.len() < RESPONSE_PREFIX_LEN {
            return Err(FrameError::MalformedPayload {
                command: frame.command,
            });
        }
        Ok(Self {
            command: frame.command & !RESPONSE_FLAG,
            status: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
            detail: u32::from_le_bytes([p[4], p[5], p[6], p[7]]),
            data: p[RESPONSE_PREFIX_LEN..].to_vec(),
        })
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data_str = self
            .data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        write!(
            f,
            "{:02X}  status 0x{:08X} detail 0x{:08X}  [{}]  {}",
            self.command,
            self.status,
            self.detail,
            self.data.len(),
            data_str
        )
    }
}
