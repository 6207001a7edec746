//! SoundCath wire frame implementation
//!
//! This module provides the `Frame` struct for the probe's wire format
//! `[type:1][len:2][payload:len][crc:2|4]` and the `Framer`, which turns
//! commands into frames and frames into responses while enforcing integrity.

use crc::Crc;
use log::trace;

use crate::command::{Command, Response};
use crate::constants::{FRAME_HEADER_LEN, MAX_PAYLOAD_LEN, RESPONSE_PREFIX_LEN};
use crate::error::FrameError;

const CRC16_IBM_SDLC: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);
const CRC16_CCITT_FALSE: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_IBM_3740);
const CRC16_XMODEM: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_XMODEM);
const CRC32_ISO_HDLC: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// CRC algorithm used for the frame trailer
///
/// Must match the algorithm built into the probe firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcAlgorithm {
    /// CRC-16/IBM-SDLC (X.25), 2-byte trailer
    #[default]
    Crc16IbmSdlc,
    /// CRC-16/CCITT-FALSE, 2-byte trailer
    Crc16CcittFalse,
    /// CRC-16/XMODEM, 2-byte trailer
    Crc16Xmodem,
    /// CRC-32/ISO-HDLC, 4-byte trailer
    Crc32IsoHdlc,
}

impl CrcAlgorithm {
    /// Trailer width in bytes
    pub fn width(self) -> usize {
        match self {
            CrcAlgorithm::Crc32IsoHdlc => 4,
            _ => 2,
        }
    }

    /// Compute the checksum over `bytes`
    pub fn checksum(self, bytes: &[u8]) -> u32 {
        match self {
            CrcAlgorithm::Crc16IbmSdlc => CRC16_IBM_SDLC.checksum(bytes) as u32,
            CrcAlgorithm::Crc16CcittFalse => CRC16_CCITT_FALSE.checksum(bytes) as u32,
            CrcAlgorithm::Crc16Xmodem => CRC16_XMODEM.checksum(bytes) as u32,
            CrcAlgorithm::Crc32IsoHdlc => CRC32_ISO_HDLC.checksum(bytes),
        }
    }

    fn write_trailer(self, crc: u32, buf: &mut Vec<u8>) {
        match self.width() {
            4 => buf.extend_from_slice(&crc.to_le_bytes()),
            _ => buf.extend_from_slice(&(crc as u16).to_le_bytes()),
        }
    }

    fn read_trailer(self, trailer: &[u8]) -> u32 {
        match self.width() {
            4 => u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]),
            _ => u16::from_le_bytes([trailer[0], trailer[1]]) as u32,
        }
    }
}

/// One wire frame, without its CRC trailer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command type byte (with `RESPONSE_FLAG` for responses)
    pub command: u8,
    /// Frame payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame
    pub fn new(command: u8, payload: Vec<u8>) -> Self {
        Self { command, payload }
    }

    /// Get total wire size for a payload length
    pub fn wire_len(payload_len: usize, algorithm: CrcAlgorithm) -> usize {
        FRAME_HEADER_LEN + payload_len + algorithm.width()
    }

    /// Pack frame into bytes for transmission, appending the CRC
    pub fn pack(&self, algorithm: CrcAlgorithm) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge {
                len: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut buf = Vec::with_capacity(Self::wire_len(self.payload.len(), algorithm));

        // Header: type (1) + payload length (2)
        buf.push(self.command);
        buf.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());

        // Payload
        buf.extend_from_slice(&self.payload);

        // Trailer over header + payload
        let crc = algorithm.checksum(&buf);
        algorithm.write_trailer(crc, &mut buf);

        Ok(buf)
    }

    /// Unpack received bytes, verifying length and CRC
    ///
    /// A frame that fails any check yields no payload.
    pub fn unpack(raw: &[u8], algorithm: CrcAlgorithm) -> Result<Self, FrameError> {
        let width = algorithm.width();
        if raw.len() < FRAME_HEADER_LEN + width {
            return Err(FrameError::Truncated { len: raw.len() });
        }

        let declared = u16::from_le_bytes([raw[1], raw[2]]) as usize;
        let actual = raw.len() - FRAME_HEADER_LEN - width;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }

        let body_len = FRAME_HEADER_LEN + declared;
        let received = algorithm.read_trailer(&raw[body_len..]);
        let computed = algorithm.checksum(&raw[..body_len]);
        if received != computed {
            return Err(FrameError::CrcMismatch { received, computed });
        }

        Ok(Self {
            command: raw[0],
            payload: raw[FRAME_HEADER_LEN..body_len].to_vec(),
        })
    }
}

/// Encoder/decoder between commands, responses and wire bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Framer {
    algorithm: CrcAlgorithm,
}

impl Framer {
    /// Create a framer for the given CRC algorithm
    pub fn new(algorithm: CrcAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Get the CRC algorithm
    pub fn algorithm(&self) -> CrcAlgorithm {
        self.algorithm
    }

    /// Encode a command into wire bytes
    ///
    /// Deterministic: the same command always yields the same bytes.
    pub fn encode(&self, command: &Command) -> Result<Vec<u8>, FrameError> {
        let bytes = command.to_frame().pack(self.algorithm)?;
        trace!("encode {:?} -> {:02X?}", command, bytes);
        Ok(bytes)
    }

    /// Decode a response frame
    pub fn decode(&self, raw: &[u8]) -> Result<Response, FrameError> {
        trace!("decode {:02X?}", raw);
        let frame = Frame::unpack(raw, self.algorithm)?;
        Response::from_frame(&frame)
    }

    /// Decode a request frame (device side)
    pub fn decode_request(&self, raw: &[u8]) -> Result<Command, FrameError> {
        let frame = Frame::unpack(raw, self.algorithm)?;
        Command::from_frame(&frame)
    }

    /// Encode a response frame (device side)
    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>, FrameError> {
        response.to_frame().pack(self.algorithm)
    }

    /// Get the exact wire size of the response to `command`
    pub fn response_len(&self, command: &Command) -> usize {
        Frame::wire_len(
            RESPONSE_PREFIX_LEN + command.response_data_len(),
            self.algorithm,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CMD_STATUS, RESPONSE_FLAG};
    use crate::structures::{ParamId, ParameterSet};

    fn all_algorithms() -> [CrcAlgorithm; 4] {
        [
            CrcAlgorithm::Crc16IbmSdlc,
            CrcAlgorithm::Crc16CcittFalse,
            CrcAlgorithm::Crc16Xmodem,
            CrcAlgorithm::Crc32IsoHdlc,
        ]
    }

    #[test]
    fn test_crc_check_values() {
        // Standard check value over "123456789"
        let check = b"123456789";
        assert_eq!(CrcAlgorithm::Crc16IbmSdlc.checksum(check), 0x906E);
        assert_eq!(CrcAlgorithm::Crc16CcittFalse.checksum(check), 0x29B1);
        assert_eq!(CrcAlgorithm::Crc16Xmodem.checksum(check), 0x31C3);
        assert_eq!(CrcAlgorithm::Crc32IsoHdlc.checksum(check), 0xCBF4_3926);
    }

    #[test]
    fn test_pack_layout() {
        let frame = Frame::new(CMD_STATUS, vec![0xAA, 0xBB]);
        let packed = frame.pack(CrcAlgorithm::Crc16IbmSdlc).unwrap();
        assert_eq!(packed.len(), 7);
        assert_eq!(packed[0], CMD_STATUS);
        assert_eq!(packed[1..3], [2, 0]);
        assert_eq!(packed[3..5], [0xAA, 0xBB]);
        let crc = CrcAlgorithm::Crc16IbmSdlc.checksum(&packed[..5]) as u16;
        assert_eq!(packed[5..7], crc.to_le_bytes());
    }

    #[test]
    fn test_trailer_width_follows_algorithm() {
        let frame = Frame::new(CMD_STATUS, vec![]);
        for algorithm in all_algorithms() {
            let packed = frame.pack(algorithm).unwrap();
            assert_eq!(packed.len(), FRAME_HEADER_LEN + algorithm.width());
            assert_eq!(Frame::unpack(&packed, algorithm).unwrap(), frame);
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let framer = Framer::default();
        let command = Command::ParamSet(
            ParameterSet::new()
                .with(ParamId::GAIN, 10)
                .with(ParamId::CENTER_FREQUENCY_KHZ, 5000),
        );
        assert_eq!(framer.encode(&command), framer.encode(&command));
    }

    #[test]
    fn test_flipped_payload_byte_fails_crc() {
        let response = Response::ok(CMD_STATUS, vec![1, 1, 25, 0, 9, 0, 0, 0]);
        for algorithm in all_algorithms() {
            let framer = Framer::new(algorithm);
            let packed = framer.encode_response(&response).unwrap();
            let payload_len = packed.len() - FRAME_HEADER_LEN - algorithm.width();
            for i in 0..payload_len {
                let mut corrupted = packed.clone();
                corrupted[FRAME_HEADER_LEN + i] ^= 0x01;
                assert!(matches!(
                    framer.decode(&corrupted),
                    Err(FrameError::CrcMismatch { .. })
                ));
            }
        }
    }

    #[test]
    fn test_declared_length_mismatch() {
        let framer = Framer::default();
        let mut packed = framer
            .encode_response(&Response::ok(CMD_STATUS, vec![0; 8]))
            .unwrap();
        packed[1] = packed[1].wrapping_sub(1);
        assert_eq!(
            framer.decode(&packed),
            Err(FrameError::LengthMismatch {
                declared: 15,
                actual: 16
            })
        );
    }

    #[test]
    fn test_truncated_frame() {
        let framer = Framer::default();
        assert_eq!(
            framer.decode(&[RESPONSE_FLAG | CMD_STATUS, 0]),
            Err(FrameError::Truncated { len: 2 })
        );
    }

    #[test]
    fn test_payload_too_large() {
        let frame = Frame::new(0x40, vec![0; MAX_PAYLOAD_LEN + 1]);
        assert!(matches!(
            frame.pack(CrcAlgorithm::default()),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_response_len() {
        let framer = Framer::new(CrcAlgorithm::Crc32IsoHdlc);
        assert_eq!(framer.response_len(&Command::Status), 3 + 8 + 8 + 4);
        assert_eq!(
            framer.response_len(&Command::SetParam(ParamId::GAIN, 1)),
            3 + 8 + 4
        );
    }
}
