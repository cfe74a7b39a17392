//! Wire codec for PTP containers.
//!
//! Every message on the bulk pipe is one container: a 12-byte fixed header
//! (`u32 length, u16 kind, u16 code, u32 transaction_id`) followed by up to
//! five `u32` parameters, all little-endian. Command frames carry only as
//! many parameter slots as they use (`length = 12 + 4 * count`). Data and
//! response frames that carry a payload declare the full 32-byte container
//! followed by the raw payload bytes (`length = 32 + payload_len`).
//!
//! There is no CRC or integrity field; the transport is trusted for that.

use super::ProtocolError;

/// Fixed header size: length + kind + code + transaction id.
pub const HEADER_SIZE: usize = 12;

/// Full container size: header plus five parameter slots.
pub const CONTAINER_SIZE: usize = HEADER_SIZE + MAX_PARAMS * 4;

/// Parameter slots in a container.
pub const MAX_PARAMS: usize = 5;

/// Container kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContainerKind {
    Command = 1,
    Data = 2,
    Response = 3,
    Event = 4,
}

impl TryFrom<u16> for ContainerKind {
    type Error = ProtocolError;

    fn try_from(raw: u16) -> Result<Self, ProtocolError> {
        match raw {
            1 => Ok(ContainerKind::Command),
            2 => Ok(ContainerKind::Data),
            3 => Ok(ContainerKind::Response),
            4 => Ok(ContainerKind::Event),
            other => Err(ProtocolError::UnexpectedFrameType(other)),
        }
    }
}

/// One decoded wire container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Declared length from the header.
    pub length: u32,
    pub kind: ContainerKind,
    pub code: u16,
    pub transaction_id: u32,
    /// Parameters actually present (at most [`MAX_PARAMS`]).
    pub params: Vec<u32>,
    /// Payload bytes following the full container, if any.
    pub payload: Vec<u8>,
}

/// Encode a parameter-only container (command, response, event).
///
/// The frame carries exactly the parameter slots in `params`; callers pass
/// at most [`MAX_PARAMS`] values (extras are dropped, matching the wire
/// limit rather than erroring).
pub fn encode(kind: ContainerKind, code: u16, transaction_id: u32, params: &[u32]) -> Vec<u8> {
    let count = params.len().min(MAX_PARAMS);
    let length = (HEADER_SIZE + count * 4) as u32;
    let mut buf = Vec::with_capacity(length as usize);
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&(kind as u16).to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&transaction_id.to_le_bytes());
    for p in &params[..count] {
        buf.extend_from_slice(&p.to_le_bytes());
    }
    buf
}

/// Encode the 32-byte header of a data phase.
///
/// The declared length covers the payload that follows on the pipe; the
/// parameter slots are zeroed.
pub fn encode_data_header(code: u16, transaction_id: u32, payload_len: usize) -> Vec<u8> {
    let length = (CONTAINER_SIZE + payload_len) as u32;
    let mut buf = Vec::with_capacity(CONTAINER_SIZE);
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&(ContainerKind::Data as u16).to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&transaction_id.to_le_bytes());
    buf.resize(CONTAINER_SIZE, 0);
    buf
}

/// Encode a response container followed inline by its payload.
///
/// This is the shape a device uses for responses that carry data; it is
/// also what the mock transport feeds back to the engine in tests.
pub fn encode_with_payload(
    kind: ContainerKind,
    code: u16,
    transaction_id: u32,
    payload: &[u8],
) -> Vec<u8> {
    let length = (CONTAINER_SIZE + payload.len()) as u32;
    let mut buf = Vec::with_capacity(length as usize);
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&(kind as u16).to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&transaction_id.to_le_bytes());
    buf.resize(CONTAINER_SIZE, 0);
    buf.extend_from_slice(payload);
    buf
}

/// Decode one container from raw bytes.
///
/// Fails with [`ProtocolError::FrameTooShort`] when fewer than
/// [`HEADER_SIZE`] bytes are present; otherwise parses greedily up to the
/// declared length, never past the end of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Container, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::FrameTooShort { len: bytes.len() });
    }

    let length = u32::from_le_bytes(bytes[0..4].try_into().unwrap_or_default());
    let raw_kind = u16::from_le_bytes([bytes[4], bytes[5]]);
    let code = u16::from_le_bytes([bytes[6], bytes[7]]);
    let transaction_id = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

    let kind = ContainerKind::try_from(raw_kind)?;

    let declared = length as usize;
    let avail = declared.min(bytes.len());

    let param_end = avail.min(CONTAINER_SIZE);
    let param_count = param_end.saturating_sub(HEADER_SIZE) / 4;
    let mut params = Vec::with_capacity(param_count);
    for i in 0..param_count {
        let off = HEADER_SIZE + i * 4;
        params.push(u32::from_le_bytes([
            bytes[off],
            bytes[off + 1],
            bytes[off + 2],
            bytes[off + 3],
        ]));
    }

    let payload = if avail > CONTAINER_SIZE {
        bytes[CONTAINER_SIZE..avail].to_vec()
    } else {
        Vec::new()
    };

    Ok(Container {
        length,
        kind,
        code,
        transaction_id,
        params,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OP_CAPTURE_BURST, OP_OPEN_SESSION, RC_OK};

    #[test]
    fn encode_command_no_params() {
        let buf = encode(ContainerKind::Command, OP_OPEN_SESSION, 7, &[]);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 12);
        assert_eq!(u16::from_le_bytes([buf[4], buf[5]]), 1);
        assert_eq!(u16::from_le_bytes([buf[6], buf[7]]), OP_OPEN_SESSION);
        assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 7);
    }

    #[test]
    fn encode_command_with_params() {
        let buf = encode(ContainerKind::Command, OP_CAPTURE_BURST, 3, &[5, 9]);
        assert_eq!(buf.len(), HEADER_SIZE + 8);
        assert_eq!(u32::from_le_bytes(buf[0..4].try_into().unwrap()), 20);
        assert_eq!(u32::from_le_bytes(buf[12..16].try_into().unwrap()), 5);
        assert_eq!(u32::from_le_bytes(buf[16..20].try_into().unwrap()), 9);
    }

    #[test]
    fn encode_caps_params_at_five() {
        let buf = encode(ContainerKind::Command, 0x1001, 1, &[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(buf.len(), CONTAINER_SIZE);
        let frame = decode(&buf).unwrap();
        assert_eq!(frame.params, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn round_trip_preserves_fields() {
        let cases: &[(ContainerKind, u16, u32, &[u32])] = &[
            (ContainerKind::Command, OP_OPEN_SESSION, 1, &[1]),
            (ContainerKind::Response, RC_OK, 42, &[]),
            (ContainerKind::Event, 0x4002, 0, &[0xDEAD_BEEF, 2]),
            (ContainerKind::Data, 0x9116, u32::MAX, &[1, 2, 3, 4, 5]),
        ];
        for &(kind, code, tid, params) in cases {
            let frame = decode(&encode(kind, code, tid, params)).unwrap();
            assert_eq!(frame.kind, kind);
            assert_eq!(frame.code, code);
            assert_eq!(frame.transaction_id, tid);
            assert_eq!(frame.params, params);
            assert!(frame.payload.is_empty());
        }
    }

    #[test]
    fn decode_too_short_fails() {
        let err = decode(&[0u8; 11]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooShort { len: 11 }));
        let err = decode(&[]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooShort { len: 0 }));
    }

    #[test]
    fn decode_unknown_kind_fails() {
        let mut buf = encode(ContainerKind::Response, RC_OK, 1, &[]);
        buf[4] = 9;
        buf[5] = 0;
        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedFrameType(9)));
    }

    #[test]
    fn data_header_declares_payload_length() {
        let hdr = encode_data_header(0x9110, 11, 100);
        assert_eq!(hdr.len(), CONTAINER_SIZE);
        assert_eq!(
            u32::from_le_bytes(hdr[0..4].try_into().unwrap()),
            (CONTAINER_SIZE + 100) as u32
        );
        assert_eq!(u16::from_le_bytes([hdr[4], hdr[5]]), 2);
        // Parameter slots are zeroed
        assert!(hdr[HEADER_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn payload_round_trip() {
        let payload = b"liveview-bytes".to_vec();
        let buf = encode_with_payload(ContainerKind::Response, RC_OK, 5, &payload);
        let frame = decode(&buf).unwrap();
        assert_eq!(frame.kind, ContainerKind::Response);
        assert_eq!(frame.transaction_id, 5);
        assert_eq!(frame.payload, payload);
        assert_eq!(frame.length as usize, CONTAINER_SIZE + payload.len());
    }

    #[test]
    fn decode_is_greedy_up_to_declared_length() {
        // Declared length shorter than the buffer: trailing bytes ignored.
        let mut buf = encode_with_payload(ContainerKind::Response, RC_OK, 5, b"abcd");
        buf.extend_from_slice(b"garbage");
        let frame = decode(&buf).unwrap();
        assert_eq!(frame.payload, b"abcd");
    }

    #[test]
    fn decode_truncated_payload_takes_what_is_there() {
        // Declared length longer than what actually arrived.
        let buf = encode_with_payload(ContainerKind::Response, RC_OK, 5, b"abcdef");
        let frame = decode(&buf[..buf.len() - 2]).unwrap();
        assert_eq!(frame.payload, b"abcd");
    }

    #[test]
    fn short_response_without_params_decodes() {
        // A bare 12-byte response frame is valid on the wire.
        let buf = encode(ContainerKind::Response, RC_OK, 9, &[]);
        let frame = decode(&buf).unwrap();
        assert!(frame.params.is_empty());
        assert!(frame.payload.is_empty());
    }
}
