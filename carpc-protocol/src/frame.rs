//! Binary frame format used by the TCP transport.
//!
//! Frame layout (26 bytes header + operation name + body):
//!
//! ```text
//! +--------+---------+--------+---------+------------+----------+--------+
//! | magic  | version | flags  | call_id | method_len | body_len | crc32c |
//! | 4 bytes| 2 bytes |2 bytes | 8 bytes |  2 bytes   | 4 bytes  | 4 bytes|
//! +--------+---------+--------+---------+------------+----------+--------+
//! | method (UTF-8)   | body                                              |
//! | method_len bytes | body_len bytes                                    |
//! +------------------+---------------------------------------------------+
//! ```
//!
//! The checksum covers the operation name followed by the body.

use crate::error::{ProtocolError, RpcError};
use crate::MAX_BODY_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic bytes identifying carpc frames: "CARP"
pub const MAGIC: [u8; 4] = *b"CARP";

/// Size of the fixed frame header in bytes (4+2+2+8+2+4+4 = 26).
pub const FRAME_HEADER_SIZE: usize = 26;

/// Frame flags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u16);

impl FrameFlags {
    /// CRC32C checksum is present and valid.
    pub const CRC_PRESENT: u16 = 1 << 0;
    /// The frame answers an earlier call with the same `call_id`.
    pub const REPLY: u16 = 1 << 1;
    /// The reply body is a JSON [`RpcError`].
    pub const ERROR: u16 = 1 << 2;

    const VALID_V1_MASK: u16 = 0x0007;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_crc(mut self) -> Self {
        self.0 |= Self::CRC_PRESENT;
        self
    }

    pub fn with_reply(mut self) -> Self {
        self.0 |= Self::REPLY;
        self
    }

    pub fn with_error(mut self) -> Self {
        self.0 |= Self::ERROR;
        self
    }

    pub fn has_crc(&self) -> bool {
        self.0 & Self::CRC_PRESENT != 0
    }

    pub fn is_reply(&self) -> bool {
        self.0 & Self::REPLY != 0
    }

    pub fn is_error(&self) -> bool {
        self.0 & Self::ERROR != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Result<Self, ProtocolError> {
        if bits & !Self::VALID_V1_MASK != 0 {
            return Err(ProtocolError::InvalidFlags(bits));
        }
        Ok(Self(bits))
    }
}

/// A parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u16,
    pub flags: FrameFlags,
    /// Correlates a reply with its call. Chosen by the caller.
    pub call_id: u64,
    /// Operation name.
    pub method: String,
    pub body: Bytes,
}

impl Frame {
    /// Creates a call frame.
    pub fn call(call_id: u64, method: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            flags: FrameFlags::new().with_crc(),
            call_id,
            method: method.into(),
            body: body.into(),
        }
    }

    /// Creates a successful reply to a call.
    pub fn reply(call_id: u64, method: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut frame = Self::call(call_id, method, body);
        frame.flags = frame.flags.with_reply();
        frame
    }

    /// Creates an error reply carrying `error` as JSON.
    pub fn error_reply(
        call_id: u64,
        method: impl Into<String>,
        error: &RpcError,
    ) -> Result<Self, ProtocolError> {
        let body = serde_json::to_vec(error)?;
        let mut frame = Self::reply(call_id, method, body);
        frame.flags = frame.flags.with_error();
        Ok(frame)
    }

    /// Converts a reply frame into the call's outcome.
    pub fn into_outcome(self) -> Result<Result<Bytes, RpcError>, ProtocolError> {
        if self.flags.is_error() {
            let error: RpcError = serde_json::from_slice(&self.body)?;
            Ok(Err(error))
        } else {
            Ok(Ok(self.body))
        }
    }

    fn checksum(method: &[u8], body: &[u8]) -> u32 {
        let crc = crc32c::crc32c(method);
        crc32c::crc32c_append(crc, body)
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let body_len = self.body.len() as u32;
        if self.body.len() > MAX_BODY_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: body_len,
                max: MAX_BODY_SIZE,
            });
        }

        let method = self.method.as_bytes();
        let method_len =
            u16::try_from(method.len()).map_err(|_| ProtocolError::MethodTooLong(method.len()))?;

        let total_size = FRAME_HEADER_SIZE + method.len() + self.body.len();
        let mut buf = BytesMut::with_capacity(total_size);

        buf.put_slice(&MAGIC);
        buf.put_u16(self.version);
        buf.put_u16(self.flags.bits());
        buf.put_u64(self.call_id);
        buf.put_u16(method_len);
        buf.put_u32(body_len);

        let crc = if self.flags.has_crc() {
            Self::checksum(method, &self.body)
        } else {
            0
        };
        buf.put_u32(crc);

        buf.put_slice(method);
        buf.put_slice(&self.body);

        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let version = u16::from_be_bytes([buf[4], buf[5]]);
        if version != crate::PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let flags = FrameFlags::from_bits(u16::from_be_bytes([buf[6], buf[7]]))?;

        let call_id = u64::from_be_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]);
        let method_len = u16::from_be_bytes([buf[16], buf[17]]) as usize;
        let body_len = u32::from_be_bytes([buf[18], buf[19], buf[20], buf[21]]);

        if body_len > MAX_BODY_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: body_len,
                max: MAX_BODY_SIZE,
            });
        }

        let crc_expected = u32::from_be_bytes([buf[22], buf[23], buf[24], buf[25]]);

        let total_len = FRAME_HEADER_SIZE + method_len + body_len as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let method = buf.split_to(method_len).freeze();
        let body = buf.split_to(body_len as usize).freeze();

        if flags.has_crc() {
            let crc_actual = Self::checksum(&method, &body);
            if crc_actual != crc_expected {
                return Err(ProtocolError::CrcMismatch {
                    expected: crc_expected,
                    actual: crc_actual,
                });
            }
        }

        let method = String::from_utf8(method.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;

        Ok(Some(Self {
            version,
            flags,
            call_id,
            method,
            body,
        }))
    }
}

/// Accumulates bytes read from a stream and yields complete frames.
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::call(7, "GetCertificate", &b"00ab"[..]);

        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, frame);
        assert!(decoded.flags.has_crc());
        assert!(!decoded.flags.is_reply());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_crc_covers_method() {
        let frame = Frame::call(1, "GetCertificate", &b"00ab"[..]);
        let mut encoded = frame.encode().unwrap();

        // Flip a byte of the operation name.
        encoded[FRAME_HEADER_SIZE] ^= 0x20;

        let result = Frame::decode(&mut encoded);
        assert!(matches!(result, Err(ProtocolError::CrcMismatch { .. })));
    }

    #[test]
    fn test_crc_covers_body() {
        let frame = Frame::call(1, "GetCertificate", &b"00ab"[..]);
        let mut encoded = frame.encode().unwrap();

        let len = encoded.len();
        encoded[len - 1] ^= 0xFF;

        let result = Frame::decode(&mut encoded);
        assert!(matches!(result, Err(ProtocolError::CrcMismatch { .. })));
    }

    #[test]
    fn test_invalid_magic() {
        let mut buf = BytesMut::from(&[0u8; FRAME_HEADER_SIZE][..]);
        buf[..4].copy_from_slice(b"RCPX");
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::InvalidMagic(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut buf = Frame::call(1, "X", Bytes::new()).encode().unwrap();
        buf[5] = 0x63;
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_incomplete_frame() {
        let encoded = Frame::call(3, "AddCertificate", vec![1u8; 64])
            .encode()
            .unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded[..10]);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.extend(&encoded[10..40]);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.extend(&encoded[40..]);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.call_id, 3);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_invalid_flags() {
        let result = FrameFlags::from_bits(0x0100);
        assert!(matches!(result, Err(ProtocolError::InvalidFlags(0x0100))));
    }

    #[test]
    fn test_frame_too_large() {
        let frame = Frame::call(1, "AddCertificate", vec![0u8; MAX_BODY_SIZE as usize + 1]);
        let result = frame.encode();
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_empty_body() {
        let frame = Frame::reply(9, "FinalizeAuthorization", Bytes::new());
        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(decoded.flags.is_reply());
        assert!(decoded.body.is_empty());
        assert_eq!(decoded.into_outcome().unwrap().unwrap(), Bytes::new());
    }

    #[test]
    fn test_error_reply_outcome() {
        let error = RpcError::improper_message("expected value at line 1 column 1");
        let frame = Frame::error_reply(4, "IssueCertificate", &error).unwrap();
        assert!(frame.flags.is_reply());
        assert!(frame.flags.is_error());

        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        let outcome = decoded.into_outcome().unwrap();
        assert_eq!(outcome.unwrap_err().code, ErrorCode::ImproperMessage);
    }

    #[test]
    fn test_frame_without_crc() {
        let mut frame = Frame::call(1, "GetAuthorization", &b"authz-1"[..]);
        frame.flags = FrameFlags::new();

        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(!decoded.flags.has_crc());
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&Frame::reply(2, "A", &b"two"[..]).encode().unwrap());
        decoder.extend(&Frame::reply(1, "B", &b"one"[..]).encode().unwrap());

        let first = decoder.next_frame().unwrap().unwrap();
        let second = decoder.next_frame().unwrap().unwrap();
        assert_eq!((first.call_id, first.body.as_ref()), (2, &b"two"[..]));
        assert_eq!((second.call_id, second.body.as_ref()), (1, &b"one"[..]));
        assert!(decoder.next_frame().unwrap().is_none());
    }
}
