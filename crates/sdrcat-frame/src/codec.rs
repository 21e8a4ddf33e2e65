use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::section::{next_chunk, put_length, Section, LENGTH_PREFIX};

/// Frame header: length (2) + integrity field (2) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest frame the 16-bit length prefix can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// A framed group of sections.
///
/// The protocol only ever sends one section per frame; a frame with any
/// other section count is a protocol violation for the receiving
/// coordinator, not a decode error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sections: Vec<Section>,
}

impl Frame {
    /// Create a new frame.
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// A frame carrying exactly one section.
    pub fn single(section: impl Into<Section>) -> Self {
        Self {
            sections: vec![section.into()],
        }
    }

    /// The sole section, if the frame carries exactly one.
    pub fn sole_section(&self) -> Option<&Section> {
        match self.sections.as_slice() {
            [section] => Some(section),
            _ => None,
        }
    }

    /// Consume the frame and return its sole section.
    pub fn into_sole_section(self) -> Option<Section> {
        let mut sections = self.sections;
        if sections.len() == 1 {
            sections.pop()
        } else {
            None
        }
    }

    /// Encode into a standalone byte buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        encode_frame(self, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a complete frame chunk (length prefix included).
    pub fn decode(chunk: &[u8]) -> Result<Self> {
        let declared = next_chunk(chunk, 0)?.len();
        if declared < HEADER_SIZE {
            return Err(FrameError::malformed(format!(
                "frame declares {declared} bytes, shorter than its {HEADER_SIZE}-byte header"
            )));
        }

        // chunk[2..4] is the integrity field. It is reserved and not checked.
        let mut sections = Vec::new();
        let mut offset = HEADER_SIZE;
        while offset < declared {
            let section = next_chunk(&chunk[..declared], offset)?;
            sections.push(Section::decode(section)?);
            offset += section.len();
        }
        Ok(Self { sections })
    }
}

impl From<Section> for Frame {
    fn from(section: Section) -> Self {
        Self::single(section)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬────────────────────────────┐
/// │ Length (2B)  │ Integrity    │ Sections                   │
/// │ BE, counts   │ (2B, 0x0000) │ (each length-prefixed)     │
/// │ whole frame  │              │                            │
/// └──────────────┴──────────────┴────────────────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let mut body = BytesMut::new();
    for section in &frame.sections {
        section.encode(&mut body)?;
    }

    put_length(dst, LENGTH_PREFIX + body.len())?;
    dst.put_u16(0x0000);
    dst.put_slice(&body);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// A complete frame is always consumed from the buffer, even when its
/// sections fail to decode, so the next call starts at the following frame.
/// A declared length shorter than the frame header cannot be skipped
/// reliably; the buffer is cleared and `MalformedFrame` returned.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    if src.len() < LENGTH_PREFIX {
        return Ok(None); // Need more data
    }

    let declared = u16::from_be_bytes([src[0], src[1]]) as usize;
    if declared < HEADER_SIZE {
        let dropped = src.len();
        src.clear();
        return Err(FrameError::malformed(format!(
            "frame declares {declared} bytes, shorter than its {HEADER_SIZE}-byte header; \
             discarded {dropped} buffered bytes"
        )));
    }

    if src.len() < declared {
        return Ok(None); // Need more data
    }

    let chunk = src.split_to(declared);
    Frame::decode(&chunk).map(Some)
}

/// Skip the header of an encoded frame and return its section bytes.
pub fn frame_body(chunk: &[u8]) -> &[u8] {
    let mut body = chunk;
    if body.len() >= HEADER_SIZE {
        body.advance(HEADER_SIZE);
    }
    body
}

/// Configuration for blocking frame I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Bytes requested per read from the underlying stream. Default: 8 KiB.
    pub read_chunk_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 8 * 1024,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{Command, PropertyKind, PropertyValue};

    fn set_property_frame() -> Frame {
        Frame::single(Section::PropertyValue(PropertyValue {
            kind: PropertyKind::Set,
            element_id: 1024,
            value: Bytes::from_static(&[0, 0, 0, 42]),
        }))
    }

    #[test]
    fn test_encode_layout() {
        let bytes = Frame::single(Command::Enumerate).to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), &[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = set_property_frame();
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 9);

        let decoded = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_length() {
        let mut buf = BytesMut::from(&[0x00][..]);
        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_decode_incomplete_body() {
        let mut buf = BytesMut::new();
        encode_frame(&set_property_frame(), &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn test_decode_length_below_header() {
        let mut buf = BytesMut::from(&[0x00, 0x03, 0xFF, 0x00, 0x07][..]);
        let result = decode_frame(&mut buf);
        assert!(matches!(result, Err(FrameError::MalformedFrame(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_bad_section_consumes_frame() {
        let mut buf = BytesMut::from(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x42][..]);
        encode_frame(&Frame::single(Command::Reset), &mut buf).unwrap();

        let result = decode_frame(&mut buf);
        assert!(matches!(result, Err(FrameError::UnknownSectionType(0x42))));

        let next = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(next, Frame::single(Command::Reset));
    }

    #[test]
    fn test_integrity_field_ignored() {
        let mut buf = BytesMut::from(&[0x00, 0x07, 0xBE, 0xEF, 0x00, 0x03, 0x09][..]);
        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::single(Command::Confirmed));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::single(Command::Enumerate), &mut buf).unwrap();
        encode_frame(&set_property_frame(), &mut buf).unwrap();

        let f1 = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(f1, Frame::single(Command::Enumerate));
        let f2 = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(f2, set_property_frame());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_section_count_preserved() {
        let empty = Frame::new(vec![]);
        let bytes = empty.to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), &[0x00, 0x04, 0x00, 0x00]);
        let decoded = Frame::decode(&bytes).unwrap();
        assert!(decoded.sole_section().is_none());

        let pair = Frame::new(vec![Command::Reset.into(), Command::Confirmed.into()]);
        let decoded = Frame::decode(&pair.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.sections.len(), 2);
        assert!(decoded.into_sole_section().is_none());
    }

    #[test]
    fn test_section_overrunning_frame_is_malformed() {
        // Section claims 5 bytes but the frame ends after 3.
        let bytes = [0x00, 0x07, 0x00, 0x00, 0x00, 0x05, 0x02];
        let result = Frame::decode(&bytes);
        assert!(matches!(result, Err(FrameError::MalformedFrame(_))));
    }

    #[test]
    fn test_frame_body() {
        let bytes = Frame::single(Command::Reset).to_bytes().unwrap();
        assert_eq!(frame_body(&bytes), &[0x00, 0x03, 0x01]);
    }
}
