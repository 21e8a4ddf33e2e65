use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use sdrcat_transport::LinkStream;
use tracing::{debug, warn};

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Turns an arbitrarily chunked byte stream into frames.
///
/// Transport-agnostic: bytes go in through [`feed`](Self::feed), frames
/// come out of [`next_frame`](Self::next_frame) in arrival order. Chunk
/// boundaries, including ones that split a length prefix, do not matter.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buf: BytesMut,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Append received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the earliest complete frame.
    ///
    /// `Ok(None)` means more bytes are needed. An error for a frame whose
    /// sections do not decode leaves the following frames intact.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match decode_frame(&mut self.buf) {
            Ok(frame) => Ok(frame),
            Err(err) => {
                warn!(error = %err, remaining = self.buf.len(), "dropping undecodable frame");
                Err(err)
            }
        }
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame. Used when the link goes away.
    pub fn clear(&mut self) {
        if !self.buf.is_empty() {
            debug!(dropped = self.buf.len(), "clearing partial frame");
        }
        self.buf.clear();
    }
}

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally. Callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    reassembler: FrameReassembler,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            reassembler: FrameReassembler::new(),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        loop {
            if let Some(frame) = self.reassembler.next_frame()? {
                return Ok(frame);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.reassembler.feed(&chunk[..read]);
        }
    }

    /// Bytes of an incomplete frame still held back.
    pub fn buffered_len(&self) -> usize {
        self.reassembler.buffered_len()
    }
}

impl FrameReader<LinkStream> {
    /// Create a frame reader for a `LinkStream` and apply read timeout from config.
    pub fn with_config_link(inner: LinkStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: sdrcat_transport::TransportError) -> FrameError {
    match err {
        sdrcat_transport::TransportError::Io(io)
        | sdrcat_transport::TransportError::Accept(io) => FrameError::Io(io),
        sdrcat_transport::TransportError::Bind { source, .. }
        | sdrcat_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;

    use super::*;
    use crate::section::{
        Command, DataTransfer, MetadataItem, PropertyKind, PropertyValue, Section,
        StreamDirection,
    };

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::single(Command::Enumerate),
            Frame::single(Section::PropertyValue(PropertyValue {
                kind: PropertyKind::Notify,
                element_id: 1025,
                value: Bytes::from_static(b"hello"),
            })),
            Frame::single(Section::DataTransfer(DataTransfer {
                direction: StreamDirection::DeviceToClient,
                element_id: 1026,
                metadata: vec![MetadataItem {
                    metadata_id: 1027,
                    value: Bytes::from_static(&[0, 0, 0, 9]),
                }],
                data: Bytes::from(vec![0xAB; 300]),
            })),
            Frame::single(Command::Confirmed),
        ]
    }

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = Vec::new();
        for frame in frames {
            buf.extend_from_slice(&frame.to_bytes().unwrap());
        }
        buf
    }

    fn drain(reassembler: &mut FrameReassembler) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Some(frame) = reassembler.next_frame().unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn reassembles_whole_buffer() {
        let frames = sample_frames();
        let mut reassembler = FrameReassembler::new();
        reassembler.feed(&wire(&frames));
        assert_eq!(drain(&mut reassembler), frames);
        assert_eq!(reassembler.buffered_len(), 0);
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let frames = sample_frames();
        let bytes = wire(&frames);

        for chunk_size in [1, 2, 3, 5, 7, 64, bytes.len()] {
            let mut reassembler = FrameReassembler::new();
            let mut out = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                reassembler.feed(chunk);
                out.extend(drain(&mut reassembler));
            }
            assert_eq!(out, frames, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn every_single_split_point() {
        let frames = sample_frames();
        let bytes = wire(&frames);

        for split in 0..=bytes.len() {
            let mut reassembler = FrameReassembler::new();
            reassembler.feed(&bytes[..split]);
            let mut out = drain(&mut reassembler);
            reassembler.feed(&bytes[split..]);
            out.extend(drain(&mut reassembler));
            assert_eq!(out, frames, "split at {split}");
        }
    }

    #[test]
    fn split_length_prefix() {
        let bytes = Frame::single(Command::Reset).to_bytes().unwrap();
        let mut reassembler = FrameReassembler::new();

        reassembler.feed(&bytes[..1]);
        assert!(reassembler.next_frame().unwrap().is_none());
        reassembler.feed(&bytes[1..]);
        assert_eq!(
            reassembler.next_frame().unwrap(),
            Some(Frame::single(Command::Reset))
        );
    }

    #[test]
    fn recovers_after_undecodable_frame() {
        let mut reassembler = FrameReassembler::new();
        reassembler.feed(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x77]);
        reassembler.feed(&Frame::single(Command::Confirmed).to_bytes().unwrap());

        assert!(matches!(
            reassembler.next_frame(),
            Err(FrameError::UnknownSectionType(0x77))
        ));
        assert_eq!(
            reassembler.next_frame().unwrap(),
            Some(Frame::single(Command::Confirmed))
        );
    }

    #[test]
    fn short_declared_length_clears_buffer() {
        let mut reassembler = FrameReassembler::new();
        reassembler.feed(&[0x00, 0x01, 0xAA, 0xBB]);
        assert!(matches!(
            reassembler.next_frame(),
            Err(FrameError::MalformedFrame(_))
        ));
        assert_eq!(reassembler.buffered_len(), 0);
        assert!(reassembler.next_frame().unwrap().is_none());
    }

    #[test]
    fn clear_drops_partial_frame() {
        let bytes = Frame::single(Command::Reset).to_bytes().unwrap();
        let mut reassembler = FrameReassembler::new();
        reassembler.feed(&bytes[..4]);
        reassembler.clear();
        reassembler.feed(&bytes);
        assert_eq!(
            reassembler.next_frame().unwrap(),
            Some(Frame::single(Command::Reset))
        );
    }

    #[test]
    fn read_multiple_frames() {
        let frames = sample_frames();
        let mut reader = FrameReader::new(Cursor::new(wire(&frames)));
        for expected in &frames {
            assert_eq!(&reader.read_frame().unwrap(), expected);
        }
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn partial_read_handling() {
        let frames = sample_frames();
        let byte_reader = ByteByByteReader {
            bytes: wire(&frames),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);
        for expected in &frames {
            assert_eq!(&reader.read_frame().unwrap(), expected);
        }
    }

    #[test]
    fn connection_closed_mid_frame() {
        let bytes = Frame::single(Command::Enumerate).to_bytes().unwrap();
        let mut reader = FrameReader::new(Cursor::new(bytes[..5].to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(reader.buffered_len(), 5);
    }

    #[test]
    fn small_read_chunk_size() {
        let frames = sample_frames();
        let cfg = FrameConfig {
            read_chunk_size: 3,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire(&frames)), cfg);
        for expected in &frames {
            assert_eq!(&reader.read_frame().unwrap(), expected);
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[Frame::single(Command::Reset)])),
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().unwrap(), Frame::single(Command::Reset));
    }

    #[test]
    fn would_block_propagates_io_error() {
        let mut framed = FrameReader::new(WouldBlockReader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn roundtrip_over_link_stream() {
        let listener = sdrcat_transport::TcpEndpoint::bind("127.0.0.1", 0).unwrap();
        let port = listener.local_addr().port();

        let server = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let cfg = FrameConfig {
                read_timeout: Some(std::time::Duration::from_secs(5)),
                ..FrameConfig::default()
            };
            let mut reader = FrameReader::with_config_link(stream, cfg).unwrap();
            reader.read_frame().unwrap()
        });

        let stream = sdrcat_transport::TcpEndpoint::connect("127.0.0.1", port).unwrap();
        let mut writer = crate::writer::FrameWriter::new(stream);
        writer.write_frame(&Frame::single(Command::Enumerate)).unwrap();

        assert_eq!(server.join().unwrap(), Frame::single(Command::Enumerate));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
