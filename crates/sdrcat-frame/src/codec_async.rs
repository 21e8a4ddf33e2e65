use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame};
use crate::error::FrameError;

/// Frame codec for `tokio_util::codec::Framed` streams.
///
/// Shares the decoding rules of [`FrameReassembler`](crate::FrameReassembler).
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)
    }
}

impl Encoder<&Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::section::{Command, Section};

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, FrameCodec::new());
        let mut stream = FramedRead::new(server, FrameCodec::new());

        sink.send(Frame::single(Command::Enumerate)).await.unwrap();
        sink.send(Frame::single(Section::GetProperty { element_id: 1024 }))
            .await
            .unwrap();
        drop(sink);

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Frame::single(Command::Enumerate)
        );
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Frame::single(Section::GetProperty { element_id: 1024 })
        );
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn eof_with_partial_frame_is_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x07, 0x00][..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::ConnectionClosed)
        ));
    }
}
