//! Inbound frame buffering shared by the WebSocket adapters.

use bytes::BytesMut;
use codesync_protocol::{codec::LENGTH_PREFIX_SIZE, Frame, FrameCodec};

use crate::traits::TransportError;

/// Accumulates message bytes and yields whole frames.
#[derive(Debug)]
pub(crate) struct FrameReader {
    buffer: BytesMut,
    codec: FrameCodec,
}

impl FrameReader {
    pub(crate) fn new(codec: FrameCodec) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            codec,
        }
    }

    pub(crate) fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Next complete frame already buffered.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.codec.decode_from(&mut self.buffer)?)
    }

    /// Append one transport message and try to complete a frame.
    pub(crate) fn push(&mut self, data: &[u8]) -> Result<Option<Frame>, TransportError> {
        let max = self.codec.max_frame_size() + LENGTH_PREFIX_SIZE;
        if data.len() > max {
            return Err(TransportError::MessageTooLarge {
                size: data.len(),
                max,
            });
        }
        self.buffer.extend_from_slice(data);
        self.next_frame()
    }
}
