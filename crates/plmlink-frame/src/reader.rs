use bytes::{Buf, BytesMut};
use tracing::warn;

use crate::code::START;
use crate::codec::decode_frame;
use crate::error::FrameError;
use crate::frame::Frame;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Buffers raw modem bytes and yields complete frames.
///
/// Handles partial reads internally: feed it whatever chunks the transport
/// delivers and pull frames out as they complete. Bytes that cannot start a
/// frame are dropped with a warning until the next start marker.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    dropped: u64,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            dropped: 0,
        }
    }

    /// Append a chunk of received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match decode_frame(&mut self.buf) {
                Ok(frame) => return frame,
                Err(err) => {
                    let dropped = discard_garbage(&mut self.buf, &err);
                    self.dropped += dropped as u64;
                    warn!(%err, dropped, "resynchronizing frame stream");
                }
            }
        }
    }

    /// Drain every frame that is currently complete.
    pub fn drain(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes discarded while resynchronizing.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard anything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop the bytes responsible for a decode error and return how many.
///
/// A bad start byte drops everything up to the next start marker; an
/// unknown message code drops its start marker only, so a start byte
/// hidden in the code position is retried.
pub(crate) fn discard_garbage(buf: &mut BytesMut, err: &FrameError) -> usize {
    let count = match err {
        FrameError::InvalidStart(_) => buf
            .iter()
            .skip(1)
            .position(|&b| b == START)
            .map_or(buf.len(), |pos| pos + 1),
        _ => 1,
    };
    let count = count.min(buf.len());
    buf.advance(count);
    count
}
