use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::code::{self, EXT_DATA_LEN, START};
use crate::error::{FrameError, Result};
use crate::flags::MsgFlags;
use crate::frame::{Frame, Request};
use crate::reader::discard_garbage;

/// Peek the total length of the frame at the front of `src`.
///
/// Returns `Ok(None)` when not enough bytes are buffered to know the length
/// yet. For standard/extended messages this needs the flags byte.
pub fn frame_len(src: &[u8]) -> Result<Option<usize>> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };
    if first != START {
        return Err(FrameError::InvalidStart(first));
    }
    let Some(&msg_code) = src.get(1) else {
        return Ok(None);
    };
    let base = code::base_len(msg_code)
        .ok_or(FrameError::UnknownType(msg_code))?;

    match code::flags_offset(msg_code) {
        Some(offset) => match src.get(offset) {
            None => Ok(None),
            Some(&flags) if MsgFlags::from_byte(flags).extended => Ok(Some(base + EXT_DATA_LEN)),
            Some(_) => Ok(Some(base)),
        },
        None => Ok(Some(base)),
    }
}

/// Decode the frame at the front of `src` without consuming anything.
///
/// Returns the frame and the number of bytes it occupies, or `Ok(None)`
/// if the frame is not complete yet.
pub fn decode(src: &[u8]) -> Result<Option<(Frame, usize)>> {
    let Some(len) = frame_len(src)? else {
        return Ok(None);
    };
    if src.len() < len {
        return Ok(None);
    }
    let frame = Frame::parse(&src[..len])
        .ok_or(FrameError::UnknownType(src[1]))?;
    Ok(Some((frame, len)))
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. Errors leave the
/// buffer untouched.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    match decode(src)? {
        Some((frame, len)) => {
            src.advance(len);
            Ok(Some(frame))
        }
        None => Ok(None),
    }
}

/// Encode a frame in the form the modem sends it.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    frame.write_to(dst);
}

/// `tokio_util` codec: decodes modem frames, encodes host requests.
///
/// Garbage and unknown message codes are skipped with a warning; the decoder
/// only returns errors for I/O failures.
#[derive(Debug, Default)]
pub struct PlmCodec {
    dropped: u64,
}

impl PlmCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes discarded while resynchronizing.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Decoder for PlmCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match decode_frame(src) {
                Ok(frame) => return Ok(frame),
                Err(err) if err.is_recoverable() => {
                    let dropped = discard_garbage(src, &err);
                    self.dropped += dropped as u64;
                    warn!(%err, dropped, "resynchronizing frame stream");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let frame = self.decode(src)?;
        if frame.is_none() && !src.is_empty() {
            debug!(
                remaining = src.len(),
                "discarding partial frame at end of stream"
            );
            src.clear();
        }
        Ok(frame)
    }
}

impl Encoder<Request> for PlmCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<()> {
        item.write_to(dst);
        Ok(())
    }
}

impl Encoder<Frame> for PlmCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, dst);
        Ok(())
    }
}
