//! Sentinel-delimited framing
//!
//! Every logical message on the wire is its payload followed by a single
//! `0x00` byte. There is no length prefix and no escaping, so payloads must
//! never contain the delimiter; encoding such a payload is refused.
//!
//! [`NulCodec`] plugs the framing into `tokio_util::codec::Framed`, and the
//! free functions [`encode`] and [`decode`] expose the same rules for
//! callers that manage their own buffers.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::AppError;

/// Reserved frame terminator
pub const DELIMITER: u8 = 0x00;

/// Largest partial frame buffered before the connection is considered broken
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Append the delimiter to `payload`
pub fn encode(payload: &[u8]) -> Result<Bytes, AppError> {
    let mut dst = BytesMut::with_capacity(payload.len() + 1);
    NulCodec::new().encode(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Split `buffer` on every delimiter
///
/// Returns each complete, non-empty segment in order, plus the trailing
/// partial segment that should be prepended to the next read.
pub fn decode(buffer: &[u8]) -> (Vec<Bytes>, BytesMut) {
    let mut rest = BytesMut::from(buffer);
    let mut messages = Vec::new();

    while let Some(pos) = rest.iter().position(|b| *b == DELIMITER) {
        let segment = rest.split_to(pos).freeze();
        rest.advance(1);
        if !segment.is_empty() {
            messages.push(segment);
        }
    }

    (messages, rest)
}

/// `Decoder`/`Encoder` for delimiter-terminated frames
///
/// Empty frames are skipped. Remembers how far the current partial frame has
/// already been scanned so repeated reads do not rescan it.
#[derive(Debug, Clone, Default)]
pub struct NulCodec {
    next_index: usize,
}

impl NulCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for NulCodec {
    type Item = BytesMut;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, AppError> {
        loop {
            let found = src[self.next_index..]
                .iter()
                .position(|b| *b == DELIMITER);

            let Some(offset) = found else {
                if src.len() > MAX_FRAME_LEN {
                    return Err(AppError::FrameTooLong { max: MAX_FRAME_LEN });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;

            let frame = src.split_to(end);
            src.advance(1);

            if !frame.is_empty() {
                return Ok(Some(frame));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, AppError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        // Unterminated tail at end of stream is dropped
        src.clear();
        self.next_index = 0;
        Ok(None)
    }
}

impl<T> Encoder<T> for NulCodec
where
    T: AsRef<[u8]>,
{
    type Error = AppError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), AppError> {
        let payload = item.as_ref();
        if payload.contains(&DELIMITER) {
            return Err(AppError::DelimiterInPayload);
        }

        dst.reserve(payload.len() + 1);
        dst.put_slice(payload);
        dst.put_u8(DELIMITER);
        Ok(())
    }
}
