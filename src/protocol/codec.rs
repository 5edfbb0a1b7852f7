//! Length-Prefixed Frame Codec
//!
//! This module extracts frames from a raw byte buffer, decodes request
//! payloads, and encodes response frames.
//!
//! ## How the Codec Works
//!
//! TCP is a stream; a read may deliver half a frame or several frames at
//! once. Extraction is therefore incremental:
//!
//! - `Ok(Some((payload, consumed)))` - a complete frame is available,
//!   `consumed` bytes (prefix plus payload) should be discarded afterwards
//! - `Ok(None)` - the buffer holds only a partial frame, read more first
//! - `Err(FrameError)` - the peer violated the protocol
//!
//! The caller appends incoming network data to its buffer, attempts
//! extraction, and on success compacts the buffer by `consumed` bytes.
//! Decode errors are connection-fatal: once the stream is out of sync
//! there is no way to find the next frame boundary.

use crate::protocol::types::{Request, Response, HEADER_LEN, MAX_ARGS, MAX_MSG};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while decoding or encoding frames.
///
/// Every variant is a protocol violation and closes the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The declared payload length exceeds the per-frame limit.
    #[error("frame too large: {len} bytes (max: {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// The declared argument count exceeds the per-request limit.
    #[error("too many arguments: {argc} (max: {max})")]
    TooManyArgs { argc: usize, max: usize },

    /// A declared length runs past the end of the payload.
    #[error("declared data overruns payload: need {need} bytes, {have} available")]
    Truncated { need: usize, have: usize },

    /// Bytes remain after the last declared argument.
    #[error("{remaining} trailing bytes after last argument")]
    TrailingBytes { remaining: usize },
}

/// Result type for codec operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Attempts to extract one complete frame from the front of `buf`.
///
/// # Returns
///
/// - `Ok(Some((payload, consumed)))` - a full frame; `payload` borrows the
///   payload bytes and `consumed` is the total frame size including the
///   length prefix
/// - `Ok(None)` - not enough data buffered yet
/// - `Err(FrameError::FrameTooLarge)` - the prefix declares an oversized
///   payload
pub fn try_extract_frame(buf: &[u8]) -> FrameResult<Option<(&[u8], usize)>> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }

    let len = read_u32(buf) as usize;
    if len > MAX_MSG {
        return Err(FrameError::FrameTooLarge { len, max: MAX_MSG });
    }

    let consumed = HEADER_LEN + len;
    if buf.len() < consumed {
        return Ok(None); // Incomplete
    }

    Ok(Some((&buf[HEADER_LEN..consumed], consumed)))
}

/// Decodes a request payload into its argument list.
///
/// The payload layout is `argc` followed by `argc` length-prefixed
/// argument fields, which together must fill the payload exactly.
/// Argument bytes are copied out so the caller can reuse its buffer.
pub fn decode_request(payload: &[u8]) -> FrameResult<Request> {
    if payload.len() < 4 {
        return Err(FrameError::Truncated {
            need: 4,
            have: payload.len(),
        });
    }

    let argc = read_u32(payload) as usize;
    if argc > MAX_ARGS {
        return Err(FrameError::TooManyArgs {
            argc,
            max: MAX_ARGS,
        });
    }

    let mut args = Vec::with_capacity(argc);
    let mut rest = &payload[4..];

    for _ in 0..argc {
        if rest.len() < 4 {
            return Err(FrameError::Truncated {
                need: 4,
                have: rest.len(),
            });
        }
        let len = read_u32(rest) as usize;
        if rest.len() - 4 < len {
            return Err(FrameError::Truncated {
                need: len,
                have: rest.len() - 4,
            });
        }
        args.push(Bytes::copy_from_slice(&rest[4..4 + len]));
        rest = &rest[4 + len..];
    }

    if !rest.is_empty() {
        return Err(FrameError::TrailingBytes {
            remaining: rest.len(),
        });
    }

    Ok(Request::new(args))
}

/// Encodes a response frame into the front of `out`.
///
/// The frame is `len | status | body` where `len = 4 + body.len()`.
/// Returns the number of bytes written. `out` must be able to hold
/// `HEADER_LEN + MAX_MSG` bytes; bodies are bounded well below `MAX_MSG`
/// because they originate from values that arrived inside request frames.
pub fn encode_response(response: &Response, out: &mut [u8]) -> FrameResult<usize> {
    let body = &response.body;
    let payload_len = 4 + body.len();
    if payload_len > MAX_MSG {
        return Err(FrameError::FrameTooLarge {
            len: payload_len,
            max: MAX_MSG,
        });
    }

    let total = HEADER_LEN + payload_len;
    debug_assert!(out.len() >= total);

    out[0..4].copy_from_slice(&(payload_len as u32).to_le_bytes());
    out[4..8].copy_from_slice(&response.status.as_u32().to_le_bytes());
    out[8..total].copy_from_slice(body);

    Ok(total)
}

/// Reads a little-endian u32 from the front of `buf`.
///
/// The caller must guarantee `buf.len() >= 4`.
#[inline]
fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
