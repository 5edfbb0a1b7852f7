//! Binary Wire Protocol
//!
//! This module implements the length-prefixed wire format spoken between
//! clients and the server.
//!
//! ## Frame Layout
//!
//! ```text
//! Request:   u32 len | u32 argc | (u32 arg_len, bytes)*
//! Response:  u32 len | u32 status | body bytes
//! ```
//!
//! All integers are little-endian. `len` counts the payload only, never
//! itself, and is capped at [`MAX_MSG`] bytes. Requests carry at most
//! [`MAX_ARGS`] arguments, and the argument fields must fill the payload
//! exactly; anything else is a protocol violation that closes the
//! connection.
//!
//! The codec is incremental: extraction returns `Ok(None)` while a frame
//! is still partial, so callers can accumulate stream data and retry as
//! more bytes arrive.

pub mod codec;
pub mod types;

// Re-export commonly used items
pub use codec::{decode_request, encode_response, try_extract_frame, FrameError, FrameResult};
pub use types::{Request, Response, Status, HEADER_LEN, MAX_ARGS, MAX_MSG};
