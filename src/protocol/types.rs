//! Wire Protocol Data Types
//!
//! This module defines the data types used in the binary wire protocol.
//! The protocol is length-prefixed and binary-safe; there are no delimiters
//! and no text framing.
//!
//! ## Protocol Format
//!
//! All integers are unsigned 32-bit little-endian.
//!
//! Request frame:  `len | argc | arg1_len arg1 | arg2_len arg2 | ...`
//! Response frame: `len | status | body`
//!
//! `len` counts the payload bytes that follow it (it does not include
//! itself). For a request, the argument fields must exactly fill the
//! payload. For a response, `len` is always `4 + body.len()`.

use bytes::Bytes;
use std::fmt;

/// Maximum payload size for a single frame, in bytes.
pub const MAX_MSG: usize = 4096;

/// Maximum number of arguments in a single request.
pub const MAX_ARGS: usize = 1024;

/// Size of the length prefix that starts every frame.
pub const HEADER_LEN: usize = 4;

/// Status code carried in the first four bytes of every response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    /// The command succeeded.
    Ok = 0,
    /// The command was rejected (unknown name or wrong argument count).
    Err = 1,
    /// The requested key does not exist.
    NotFound = 2,
}

impl Status {
    /// Returns the wire representation of this status.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decodes a wire status code, if it is one we know about.
    pub fn from_u32(code: u32) -> Option<Status> {
        match code {
            0 => Some(Status::Ok),
            1 => Some(Status::Err),
            2 => Some(Status::NotFound),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Err => write!(f, "ERR"),
            Status::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

/// A decoded request: an ordered list of binary-safe arguments.
///
/// The first argument is the command name; the rest are its operands.
/// An empty argument list is representable on the wire (`argc == 0`) and
/// is handled by the dispatcher as an unknown command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The argument fields, in wire order.
    pub args: Vec<Bytes>,
}

impl Request {
    /// Creates a request from a list of arguments.
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// Returns the command name (the first argument), if any.
    pub fn name(&self) -> Option<&[u8]> {
        self.args.first().map(|a| a.as_ref())
    }
}

/// A command result: a status code plus an optional binary body.
///
/// For `GET` hits the body is the stored value; for errors it is a short
/// diagnostic string; otherwise it is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The status code.
    pub status: Status,
    /// The response body (may be empty).
    pub body: Bytes,
}

impl Response {
    /// Successful response carrying a value.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: Status::Ok,
            body: body.into(),
        }
    }

    /// Successful response with no body.
    pub fn ok_empty() -> Self {
        Self {
            status: Status::Ok,
            body: Bytes::new(),
        }
    }

    /// Error response carrying a diagnostic message.
    pub fn err(message: impl Into<Bytes>) -> Self {
        Self {
            status: Status::Err,
            body: message.into(),
        }
    }

    /// Response for a key that does not exist.
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            body: Bytes::new(),
        }
    }
}
