//! Connection Module
//!
//! Owns everything that belongs to a single client session: the
//! non-blocking socket, the bounded read and write buffers, and the
//! state machine that moves bytes between them.
//!
//! The event loop calls [`Connection::drive`] whenever the socket
//! reports readiness; the connection then reads, parses, dispatches and
//! writes until the socket would block, at which point control returns
//! to the scheduler. There are no tasks and no callbacks; suspension is
//! simply returning from `drive`.

pub mod conn;

// Re-export the connection types
pub use conn::{ConnState, Connection, READ_BUF_CAPACITY, WRITE_BUF_CAPACITY};
