//! # emberkv - A Single-Threaded, Event-Driven Key-Value Server
//!
//! emberkv is an in-memory key-value server built around one explicit
//! event loop. There is no async runtime and no thread pool: a single
//! thread multiplexes every connection with readiness polling, and all
//! parsing, dispatch and storage happen synchronously inside it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           emberkv                            │
//! │                                                              │
//! │  ┌───────────┐     ┌──────────────┐    ┌──────────────────┐  │
//! │  │ EventLoop │────>│  Connection  │───>│ CommandDispatcher│  │
//! │  │ (mio Poll)│     │ state machine│    └────────┬─────────┘  │
//! │  └─────┬─────┘     └──────┬───────┘             │            │
//! │        │                  ▼                     ▼            │
//! │        │           ┌────────────┐        ┌───────────┐       │
//! │        │           │ FrameCodec │        │   Store   │       │
//! │        │           └────────────┘        └───────────┘       │
//! │        │                                                     │
//! │        └── accepts sockets, polls readiness, reaps closed    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Protocol
//!
//! Length-prefixed binary frames, all integers little-endian `u32`:
//!
//! - Request: `len | argc | (arg_len, arg_bytes)*`
//! - Response: `len | status | body`
//!
//! Payloads are capped at 4096 bytes and requests at 1024 arguments.
//! Violating either limit, or declaring lengths that do not exactly fill
//! the payload, closes the connection; a well-formed request that is not
//! a recognized command just gets a status `Err` response.
//!
//! ## Supported Commands
//!
//! - `GET key` - returns the value, or status NotFound
//! - `SET key value` - inserts or overwrites
//! - `DEL key` - removes the key; succeeds even if absent
//!
//! Names are matched case-insensitively.
//!
//! ## Quick Start
//!
//! ```no_run
//! use emberkv::commands::CommandDispatcher;
//! use emberkv::server::EventLoop;
//! use emberkv::storage::Store;
//!
//! fn main() -> std::io::Result<()> {
//!     let dispatcher = CommandDispatcher::new(Store::new());
//!     let mut server = EventLoop::bind("127.0.0.1:1234".parse().unwrap(), dispatcher)?;
//!     server.run()
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame extraction, request decoding, response encoding
//! - [`storage`]: the in-memory key-value store
//! - [`commands`]: command dispatch against the store
//! - [`connection`]: the per-connection state machine and buffers
//! - [`server`]: the poll loop, connection registry and stats
//!
//! ## Design Highlights
//!
//! ### One Thread, Visible in the Types
//!
//! The store is owned by the dispatcher, which is owned by the event
//! loop; mutation requires `&mut`. There are no locks because the type
//! system already proves exclusive access.
//!
//! ### Suspension Is Just Returning
//!
//! A connection that would block simply returns from its drive call.
//! The event loop re-polls and calls it again when the OS says the
//! socket is ready; no futures, wakers or callbacks are involved.
//!
//! ### Pipelining
//!
//! Clients may send many requests before reading responses. Responses
//! are produced strictly in arrival order per connection, and a whole
//! buffered burst is served within a single drive call.

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandDispatcher;
pub use connection::{ConnState, Connection};
pub use protocol::{FrameError, Request, Response, Status};
pub use server::{EventLoop, ServerStats};
pub use storage::Store;

/// The default port emberkv listens on
pub const DEFAULT_PORT: u16 = 1234;

/// The default host emberkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of emberkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
