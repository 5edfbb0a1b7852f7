//! Command Processing Module
//!
//! The command layer sits between the wire protocol and the store:
//!
//! ```text
//! decoded Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandDispatcher│   match on (name, argc)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Store      │
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `GET key` - value with status Ok, or status NotFound
//! - `SET key value` - insert or overwrite, status Ok
//! - `DEL key` - remove if present, status Ok either way
//!
//! Command names are matched case-insensitively. Any other name or
//! argument count produces a status Err response and leaves the
//! connection open.

pub mod dispatcher;

// Re-export the dispatcher
pub use dispatcher::CommandDispatcher;
