//! Storage Module
//!
//! The in-memory key-value store backing all commands. Keys and values
//! are binary-safe `Bytes`; there is one flat keyspace with no expiry
//! and no persistence.
//!
//! Access is single-threaded by construction: the store is owned by the
//! command dispatcher, which runs inside the event loop, so the API takes
//! `&mut self` rather than hiding mutation behind a lock.

pub mod store;

// Re-export the store type
pub use store::Store;
