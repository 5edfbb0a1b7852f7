//! Command Dispatcher
//!
//! Interprets a decoded request as a command and applies it to the store.
//! Commands are matched on name plus exact argument count; the name
//! comparison is case-insensitive. A request that matches nothing gets a
//! structured error response, never a closed connection: from the wire's
//! point of view the frame was perfectly well-formed.

use crate::protocol::{Request, Response};
use crate::storage::Store;
use bytes::Bytes;

/// Diagnostic body returned for unknown commands and wrong arities.
const UNKNOWN_COMMAND: &[u8] = b"ERR unknown command";

/// Executes commands against the store it owns.
///
/// There is exactly one dispatcher per server, owned by the event loop.
/// Dispatch happens synchronously on the event-loop thread, so the store
/// needs no locking.
#[derive(Debug, Default)]
pub struct CommandDispatcher {
    /// The key-value store all commands operate on.
    store: Store,
}

impl CommandDispatcher {
    /// Creates a dispatcher around the given store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Read access to the underlying store, for introspection and tests.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Executes a request and returns the response to send back.
    pub fn dispatch(&mut self, request: &Request) -> Response {
        let name = match request.name() {
            Some(name) => name.to_ascii_uppercase(),
            None => return Response::err(UNKNOWN_COMMAND),
        };

        match (name.as_slice(), request.args.len()) {
            (b"GET", 2) => self.cmd_get(&request.args[1]),
            (b"SET", 3) => self.cmd_set(&request.args[1], &request.args[2]),
            (b"DEL", 2) => self.cmd_del(&request.args[1]),
            _ => Response::err(UNKNOWN_COMMAND),
        }
    }

    /// `GET key` - look up a key.
    fn cmd_get(&self, key: &Bytes) -> Response {
        match self.store.get(key) {
            Some(value) => Response::ok(value),
            None => Response::not_found(),
        }
    }

    /// `SET key value` - insert or overwrite a key.
    fn cmd_set(&mut self, key: &Bytes, value: &Bytes) -> Response {
        self.store.set(key.clone(), value.clone());
        Response::ok_empty()
    }

    /// `DEL key` - remove a key; succeeds whether or not it existed.
    fn cmd_del(&mut self, key: &Bytes) -> Response {
        self.store.del(key);
        Response::ok_empty()
    }
}
