//! Readiness-Driven Event Loop
//!
//! The single scheduling authority of the server. One thread, one
//! `mio::Poll`, and a registry of live connections keyed by token:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         EventLoop                           │
//! │                                                             │
//! │   poll(timeout) ──> ready tokens                            │
//! │        │                                                    │
//! │        ├── LISTENER ──> accept until would-block ──> register│
//! │        │                                                    │
//! │        └── client token ──> Connection::drive               │
//! │                │                                            │
//! │                ├── state Closing ──> deregister + drop      │
//! │                └── else ──> reregister interest if changed  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Interest follows connection state: readable while a connection is
//! waiting for requests, writable while it is draining a response. The
//! poll timeout exists only for liveness; no protocol timing depends on
//! it.
//!
//! Failure policy: a failed accept is logged and skipped, a failed
//! connection is dropped, a failed `poll` is fatal and propagates out of
//! [`EventLoop::run`], taking the process down with it.

use crate::commands::CommandDispatcher;
use crate::connection::{ConnState, Connection};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Token reserved for the listening socket.
const LISTENER: Token = Token(0);

/// Capacity of the readiness event buffer per poll call.
const EVENTS_CAPACITY: usize = 256;

/// Upper bound on one blocking poll call.
const POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Aggregate counters for the whole server.
///
/// Plain integers: the loop is single-threaded, so there is nothing to
/// synchronize with.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total connections accepted since startup.
    pub connections_accepted: u64,
    /// Connections currently registered.
    pub active_connections: u64,
    /// Commands dispatched across closed connections.
    pub commands_processed: u64,
    /// Bytes read across closed connections.
    pub bytes_read: u64,
    /// Bytes written across closed connections.
    pub bytes_written: u64,
}

/// A registered connection plus the interest it is registered with.
struct Client {
    conn: Connection<TcpStream>,
    interest: Interest,
}

/// The server's event loop: listener, poller, connection registry,
/// dispatcher and stats, all owned by one thread.
pub struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: HashMap<Token, Client>,
    dispatcher: CommandDispatcher,
    stats: ServerStats,
    /// Next token to hand out. Monotonic; tokens are never reused.
    next_token: usize,
}

impl EventLoop {
    /// Binds the listener and prepares an empty registry.
    pub fn bind(addr: SocketAddr, dispatcher: CommandDispatcher) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            poll,
            listener,
            local_addr,
            connections: HashMap::new(),
            dispatcher,
            stats: ServerStats::default(),
            next_token: 1,
        })
    }

    /// The address the listener is bound to.
    ///
    /// Useful when binding port 0 and letting the OS pick.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Aggregate server counters.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Runs the loop until `poll` itself fails.
    ///
    /// This is the only place the thread blocks. Per-connection errors
    /// never escape; an error returned here means the multiplexing
    /// primitive is broken and there is no safe way to continue.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        info!(addr = %self.local_addr, "event loop started");

        loop {
            match self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "poll failed");
                    return Err(e);
                }
            }

            if events.is_empty() {
                // Timeout tick with nothing to do.
                trace!(active = self.connections.len(), "idle tick");
                continue;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_ready(),
                    token => self.connection_ready(token),
                }
            }
        }
    }

    /// Drains the accept queue.
    ///
    /// Readiness is edge-triggered, so a single accept per event could
    /// strand queued connections until some later wakeup; keep accepting
    /// until the listener reports would-block.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.register_client(stream, addr),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    // Accept can fail under fd exhaustion. Skip this
                    // cycle; existing connections keep being served.
                    error!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    /// Registers a freshly accepted socket with the poller and the
    /// registry. New connections start out waiting for a request.
    fn register_client(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(e) = self
            .poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)
        {
            error!(client = %addr, error = %e, "failed to register connection");
            return;
        }

        self.connections.insert(
            token,
            Client {
                conn: Connection::new(stream, addr),
                interest: Interest::READABLE,
            },
        );
        self.stats.connections_accepted += 1;
        self.stats.active_connections += 1;
        info!(client = %addr, "client connected");
    }

    /// Drives one ready connection, then reconciles its registration
    /// with whatever state it ended up in.
    fn connection_ready(&mut self, token: Token) {
        let Some(client) = self.connections.get_mut(&token) else {
            // Stale event for a connection removed earlier this cycle.
            return;
        };

        client.conn.drive(&mut self.dispatcher);

        let desired = match client.conn.state() {
            ConnState::AwaitingRequest => Interest::READABLE,
            ConnState::SendingResponse => Interest::WRITABLE,
            ConnState::Closing => {
                self.close(token);
                return;
            }
        };

        if desired != client.interest {
            match self
                .poll
                .registry()
                .reregister(client.conn.stream_mut(), token, desired)
            {
                Ok(()) => client.interest = desired,
                Err(e) => {
                    error!(client = %client.conn.addr(), error = %e, "reregister failed");
                    self.close(token);
                }
            }
        }
    }

    /// Removes a connection: deregister, fold its counters into the
    /// server totals, drop the socket. Unsent output is discarded.
    fn close(&mut self, token: Token) {
        let Some(mut client) = self.connections.remove(&token) else {
            return;
        };

        if let Err(e) = self.poll.registry().deregister(client.conn.stream_mut()) {
            debug!(error = %e, "deregister failed");
        }

        self.stats.active_connections -= 1;
        self.stats.commands_processed += client.conn.commands_processed();
        self.stats.bytes_read += client.conn.bytes_read();
        self.stats.bytes_written += client.conn.bytes_written();

        info!(
            client = %client.conn.addr(),
            commands = client.conn.commands_processed(),
            "client disconnected"
        );
    }
}
