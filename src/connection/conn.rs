//! Per-Connection State Machine
//!
//! Each client connection owns a non-blocking socket, a fixed-capacity
//! read buffer and a fixed-capacity write buffer, and moves between three
//! states:
//!
//! ```text
//!                 ┌──────────────────┐
//!      accept ───>│  AwaitingRequest │<─────────────┐
//!                 └────────┬─────────┘              │
//!                          │ complete frame         │ response drained
//!                          ▼                        │
//!                 ┌──────────────────┐              │
//!                 │ SendingResponse  │──────────────┘
//!                 └────────┬─────────┘
//!                          │ error / peer shutdown / protocol violation
//!                          ▼
//!                 ┌──────────────────┐
//!                 │     Closing      │
//!                 └──────────────────┘
//! ```
//!
//! [`Connection::drive`] runs the machine until it has to wait for the
//! socket again. Each state has one transition function returning either
//! `Continue` (run the next state handler now) or `Yield` (give control
//! back to the event loop until the next readiness event). A would-block
//! result from the socket is the only thing that yields; everything else
//! either makes progress or transitions to `Closing`.
//!
//! ## Pipelining
//!
//! A single read may deliver several complete frames. The machine serves
//! one frame, flushes its response, then returns to `AwaitingRequest`
//! where frames still buffered are consumed before the socket is read
//! again. A whole burst is answered within one `drive` call, in arrival
//! order, and the write buffer never needs room for more than one
//! response.

use crate::commands::CommandDispatcher;
use crate::protocol::{codec, HEADER_LEN, MAX_MSG};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

/// Read buffer capacity: exactly one largest-legal frame.
pub const READ_BUF_CAPACITY: usize = HEADER_LEN + MAX_MSG;

/// Write buffer capacity: exactly one largest-legal response frame.
pub const WRITE_BUF_CAPACITY: usize = HEADER_LEN + MAX_MSG;

/// The lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Reading request bytes; the read buffer may hold a partial frame.
    AwaitingRequest,
    /// Draining a buffered response; `wbuf_sent` marks progress.
    SendingResponse,
    /// Terminal: the socket is dead or the peer misbehaved. The owner
    /// should drop the connection; buffered output is discarded.
    Closing,
}

/// What a state handler tells the drive loop to do next.
enum Flow {
    /// Run the handler for the (possibly new) current state immediately.
    Continue,
    /// Stop driving until the next readiness event.
    Yield,
}

/// One client connection and everything it owns.
///
/// Generic over the transport so the state machine can be exercised
/// against an in-memory stream in tests; the server instantiates it with
/// `mio::net::TcpStream`.
///
/// Buffer invariants, maintained by every transition:
/// `rbuf_len <= READ_BUF_CAPACITY` and
/// `wbuf_sent <= wbuf_len <= WRITE_BUF_CAPACITY`.
pub struct Connection<S> {
    /// The non-blocking transport.
    stream: S,

    /// Peer address, for logging.
    addr: SocketAddr,

    /// Current lifecycle state.
    state: ConnState,

    /// Incoming bytes; `rbuf[..rbuf_len]` is valid.
    rbuf: Box<[u8; READ_BUF_CAPACITY]>,
    rbuf_len: usize,

    /// Outgoing bytes; `wbuf[wbuf_sent..wbuf_len]` is still unsent.
    wbuf: Box<[u8; WRITE_BUF_CAPACITY]>,
    wbuf_len: usize,
    wbuf_sent: usize,

    /// Totals for stats reporting.
    read_bytes: u64,
    written_bytes: u64,
    commands: u64,
}

impl<S: Read + Write> Connection<S> {
    /// Wraps a freshly accepted transport.
    pub fn new(stream: S, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            state: ConnState::AwaitingRequest,
            rbuf: Box::new([0u8; READ_BUF_CAPACITY]),
            rbuf_len: 0,
            wbuf: Box::new([0u8; WRITE_BUF_CAPACITY]),
            wbuf_len: 0,
            wbuf_sent: 0,
            read_bytes: 0,
            written_bytes: 0,
            commands: 0,
        }
    }

    /// The current state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// The peer address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared access to the transport.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Exclusive access to the transport (needed for deregistration).
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Total bytes read from the peer.
    pub fn bytes_read(&self) -> u64 {
        self.read_bytes
    }

    /// Total bytes written to the peer.
    pub fn bytes_written(&self) -> u64 {
        self.written_bytes
    }

    /// Total commands dispatched on this connection.
    pub fn commands_processed(&self) -> u64 {
        self.commands
    }

    /// Runs the state machine until it would block or reaches `Closing`.
    ///
    /// Called by the event loop whenever the socket reports readiness.
    /// Safe to call spuriously: a wakeup with nothing to do simply hits
    /// would-block and yields again.
    pub fn drive(&mut self, dispatcher: &mut CommandDispatcher) {
        loop {
            let flow = match self.state {
                ConnState::AwaitingRequest => self.poll_request(dispatcher),
                ConnState::SendingResponse => self.poll_response(),
                ConnState::Closing => return,
            };
            if let Flow::Yield = flow {
                return;
            }
        }
    }

    /// `AwaitingRequest`: serve buffered frames, then read for more.
    fn poll_request(&mut self, dispatcher: &mut CommandDispatcher) -> Flow {
        // Frames left over from an earlier burst are served before the
        // socket is touched again.
        if let Some(flow) = self.process_buffered(dispatcher) {
            return flow;
        }

        loop {
            if self.rbuf_len == READ_BUF_CAPACITY {
                // Cannot happen: a full buffer always starts with a
                // complete frame, which process_buffered just consumed.
                // Bail out rather than misread a zero-length read as EOF.
                debug_assert!(false, "read buffer full without a complete frame");
                return Flow::Yield;
            }

            match retry_interrupted(|| self.stream.read(&mut self.rbuf[self.rbuf_len..])) {
                Ok(0) => {
                    if self.rbuf_len > 0 {
                        warn!(
                            client = %self.addr,
                            buffered = self.rbuf_len,
                            "peer closed with a partial frame buffered"
                        );
                    } else {
                        debug!(client = %self.addr, "peer closed the connection");
                    }
                    self.state = ConnState::Closing;
                    return Flow::Continue;
                }
                Ok(n) => {
                    self.rbuf_len += n;
                    self.read_bytes += n as u64;
                    trace!(client = %self.addr, bytes = n, "read data");
                    if let Some(flow) = self.process_buffered(dispatcher) {
                        return flow;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Flow::Yield,
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "read failed");
                    self.state = ConnState::Closing;
                    return Flow::Continue;
                }
            }
        }
    }

    /// `SendingResponse`: drain the unsent region of the write buffer.
    fn poll_response(&mut self) -> Flow {
        loop {
            if self.wbuf_sent == self.wbuf_len {
                // Fully drained. Reset and return to reading; any frames
                // still buffered are handled in this same drive call.
                self.wbuf_sent = 0;
                self.wbuf_len = 0;
                self.state = ConnState::AwaitingRequest;
                return Flow::Continue;
            }

            match retry_interrupted(|| self.stream.write(&self.wbuf[self.wbuf_sent..self.wbuf_len]))
            {
                Ok(0) => {
                    warn!(client = %self.addr, "peer stopped accepting data");
                    self.state = ConnState::Closing;
                    return Flow::Continue;
                }
                Ok(n) => {
                    self.wbuf_sent += n;
                    self.written_bytes += n as u64;
                    debug_assert!(self.wbuf_sent <= self.wbuf_len);
                    trace!(client = %self.addr, bytes = n, "wrote data");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Flow::Yield,
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "write failed");
                    self.state = ConnState::Closing;
                    return Flow::Continue;
                }
            }
        }
    }

    /// Tries to serve exactly one complete frame from the read buffer.
    ///
    /// Returns `None` when no complete frame is buffered (keep reading),
    /// or `Some(Flow::Continue)` after a state transition: to
    /// `SendingResponse` with a response queued, or to `Closing` on a
    /// protocol violation.
    fn process_buffered(&mut self, dispatcher: &mut CommandDispatcher) -> Option<Flow> {
        let (payload, consumed) = match codec::try_extract_frame(&self.rbuf[..self.rbuf_len]) {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(e) => {
                warn!(client = %self.addr, error = %e, "invalid frame");
                self.state = ConnState::Closing;
                return Some(Flow::Continue);
            }
        };

        let response = match codec::decode_request(payload) {
            Ok(request) => {
                self.commands += 1;
                dispatcher.dispatch(&request)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "malformed request payload");
                self.state = ConnState::Closing;
                return Some(Flow::Continue);
            }
        };

        let written = match codec::encode_response(&response, &mut self.wbuf[..]) {
            Ok(n) => n,
            Err(e) => {
                warn!(client = %self.addr, error = %e, "response exceeds frame limit");
                self.state = ConnState::Closing;
                return Some(Flow::Continue);
            }
        };
        self.wbuf_len = written;
        self.wbuf_sent = 0;

        // Discard the consumed frame and shift any following bytes to the
        // front of the buffer.
        self.rbuf.copy_within(consumed..self.rbuf_len, 0);
        self.rbuf_len -= consumed;

        self.state = ConnState::SendingResponse;
        Some(Flow::Continue)
    }
}

/// Runs an I/O operation, transparently retrying on `Interrupted`.
///
/// Would-block is deliberately not handled here; it is a flow-control
/// signal for the state machine, not a retryable condition.
fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Status;
    use std::collections::VecDeque;

    /// In-memory transport with scripted reads and writes.
    ///
    /// Reads pop from a queue; an empty `Vec` means EOF and an exhausted
    /// queue means would-block. Writes follow a queue of per-call byte
    /// caps (or errors); once the queue is empty every write is accepted
    /// in full. Everything written is captured for assertions.
    struct ScriptedIo {
        reads: VecDeque<io::Result<Vec<u8>>>,
        writes: VecDeque<io::Result<usize>>,
        written: Vec<u8>,
    }

    impl ScriptedIo {
        fn new() -> Self {
            Self {
                reads: VecDeque::new(),
                writes: VecDeque::new(),
                written: Vec::new(),
            }
        }

        fn queue_read(&mut self, data: &[u8]) {
            self.reads.push_back(Ok(data.to_vec()));
        }

        fn queue_read_err(&mut self, kind: io::ErrorKind) {
            self.reads.push_back(Err(kind.into()));
        }

        fn queue_eof(&mut self) {
            self.reads.push_back(Ok(Vec::new()));
        }

        fn queue_write_cap(&mut self, cap: usize) {
            self.writes.push_back(Ok(cap));
        }

        fn queue_write_err(&mut self, kind: io::ErrorKind) {
            self.writes.push_back(Err(kind.into()));
        }
    }

    impl Read for ScriptedIo {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Err(io::ErrorKind::WouldBlock.into()),
                Some(Err(e)) => Err(e),
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.reads.push_front(Ok(data[n..].to_vec()));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for ScriptedIo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.writes.pop_front() {
                Some(Err(e)) => Err(e),
                Some(Ok(cap)) => {
                    let n = cap.min(buf.len());
                    self.written.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                None => {
                    self.written.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn frame(args: &[&[u8]]) -> Vec<u8> {
        let mut payload = (args.len() as u32).to_le_bytes().to_vec();
        for arg in args {
            payload.extend_from_slice(&(arg.len() as u32).to_le_bytes());
            payload.extend_from_slice(arg);
        }
        let mut out = (payload.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&payload);
        out
    }

    fn response(status: Status, body: &[u8]) -> Vec<u8> {
        let mut out = ((4 + body.len()) as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&status.as_u32().to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn connection(io: ScriptedIo) -> Connection<ScriptedIo> {
        Connection::new(io, "127.0.0.1:0".parse().unwrap())
    }

    #[test]
    fn test_single_request_round_trip() {
        let mut io = ScriptedIo::new();
        io.queue_read(&frame(&[b"SET", b"a", b"1"]));
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);

        assert_eq!(conn.state(), ConnState::AwaitingRequest);
        assert_eq!(conn.stream().written, response(Status::Ok, b""));
        assert_eq!(conn.commands_processed(), 1);
        assert_eq!(dispatcher.store().get(b"a"), Some(bytes::Bytes::from("1")));
    }

    #[test]
    fn test_pipelined_burst_served_in_order() {
        let mut burst = frame(&[b"SET", b"a", b"1"]);
        burst.extend_from_slice(&frame(&[b"GET", b"a"]));
        burst.extend_from_slice(&frame(&[b"DEL", b"a"]));
        burst.extend_from_slice(&frame(&[b"GET", b"a"]));

        let mut io = ScriptedIo::new();
        io.queue_read(&burst);
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);

        let mut expected = response(Status::Ok, b"");
        expected.extend_from_slice(&response(Status::Ok, b"1"));
        expected.extend_from_slice(&response(Status::Ok, b""));
        expected.extend_from_slice(&response(Status::NotFound, b""));

        assert_eq!(conn.state(), ConnState::AwaitingRequest);
        assert_eq!(conn.stream().written, expected);
        assert_eq!(conn.commands_processed(), 4);
    }

    #[test]
    fn test_partial_frame_waits_for_more_data() {
        let full = frame(&[b"GET", b"a"]);
        let (head, tail) = full.split_at(5);

        let mut io = ScriptedIo::new();
        io.queue_read(head);
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::AwaitingRequest);
        assert!(conn.stream().written.is_empty());

        conn.stream_mut().reads.push_back(Ok(tail.to_vec()));
        conn.drive(&mut dispatcher);
        assert_eq!(conn.stream().written, response(Status::NotFound, b""));
    }

    #[test]
    fn test_clean_eof_closes() {
        let mut io = ScriptedIo::new();
        io.queue_eof();
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::Closing);
    }

    #[test]
    fn test_eof_with_partial_frame_closes() {
        let full = frame(&[b"GET", b"a"]);
        let mut io = ScriptedIo::new();
        io.queue_read(&full[..4]);
        io.queue_eof();
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::Closing);
        assert!(conn.stream().written.is_empty());
    }

    #[test]
    fn test_oversized_frame_closes_without_response() {
        let mut io = ScriptedIo::new();
        io.queue_read(&((MAX_MSG + 1) as u32).to_le_bytes());
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::Closing);
        assert!(conn.stream().written.is_empty());
    }

    #[test]
    fn test_malformed_payload_closes_without_response() {
        // argc = 1, one valid argument, then stray bytes.
        let mut payload = 1u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(b"x");
        payload.extend_from_slice(&[0xaa, 0xbb]);
        let mut wire = (payload.len() as u32).to_le_bytes().to_vec();
        wire.extend_from_slice(&payload);

        let mut io = ScriptedIo::new();
        io.queue_read(&wire);
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::Closing);
        assert!(conn.stream().written.is_empty());
    }

    #[test]
    fn test_unknown_command_keeps_connection_usable() {
        let mut burst = frame(&[b"FOO", b"bar"]);
        burst.extend_from_slice(&frame(&[b"SET", b"a", b"1"]));

        let mut io = ScriptedIo::new();
        io.queue_read(&burst);
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);

        let mut expected = response(Status::Err, b"ERR unknown command");
        expected.extend_from_slice(&response(Status::Ok, b""));

        assert_eq!(conn.state(), ConnState::AwaitingRequest);
        assert_eq!(conn.stream().written, expected);
    }

    #[test]
    fn test_read_error_closes() {
        let mut io = ScriptedIo::new();
        io.queue_read_err(io::ErrorKind::ConnectionReset);
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::Closing);
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        let mut io = ScriptedIo::new();
        io.queue_read_err(io::ErrorKind::Interrupted);
        io.queue_read(&frame(&[b"GET", b"a"]));
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::AwaitingRequest);
        assert_eq!(conn.stream().written, response(Status::NotFound, b""));
    }

    #[test]
    fn test_write_would_block_resumes_and_finishes_burst() {
        let mut burst = frame(&[b"SET", b"a", b"1"]);
        burst.extend_from_slice(&frame(&[b"GET", b"a"]));

        let mut io = ScriptedIo::new();
        io.queue_read(&burst);
        io.queue_write_cap(3);
        io.queue_write_err(io::ErrorKind::WouldBlock);
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        // First drive: the SET response is stuck after three bytes.
        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::SendingResponse);
        assert_eq!(conn.stream().written.len(), 3);

        // Next writable event: the flush finishes and the buffered GET
        // frame is served in the same drive call.
        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::AwaitingRequest);

        let mut expected = response(Status::Ok, b"");
        expected.extend_from_slice(&response(Status::Ok, b"1"));
        assert_eq!(conn.stream().written, expected);
    }

    #[test]
    fn test_write_returning_zero_closes() {
        let mut io = ScriptedIo::new();
        io.queue_read(&frame(&[b"GET", b"a"]));
        io.queue_write_cap(0);
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::Closing);
    }

    #[test]
    fn test_drive_on_closing_is_a_no_op() {
        let mut io = ScriptedIo::new();
        io.queue_eof();
        let mut conn = connection(io);
        let mut dispatcher = CommandDispatcher::default();

        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::Closing);
        conn.drive(&mut dispatcher);
        assert_eq!(conn.state(), ConnState::Closing);
    }

    #[test]
    fn test_retry_interrupted_passes_through_other_errors() {
        let mut calls = 0;
        let result: io::Result<usize> = retry_interrupted(|| {
            calls += 1;
            if calls < 3 {
                Err(io::ErrorKind::Interrupted.into())
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            }
        });
        assert_eq!(calls, 3);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::WouldBlock);
    }
}
