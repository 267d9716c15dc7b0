//! mio event loop for the sink server.
//!
//! Readiness-based model: poll tells us which sockets are ready, then each
//! ready connection gets exactly one non-blocking read per cycle. The data
//! is discarded; the server never writes to its peers.
//!
//! ## Failure policy
//!
//! Peer closes and resets release the peer's slot and nothing else. Any
//! other read error, and running out of slots, is fatal for the whole
//! server: every connection and the listener are closed and the error is
//! returned to the caller.
//!
//! ## Carry list
//!
//! mio readiness is edge-triggered, so a slot that just returned data may
//! still hold more data, or a FIN, that will never be announced again. Such
//! slots are carried into the next cycle and re-read without waiting until
//! a read would block.

use crate::error::Error;
use crate::runtime::connection::{CapacityExceeded, ConnectionTable};
use crate::runtime::listener::bind_listener;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Bytes drained per read call.
pub const BUFFER_SIZE: usize = 1024;

/// Listener occupies slot 0 of the connection table.
const LISTENER_TOKEN: Token = Token(0);

const EVENTS_CAPACITY: usize = 1024;

/// A peer admitted into the table.
struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
    /// Bytes drained so far.
    received: u64,
}

/// Result of a single drain call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    Data(usize),
    /// Peer shut down its write side.
    Closed,
    /// Peer aborted the connection.
    Reset,
    /// Spurious wakeup, nothing to read.
    WouldBlock,
    Interrupted,
}

/// Single-threaded connection manager owning the listener and every peer.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    connections: ConnectionTable<Peer>,
    buf: [u8; BUFFER_SIZE],
    /// Slots to read this cycle, reused across cycles.
    ready: Vec<usize>,
    /// Slots to re-read next cycle without waiting.
    carry: Vec<usize>,
    bytes_received: u64,
}

impl EventLoop {
    /// Bind the listener on `port` and register it with a fresh poller.
    ///
    /// `capacity` counts the listener slot, so `capacity - 1` peers fit.
    pub fn bind(port: u16, capacity: usize) -> Result<Self, Error> {
        if capacity < 2 {
            return Err(Error::InvalidArgument(format!(
                "capacity must be at least 2, got {capacity}"
            )));
        }

        let mut listener = bind_listener(port)?;
        let poll = Poll::new().map_err(Error::io("create the poller"))?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(Error::io("register the listener"))?;

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener: Some(listener),
            connections: ConnectionTable::new(capacity),
            buf: [0; BUFFER_SIZE],
            ready: Vec::new(),
            carry: Vec::new(),
            bytes_received: 0,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener has been closed",
            )),
        }
    }

    /// Cycle until a fatal error. Every connection is closed by the time
    /// this returns.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            self.turn(None)?;
        }
    }

    /// Run one wait-then-dispatch cycle.
    ///
    /// `timeout` bounds the wait; `None` blocks until something is ready.
    /// On error the loop has already been shut down.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        match self.dispatch(timeout) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    error = %e,
                    open = self.connections.len(),
                    "Fatal error, closing all connections"
                );
                self.shutdown();
                Err(e)
            }
        }
    }

    fn dispatch(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        let timeout = if self.carry.is_empty() {
            timeout
        } else {
            Some(Duration::ZERO)
        };

        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(Error::Io {
                op: "wait for readiness",
                source: e,
            });
        }

        let mut accept = false;
        self.ready.clear();
        self.ready.append(&mut self.carry);
        for event in self.events.iter() {
            match event.token() {
                LISTENER_TOKEN => accept = true,
                Token(slot) => self.ready.push(slot),
            }
        }
        self.ready.sort_unstable();
        self.ready.dedup();

        // Earliest slot first, listener last
        let ready = std::mem::take(&mut self.ready);
        let result = ready.iter().try_for_each(|&slot| self.handle_readable(slot));
        self.ready = ready;
        result?;

        if accept {
            self.accept_connections()?;
        }
        Ok(())
    }

    fn handle_readable(&mut self, slot: usize) -> Result<(), Error> {
        let Some(peer) = self.connections.get_mut(slot) else {
            return Ok(());
        };

        match read_once(&mut peer.stream, &mut self.buf) {
            Ok(ReadOutcome::Data(n)) => {
                peer.received += n as u64;
                self.bytes_received += n as u64;
                trace!(slot, n, "Drained");
                // More data or a FIN may be queued behind this read
                self.carry.push(slot);
            }
            Ok(ReadOutcome::Interrupted) => self.carry.push(slot),
            Ok(ReadOutcome::WouldBlock) => {}
            Ok(ReadOutcome::Closed) => self.close(slot, "closed"),
            Ok(ReadOutcome::Reset) => self.close(slot, "reset"),
            Err(source) => return Err(Error::Read { slot, source }),
        }
        Ok(())
    }

    fn accept_connections(&mut self) -> Result<(), Error> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(());
        };
        let capacity = self.connections.capacity();

        loop {
            let (stream, addr) = match listener.accept() {
                Ok(conn) => conn,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    continue
                }
                Err(ref e) if matches!(e.raw_os_error(), Some(libc::EMFILE | libc::ENFILE)) => {
                    return Err(Error::CapacityExceeded { capacity });
                }
                Err(source) => {
                    return Err(Error::Io {
                        op: "accept a connection",
                        source,
                    })
                }
            };

            let peer = Peer {
                stream,
                addr,
                received: 0,
            };
            let slot = match self.connections.admit(peer) {
                Ok(slot) => slot,
                Err(CapacityExceeded) => {
                    warn!(peer = %addr, capacity, "Connection limit reached");
                    return Err(Error::CapacityExceeded { capacity });
                }
            };

            if let Some(peer) = self.connections.get_mut(slot) {
                // Receive-only: peers never get application data back
                if let Err(e) = peer.stream.shutdown(Shutdown::Write) {
                    debug!(slot, error = %e, "Half-close failed");
                }
                self.poll
                    .registry()
                    .register(&mut peer.stream, Token(slot), Interest::READABLE)
                    .map_err(Error::io("register a connection"))?;
            }

            debug!(slot, peer = %addr, "Accepted connection");
        }
    }

    fn close(&mut self, slot: usize, reason: &'static str) {
        if let Some(mut peer) = self.connections.release(slot) {
            let _ = self.poll.registry().deregister(&mut peer.stream);
            debug!(
                slot,
                peer = %peer.addr,
                bytes = peer.received,
                reason,
                "Connection closed"
            );
        }
    }

    /// Close every connection and the listener.
    pub fn shutdown(&mut self) {
        for (slot, mut peer) in self.connections.drain() {
            let _ = self.poll.registry().deregister(&mut peer.stream);
            debug!(slot, peer = %peer.addr, "Connection closed by shutdown");
        }
        if let Some(mut listener) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut listener);
        }
        self.carry.clear();
    }

    /// Number of open peer connections.
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Occupied peer slots in increasing order.
    pub fn occupied_slots(&self) -> Vec<usize> {
        self.connections.occupied().collect()
    }

    pub fn high_water_mark(&self) -> usize {
        self.connections.high_water_mark()
    }

    pub fn capacity(&self) -> usize {
        self.connections.capacity()
    }

    /// Total bytes drained from all peers since startup.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }
}

/// Drain one buffer's worth from `stream` and classify the result.
///
/// Errors other than reset, would-block and interrupt are returned as is.
fn read_once<R: Read>(stream: &mut R, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    match stream.read(buf) {
        Ok(0) => Ok(ReadOutcome::Closed),
        Ok(n) => Ok(ReadOutcome::Data(n)),
        Err(e) => match e.kind() {
            io::ErrorKind::ConnectionReset => Ok(ReadOutcome::Reset),
            io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            io::ErrorKind::Interrupted => Ok(ReadOutcome::Interrupted),
            _ => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Option<io::Result<usize>>);

    impl Read for Scripted {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.0.take().unwrap_or(Ok(0))
        }
    }

    fn outcome(result: io::Result<usize>) -> io::Result<ReadOutcome> {
        let mut buf = [0u8; BUFFER_SIZE];
        read_once(&mut Scripted(Some(result)), &mut buf)
    }

    #[test]
    fn test_read_classification() {
        assert_eq!(outcome(Ok(17)).unwrap(), ReadOutcome::Data(17));
        assert_eq!(outcome(Ok(0)).unwrap(), ReadOutcome::Closed);
        assert_eq!(
            outcome(Err(io::ErrorKind::ConnectionReset.into())).unwrap(),
            ReadOutcome::Reset
        );
        assert_eq!(
            outcome(Err(io::ErrorKind::WouldBlock.into())).unwrap(),
            ReadOutcome::WouldBlock
        );
        assert_eq!(
            outcome(Err(io::ErrorKind::Interrupted.into())).unwrap(),
            ReadOutcome::Interrupted
        );
    }

    #[test]
    fn test_unclassified_read_error_escalates() {
        let err = outcome(Err(io::Error::from_raw_os_error(libc::EIO))).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EIO));

        assert!(outcome(Err(io::ErrorKind::ConnectionAborted.into())).is_err());
    }

    #[test]
    fn test_bind_rejects_tiny_capacity() {
        assert!(matches!(
            EventLoop::bind(0, 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_shutdown_closes_listener() {
        let mut event_loop = EventLoop::bind(0, 4).unwrap();
        assert!(event_loop.is_listening());
        assert!(event_loop.local_addr().is_ok());

        event_loop.shutdown();
        assert!(!event_loop.is_listening());
        assert!(event_loop.local_addr().is_err());
        assert_eq!(event_loop.open_connections(), 0);
    }
}
