//! Listening socket setup.

use crate::error::Error;
use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};

/// Pending-connection queue length passed to `listen`.
pub const BACKLOG: i32 = 128;

/// Bind a non-blocking listener on the IPv4 wildcard address.
///
/// Every failure here is a startup configuration error, so nothing is retried.
pub fn bind_listener(port: u16) -> Result<TcpListener, Error> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(Error::io("create a socket"))?;

    socket
        .set_reuse_address(true)
        .map_err(Error::io("set SO_REUSEADDR"))?;
    socket
        .set_nonblocking(true)
        .map_err(Error::io("make the socket non-blocking"))?;
    socket
        .bind(&addr.into())
        .map_err(Error::io("bind the socket"))?;
    socket
        .listen(BACKLOG)
        .map_err(Error::io("make the socket listening"))?;

    Ok(TcpListener::from_std(socket.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = bind_listener(0).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let first = bind_listener(0).unwrap();
        let port = first.local_addr().unwrap().port();

        match bind_listener(port) {
            Err(Error::Io { op, .. }) => assert_eq!(op, "bind the socket"),
            other => panic!("expected bind failure, got {other:?}"),
        }
    }
}
