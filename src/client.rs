//! Streaming client: validates its target, picks a congestion control
//! algorithm and pushes a pseudo-random payload over one connection.
//!
//! All validation happens before any socket is created, so a bad algorithm
//! or hostname never touches the network.

use crate::config::CongestionControl;
use crate::error::Error;
use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use tracing::info;

/// Where Linux lists the congestion control algorithms it has loaded.
pub const AVAILABLE_ALGORITHMS_PATH: &str =
    "/proc/sys/net/ipv4/tcp_available_congestion_control";

/// Split a whitespace-separated algorithm list.
pub fn parse_available(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_owned).collect()
}

/// Read the host's enabled algorithms from `path`.
pub fn available_algorithms(path: &Path) -> Result<Vec<String>, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(Error::io("read available congestion control algorithms"))?;
    Ok(parse_available(&text))
}

/// Check that `algorithm` appears in the host's list.
pub fn ensure_available(algorithm: CongestionControl, available: &[String]) -> Result<(), Error> {
    if available.iter().any(|a| a == algorithm.as_str()) {
        Ok(())
    } else {
        Err(Error::UnavailableAlgorithm {
            requested: algorithm,
            available: available.to_vec(),
        })
    }
}

/// Hostnames may only contain ASCII letters, digits, dots and dashes.
pub fn is_valid_hostname(host: &str) -> bool {
    host.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
}

/// Turn the `<server>` argument into a socket address.
///
/// Dotted IPv4 literals are used as is. Anything else must look like a
/// hostname and is resolved, preferring IPv4 results.
pub fn resolve_server(server: &str, port: u16) -> Result<SocketAddr, Error> {
    if let Ok(ip) = server.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::from((ip, port)));
    }

    if !is_valid_hostname(server) {
        return Err(Error::InvalidArgument(format!(
            "Invalid server IP address or hostname '{server}'. Have you typed it correctly?"
        )));
    }

    info!(host = server, "Resolving hostname");
    let resolve_err = || Error::Resolve {
        host: server.to_string(),
    };
    let addrs: Vec<SocketAddr> = (server, port)
        .to_socket_addrs()
        .map_err(|_| resolve_err())?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(resolve_err)
}

/// `size` pseudo-random bytes.
pub fn generate_payload(size: usize) -> Vec<u8> {
    let mut payload = vec![0u8; size];
    rand::thread_rng().fill(&mut payload[..]);
    payload
}

/// Connect to `addr` using `algorithm` and write the whole payload.
///
/// Returns the number of bytes sent. The connection is closed on return.
pub fn send_payload(
    addr: SocketAddr,
    algorithm: CongestionControl,
    payload: &[u8],
) -> Result<usize, Error> {
    info!("Creating socket");
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(Error::io("create a socket"))?;

    info!(algorithm = %algorithm, "Setting congestion control algorithm");
    set_congestion(&socket, algorithm)?;

    info!(addr = %addr, "Connecting to server");
    socket
        .connect(&addr.into())
        .map_err(Error::io("connect to the server"))?;

    let mut stream: TcpStream = socket.into();
    info!(bytes = payload.len(), "Sending bytes to server");
    stream
        .write_all(payload)
        .map_err(Error::io("send bytes to the server"))?;

    drop(stream);
    Ok(payload.len())
}

#[cfg(any(target_os = "linux", target_os = "freebsd"))]
fn set_congestion(socket: &Socket, algorithm: CongestionControl) -> Result<(), Error> {
    socket
        .set_tcp_congestion(algorithm.as_str().as_bytes())
        .map_err(Error::io("set the congestion control algorithm"))
}

#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
fn set_congestion(_socket: &Socket, _algorithm: CongestionControl) -> Result<(), Error> {
    Err(Error::Io {
        op: "set the congestion control algorithm",
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "TCP_CONGESTION is not supported on this platform",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_available() {
        assert_eq!(parse_available("reno cubic\n"), vec!["reno", "cubic"]);
        assert_eq!(parse_available("  bbr\treno  vegas \n"), vec!["bbr", "reno", "vegas"]);
        assert!(parse_available("\n").is_empty());
    }

    #[test]
    fn test_ensure_available() {
        let list = parse_available("reno cubic");
        assert!(ensure_available(CongestionControl::Cubic, &list).is_ok());

        match ensure_available(CongestionControl::Vegas, &list) {
            Err(Error::UnavailableAlgorithm {
                requested,
                available,
            }) => {
                assert_eq!(requested, CongestionControl::Vegas);
                assert_eq!(available, list);
            }
            other => panic!("expected unavailable algorithm, got {other:?}"),
        }
    }

    #[test]
    fn test_hostname_validation() {
        assert!(is_valid_hostname("localhost"));
        assert!(is_valid_hostname("my-host.example.com"));
        assert!(is_valid_hostname(""));
        assert!(!is_valid_hostname("bad/host"));
        assert!(!is_valid_hostname("under_score"));
        assert!(!is_valid_hostname("spa ce"));
        assert!(!is_valid_hostname("ünicode"));
    }

    #[test]
    fn test_resolve_ipv4_literal() {
        let addr = resolve_server("10.1.2.3", 6000).unwrap();
        assert_eq!(addr, "10.1.2.3:6000".parse().unwrap());
    }

    #[test]
    fn test_resolve_rejects_invalid_hostname() {
        assert!(matches!(
            resolve_server("evil/../host", 5000),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_generate_payload_size() {
        assert_eq!(generate_payload(1000).len(), 1000);
        assert_eq!(generate_payload(1).len(), 1);
    }
}
