//! Errors shared by the server and the client.
//!
//! Every variant is fatal for the process that hits it. Peer closes and
//! resets never surface here; the event loop recovers from those locally.

use crate::config::{CongestionControl, ConfigError};
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// Configuration could not be loaded.
    Config(ConfigError),
    /// A command-line value failed validation.
    InvalidArgument(String),
    /// The requested algorithm is not enabled on this host.
    UnavailableAlgorithm {
        requested: CongestionControl,
        available: Vec<String>,
    },
    /// A socket or system call failed.
    Io { op: &'static str, source: io::Error },
    /// The server hostname did not resolve to any address.
    Resolve { host: String },
    /// Every connection slot (or file descriptor) is in use.
    CapacityExceeded { capacity: usize },
    /// A read failed with something other than a reset.
    Read { slot: usize, source: io::Error },
}

impl Error {
    pub(crate) fn io(op: &'static str) -> impl FnOnce(io::Error) -> Error {
        move |source| Error::Io { op, source }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "{e}"),
            Error::InvalidArgument(msg) => f.write_str(msg),
            Error::UnavailableAlgorithm {
                requested,
                available,
            } => {
                write!(
                    f,
                    "Congestion control algorithm '{requested}' is not enabled on this system. \
                     Enabled algorithms: {}",
                    available.join(", ")
                )
            }
            Error::Io { op, source } => write!(f, "Failed to {op}: {source}"),
            Error::Resolve { host } => {
                write!(f, "Invalid server IP address or hostname: '{host}' did not resolve")
            }
            Error::CapacityExceeded { capacity } => {
                write!(f, "Too many files open: all {capacity} connection slots are in use")
            }
            Error::Read { slot, source } => {
                write!(f, "Failed reading from client in slot {slot}: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Io { source, .. } | Error::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}
