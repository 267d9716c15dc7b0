//! ccbench: a minimal TCP congestion-control exerciser.
//!
//! Two programs share this library:
//! - `client` streams a pseudo-random payload over one connection using a
//!   chosen kernel congestion control algorithm
//! - `server` accepts any number of such connections on a single thread and
//!   drains whatever they send
//!
//! The server never replies; the wire format is a raw byte stream.

pub mod client;
pub mod config;
pub mod error;
pub mod runtime;

pub use error::Error;
