//! Single-threaded sink server runtime.
//!
//! - `listener`: binds the listening socket
//! - `connection`: fixed-capacity slot table for open peers
//! - `event_loop`: mio readiness loop that accepts and drains peers

mod connection;
mod event_loop;
mod listener;

pub use connection::{CapacityExceeded, ConnectionTable};
pub use event_loop::{EventLoop, BUFFER_SIZE};
pub use listener::{bind_listener, BACKLOG};

use crate::config::ServerConfig;
use crate::error::Error;
use tracing::{info, warn};

/// Upper bound on the slot table when the open-file limit is very large.
const MAX_CAPACITY: usize = 65536;

/// Slot count used when the open-file limit can't be read.
const FALLBACK_CAPACITY: usize = 1024;

/// Run the server until a fatal error.
pub fn run(config: &ServerConfig) -> Result<(), Error> {
    let capacity = config.capacity.unwrap_or_else(default_capacity);
    let mut event_loop = EventLoop::bind(config.port, capacity)?;

    let addr = event_loop
        .local_addr()
        .map_err(Error::io("read the listener address"))?;
    info!(addr = %addr, capacity, "Listening");

    event_loop.run()
}

/// Slot count derived from the process's soft open-file limit.
pub fn default_capacity() -> usize {
    match open_file_limit() {
        Some(limit) => limit.clamp(2, MAX_CAPACITY as u64) as usize,
        None => {
            warn!(
                capacity = FALLBACK_CAPACITY,
                "Could not read the open-file limit"
            );
            FALLBACK_CAPACITY
        }
    }
}

fn open_file_limit() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes into the struct we hand it.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    (rc == 0).then_some(limit.rlim_cur as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity_in_range() {
        let capacity = default_capacity();
        assert!((2..=MAX_CAPACITY).contains(&capacity));
    }
}
