//! ccbench client: sends a pseudo-random payload to a ccbench server.

use ccbench::client::{self, AVAILABLE_ALGORITHMS_PATH};
use ccbench::config::ClientArgs;
use ccbench::Error;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = ClientArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(sent) => {
            info!(bytes = sent, "Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &ClientArgs) -> Result<usize, Error> {
    // Everything that can reject the arguments runs before the socket exists
    let available = client::available_algorithms(Path::new(AVAILABLE_ALGORITHMS_PATH))?;
    client::ensure_available(args.congestion, &available)?;
    let addr = client::resolve_server(&args.server, args.port)?;

    info!(
        addr = %addr,
        port = args.port,
        size = args.size,
        congestion = %args.congestion,
        "Configuration"
    );

    let payload = client::generate_payload(args.size);
    client::send_payload(addr, args.congestion, &payload)
}
