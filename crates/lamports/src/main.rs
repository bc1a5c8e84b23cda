//! Lamports.
//!
//! Lamports is a web service that reports the SOL balance of Solana wallets. Lookups for the
//! same wallet are coalesced across all clients and answered from a short-lived cache, so bursts
//! of traffic translate into few calls to the upstream RPC node.

#![warn(clippy::all)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;


fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
