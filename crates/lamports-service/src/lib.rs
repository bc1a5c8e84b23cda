//! Solana wallet balance lookups behind a coalescing cache.
//!
//! This crate holds everything the `lamports` server needs besides HTTP: configuration,
//! metrics, the Solana RPC client, license checks and rate limiting.

#[macro_use]
pub mod metrics;

pub mod config;
pub mod licenses;
pub mod ratelimit;
pub mod rpc;
pub mod service;
