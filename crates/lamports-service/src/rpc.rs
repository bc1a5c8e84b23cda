//! Balance lookups against a Solana JSON-RPC node.

use std::time::Duration;

use async_trait::async_trait;
use lamports_cache::{FetchError, Fetcher};
use serde::{Deserialize, Serialize};

use crate::config::RpcConfig;
use crate::metric;

const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Decodes `input` as base58, returning the number of bytes it represents.
///
/// Only the length is needed to validate a public key, so the bytes themselves are discarded.
fn base58_decoded_len(input: &str) -> Option<usize> {
    // Big-endian base256 digits of the number decoded so far.
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());
    for c in input.bytes() {
        let mut carry = BASE58_ALPHABET.iter().position(|&a| a == c)? as u32;
        for byte in bytes.iter_mut().rev() {
            carry += u32::from(*byte) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    // each leading `1` encodes a leading zero byte
    let zeros = input.bytes().take_while(|&c| c == b'1').count();
    Some(zeros + bytes.len())
}

/// Checks that `address` is a base58 encoded 32 byte public key.
pub fn validate_address(address: &str) -> Result<(), FetchError> {
    let invalid = || FetchError::InvalidKey(address.to_owned());
    if address.is_empty() || address.len() > 44 {
        return Err(invalid());
    }
    match base58_decoded_len(address) {
        Some(32) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Renders an amount of lamports as SOL with all nine fractional digits.
pub fn format_sol(lamports: u64) -> String {
    format!(
        "{}.{:09}",
        lamports / LAMPORTS_PER_SOL,
        lamports % LAMPORTS_PER_SOL
    )
}

#[derive(Debug, Serialize)]
struct Commitment<'a> {
    commitment: &'a str,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (&'a str, Commitment<'a>),
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<BalanceResult>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// A [`Fetcher`] that reads wallet balances via `getBalance`.
///
/// Values are SOL amounts formatted by [`format_sol`].
#[derive(Debug, Clone)]
pub struct SolanaRpc {
    client: reqwest::Client,
    url: String,
    commitment: String,
}

impl SolanaRpc {
    pub fn new(config: &RpcConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            commitment: config.commitment.clone(),
        })
    }

    /// Fetches the balance of `address` in lamports.
    pub async fn get_balance(&self, address: &str) -> Result<u64, FetchError> {
        validate_address(address)?;

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "getBalance",
            params: (
                address,
                Commitment {
                    commitment: &self.commitment,
                },
            ),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                metric!(counter("rpc.requests") += 1, "status" => "transport");
                FetchError::Upstream(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            metric!(counter("rpc.requests") += 1, "status" => status.as_str());
            return Err(FetchError::Upstream(format!(
                "rpc endpoint responded with {status}"
            )));
        }

        let body: RpcResponse = response.json().await.map_err(|err| {
            metric!(counter("rpc.requests") += 1, "status" => "malformed");
            FetchError::Malformed(err.to_string())
        })?;

        match body {
            RpcResponse {
                error: Some(error), ..
            } => {
                metric!(counter("rpc.requests") += 1, "status" => "rpc_error");
                Err(FetchError::Upstream(format!(
                    "rpc error {}: {}",
                    error.code, error.message
                )))
            }
            RpcResponse {
                result: Some(result),
                ..
            } => {
                metric!(counter("rpc.requests") += 1, "status" => "ok");
                Ok(result.value)
            }
            _ => {
                metric!(counter("rpc.requests") += 1, "status" => "malformed");
                Err(FetchError::Malformed("response carries no result".into()))
            }
        }
    }
}

#[async_trait]
impl Fetcher for SolanaRpc {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, key: &str) -> Result<String, FetchError> {
        let lamports = self.get_balance(key).await?;
        tracing::debug!(lamports, "Fetched balance");
        Ok(format_sol(lamports))
    }
}
