//! Helpers for testing the web server and service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using a [`Server`] or [`FakeRpc`], make sure it is held until all requests to it
//!    have been made. Dropping it stops serving, and all further connections fail.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use reqwest::Url;
use serde_json::{Value, json};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `lamports` crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new(
            "lamports=trace,lamports_cache=trace,lamports_service=trace",
        ))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped. Handlers may extract the peer address via
/// [`ConnectInfo<SocketAddr>`](axum::extract::ConnectInfo).
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Creates a new test server serving `router`.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Default)]
struct RpcState {
    balances: HashMap<String, u64>,
    hits: BTreeMap<String, usize>,
    delay: Duration,
    failing: bool,
}

/// A fake Solana JSON-RPC node answering `getBalance`.
///
/// Unknown wallets have a balance of zero. Every request is counted per wallet, so tests can
/// assert how many upstream calls were made.
pub struct FakeRpc {
    server: Server,
    state: Arc<Mutex<RpcState>>,
}

async fn get_balance(
    State(state): State<Arc<Mutex<RpcState>>>,
    Json(request): Json<Value>,
) -> Json<Value> {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let address = request
        .pointer("/params/0")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let (delay, failing, balance) = {
        let mut state = state.lock().unwrap();
        *state.hits.entry(address.clone()).or_default() += 1;
        let balance = state.balances.get(&address).copied().unwrap_or(0);
        (state.delay, state.failing, balance)
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if failing {
        return Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32602, "message": "Invalid param: could not find account"},
        }));
    }

    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"context": {"slot": 1}, "value": balance},
    }))
}

impl FakeRpc {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(RpcState::default()));
        let router = Router::new()
            .route("/", post(get_balance))
            .with_state(state.clone());

        Self {
            server: Server::with_router(router),
            state,
        }
    }

    /// Sets the balance reported for `address`.
    pub fn set_balance(&self, address: &str, lamports: u64) {
        let mut state = self.state.lock().unwrap();
        state.balances.insert(address.to_owned(), lamports);
    }

    /// Delays every following response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Makes every following request fail with a JSON-RPC error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// The number of requests made for `address`.
    pub fn hits(&self, address: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.hits.get(address).copied().unwrap_or(0)
    }

    /// The total number of requests made so far.
    pub fn accesses(&self) -> usize {
        self.state.lock().unwrap().hits.values().sum()
    }

    /// The URL of the JSON-RPC endpoint.
    pub fn url(&self) -> String {
        self.server.url("/").to_string()
    }
}

impl Default for FakeRpc {
    fn default() -> Self {
        Self::new()
    }
}
