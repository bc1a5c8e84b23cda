use lamports_service::config::{CacheBackend, Config};
use lamports_service::service::BalanceService;
use lamports_test as test;

pub use test::FakeRpc;

pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
pub const WRAPPED_SOL: &str = "So11111111111111111111111111111111111111112";
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Creates a configuration talking to `rpc` and caching in memory.
///
/// The `update_config` closure can modify any default configuration if needed.
pub fn test_config(rpc: &FakeRpc, update_config: impl FnOnce(&mut Config)) -> Config {
    let mut config = Config::default();
    config.rpc.url = rpc.url();
    config.cache.backend = CacheBackend::Memory;
    update_config(&mut config);
    config
}

/// Setup tests and create a balance service backed by a fake RPC node.
///
/// Keep the returned [`FakeRpc`] alive until the test has finished.
pub fn setup_service(update_config: impl FnOnce(&mut Config)) -> (BalanceService, FakeRpc) {
    test::setup();

    let rpc = FakeRpc::new();
    let config = test_config(&rpc, update_config);
    let service = BalanceService::create(config).unwrap();
    (service, rpc)
}
