use lamports_cache::{FetchError, Fetcher};
use lamports_service::rpc::SolanaRpc;

use crate::{FakeRpc, SYSTEM_PROGRAM, WRAPPED_SOL, test_config};

#[tokio::test]
async fn test_fetch_balance() {
    lamports_test::setup();
    let fake = FakeRpc::new();
    fake.set_balance(WRAPPED_SOL, 1_500_000_000);
    let rpc = SolanaRpc::new(&test_config(&fake, |_| {}).rpc).unwrap();

    assert_eq!(rpc.get_balance(WRAPPED_SOL).await, Ok(1_500_000_000));
    assert_eq!(rpc.fetch(WRAPPED_SOL).await.unwrap(), "1.500000000");
    assert_eq!(rpc.fetch(SYSTEM_PROGRAM).await.unwrap(), "0.000000000");
    assert_eq!(fake.hits(WRAPPED_SOL), 2);
}

#[tokio::test]
async fn test_rpc_error() {
    lamports_test::setup();
    let fake = FakeRpc::new();
    fake.set_failing(true);
    let rpc = SolanaRpc::new(&test_config(&fake, |_| {}).rpc).unwrap();

    let error = rpc.fetch(WRAPPED_SOL).await.unwrap_err();
    assert!(matches!(error, FetchError::Upstream(ref msg) if msg.contains("-32602")));
}

#[tokio::test]
async fn test_invalid_address_stays_local() {
    lamports_test::setup();
    let fake = FakeRpc::new();
    let rpc = SolanaRpc::new(&test_config(&fake, |_| {}).rpc).unwrap();

    let error = rpc.fetch("not-a-wallet").await.unwrap_err();
    assert_eq!(error, FetchError::InvalidKey("not-a-wallet".into()));
    assert_eq!(fake.accesses(), 0);
}
