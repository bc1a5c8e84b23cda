use std::time::Duration;

use futures::future;
use lamports_service::service::{CacheStatus, WalletBalance};

use crate::{SYSTEM_PROGRAM, TOKEN_PROGRAM, WRAPPED_SOL, setup_service};

#[tokio::test]
async fn test_balances_in_request_order() {
    let (service, rpc) = setup_service(|_| {});
    rpc.set_balance(WRAPPED_SOL, 2_000_000_000);
    rpc.set_balance(TOKEN_PROGRAM, 5);

    let wallets = vec![
        TOKEN_PROGRAM.to_owned(),
        WRAPPED_SOL.to_owned(),
        SYSTEM_PROGRAM.to_owned(),
    ];
    let balances = service.get_balances(&wallets).await;

    assert_eq!(
        balances,
        vec![
            WalletBalance {
                wallet: TOKEN_PROGRAM.into(),
                balance: "0.000000005".into(),
                cache: CacheStatus::Miss,
            },
            WalletBalance {
                wallet: WRAPPED_SOL.into(),
                balance: "2.000000000".into(),
                cache: CacheStatus::Miss,
            },
            WalletBalance {
                wallet: SYSTEM_PROGRAM.into(),
                balance: "0.000000000".into(),
                cache: CacheStatus::Miss,
            },
        ]
    );

    // served from the cache the second time around
    let balances = service.get_balances(&wallets).await;
    assert!(balances.iter().all(|b| b.cache == CacheStatus::Hit));
    assert_eq!(rpc.accesses(), 3);
}

#[tokio::test]
async fn test_concurrent_requests_coalesce() {
    let (service, rpc) = setup_service(|_| {});
    rpc.set_balance(WRAPPED_SOL, 42);
    rpc.set_delay(Duration::from_millis(100));

    let wallets = vec![WRAPPED_SOL.to_owned()];
    let requests = (0..5).map(|_| service.get_balances(&wallets));
    let balances: Vec<_> = future::join_all(requests)
        .await
        .into_iter()
        .flatten()
        .collect();

    assert_eq!(rpc.hits(WRAPPED_SOL), 1);
    assert!(balances.iter().all(|b| b.balance == "0.000000042"));
    let misses = balances
        .iter()
        .filter(|b| b.cache == CacheStatus::Miss)
        .count();
    assert_eq!(misses, 1);
}

#[tokio::test]
async fn test_duplicates_within_request() {
    let (service, rpc) = setup_service(|_| {});
    rpc.set_delay(Duration::from_millis(50));

    let wallets = vec![SYSTEM_PROGRAM.to_owned(), SYSTEM_PROGRAM.to_owned()];
    let balances = service.get_balances(&wallets).await;

    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].cache, CacheStatus::Miss);
    assert_eq!(balances[1].cache, CacheStatus::Hit);
    assert_eq!(rpc.hits(SYSTEM_PROGRAM), 1);
}

#[tokio::test]
async fn test_invalid_wallet() {
    let (service, rpc) = setup_service(|_| {});

    let wallets = vec!["nope".to_owned(), WRAPPED_SOL.to_owned()];
    let balances = service.get_balances(&wallets).await;

    assert_eq!(balances[0].balance, "invalid key: nope");
    assert_eq!(balances[0].cache, CacheStatus::Miss);
    assert_eq!(balances[1].balance, "0.000000000");
    assert_eq!(rpc.accesses(), 1);
}

#[tokio::test]
async fn test_upstream_errors_are_not_cached() {
    let (service, rpc) = setup_service(|_| {});
    rpc.set_failing(true);

    let wallets = vec![WRAPPED_SOL.to_owned()];
    let balances = service.get_balances(&wallets).await;
    assert!(balances[0].balance.contains("-32602"));

    rpc.set_failing(false);
    let balances = service.get_balances(&wallets).await;
    assert_eq!(balances[0].balance, "0.000000000");
    assert_eq!(balances[0].cache, CacheStatus::Miss);
    assert_eq!(rpc.hits(WRAPPED_SOL), 2);
}

#[tokio::test]
async fn test_queue_timeout() {
    let (service, rpc) = setup_service(|config| {
        config.queue.timeout = Duration::from_millis(100);
    });
    rpc.set_delay(Duration::from_secs(1));

    let wallets = vec![WRAPPED_SOL.to_owned()];
    let balances = service.get_balances(&wallets).await;

    assert_eq!(balances[0].balance, "request timed out");
    assert_eq!(balances[0].cache, CacheStatus::Miss);
    assert!(!service.resolver().queue().registry().contains(WRAPPED_SOL));
}
