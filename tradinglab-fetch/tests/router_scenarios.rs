use std::sync::Arc;
use std::time::Duration;

use tradinglab_core::{Exchange, FetcherError, Provider, StockBasicInfo};
use tradinglab_fetch::{Registry, Router};
use tradinglab_mock::MockProvider;
use tradinglab_types::{BackoffConfig, CallOptions, Method, RouterConfig};

fn basic_info(symbol: &str) -> StockBasicInfo {
    StockBasicInfo {
        symbol: symbol.to_string(),
        exchange: Exchange::SH,
        section: "主板".to_string(),
        stock_type: Some("A股".to_string()),
        name: "Example Co".to_string(),
        listing_date: None,
        industry: None,
        total_shares: None,
        float_shares: None,
        total_market_value: None,
        float_market_value: None,
        last_update: chrono::Utc::now(),
    }
}

/// S5 (provider failover): two equally-weighted providers, one unhealthy.
/// The call must land on the healthy one and the unhealthy one's counters
/// must not move.
#[tokio::test]
async fn unhealthy_provider_is_skipped_in_favor_of_its_healthy_peer() {
    let p1 = Arc::new(MockProvider::builder("p1").weight(1.0).build());
    let p2 = Arc::new(MockProvider::builder("p2").weight(1.0).build());
    p1.set_healthy(false);
    p2.set_basic_info(basic_info("600000"));

    let config = RouterConfig::default();
    let registry =
        Registry::from_providers(vec![p1.clone() as Arc<dyn Provider>, p2.clone() as Arc<dyn Provider>], &config)
            .unwrap();
    let router = Router::new(Arc::new(registry), config);

    let result = router
        .get_stock_basic_info(Exchange::SH, "600000", CallOptions::default())
        .await
        .unwrap();
    assert_eq!(result.symbol, "600000");

    let stat = router.stat().await;
    let p1_reg = stat
        .for_method(Method::GetStockBasicInfo)
        .into_iter()
        .find(|r| r.provider == p1.key())
        .unwrap();
    let p2_reg = stat
        .for_method(Method::GetStockBasicInfo)
        .into_iter()
        .find(|r| r.provider == p2.key())
        .unwrap();
    assert_eq!(p1_reg.calls, 0);
    assert_eq!(p2_reg.calls, 1);
}

/// S6 (retry then fail): the sole provider fails every attempt; the router
/// must exhaust `retries`, mark the provider unhealthy and decay its EMA.
#[tokio::test]
async fn exhausting_retries_marks_the_provider_unhealthy_and_decays_success_rate() {
    let provider = Arc::new(MockProvider::builder("solo").weight(1.0).build());
    provider.fail_calls_for("600001");

    let config = RouterConfig {
        retries: 3,
        backoff: BackoffConfig {
            initial: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            factor: 2.0,
            jitter_percent: 0,
        },
        provider_timeout: Duration::from_millis(50),
        ..RouterConfig::default()
    };
    let registry = Registry::from_providers(vec![provider.clone() as Arc<dyn Provider>], &config).unwrap();
    let router = Router::new(Arc::new(registry), config);

    let err = router
        .fetch_stock_daily_data(
            "600001",
            "2024-01-02".parse().unwrap(),
            "2024-01-03".parse().unwrap(),
            CallOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetcherError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(provider.call_count(), 3);
    assert!(!provider.is_healthy());

    let stat = router.stat().await;
    let reg = stat
        .for_method(Method::FetchStockDailyData)
        .into_iter()
        .find(|r| r.provider == provider.key())
        .unwrap();
    assert!(reg.success_rate < 1.0);
    assert_eq!(reg.errors, 1);
}

/// Dropping a call future mid-flight must not poison the registration: the
/// active count returns to zero and a later call still succeeds.
#[tokio::test]
async fn cancelling_an_in_flight_call_leaves_the_registration_usable() {
    let provider = Arc::new(MockProvider::builder("solo").weight(1.0).build());
    provider.set_daily_bars(
        "600002",
        vec![],
    );
    provider.set_behavior("600002", tradinglab_mock::MockBehavior::Delay(Duration::from_secs(5)));

    let config = RouterConfig::default();
    let registry = Registry::from_providers(vec![provider.clone() as Arc<dyn Provider>], &config).unwrap();
    let router = Arc::new(Router::new(Arc::new(registry), config));

    let r = Arc::clone(&router);
    let call = tokio::spawn(async move {
        r.fetch_stock_daily_data(
            "600002",
            "2024-01-02".parse().unwrap(),
            "2024-01-03".parse().unwrap(),
            CallOptions::default(),
        )
        .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    call.abort();
    let _ = call.await;

    let stat = router.stat().await;
    let reg = stat
        .for_method(Method::FetchStockDailyData)
        .into_iter()
        .find(|r| r.provider == provider.key())
        .unwrap();
    assert_eq!(reg.active, 0);
}
