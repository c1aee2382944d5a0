use binance_futures_bot::audit::AuditLog;
use binance_futures_bot::config::{Config, Network};
use binance_futures_bot::exchange::{BinanceClient, ExchangeClient};
use binance_futures_bot::trading::{OrderExecutor, RetryPolicy};

/// Testnet config from the environment, if credentials are present.
fn testnet_config() -> Option<Config> {
    let config = Config::load().ok()?;
    config.credentials(Network::Testnet).ok()?;
    Some(config)
}

#[tokio::test]
#[ignore = "requires BINANCE_API_KEY/BINANCE_API_SECRET for the futures testnet"]
async fn testnet_account_and_time() {
    let Some(config) = testnet_config() else {
        eprintln!("Skipping: no testnet credentials");
        return;
    };
    let credentials = config.credentials(Network::Testnet).unwrap();
    let client = BinanceClient::new(&config, Network::Testnet, credentials).unwrap();

    let server_ms = client.server_time().await.unwrap();
    assert!(server_ms > 0);

    let executor = OrderExecutor::new(
        client,
        AuditLog::memory(),
        config.validation_policy(),
        RetryPolicy::from_config(&config),
    );
    let balance = executor.account_balance().await.unwrap();
    println!("Testnet wallet balance: {}", balance.total_wallet_balance);

    let price = executor.ticker_price("BTCUSDT").await.unwrap();
    assert!(price > rust_decimal::Decimal::ZERO);
}
