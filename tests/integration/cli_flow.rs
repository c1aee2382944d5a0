use binance_futures_bot::audit::{Operation, Outcome};
use binance_futures_bot::commands::CommandOutcome;
use binance_futures_bot::error::{BotError, ExchangeError};
use binance_futures_bot::exchange::{MockCall, MockConfig, MockExchangeClient, MockOutcome};
use binance_futures_bot::trading::{OrderStatus, Side};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use crate::{mock_app, run_args};

#[tokio::test]
async fn market_order_fills_at_ticker() {
    let mock = MockExchangeClient::new();
    mock.set_ticker("BTCUSDT", dec!(50000));
    let app = mock_app(&mock);

    let outcome = assert_ok!(run_args(&app, &["market", "BUY", "BTCUSDT", "0.01"]).await);

    match &outcome {
        CommandOutcome::Order { request, result } => {
            assert_eq!(request.side, Side::Buy);
            assert_eq!(result.status, OrderStatus::Filled);
            assert_eq!(result.avg_price, dec!(50000));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.to_string().contains("MARKET BUY 0.01 BTCUSDT"));
}

#[tokio::test]
async fn invalid_order_never_reaches_the_exchange() {
    let mock = MockExchangeClient::new();
    let app = mock_app(&mock);

    let err = assert_err!(run_args(&app, &["limit", "BUY", "btcusdt", "-1", "0"]).await);

    match &err {
        BotError::Validation(v) => {
            assert!(v.mentions("symbol"));
            assert!(v.mentions("quantity"));
            assert!(v.mentions("price"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.exit_code(), BotError::EXIT_VALIDATION);
    assert!(mock.calls().is_empty());

    let records = app.executor().audit().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].operation, Operation::Validate);
    assert_eq!(records[0].outcome, Outcome::ValidationFailed);
}

#[tokio::test]
async fn cancel_all_then_info_shows_no_open_orders() {
    let mock = MockExchangeClient::new();
    let app = mock_app(&mock);

    assert_ok!(run_args(&app, &["limit", "BUY", "BTCUSDT", "0.01", "48000"]).await);
    assert_ok!(run_args(&app, &["limit", "SELL", "BTCUSDT", "0.01", "52000"]).await);
    assert_eq!(mock.resting_orders().len(), 2);

    let cancelled = assert_ok!(run_args(&app, &["cancel", "BTCUSDT", "--all"]).await);
    assert!(matches!(cancelled, CommandOutcome::CancelledAll { ref symbol } if symbol == "BTCUSDT"));

    let info = assert_ok!(run_args(&app, &["info", "--symbol", "BTCUSDT"]).await);
    match info {
        CommandOutcome::Info { symbol: Some(details), .. } => {
            assert!(details.open_orders.is_empty());
            assert!(details.position.is_none());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn exchange_rejection_is_not_retried() {
    let mock = MockExchangeClient::new();
    mock.script_placements([MockOutcome::reject(-2019, "Margin is insufficient.")]);
    let app = mock_app(&mock);

    let err = assert_err!(run_args(&app, &["limit", "BUY", "BTCUSDT", "0.01", "48000"]).await);

    assert!(matches!(
        err,
        BotError::Exchange(ExchangeError::Rejected { code: -2019, .. })
    ));
    assert_eq!(err.exit_code(), BotError::EXIT_EXCHANGE);
    assert_eq!(mock.placed_requests().len(), 1);
}

#[tokio::test]
async fn transient_network_failure_is_retried() {
    let mock = MockExchangeClient::new();
    mock.script_placements([MockOutcome::NetworkFailure, MockOutcome::Accept]);
    let app = mock_app(&mock);

    let outcome = assert_ok!(run_args(&app, &["limit", "SELL", "BTCUSDT", "0.01", "52000"]).await);

    assert_eq!(outcome.exit_code(), 0);
    let placed = mock.placed_requests();
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0].client_order_id, placed[1].client_order_id);

    let outcomes: Vec<Outcome> = app
        .executor()
        .audit()
        .records()
        .iter()
        .map(|r| r.outcome)
        .collect();
    assert_eq!(outcomes, vec![Outcome::NetworkFailure, Outcome::Success]);
}

#[tokio::test]
async fn offline_exchange_exits_with_network_code() {
    let mock = MockExchangeClient::with_config(MockConfig {
        offline: true,
        ..Default::default()
    });
    let app = mock_app(&mock);

    let err = assert_err!(run_args(&app, &["time-sync"]).await);

    assert_eq!(err.exit_code(), BotError::EXIT_NETWORK);
    // initial attempt plus three retries
    assert_eq!(mock.calls().len(), 4);
}

#[tokio::test]
async fn oco_stop_loss_rejection_cancels_take_profit() {
    let mock = MockExchangeClient::new();
    mock.script_placements([
        MockOutcome::Accept,
        MockOutcome::reject(-2021, "Order would immediately trigger."),
    ]);
    let app = mock_app(&mock);

    let err = assert_err!(
        run_args(
            &app,
            &["oco", "BUY", "BTCUSDT", "0.01", "50000", "49000", "52000"]
        )
        .await
    );

    assert_eq!(err.exit_code(), BotError::EXIT_EXCHANGE);
    assert!(mock.resting_orders().is_empty());
    assert!(mock
        .calls()
        .iter()
        .any(|c| matches!(c, MockCall::CancelOrder { .. })));
}

#[tokio::test]
async fn oco_places_both_closing_legs() {
    let mock = MockExchangeClient::new();
    let app = mock_app(&mock);

    let outcome = assert_ok!(
        run_args(
            &app,
            &["oco", "BUY", "BTCUSDT", "0.01", "50000", "49000", "52000", "--reduce-only"]
        )
        .await
    );

    assert!(matches!(outcome, CommandOutcome::Oco { .. }));
    let placed = mock.placed_requests();
    assert_eq!(placed.len(), 2);
    assert!(placed.iter().all(|r| r.side == Side::Sell && r.reduce_only));
    assert_eq!(placed[0].price, Some(dec!(52000)));
    assert_eq!(placed[1].price, Some(dec!(49000)));
}
