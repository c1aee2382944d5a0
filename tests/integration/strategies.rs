use binance_futures_bot::commands::CommandOutcome;
use binance_futures_bot::exchange::{MockExchangeClient, MockOutcome};
use binance_futures_bot::strategy::RunState;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use tokio_test::assert_ok;

use crate::{mock_app, run_args};

#[tokio::test]
async fn twap_places_every_slice() {
    let mock = MockExchangeClient::new();
    mock.set_ticker("BTCUSDT", dec!(50000));
    let app = mock_app(&mock);

    let outcome = assert_ok!(
        run_args(&app, &["twap", "BUY", "BTCUSDT", "0.1", "60", "--intervals", "4"]).await
    );

    match &outcome {
        CommandOutcome::Twap { report, .. } => {
            assert_eq!(report.state, RunState::Completed);
            assert_eq!(report.completed.len(), 4);
            assert_eq!(report.filled_quantity(), dec!(0.1));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(mock.placed_requests().len(), 4);
}

#[tokio::test]
async fn twap_aborts_on_rejected_slice() {
    let mock = MockExchangeClient::new();
    mock.set_ticker("BTCUSDT", dec!(50000));
    mock.script_placements([
        MockOutcome::Accept,
        MockOutcome::reject(-2019, "Margin is insufficient."),
    ]);
    let app = mock_app(&mock);

    let outcome = assert_ok!(
        run_args(&app, &["twap", "SELL", "BTCUSDT", "0.1", "60", "--intervals", "4"]).await
    );

    match &outcome {
        CommandOutcome::Twap { report, .. } => {
            assert_eq!(report.state, RunState::Aborted);
            assert_eq!(report.completed.len(), 1);
            assert_eq!(report.failure.as_ref().map(|f| f.index), Some(1));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 3);
    assert_eq!(mock.placed_requests().len(), 2);
}

#[tokio::test]
async fn grid_splits_sides_around_ticker() {
    let mock = MockExchangeClient::new();
    mock.set_ticker("BTCUSDT", dec!(50100));
    let app = mock_app(&mock);

    let outcome = assert_ok!(
        run_args(&app, &["grid", "BTCUSDT", "48000", "52000", "5", "0.01"]).await
    );

    match &outcome {
        CommandOutcome::Grid { report, .. } => {
            assert_eq!(report.state, RunState::Completed);
            assert_eq!(report.placed.len(), 5);
            assert_eq!(report.reference_price, Some(dec!(50100)));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(mock.resting_orders().len(), 5);
    assert!(outcome.to_string().contains("5 placed, 0 skipped"));
}
