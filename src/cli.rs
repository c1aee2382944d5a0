//! Command-line surface.

use clap::{ArgGroup, Args, Parser, Subcommand};
use rust_decimal::Decimal;

use crate::strategy::TwapOrderStyle;
use crate::trading::{Side, TimeInForce};

/// Binance USDT-M futures order CLI.
#[derive(Parser, Debug)]
#[command(name = "futures-bot")]
#[command(about = "Place and manage Binance USDT-M futures orders (testnet by default)")]
#[command(version)]
pub struct Cli {
    /// Trade on mainnet with real funds.
    #[arg(long, global = true)]
    pub mainnet: bool,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// API key (overrides the environment).
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// API secret (overrides the environment).
    #[arg(long, global = true)]
    pub api_secret: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by single-order commands.
#[derive(Args, Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderFlags {
    /// Only reduce an existing position.
    #[arg(long)]
    pub reduce_only: bool,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Place a market order.
    #[command(allow_negative_numbers = true)]
    Market {
        /// BUY or SELL.
        side: Side,
        /// Trading pair, e.g. BTCUSDT.
        symbol: String,
        /// Quantity in base asset.
        quantity: Decimal,
        #[command(flatten)]
        flags: OrderFlags,
    },

    /// Place a limit order.
    #[command(allow_negative_numbers = true)]
    Limit {
        /// BUY or SELL.
        side: Side,
        /// Trading pair.
        symbol: String,
        /// Quantity in base asset.
        quantity: Decimal,
        /// Limit price.
        price: Decimal,
        /// GTC, IOC or FOK.
        #[arg(long, default_value = "GTC")]
        time_in_force: TimeInForce,
        #[command(flatten)]
        flags: OrderFlags,
    },

    /// Place a stop-limit order.
    #[command(allow_negative_numbers = true)]
    StopLimit {
        /// BUY or SELL.
        side: Side,
        /// Trading pair.
        symbol: String,
        /// Quantity in base asset.
        quantity: Decimal,
        /// Limit price once triggered.
        price: Decimal,
        /// Trigger price.
        stop_price: Decimal,
        #[command(flatten)]
        flags: OrderFlags,
    },

    /// Place a take-profit / stop-loss pair around a position.
    #[command(allow_negative_numbers = true)]
    Oco {
        /// Side of the position being protected.
        side: Side,
        /// Trading pair.
        symbol: String,
        /// Quantity each leg closes.
        quantity: Decimal,
        /// Position entry price.
        entry_price: Decimal,
        /// Stop-loss trigger.
        stop_loss_price: Decimal,
        /// Take-profit trigger.
        take_profit_price: Decimal,
        #[command(flatten)]
        flags: OrderFlags,
    },

    /// Split an order into time-spaced slices.
    #[command(allow_negative_numbers = true)]
    Twap {
        /// BUY or SELL.
        side: Side,
        /// Trading pair.
        symbol: String,
        /// Total quantity.
        quantity: Decimal,
        /// Total duration in seconds.
        duration_sec: u64,
        /// Number of slices.
        #[arg(long, default_value_t = 10)]
        intervals: u32,
        /// MARKET or LIMIT slices.
        #[arg(long, default_value = "MARKET")]
        order_type: TwapOrderStyle,
    },

    /// Place limit orders on evenly spaced levels.
    #[command(allow_negative_numbers = true)]
    Grid {
        /// Trading pair.
        symbol: String,
        /// Lowest level.
        lower_price: Decimal,
        /// Highest level.
        upper_price: Decimal,
        /// Number of levels, endpoints included.
        levels: u32,
        /// Quantity per level.
        quantity_per_level: Decimal,
    },

    /// Show balances, and for a symbol its position and open orders.
    Info {
        /// Trading pair.
        #[arg(long)]
        symbol: Option<String>,
    },

    /// Cancel one order or every open order on a symbol.
    #[command(group(ArgGroup::new("target").required(true).args(["order_id", "all"])))]
    Cancel {
        /// Trading pair.
        symbol: String,
        /// Exchange order id.
        #[arg(long)]
        order_id: Option<String>,
        /// Cancel every open order on the symbol.
        #[arg(long)]
        all: bool,
    },

    /// Compare the local clock with the exchange clock.
    TimeSync,
}

impl Command {
    /// Multi-order runs that stop cleanly on Ctrl-C. Everything else keeps the
    /// default SIGINT behavior and exits immediately.
    pub fn is_interruptible(&self) -> bool {
        matches!(self, Command::Twap { .. } | Command::Grid { .. })
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Market { .. } => "market",
            Command::Limit { .. } => "limit",
            Command::StopLimit { .. } => "stop-limit",
            Command::Oco { .. } => "oco",
            Command::Twap { .. } => "twap",
            Command::Grid { .. } => "grid",
            Command::Info { .. } => "info",
            Command::Cancel { .. } => "cancel",
            Command::TimeSync => "time-sync",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use rust_decimal_macros::dec;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("futures-bot").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_market_with_lowercase_side() {
        let cli = parse(&["market", "buy", "BTCUSDT", "0.01", "--reduce-only"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Market {
                side: Side::Buy,
                symbol: "BTCUSDT".into(),
                quantity: dec!(0.01),
                flags: OrderFlags { reduce_only: true },
            }
        );
        assert!(!cli.mainnet);
    }

    #[test]
    fn negative_quantity_reaches_validation() {
        let cli = parse(&["market", "SELL", "BTCUSDT", "-1"]).unwrap();
        assert!(matches!(cli.command, Command::Market { quantity, .. } if quantity == dec!(-1)));
    }

    #[test]
    fn unknown_side_is_a_usage_error() {
        let err = parse(&["market", "HOLD", "BTCUSDT", "1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn twap_defaults_to_ten_market_intervals() {
        let cli = parse(&["--mainnet", "twap", "BUY", "BTCUSDT", "1", "600"]).unwrap();
        assert!(cli.mainnet);
        assert_eq!(
            cli.command,
            Command::Twap {
                side: Side::Buy,
                symbol: "BTCUSDT".into(),
                quantity: dec!(1),
                duration_sec: 600,
                intervals: 10,
                order_type: TwapOrderStyle::Market,
            }
        );
    }

    #[test]
    fn limit_accepts_time_in_force() {
        let cli = parse(&["limit", "SELL", "BTCUSDT", "0.01", "52000", "--time-in-force", "IOC"]).unwrap();
        assert!(matches!(cli.command, Command::Limit { time_in_force: TimeInForce::IOC, .. }));
    }

    #[test]
    fn only_strategies_trap_ctrl_c() {
        let twap = parse(&["twap", "BUY", "BTCUSDT", "1", "60"]).unwrap();
        let grid = parse(&["grid", "BTCUSDT", "48000", "52000", "5", "0.01"]).unwrap();
        let market = parse(&["market", "BUY", "BTCUSDT", "0.01"]).unwrap();
        assert!(twap.command.is_interruptible());
        assert!(grid.command.is_interruptible());
        assert!(!market.command.is_interruptible());
        assert!(!Command::TimeSync.is_interruptible());
    }

    #[test]
    fn cancel_requires_exactly_one_target() {
        assert!(parse(&["cancel", "BTCUSDT"]).is_err());
        assert!(parse(&["cancel", "BTCUSDT", "--all", "--order-id", "1"]).is_err());
        let cli = parse(&["cancel", "BTCUSDT", "--all"]).unwrap();
        assert_eq!(cli.command.name(), "cancel");
    }
}
