//! Unified error types for the futures order CLI.

use std::fmt;

use thiserror::Error;

/// Unified error type for the order CLI.
#[derive(Error, Debug)]
pub enum BotError {
    /// Bad input; never reaches the network.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Non-2xx or business rejection from the exchange.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Timeout or connection failure.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Exit code used when validation fails (matches clap's usage-error code).
    pub const EXIT_VALIDATION: u8 = 2;
    /// Exit code used for exchange rejections.
    pub const EXIT_EXCHANGE: u8 = 3;
    /// Exit code used for network failures.
    pub const EXIT_NETWORK: u8 = 4;
    /// Exit code used for configuration errors.
    pub const EXIT_CONFIGURATION: u8 = 5;
    /// Exit code for anything else.
    pub const EXIT_OTHER: u8 = 1;
    /// Exit code when the user interrupts a scheduled run (128 + SIGINT).
    pub const EXIT_INTERRUPTED: u8 = 130;

    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotError::Network(_))
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            BotError::Validation(_) => Self::EXIT_VALIDATION,
            BotError::Exchange(_) => Self::EXIT_EXCHANGE,
            BotError::Network(_) => Self::EXIT_NETWORK,
            BotError::Configuration(_) => Self::EXIT_CONFIGURATION,
            BotError::Io(_) => Self::EXIT_OTHER,
        }
    }

    /// Operator hint for well-known exchange error codes.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            BotError::Exchange(ExchangeError::Rejected { code: -1021, .. }) => Some(
                "timestamp outside recvWindow: sync the system clock (see `time-sync`) or raise BINANCE_RECV_WINDOW",
            ),
            BotError::Exchange(ExchangeError::Rejected { code: -1022, .. }) => Some(
                "invalid signature: check the API key/secret and that they belong to the selected network",
            ),
            BotError::Exchange(ExchangeError::Rejected { code: -2015, .. }) => Some(
                "invalid API key, IP, or permissions: testnet keys do not work on mainnet and vice versa",
            ),
            _ => None,
        }
    }
}

/// One failed check, tied to the field it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Offending field name (e.g. `quantity`, `stop_price`).
    pub field: &'static str,
    /// Human-readable reason.
    pub reason: String,
}

impl Violation {
    /// Create a new violation.
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Every violation found in one input, not just the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// All violations, in check order.
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// Wrap a list of violations.
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// Single-violation shorthand.
    pub fn single(field: &'static str, reason: impl Into<String>) -> Self {
        Self::new(vec![Violation::new(field, reason)])
    }

    /// Whether any violation concerns `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    /// Fields named by the violations, in order.
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

/// Errors reported by (or while reading from) the exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Non-2xx response, with the exchange's code and message.
    #[error("HTTP {status}, code {code}: {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Binance error code (e.g. -2019).
        code: i64,
        /// Binance error message.
        message: String,
    },

    /// 2xx response whose body could not be understood.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Transport-level failures. All of these are retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Could not connect.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Any other transport failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout(err.to_string())
        } else if err.is_connect() {
            NetworkError::Connection(err.to_string())
        } else {
            NetworkError::Transport(err.to_string())
        }
    }
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required credential variable is absent or empty.
    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),

    /// Environment could not be deserialized.
    #[error("environment: {0}")]
    Env(#[from] envy::Error),

    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        let net = BotError::from(NetworkError::Timeout("slow".into()));
        let rejected = BotError::from(ExchangeError::Rejected {
            status: 400,
            code: -2019,
            message: "Margin is insufficient.".into(),
        });
        let invalid = BotError::from(ValidationError::single("symbol", "must not be empty"));

        assert!(net.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn exit_codes_are_distinct_per_class() {
        let codes = [
            BotError::from(ValidationError::single("side", "x")).exit_code(),
            BotError::from(ExchangeError::MalformedPayload("x".into())).exit_code(),
            BotError::from(NetworkError::Connection("x".into())).exit_code(),
            BotError::from(ConfigError::MissingCredential("BINANCE_API_KEY")).exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
    }

    #[test]
    fn validation_error_lists_every_violation() {
        let err = ValidationError::new(vec![
            Violation::new("symbol", "must not be empty"),
            Violation::new("quantity", "must be positive"),
        ]);
        assert_eq!(
            err.to_string(),
            "symbol: must not be empty; quantity: must be positive"
        );
        assert!(err.mentions("quantity"));
        assert!(!err.mentions("price"));
    }

    #[test]
    fn timestamp_rejection_has_hint() {
        let err = BotError::from(ExchangeError::Rejected {
            status: 400,
            code: -1021,
            message: "Timestamp for this request is outside of the recvWindow.".into(),
        });
        assert!(err.hint().is_some_and(|h| h.contains("time-sync")));
    }
}
