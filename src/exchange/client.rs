//! Binance USDT-M futures REST client.

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::types::{AccountBalance, Position};
use super::ExchangeClient;
use crate::config::{Config, Credentials, Network};
use crate::error::{BotError, ConfigError, ExchangeError, NetworkError, Result};
use crate::signing::{build_query_string, RequestSigner, API_KEY_HEADER};
use crate::trading::order::{parse_decimal, OrderRequest, OrderResult};

/// Error body Binance returns with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TickerPayload {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTimePayload {
    server_time: i64,
}

/// Binance USDT-M futures client bound to one network and credential set.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL, without trailing slash.
    base_url: String,
    /// Query signer holding the credentials.
    signer: RequestSigner,
    network: Network,
}

impl BinanceClient {
    /// Build a client from config for `network`.
    pub fn new(config: &Config, network: Network, credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.http_timeout().min(std::time::Duration::from_secs(5)))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url(network).trim_end_matches('/').to_string(),
            signer: RequestSigner::new(credentials, config.binance_recv_window),
            network,
        })
    }

    /// Network this client talks to.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a signed request.
    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = self.signer.signed_query(params, timestamp)?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!(%method, path, "signed request");

        let response = self
            .http
            .request(method, &url)
            .header(API_KEY_HEADER, self.signer.api_key())
            .send()
            .await
            .map_err(NetworkError::from)?;
        read_body(response).await
    }

    /// Send an unsigned GET.
    async fn public(&self, path: &str, params: &[(String, String)]) -> Result<serde_json::Value> {
        let url = if params.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, build_query_string(params))
        };
        debug!(path, "public request");

        let response = self.http.get(&url).send().await.map_err(NetworkError::from)?;
        read_body(response).await
    }
}

/// Map a response to its JSON body, or to the exchange's rejection.
async fn read_body(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let body = response.text().await.map_err(NetworkError::from)?;

    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => (err.code, err.msg),
            // No Binance code (e.g. a proxy error page).
            Err(_) => (0, body),
        };
        return Err(ExchangeError::Rejected {
            status: status.as_u16(),
            code,
            message,
        }
        .into());
    }

    serde_json::from_str(&body).map_err(|e| {
        BotError::from(ExchangeError::MalformedPayload(format!("invalid JSON body: {e}")))
    })
}

fn symbol_param(symbol: &str) -> Vec<(String, String)> {
    vec![("symbol".to_string(), symbol.to_string())]
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    #[instrument(skip(self, request), fields(symbol = %request.symbol, kind = request.order_type.wire_type()))]
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        let raw = self
            .signed(Method::POST, "/fapi/v1/order", &request.to_params())
            .await?;
        Ok(OrderResult::from_payload(raw)?)
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderResult> {
        let mut params = symbol_param(symbol);
        params.push(("orderId".to_string(), order_id.to_string()));
        let raw = self.signed(Method::DELETE, "/fapi/v1/order", &params).await?;
        Ok(OrderResult::from_payload(raw)?)
    }

    #[instrument(skip(self))]
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        self.signed(Method::DELETE, "/fapi/v1/allOpenOrders", &symbol_param(symbol))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderResult>> {
        let raw = self
            .signed(Method::GET, "/fapi/v1/openOrders", &symbol_param(symbol))
            .await?;
        let entries = match raw {
            serde_json::Value::Array(entries) => entries,
            other => {
                return Err(ExchangeError::MalformedPayload(format!(
                    "openOrders: expected array, got {other}"
                ))
                .into())
            }
        };
        entries
            .into_iter()
            .map(|entry| OrderResult::from_payload(entry).map_err(BotError::from))
            .collect()
    }

    #[instrument(skip(self))]
    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        let raw = self.public("/fapi/v1/ticker/price", &symbol_param(symbol)).await?;
        let ticker: TickerPayload = serde_json::from_value(raw)
            .map_err(|e| ExchangeError::MalformedPayload(format!("ticker: {e}")))?;
        Ok(parse_decimal(Some(&ticker.price), "price")?)
    }

    #[instrument(skip(self))]
    async fn account_balance(&self) -> Result<AccountBalance> {
        let raw = self.signed(Method::GET, "/fapi/v2/account", &[]).await?;
        Ok(AccountBalance::from_payload(&raw)?)
    }

    #[instrument(skip(self))]
    async fn position(&self, symbol: &str) -> Result<Option<Position>> {
        let raw = self
            .signed(Method::GET, "/fapi/v2/positionRisk", &symbol_param(symbol))
            .await?;
        Ok(Position::from_payload(&raw, symbol)?)
    }

    #[instrument(skip(self))]
    async fn server_time(&self) -> Result<i64> {
        let raw = self.public("/fapi/v1/time", &[]).await?;
        let time: ServerTimePayload = serde_json::from_value(raw)
            .map_err(|e| ExchangeError::MalformedPayload(format!("time: {e}")))?;
        Ok(time.server_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        }
    }

    #[test]
    fn base_url_follows_network() {
        let config = Config {
            binance_testnet_url: "https://testnet.binancefuture.com/".to_string(),
            ..Default::default()
        };
        let testnet = BinanceClient::new(&config, Network::Testnet, credentials()).unwrap();
        assert_eq!(testnet.base_url(), "https://testnet.binancefuture.com");

        let mainnet = BinanceClient::new(&config, Network::Mainnet, credentials()).unwrap();
        assert_eq!(mainnet.base_url(), "https://fapi.binance.com");
        assert_eq!(mainnet.network(), Network::Mainnet);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let config = Config {
            binance_testnet_url: "http://127.0.0.1:9".to_string(),
            http_timeout_ms: 500,
            ..Default::default()
        };
        let client = BinanceClient::new(&config, Network::Testnet, credentials()).unwrap();
        let err = client.server_time().await.unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
