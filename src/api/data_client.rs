//! Alpaca market-data client for fetching historical daily bars.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use backoff::future::retry_notify;
use backoff::ExponentialBackoff;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::models::Bar;
use crate::provider::BarProvider;

use super::types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Give up retrying a page after this long
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(60);

/// Largest page the bars endpoint accepts
const PAGE_LIMIT: u32 = 10_000;

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

/// Client for the Alpaca Data API (read-only operations).
pub struct DataClient {
    client: Client,
    base_url: String,
    key: String,
    secret: String,
}

impl DataClient {
    /// Create a new data client for `base_url` (e.g. `https://data.alpaca.markets`).
    pub fn new(base_url: &str, key: &str, secret: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            secret: secret.to_string(),
        })
    }

    /// Build a client from the application config. Fails without credentials.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let (Some(key), Some(secret)) = (&config.alpaca_key, &config.alpaca_secret) else {
            bail!("ALPACA_KEY and ALPACA_SECRET must be set to fetch market data");
        };
        Self::new(&config.alpaca_data_url, key, secret)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn bars_url(&self, symbol: &str) -> String {
        format!("{}/v2/stocks/{}/bars", self.base_url, symbol.to_uppercase())
    }

    /// Fetch daily bars for `symbol` in `[start, end]`, following pagination.
    pub async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let url = self.bars_url(symbol);
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut query = vec![
                ("timeframe", "1Day".to_string()),
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("limit", PAGE_LIMIT.to_string()),
                ("adjustment", "raw".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            debug!(url = %url, page = pages, "Fetching bars");
            let page = self
                .get_page_with_retry(&url, &query)
                .await
                .with_context(|| format!("Failed to fetch bars for {symbol}"))?;
            pages += 1;

            bars.extend(page.bars.unwrap_or_default().into_iter().map(Bar::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        bars.sort_by_key(|b| b.timestamp);
        info!(symbol = %symbol, count = bars.len(), pages = pages, "Fetched bars");
        Ok(bars)
    }

    /// Fetch one page, retrying network errors, 429 and 5xx with exponential backoff.
    async fn get_page_with_retry(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<BarsResponse> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..ExponentialBackoff::default()
        };

        retry_notify(
            policy,
            move || self.get_page(url, query),
            |err: anyhow::Error, wait: Duration| {
                warn!(
                    url = %url,
                    error = %err,
                    retry_in_ms = wait.as_millis() as u64,
                    "Bars request failed, retrying"
                );
            },
        )
        .await
    }

    async fn get_page(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<BarsResponse, backoff::Error<anyhow::Error>> {
        let response = self
            .client
            .get(url)
            .header(KEY_HEADER, &self.key)
            .header(SECRET_HEADER, &self.secret)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(anyhow::Error::new(e).context("Bars request failed"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            let err = anyhow!("Bars request failed: {} - {}", status, message);

            return Err(if is_transient_status(status) {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }

        response.json::<BarsResponse>().await.map_err(|e| {
            let err = anyhow::Error::new(e).context("Failed to parse bars response");
            backoff::Error::permanent(err)
        })
    }
}

impl BarProvider for DataClient {
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        self.get_bars(symbol, start, end).await
    }
}

/// Rate limiting and server errors are worth retrying; other statuses are not.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
        assert!(!is_transient_status(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn test_bars_url() {
        let client = DataClient::new("https://data.alpaca.markets/", "k", "s").unwrap();
        assert_eq!(client.base_url(), "https://data.alpaca.markets");
        assert_eq!(
            client.bars_url("spy"),
            "https://data.alpaca.markets/v2/stocks/SPY/bars"
        );
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut config = AppConfig::default();
        config.alpaca_key = Some("key".to_string());
        config.alpaca_secret = None;
        assert!(DataClient::from_config(&config).is_err());

        config.alpaca_secret = Some("secret".to_string());
        let client = DataClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "https://data.alpaca.markets");
    }
}
