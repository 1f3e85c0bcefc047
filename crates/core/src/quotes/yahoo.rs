use crate::config::Settings;
use crate::quotes::{Quote, QuoteProvider};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://yahoo-finance15.p.rapidapi.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Primary provider: Yahoo Finance via RapidAPI.
#[derive(Debug, Clone)]
pub struct YahooQuoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl YahooQuoteClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_rapidapi_key()?.to_string();
        let base_url = settings
            .rapidapi_yahoo_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("QUOTE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build Yahoo quote http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("X-RapidAPI-Key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "X-RapidAPI-Host",
            HeaderValue::from_str(host_from_base_url(&self.base_url))?,
        );
        Ok(headers)
    }

    fn url(&self, symbols: &[String]) -> String {
        format!(
            "{}/api/yahoo/qu/quote/{}",
            self.base_url.trim_end_matches('/'),
            symbols.join(",")
        )
    }
}

#[async_trait::async_trait]
impl QuoteProvider for YahooQuoteClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_rapidapi"
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        let res = self
            .http
            .get(self.url(symbols))
            .headers(self.headers()?)
            .send()
            .await
            .context("Yahoo quote request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Yahoo quote response")?;
        if !status.is_success() {
            anyhow::bail!("Yahoo quote HTTP {status}: {text}");
        }

        let envelope = serde_json::from_str::<YahooQuoteEnvelope>(&text)
            .with_context(|| format!("failed to parse Yahoo quote response: {text}"))?;

        Ok(normalize(envelope))
    }
}

fn normalize(envelope: YahooQuoteEnvelope) -> Vec<Quote> {
    envelope
        .quote_response
        .result
        .into_iter()
        .filter_map(|row| {
            let Some(price) = row.regular_market_price else {
                tracing::warn!(symbol = %row.symbol, "Yahoo row missing price; skipping");
                return None;
            };
            Some(Quote {
                symbol: row.symbol,
                price,
                previous_close: row.regular_market_previous_close,
                percent_change: row.regular_market_change_percent,
            })
        })
        .collect()
}

fn host_from_base_url(base_url: &str) -> &str {
    let stripped = base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))
        .unwrap_or(base_url);
    stripped.trim_end_matches('/')
}

#[derive(Debug, Deserialize)]
struct YahooQuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: YahooQuoteResult,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteResult {
    #[serde(default)]
    result: Vec<YahooQuoteRow>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteRow {
    symbol: String,
    #[serde(default, rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(default, rename = "regularMarketPreviousClose")]
    regular_market_previous_close: Option<f64>,
    #[serde(default, rename = "regularMarketChangePercent")]
    regular_market_change_percent: Option<f64>,
}
