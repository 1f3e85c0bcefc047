use crate::config::Settings;
use crate::quotes::{Quote, QuoteProvider};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com";
// The public demo key works for a handful of large-cap symbols; real
// deployments set FMP_API_KEY.
const DEFAULT_API_KEY: &str = "demo";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Fallback provider: FinancialModelingPrep. Returns a bare row array that
/// gets normalized into the Yahoo-like shape the frontend expects.
#[derive(Debug, Clone)]
pub struct FmpQuoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FmpQuoteClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .fmp_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = settings
            .fmp_api_key
            .clone()
            .unwrap_or_else(|| DEFAULT_API_KEY.to_string());

        let timeout_secs = std::env::var("QUOTE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build FMP quote http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self, symbols: &[String]) -> String {
        format!(
            "{}/api/v3/quote/{}",
            self.base_url.trim_end_matches('/'),
            symbols.join(",")
        )
    }
}

#[async_trait::async_trait]
impl QuoteProvider for FmpQuoteClient {
    fn provider_name(&self) -> &'static str {
        "fmp"
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        let res = self
            .http
            .get(self.url(symbols))
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .context("FMP quote request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read FMP quote response")?;
        if !status.is_success() {
            anyhow::bail!("FMP quote HTTP {status}: {text}");
        }

        let rows = serde_json::from_str::<Vec<FmpQuoteRow>>(&text)
            .with_context(|| format!("failed to parse FMP quote response: {text}"))?;

        Ok(normalize(rows))
    }
}

fn normalize(rows: Vec<FmpQuoteRow>) -> Vec<Quote> {
    rows.into_iter()
        .filter_map(|row| {
            let Some(price) = row.price else {
                tracing::warn!(symbol = %row.symbol, "FMP row missing price; skipping");
                return None;
            };
            Some(Quote {
                symbol: row.symbol,
                price,
                previous_close: row.previous_close,
                percent_change: row.changes_percentage,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct FmpQuoteRow {
    symbol: String,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default, rename = "previousClose")]
    previous_close: Option<f64>,
    #[serde(default, rename = "changesPercentage")]
    changes_percentage: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_row_array() {
        let v = json!([
            {
                "symbol": "XOM",
                "price": 111.2,
                "previousClose": 110.0,
                "changesPercentage": 1.09,
                "name": "Exxon Mobil Corporation"
            }
        ]);

        let rows: Vec<FmpQuoteRow> = serde_json::from_value(v).unwrap();
        let quotes = normalize(rows);

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "XOM");
        assert_eq!(quotes[0].price, 111.2);
        assert_eq!(quotes[0].previous_close, Some(110.0));
    }
}
