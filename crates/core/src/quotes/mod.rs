pub mod fmp;
pub mod yahoo;

use crate::config::Settings;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Per-symbol quote normalized to a common shape; upstream field names vary
/// by provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
}

#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>>;
}

/// Static fallback chain over quote providers: each provider is tried in
/// order and the first success wins. Holds no state and is idempotent per
/// request.
pub struct QuoteRouter {
    providers: Vec<Box<dyn QuoteProvider>>,
}

impl QuoteRouter {
    pub fn new(providers: Vec<Box<dyn QuoteProvider>>) -> Self {
        Self { providers }
    }

    /// Yahoo (RapidAPI) first when a key is configured, FinancialModelingPrep
    /// as the always-available fallback.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut providers: Vec<Box<dyn QuoteProvider>> = Vec::new();

        match yahoo::YahooQuoteClient::from_settings(settings) {
            Ok(client) => providers.push(Box::new(client)),
            Err(err) => {
                tracing::warn!(error = %err, "Yahoo quote provider not configured; skipping");
            }
        }
        providers.push(Box::new(fmp::FmpQuoteClient::from_settings(settings)?));

        Ok(Self::new(providers))
    }

    pub async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        anyhow::ensure!(!symbols.is_empty(), "symbols must be non-empty");

        let mut last_err: Option<anyhow::Error> = None;
        for provider in &self.providers {
            match provider.fetch_quotes(symbols).await {
                Ok(quotes) => return Ok(quotes),
                Err(err) => {
                    tracing::warn!(
                        provider = provider.provider_name(),
                        error = %err,
                        "quote provider failed; trying next"
                    );
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) => Err(err.context("all quote providers failed")),
            None => anyhow::bail!("no quote providers configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        name: &'static str,
        result: Result<Vec<Quote>, String>,
    }

    #[async_trait::async_trait]
    impl QuoteProvider for StaticProvider {
        fn provider_name(&self) -> &'static str {
            self.name
        }

        async fn fetch_quotes(&self, _symbols: &[String]) -> Result<Vec<Quote>> {
            match &self.result {
                Ok(quotes) => Ok(quotes.clone()),
                Err(msg) => anyhow::bail!("{msg}"),
            }
        }
    }

    fn quote(symbol: &str, price: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price,
            previous_close: None,
            percent_change: None,
        }
    }

    #[tokio::test]
    async fn falls_back_when_the_primary_fails() {
        let router = QuoteRouter::new(vec![
            Box::new(StaticProvider {
                name: "primary",
                result: Err("HTTP 500".to_string()),
            }),
            Box::new(StaticProvider {
                name: "fallback",
                result: Ok(vec![quote("AAPL", 180.0)]),
            }),
        ]);

        let quotes = router
            .fetch_quotes(&["AAPL".to_string()])
            .await
            .unwrap();
        assert_eq!(quotes, vec![quote("AAPL", 180.0)]);
    }

    #[tokio::test]
    async fn errors_when_all_providers_are_exhausted() {
        let router = QuoteRouter::new(vec![
            Box::new(StaticProvider {
                name: "primary",
                result: Err("HTTP 500".to_string()),
            }),
            Box::new(StaticProvider {
                name: "fallback",
                result: Err("HTTP 429".to_string()),
            }),
        ]);

        let err = router
            .fetch_quotes(&["AAPL".to_string()])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("all quote providers failed"));
    }

    #[tokio::test]
    async fn rejects_empty_symbol_list() {
        let router = QuoteRouter::new(vec![]);
        assert!(router.fetch_quotes(&[]).await.is_err());
    }
}
