use crate::domain::suggestion::{Suggestion, SuggestionAction, SuggestionBatch};
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Raw suggestion batch as emitted by the LLM, before validation. Field
/// names follow the UI wire contract (`amountPct`, `newShares`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSuggestionBatch {
    pub summary: String,
    pub suggestions: Vec<LlmSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSuggestion {
    pub ticker: String,
    pub action: SuggestionAction,
    #[serde(default)]
    pub amount_pct: Option<f64>,
    #[serde(default)]
    pub new_shares: Option<f64>,
    #[serde(default)]
    pub reason: String,
}

impl LlmSuggestionBatch {
    pub fn validate_and_into_batch(self) -> anyhow::Result<SuggestionBatch> {
        let summary = self.summary.trim().to_string();
        ensure!(!summary.is_empty(), "summary must be non-empty");

        let mut suggestions = Vec::with_capacity(self.suggestions.len());
        for item in self.suggestions {
            suggestions.push(item.validate_and_into_suggestion()?);
        }

        Ok(SuggestionBatch {
            summary,
            suggestions,
        })
    }
}

impl LlmSuggestion {
    fn validate_and_into_suggestion(self) -> anyhow::Result<Suggestion> {
        let ticker = self.ticker.trim().to_string();
        ensure!(!ticker.is_empty(), "suggestion ticker must be non-empty");

        if let Some(pct) = self.amount_pct {
            ensure!(pct.is_finite(), "amountPct must be finite (got {pct})");
        }

        if let Some(shares) = self.new_shares {
            ensure!(
                shares.is_finite() && shares >= 0.0,
                "newShares must be a non-negative number (got {shares})"
            );
        }

        Ok(Suggestion {
            ticker,
            action: self.action,
            amount_pct: self.amount_pct,
            new_shares: self.new_shares,
            reason: self.reason.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_batch(suggestions: serde_json::Value) -> LlmSuggestionBatch {
        serde_json::from_value(json!({
            "summary": "Trim tech exposure",
            "suggestions": suggestions,
        }))
        .unwrap()
    }

    #[test]
    fn accepts_well_formed_batch() {
        let batch = raw_batch(json!([
            {"ticker": " AAPL ", "action": "decrease", "amountPct": 10, "reason": "concentration"},
            {"ticker": "NEW", "action": "buy", "newShares": 20, "reason": "entry"},
        ]));

        let batch = batch.validate_and_into_batch().unwrap();
        assert_eq!(batch.suggestions.len(), 2);
        assert_eq!(batch.suggestions[0].ticker, "AAPL");
        assert_eq!(batch.suggestions[1].new_shares, Some(20.0));
    }

    #[test]
    fn rejects_blank_ticker() {
        let batch = raw_batch(json!([
            {"ticker": "   ", "action": "hold", "reason": "noop"},
        ]));
        assert!(batch.validate_and_into_batch().is_err());
    }

    #[test]
    fn rejects_negative_new_shares() {
        let batch = raw_batch(json!([
            {"ticker": "AAPL", "action": "sell", "newShares": -5, "reason": "bad"},
        ]));
        assert!(batch.validate_and_into_batch().is_err());
    }

    #[test]
    fn rejects_empty_summary() {
        let batch: LlmSuggestionBatch = serde_json::from_value(json!({
            "summary": "  ",
            "suggestions": [],
        }))
        .unwrap();
        assert!(batch.validate_and_into_batch().is_err());
    }
}
