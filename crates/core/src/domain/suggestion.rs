use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionAction {
    Increase,
    Decrease,
    Buy,
    Sell,
    Hold,
}

/// A single ticker-level instruction from the suggestion source.
///
/// `new_shares` is an absolute target and wins over `amount_pct` when both
/// are present. `reason` is surfaced to the user, never computed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub ticker: String,
    pub action: SuggestionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_shares: Option<f64>,
    #[serde(default)]
    pub reason: String,
}

/// Natural-language summary plus the ordered suggestion list, as consumed
/// by `store::PortfolioStore::apply_suggestions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionBatch {
    pub summary: String,
    pub suggestions: Vec<Suggestion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_wire_field_names() {
        let s: Suggestion = serde_json::from_str(
            r#"{"ticker":"AAPL","action":"decrease","amountPct":10,"reason":"trim tech"}"#,
        )
        .unwrap();
        assert_eq!(s.action, SuggestionAction::Decrease);
        assert_eq!(s.amount_pct, Some(10.0));
        assert!(s.new_shares.is_none());
    }

    #[test]
    fn reason_defaults_to_empty_when_absent() {
        let s: Suggestion = serde_json::from_str(r#"{"ticker":"XOM","action":"sell"}"#).unwrap();
        assert_eq!(s.action, SuggestionAction::Sell);
        assert!(s.reason.is_empty());
    }

    #[test]
    fn rejects_unknown_action() {
        let res = serde_json::from_str::<Suggestion>(r#"{"ticker":"XOM","action":"short"}"#);
        assert!(res.is_err());
    }
}
