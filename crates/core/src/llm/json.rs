use crate::domain::contract::LlmSuggestionBatch;
use crate::domain::suggestion::SuggestionBatch;
use anyhow::Context;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_batch(text: &str) -> anyhow::Result<SuggestionBatch> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmSuggestionBatch>(&json_str)
        .with_context(|| format!("LLM output is not valid JSON for the batch schema: {json_str}"))?;
    parsed.validate_and_into_batch()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::suggestion::SuggestionAction;
    use serde_json::json;

    fn valid_batch_json() -> String {
        json!({
            "summary": "Trim tech, add defensives",
            "suggestions": [
                {"ticker": "AAPL", "action": "decrease", "amountPct": 10, "newShares": null, "reason": "concentration"},
                {"ticker": "XOM", "action": "increase", "amountPct": 5, "newShares": null, "reason": "policy tailwind"},
            ],
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn parse_batch_accepts_valid_json() {
        let batch = parse_batch(&valid_batch_json()).unwrap();
        assert_eq!(batch.suggestions.len(), 2);
        assert_eq!(batch.suggestions[0].action, SuggestionAction::Decrease);
        assert_eq!(batch.suggestions[0].amount_pct, Some(10.0));
    }

    #[test]
    fn parse_batch_accepts_prose_wrapped_json() {
        let wrapped = format!("Here is my answer:\n{}\nHope that helps.", valid_batch_json());
        let batch = parse_batch(&wrapped).unwrap();
        assert_eq!(batch.summary, "Trim tech, add defensives");
    }

    #[test]
    fn parse_batch_rejects_invalid_action() {
        let json = json!({
            "summary": "bad",
            "suggestions": [{"ticker": "AAPL", "action": "liquidate", "reason": "x"}],
        })
        .to_string();
        assert!(parse_batch(&json).is_err());
    }

    #[test]
    fn parse_batch_rejects_negative_new_shares() {
        let json = json!({
            "summary": "bad",
            "suggestions": [{"ticker": "AAPL", "action": "sell", "newShares": -2, "reason": "x"}],
        })
        .to_string();
        assert!(parse_batch(&json).is_err());
    }
}
