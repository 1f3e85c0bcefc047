use crate::config::Settings;
use crate::domain::contract::LlmSuggestionBatch;
use crate::domain::suggestion::SuggestionBatch;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{GenerateInput, Provider, SuggestionClient};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TOOL_NAME_EMIT_SUGGESTIONS: &str = "emit_suggestions";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn tools() -> Vec<Tool> {
        // Minimal JSON schema for the exact batch contract.
        // Keep it strict and explicit to maximize compliance.
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["summary", "suggestions"],
            "properties": {
                "summary": {"type": "string"},
                "suggestions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["ticker", "action", "amountPct", "newShares", "reason"],
                        "properties": {
                            "ticker": {"type": "string"},
                            "action": {
                                "type": "string",
                                "enum": ["increase", "decrease", "buy", "sell", "hold"]
                            },
                            "amountPct": {"type": ["number", "null"]},
                            "newShares": {"type": ["number", "null"]},
                            "reason": {"type": "string"}
                        }
                    }
                }
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_SUGGESTIONS,
            description: "Emit the final portfolio suggestion batch as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_SUGGESTIONS,
        }
    }

    fn system_prompt() -> String {
        // Keep strict and provider-agnostic: JSON only, no prose.
        [
            "You are a portfolio rebalancing advisor working under financial-regulation constraints.",
            "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
            "No trailing commas. No comments. Use double quotes for all JSON strings.",
            "Output schema:",
            "{",
            "  \"summary\": \"one- or two-sentence rationale for the whole batch\",",
            "  \"suggestions\": [",
            "    {",
            "      \"ticker\": \"AAPL\",",
            "      \"action\": \"decrease\",",
            "      \"amountPct\": 10,",
            "      \"newShares\": null,",
            "      \"reason\": \"short justification\"",
            "    }",
            "  ]",
            "}",
            "Rules:",
            "- action must be one of: increase, decrease, buy, sell, hold",
            "- amountPct and newShares keys MUST both be present (use null when unused)",
            "- newShares (if present) must be a non-negative absolute share count",
            "- amountPct is a relative percentage of current shares (10 means 10%)",
            "- Only suggest tickers from the provided holdings, except for buy entries",
            "- Every suggestion must carry a non-empty reason",
        ]
        .join("\n")
    }

    fn user_prompt(input: &GenerateInput) -> String {
        let documents = if input.document_names.is_empty() {
            "(none)".to_string()
        } else {
            input.document_names.join(", ")
        };

        format!(
            "Question: {}\n\nCurrent holdings JSON:\n{}\n\nUploaded documents: {}",
            input.query,
            input.holdings_json(),
            documents
        )
    }

    fn repair_prompt(previous_output: &str) -> String {
        let schema = [
            "{",
            "  \"summary\": \"...\",",
            "  \"suggestions\": [",
            "    {",
            "      \"ticker\": \"AAPL\",",
            "      \"action\": \"decrease\",",
            "      \"amountPct\": 10,",
            "      \"newShares\": null,",
            "      \"reason\": \"...\"",
            "    }",
            "  ]",
            "}",
        ]
        .join("\n");

        format!(
            "Your previous message was NOT valid JSON.\n\n\
TASK: Output ONLY a single JSON object that exactly matches the schema and rules.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Do NOT include trailing commas or comments.\n\
- Use double quotes for all JSON strings.\n\
- action must be one of: increase, decrease, buy, sell, hold.\n\
- Each suggestion MUST include keys: ticker, action, amountPct, newShares, reason.\n\
- newShares must be null or a non-negative number.\n\n\
SCHEMA:\n{schema}\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> anyhow::Result<String> {
        let mut out = String::new();
        for block in &res.content {
            match block {
                ContentBlock::Text { text } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
                ContentBlock::ToolUse { .. } => {
                    // Prefer tool output parsing when tools are enabled.
                    // Callers should use `response_tool_batch`.
                    continue;
                }
                ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. } => {
                    // Ignore.
                }
                ContentBlock::Unknown => {
                    // Ignore unknown blocks.
                }
            }
        }
        Ok(out)
    }

    fn response_tool_batch(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<LlmSuggestionBatch>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_SUGGESTIONS {
                    let parsed = serde_json::from_value::<LlmSuggestionBatch>(input.clone())
                        .context("failed to decode tool_use.input into LlmSuggestionBatch")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    async fn try_parse_with_repairs(
        &self,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<(SuggestionBatch, serde_json::Value)> {
        match json::parse_batch(&initial_text) {
            Ok(batch) => Ok((batch, initial_raw_json)),
            Err(first_err) => {
                let mut last_err = first_err;
                let mut last_text = initial_text;
                let mut last_raw_json = initial_raw_json;

                // Repair attempts: 2
                for attempt in 1..=2u32 {
                    let repair_req = CreateMessageRequest {
                        model: self.model.clone(),
                        max_tokens: self.max_tokens,
                        system: Some(Self::system_prompt()),
                        messages: vec![Message {
                            role: "user",
                            content: Self::repair_prompt(&last_text),
                        }],
                        tools: Some(Self::tools()),
                        tool_choice: Some(Self::tool_choice()),
                    };

                    let (repair_raw_json, repair_res) = self.create_message(repair_req).await?;
                    let repair_text = Self::response_text(&repair_res)?;
                    match json::parse_batch(&repair_text) {
                        Ok(batch) => return Ok((batch, repair_raw_json)),
                        Err(err) => {
                            last_err = err;
                            last_text = repair_text;
                            last_raw_json = repair_raw_json;
                            tracing::warn!(
                                attempt,
                                error = %last_err,
                                "LLM output still invalid after repair attempt"
                            );
                        }
                    }
                }

                Err(LlmDiagnosticsError {
                    provider: Provider::Anthropic,
                    stage: "parse_after_repair",
                    detail: format!("final_error={last_err}"),
                    raw_output: Some(last_text),
                    raw_response_json: Some(last_raw_json),
                }
                .into())
            }
        }
    }

    pub async fn generate_suggestions_with_raw(
        &self,
        input: GenerateInput,
    ) -> anyhow::Result<(SuggestionBatch, serde_json::Value)> {
        let make_req = |max_tokens: u32| CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: Self::user_prompt(&input),
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        };

        let (mut raw_json, mut res) = self.create_message(make_req(self.max_tokens)).await?;

        // If the model hit max_tokens, retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(4096);
            tracing::warn!(
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            let (rj, r) = self.create_message(make_req(bumped)).await?;
            raw_json = rj;
            res = r;
        }

        // Tool output path.
        if let Some(tool_batch) = Self::response_tool_batch(&res)? {
            let batch = tool_batch.validate_and_into_batch()?;
            return Ok((batch, raw_json));
        }

        // Fallback to text (should be rare).
        let text = Self::response_text(&res)?;
        self.try_parse_with_repairs(text, raw_json).await
    }
}

#[async_trait::async_trait]
impl SuggestionClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_suggestions(
        &self,
        input: GenerateInput,
    ) -> anyhow::Result<SuggestionBatch> {
        let (batch, _raw) = self.generate_suggestions_with_raw(input).await?;
        Ok(batch)
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: String,
    },

    #[serde(rename = "redacted_thinking")]
    RedactedThinking {
        #[serde(default)]
        data: String,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::suggestion::SuggestionAction;
    use serde_json::json;

    #[test]
    fn parses_tool_use_batch_input() {
        let tool_input = json!({
            "summary": "Trim tech, add defensives",
            "suggestions": [
                {
                    "ticker": "AAPL",
                    "action": "decrease",
                    "amountPct": 10,
                    "newShares": null,
                    "reason": "concentration risk"
                },
                {
                    "ticker": "XOM",
                    "action": "increase",
                    "amountPct": 5,
                    "newShares": null,
                    "reason": "policy tailwind"
                }
            ],
        });

        let res = CreateMessageResponse {
            content: vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: TOOL_NAME_EMIT_SUGGESTIONS.to_string(),
                input: tool_input,
            }],
            stop_reason: None,
        };

        let parsed = AnthropicClient::response_tool_batch(&res).unwrap().unwrap();
        let batch = parsed.validate_and_into_batch().unwrap();
        assert_eq!(batch.suggestions.len(), 2);
        assert_eq!(batch.suggestions[0].action, SuggestionAction::Decrease);
        assert_eq!(batch.suggestions[1].ticker, "XOM");
    }

    #[test]
    fn tool_batch_with_bad_record_fails_validation() {
        let tool_input = json!({
            "summary": "bad",
            "suggestions": [
                {"ticker": "", "action": "hold", "amountPct": null, "newShares": null, "reason": "x"}
            ],
        });

        let res = CreateMessageResponse {
            content: vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: TOOL_NAME_EMIT_SUGGESTIONS.to_string(),
                input: tool_input,
            }],
            stop_reason: None,
        };

        let parsed = AnthropicClient::response_tool_batch(&res).unwrap().unwrap();
        assert!(parsed.validate_and_into_batch().is_err());
    }
}
