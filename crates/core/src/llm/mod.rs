pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::holding::Holding;
use crate::domain::suggestion::SuggestionBatch;
use anyhow::Context;

/// Input handed to the suggestion source: the user's free-text query, the
/// current holdings, and the names of any uploaded documents.
#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub query: String,
    pub document_names: Vec<String>,
    holdings_json: serde_json::Value,
}

impl GenerateInput {
    pub fn try_new(
        query: impl Into<String>,
        holdings: &[Holding],
        document_names: Vec<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            query: query.into(),
            document_names,
            holdings_json: serde_json::to_value(holdings)
                .context("failed to serialize holdings for the prompt")?,
        })
    }

    pub fn holdings_json(&self) -> &serde_json::Value {
        &self.holdings_json
    }
}

#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic,
}

#[async_trait::async_trait]
pub trait SuggestionClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_suggestions(&self, input: GenerateInput)
        -> anyhow::Result<SuggestionBatch>;
}
