use async_trait::async_trait;
use tracing::debug;

use super::{parse_response, AnalysisClient, AnalysisError, AnalysisRequest, AnalysisResponse};

const SYSTEM_PROMPT: &str = r#"You assist reliability engineers with root cause analysis of equipment and process failures.

You will receive a JSON object describing a failure record: title, failure description, impact, supporting notes, questions already answered by the team, and questions still open.
Respond with a JSON object in exactly this format:

{
  "root_causes": [{"cause_text": "<candidate root cause>", "confidence": "low" | "medium" | "high"}],
  "action_items": [{"action_text": "<corrective action>", "priority": "low" | "medium" | "high" | "critical", "timeframe": "<e.g. 2 weeks>", "success_criteria": "<how to verify>"}],
  "questions": ["<follow-up question that would narrow the cause>"],
  "material_change": true
}

Rules:
- Set "material_change" to false, with empty lists, when the latest answers do not change your analysis.
- Do not repeat questions listed as already answered or still open.
- Respond only with valid JSON. Do not include markdown fences or other text."#;

/// Reference analysis client using the Anthropic Messages API.
///
/// Uses `ureq` for HTTP inside `spawn_blocking`.
pub struct AnthropicAnalysisClient {
    pub api_key: String,
    /// Base URL (default: https://api.anthropic.com).
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

impl AnthropicAnalysisClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            model,
            max_tokens: 2048,
        }
    }

    /// Create a client from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env(model: String) -> Result<Self, AnalysisError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            AnalysisError::Unavailable("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl AnalysisClient for AnthropicAnalysisClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let user_message = serde_json::to_string_pretty(request)
            .map_err(|e| AnalysisError::Parse(format!("failed to encode request: {e}")))?;
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": user_message }],
        });
        let api_key = self.api_key.clone();
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %self.model, "calling analysis service");

        // ureq is synchronous.
        let text = tokio::task::spawn_blocking(move || -> Result<String, AnalysisError> {
            let agent = ureq::Agent::new_with_defaults();
            let response = agent
                .post(&url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .send_json(body);

            match response {
                Ok(resp) => {
                    let json: serde_json::Value = resp.into_body().read_json().map_err(|e| {
                        AnalysisError::Parse(format!("failed to read Anthropic response: {e}"))
                    })?;
                    json["content"]
                        .as_array()
                        .and_then(|arr| arr.first())
                        .and_then(|c| c["text"].as_str())
                        .map(|s| s.to_string())
                        .ok_or_else(|| {
                            AnalysisError::Parse("no text content in Anthropic response".to_string())
                        })
                }
                Err(ureq::Error::StatusCode(status)) => Err(AnalysisError::Api {
                    status,
                    message: "Anthropic API returned an error status".to_string(),
                }),
                Err(e) => Err(AnalysisError::Network(e.to_string())),
            }
        })
        .await
        .map_err(|e| AnalysisError::Network(format!("task join error: {e}")))??;

        parse_response(&text)
    }
}
