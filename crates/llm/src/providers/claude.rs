//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, trace};

use super::frame::{check_status, line_stream, sse_data, LineOutcome};
use crate::provider::{FragmentStream, LlmError, LlmProvider, Message, Role};

pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, "https://api.anthropic.com".to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request_body(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        // System messages go in a top-level field, not in the messages array.
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let api_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": api_messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": true,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        body
    }
}

/// Parse one line of a Claude SSE stream. The `data:` payload repeats the
/// event type in its `type` field, so the `event:` lines are not needed.
pub(crate) fn parse_line(line: &str) -> LineOutcome {
    let Some(data) = sse_data(line) else {
        return LineOutcome::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return LineOutcome::Skip;
    }

    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            return LineOutcome::Fail(LlmError::InvalidResponse(format!(
                "malformed stream chunk: {}",
                e
            )))
        }
    };

    match parsed["type"].as_str() {
        Some("content_block_delta") => match parsed["delta"]["type"].as_str() {
            Some("text_delta") => match parsed["delta"]["text"].as_str() {
                Some(text) if !text.is_empty() => LineOutcome::Fragment(text.to_string()),
                _ => LineOutcome::Skip,
            },
            _ => LineOutcome::Skip,
        },
        Some("message_stop") => LineOutcome::Done,
        Some("error") => {
            let message = parsed["error"]["message"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| data.to_string());
            LineOutcome::Fail(LlmError::StreamError(message))
        }
        Some(other) => {
            trace!(event_type = other, "ignoring SSE event");
            LineOutcome::Skip
        }
        None => LineOutcome::Skip,
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn stream_completion(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<FragmentStream, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&messages, temperature, max_tokens);

        debug!(model = %self.model, url = %url, "starting Claude streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let response = check_status(response).await?;
        Ok(line_stream(response.bytes_stream(), parse_line))
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
