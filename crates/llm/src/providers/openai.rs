//! OpenAI-compatible chat completions backend.
//!
//! Serves both OpenAI and Mistral, which share the `/v1/chat/completions`
//! wire format: SSE `data:` lines carrying `choices[0].delta.content`,
//! terminated by `data: [DONE]`.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::frame::{check_status, line_stream, sse_data, LineOutcome};
use crate::provider::{FragmentStream, LlmError, LlmProvider, Message};

pub struct OpenAiProvider {
    client: reqwest::Client,
    name: &'static str,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self::named("openai", api_key, model, base_url)
    }

    /// Mistral's La Plateforme API.
    pub fn mistral(api_key: String, model: String, base_url: String) -> Self {
        Self::named("mistral", api_key, model, base_url)
    }

    fn named(name: &'static str, api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            name,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn request_body(&self, messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        json!({
            "model": self.model,
            "messages": api_messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": true,
        })
    }
}

/// Parse one line of an OpenAI-style completion stream.
pub(crate) fn parse_line(line: &str) -> LineOutcome {
    let Some(data) = sse_data(line) else {
        return LineOutcome::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return LineOutcome::Skip;
    }
    if data == "[DONE]" {
        return LineOutcome::Done;
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

    if let Some(err) = parsed.get("error") {
        let message = err["message"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| err.to_string());
        return LineOutcome::Fail(LlmError::StreamError(message));
    }

    match parsed["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => LineOutcome::Fragment(text.to_string()),
        _ => LineOutcome::Skip,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn stream_completion(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<FragmentStream, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(&messages, temperature, max_tokens);

        debug!(provider = self.name, model = %self.model, url = %url, "starting streaming completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let response = check_status(response).await?;
        Ok(line_stream(response.bytes_stream(), parse_line))
    }

    fn provider_name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}
