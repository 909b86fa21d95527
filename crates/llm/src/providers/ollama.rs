use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::frame::{check_status, line_stream, LineOutcome};
use crate::provider::{FragmentStream, LlmError, LlmProvider, Message};

pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

/// Parse one NDJSON line of an Ollama `/api/chat` stream.
pub(crate) fn parse_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    let parsed: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            return LineOutcome::Fail(LlmError::InvalidResponse(format!(
                "malformed stream chunk: {}",
                e
            )))
        }
    };

    if let Some(err) = parsed["error"].as_str() {
        return LineOutcome::Fail(LlmError::StreamError(err.to_string()));
    }

    let text = parsed["message"]["content"].as_str().unwrap_or("");
    let done = parsed["done"].as_bool().unwrap_or(false);
    match (text.is_empty(), done) {
        (true, true) => LineOutcome::Done,
        (false, true) => LineOutcome::Last(text.to_string()),
        (true, false) => LineOutcome::Skip,
        (false, false) => LineOutcome::Fragment(text.to_string()),
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn stream_completion(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<FragmentStream, LlmError> {
        let url = format!("{}/api/chat", self.url);

        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let body = json!({
            "model": self.model,
            "messages": api_messages,
            "stream": true,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });

        debug!("Ollama request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let response = check_status(response).await?;
        Ok(line_stream(response.bytes_stream(), parse_line))
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
