use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// A chat message for the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Trait for LLM providers; each backend implements this.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Submit a chat completion request and return its output as a lazy
    /// sequence of text fragments, in the order the backend produced them.
    async fn stream_completion(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<FragmentStream, LlmError>;

    /// Provider name for logging (e.g. "mistral", "ollama").
    fn provider_name(&self) -> &str;

    fn model(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

type BoxedFragments = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Pull-based sequence of generated text fragments.
///
/// The stream owns the underlying backend request. Dropping it, or calling
/// [`FragmentStream::cancel`], aborts the request; nothing is buffered, so each
/// fragment is yielded as soon as the backend delivers it.
pub struct FragmentStream {
    inner: BoxedFragments,
}

impl FragmentStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<String, LlmError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// A stream that ends immediately without producing fragments.
    pub fn empty() -> Self {
        Self::new(futures::stream::empty())
    }

    /// Abandon the sequence and release the backend request.
    pub fn cancel(self) {
        tracing::debug!("fragment stream cancelled");
        drop(self);
    }
}

impl Stream for FragmentStream {
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentStream").finish_non_exhaustive()
    }
}
