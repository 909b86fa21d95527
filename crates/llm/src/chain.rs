//! A generation stage: render a template, submit it, hand back the fragments.

use std::sync::Arc;

use tracing::debug;

use crate::prompt::{PromptError, PromptFields, PromptRenderer, PromptTemplate};
use crate::provider::{FragmentStream, LlmError, LlmProvider, Message};

/// Sampling parameters applied to every request a stage makes.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Generation(#[from] LlmError),
}

/// One prompt-render-then-generate unit bound to a fixed template.
#[derive(Clone)]
pub struct StageChain {
    template: PromptTemplate,
    renderer: Arc<PromptRenderer>,
    provider: Arc<dyn LlmProvider>,
    settings: GenerationSettings,
}

impl StageChain {
    pub fn new(
        template: PromptTemplate,
        renderer: Arc<PromptRenderer>,
        provider: Arc<dyn LlmProvider>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            template,
            renderer,
            provider,
            settings,
        }
    }

    /// Render the stage prompt with `fields` and start generation.
    ///
    /// The returned stream is the backend's own fragment sequence, passed
    /// through untouched.
    pub async fn run(&self, fields: &PromptFields) -> Result<FragmentStream, StageError> {
        let prompt = self.renderer.render(self.template, fields)?;
        debug!(
            stage = %self.template,
            provider = self.provider.provider_name(),
            prompt_len = prompt.len(),
            "submitting stage prompt"
        );
        let fragments = self
            .provider
            .stream_completion(
                vec![Message::user(prompt)],
                self.settings.temperature,
                self.settings.max_tokens,
            )
            .await?;
        Ok(fragments)
    }
}
