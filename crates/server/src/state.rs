use std::sync::Arc;

use deepthink_llm::{GenerationSettings, LlmProvider, PromptError};

use crate::pipeline::StreamOrchestrator;
use crate::query_store::QueryStore;

pub struct AppState {
    pub queries: QueryStore,
    pub orchestrator: Arc<StreamOrchestrator>,
    /// Backend name and model, reported by `/health`.
    pub provider: String,
    pub model: String,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        settings: GenerationSettings,
    ) -> Result<Self, PromptError> {
        let provider_name = provider.provider_name().to_string();
        let model = provider.model().to_string();
        Ok(Self {
            queries: QueryStore::new(),
            orchestrator: Arc::new(StreamOrchestrator::new(provider, settings)?),
            provider: provider_name,
            model,
        })
    }
}
