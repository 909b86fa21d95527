pub mod chain;
pub mod prompt;
pub mod provider;
pub mod providers;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use chain::{GenerationSettings, StageChain, StageError};
pub use prompt::{PromptError, PromptFields, PromptRenderer, PromptTemplate};
pub use provider::{FragmentStream, LlmError, LlmProvider, Message, Role};
pub use providers::create_provider;
