//! Scripted LLM provider for exercising stages and pipelines without a backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use crate::provider::{FragmentStream, LlmError, LlmProvider, Message};

/// One scripted action of a mock fragment stream.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Yield a fragment.
    Text(String),
    /// Sleep before continuing (tokio time, so paused clocks apply).
    Delay(Duration),
    /// Yield a stream error and end.
    Fail(String),
    /// Never produce anything again.
    Hang,
}

enum MockScript {
    Steps(Vec<MockStep>),
    Reject(LlmError),
    HangRequest,
}

/// A mock provider that replays queued scripts, one per call, in FIFO order.
/// Calls beyond the queued scripts get an empty stream.
pub struct MockLlmProvider {
    scripts: Mutex<VecDeque<MockScript>>,
    prompts: Mutex<Vec<String>>,
    abandoned: Arc<AtomicUsize>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn queue_steps(&self, steps: Vec<MockStep>) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(MockScript::Steps(steps));
    }

    /// Queue a stream that yields `fragments` and ends normally.
    pub fn queue_fragments(&self, fragments: &[&str]) {
        self.queue_steps(fragments.iter().map(|f| MockStep::Text(f.to_string())).collect());
    }

    /// Queue a stream that yields `fragments` and then fails.
    pub fn queue_failure_after(&self, fragments: &[&str], message: &str) {
        let mut steps: Vec<MockStep> = fragments
            .iter()
            .map(|f| MockStep::Text(f.to_string()))
            .collect();
        steps.push(MockStep::Fail(message.to_string()));
        self.queue_steps(steps);
    }

    /// Queue a call that fails before any stream is returned.
    pub fn queue_rejection(&self, error: LlmError) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(MockScript::Reject(error));
    }

    /// Queue a call whose request never completes, as if the backend
    /// accepted the connection and never answered.
    pub fn queue_hanging_request(&self) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(MockScript::HangRequest);
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of streams dropped before they finished.
    pub fn abandoned_streams(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

struct CompletionGuard {
    abandoned: Arc<AtomicUsize>,
    finished: bool,
}

impl CompletionGuard {
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct ScriptState {
    steps: VecDeque<MockStep>,
    guard: CompletionGuard,
}

fn play(steps: Vec<MockStep>, abandoned: Arc<AtomicUsize>) -> FragmentStream {
    let state = ScriptState {
        steps: steps.into(),
        guard: CompletionGuard {
            abandoned,
            finished: false,
        },
    };

    FragmentStream::new(stream::unfold(state, |mut state| async move {
        loop {
            match state.steps.pop_front() {
                Some(MockStep::Text(text)) => return Some((Ok(text), state)),
                Some(MockStep::Delay(d)) => tokio::time::sleep(d).await,
                Some(MockStep::Fail(message)) => {
                    state.steps.clear();
                    state.guard.finish();
                    return Some((Err(LlmError::StreamError(message)), state));
                }
                Some(MockStep::Hang) => futures::future::pending::<()>().await,
                None => {
                    state.guard.finish();
                    return None;
                }
            }
        }
    }))
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn stream_completion(
        &self,
        messages: Vec<Message>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<FragmentStream, LlmError> {
        let prompt = messages
            .into_iter()
            .map(|m| m.content)
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);

        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(MockScript::Steps(steps)) => Ok(play(steps, self.abandoned.clone())),
            Some(MockScript::Reject(e)) => Err(e),
            Some(MockScript::HangRequest) => futures::future::pending().await,
            None => Ok(FragmentStream::empty()),
        }
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
