//! Two-stage answer pipeline.
//!
//! A stream session runs the analysis stage, relaying each fragment to the
//! client as a `deep-thinking` event while accumulating it, then feeds the
//! complete analysis and the original query into the response stage, relaying
//! its fragments as `final-response` events. A session always finishes with
//! exactly one `end` or `error` event unless the client has already gone.

mod events;

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use deepthink_llm::{
    FragmentStream, GenerationSettings, LlmProvider, PromptError, PromptFields, PromptRenderer,
    PromptTemplate, StageChain, StageError,
};

use crate::query_store::Query;

pub use events::SessionEvent;

/// Outbound events buffered per session before sends wait on the client.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Analysis,
    Response,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Analysis => f.write_str("analysis"),
            Stage::Response => f.write_str("response"),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Both stages finished and `end` was delivered.
    Completed,
    /// A stage failed; `error` was sent if the client was still there.
    GenerationFailed(Stage),
    /// The client went away; nothing more was written.
    Disconnected,
}

#[derive(Debug)]
enum PhaseError {
    Generation { stage: Stage, source: StageError },
    ChannelClosed,
}

/// Per-request state: the query being answered, the analysis accumulated so
/// far, and the sending half of the client channel.
struct StreamSession {
    query: Query,
    analysis: String,
    analysis_fragments: usize,
    response_fragments: usize,
    tx: mpsc::Sender<SessionEvent>,
}

impl StreamSession {
    fn new(query: Query, tx: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            query,
            analysis: String::new(),
            analysis_fragments: 0,
            response_fragments: 0,
            tx,
        }
    }

    async fn emit(&self, event: SessionEvent) -> Result<(), PhaseError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| PhaseError::ChannelClosed)
    }

    /// Handle one fragment. Analysis fragments are appended to the buffer and
    /// relayed in the same step so both copies keep the same order.
    async fn accept(&mut self, stage: Stage, text: String) -> Result<(), PhaseError> {
        match stage {
            Stage::Analysis => {
                self.analysis_fragments += 1;
                self.analysis.push_str(&text);
                self.emit(SessionEvent::DeepThinking(text)).await
            }
            Stage::Response => {
                self.response_fragments += 1;
                self.emit(SessionEvent::FinalResponse(text)).await
            }
        }
    }

    /// Hand over the finished analysis. The buffer is left empty.
    fn take_analysis(&mut self) -> String {
        std::mem::take(&mut self.analysis)
    }
}

enum Pulled {
    Next(Option<Result<String, deepthink_llm::LlmError>>),
    Closed,
}

/// Drives the analysis and response stages for each stream session.
pub struct StreamOrchestrator {
    analysis: StageChain,
    response: StageChain,
}

impl StreamOrchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        settings: GenerationSettings,
    ) -> Result<Self, PromptError> {
        let renderer = Arc::new(PromptRenderer::new()?);
        Ok(Self {
            analysis: StageChain::new(
                PromptTemplate::DeepThinking,
                renderer.clone(),
                provider.clone(),
                settings,
            ),
            response: StageChain::new(PromptTemplate::FinalResponse, renderer, provider, settings),
        })
    }

    /// Open a channel for `query` and run its session in a background task.
    /// The receiver ends when the session is over.
    pub fn start(self: &Arc<Self>, query: Query) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let orchestrator = Arc::clone(self);
        let span = tracing::info_span!("stream_session", session_id = %Uuid::new_v4());

        tokio::spawn(
            async move {
                orchestrator.serve(query, tx).await;
            }
            .instrument(span),
        );

        rx
    }

    /// Run one session to completion, writing its events to `tx`.
    ///
    /// `tx` is owned by the session and dropped on return, which closes the
    /// client channel on every exit path.
    pub async fn serve(&self, query: Query, tx: mpsc::Sender<SessionEvent>) -> SessionOutcome {
        info!(
            query_len = query.text().len(),
            query_age_ms = (chrono::Utc::now() - query.accepted_at()).num_milliseconds(),
            "stream session started"
        );
        let mut session = StreamSession::new(query, tx);

        let outcome = match self.run_phases(&mut session).await {
            Ok(()) => match session.emit(SessionEvent::End).await {
                Ok(()) => SessionOutcome::Completed,
                Err(_) => SessionOutcome::Disconnected,
            },
            Err(PhaseError::Generation { stage, source }) => {
                warn!(%stage, error = %source, "generation failed");
                // Best effort: the client may already be gone.
                let _ = session.emit(SessionEvent::Error).await;
                SessionOutcome::GenerationFailed(stage)
            }
            Err(PhaseError::ChannelClosed) => {
                info!("client disconnected");
                SessionOutcome::Disconnected
            }
        };

        info!(
            ?outcome,
            analysis_fragments = session.analysis_fragments,
            response_fragments = session.response_fragments,
            "stream session finished"
        );
        outcome
    }

    async fn run_phases(&self, session: &mut StreamSession) -> Result<(), PhaseError> {
        let fields = PromptFields::new().with("query", session.query.text());
        let fragments = Self::open(session, &self.analysis, &fields, Stage::Analysis).await?;
        Self::relay(session, Stage::Analysis, fragments).await?;

        let analysis = session.take_analysis();
        let fields = PromptFields::new()
            .with("analysis", analysis)
            .with("query", session.query.text());
        let fragments = Self::open(session, &self.response, &fields, Stage::Response).await?;
        Self::relay(session, Stage::Response, fragments).await
    }

    /// Start a stage, giving up early if the client disconnects meanwhile.
    async fn open(
        session: &StreamSession,
        chain: &StageChain,
        fields: &PromptFields,
        stage: Stage,
    ) -> Result<FragmentStream, PhaseError> {
        tokio::select! {
            biased;
            _ = session.tx.closed() => Err(PhaseError::ChannelClosed),
            result = chain.run(fields) => {
                result.map_err(|source| PhaseError::Generation { stage, source })
            }
        }
    }

    /// Relay a stage's fragments until it ends, fails, or the client leaves.
    async fn relay(
        session: &mut StreamSession,
        stage: Stage,
        mut fragments: FragmentStream,
    ) -> Result<(), PhaseError> {
        loop {
            let pulled = tokio::select! {
                biased;
                _ = session.tx.closed() => Pulled::Closed,
                next = fragments.next() => Pulled::Next(next),
            };

            match pulled {
                Pulled::Closed => {
                    fragments.cancel();
                    return Err(PhaseError::ChannelClosed);
                }
                Pulled::Next(Some(Ok(text))) => session.accept(stage, text).await?,
                Pulled::Next(Some(Err(e))) => {
                    return Err(PhaseError::Generation {
                        stage,
                        source: StageError::Generation(e),
                    })
                }
                Pulled::Next(None) => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests;
