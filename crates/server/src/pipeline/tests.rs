use std::sync::Arc;
use std::time::Duration;

use deepthink_llm::mock::{MockLlmProvider, MockStep};
use deepthink_llm::{GenerationSettings, LlmError};
use tokio::sync::mpsc;

use super::*;

fn orchestrator(provider: &Arc<MockLlmProvider>) -> StreamOrchestrator {
    StreamOrchestrator::new(provider.clone(), GenerationSettings::default()).unwrap()
}

async fn run_session(
    provider: &Arc<MockLlmProvider>,
    query: &str,
) -> (SessionOutcome, Vec<SessionEvent>) {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let outcome = orchestrator(provider)
        .serve(Query::new(query).unwrap(), tx)
        .await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (outcome, events)
}

fn thinking(text: &str) -> SessionEvent {
    SessionEvent::DeepThinking(text.to_string())
}

fn response(text: &str) -> SessionEvent {
    SessionEvent::FinalResponse(text.to_string())
}

#[tokio::test]
async fn both_stages_are_relayed_in_order_then_end() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_fragments(&["The user ", "wants ", "TCP basics."]);
    provider.queue_fragments(&["TCP is ", "a transport protocol."]);

    let (outcome, events) = run_session(&provider, "explain TCP").await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(
        events,
        vec![
            thinking("The user "),
            thinking("wants "),
            thinking("TCP basics."),
            response("TCP is "),
            response("a transport protocol."),
            SessionEvent::End,
        ]
    );
}

#[tokio::test]
async fn response_prompt_carries_full_analysis_and_query() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_fragments(&["step 1\n", "step 2 ", "ünïcode"]);
    provider.queue_fragments(&["done"]);

    let (_, events) = run_session(&provider, "explain TCP").await;

    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::DeepThinking(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "step 1\nstep 2 ünïcode");

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("userQuery: explain TCP"));
    assert!(prompts[1].contains(&format!("Analysis: {}\n", streamed)));
    assert!(prompts[1].contains("Original Query: explain TCP"));
}

#[tokio::test]
async fn empty_stages_still_end_cleanly() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_fragments(&[]);
    provider.queue_fragments(&[]);

    let (outcome, events) = run_session(&provider, "hi").await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(events, vec![SessionEvent::End]);
    assert!(provider.prompts()[1].contains("Analysis: \n"));
}

#[tokio::test]
async fn analysis_failure_stops_before_response_stage() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_failure_after(&["f1", "f2"], "upstream reset");
    provider.queue_fragments(&["never sent"]);

    let (outcome, events) = run_session(&provider, "q").await;

    assert_eq!(outcome, SessionOutcome::GenerationFailed(Stage::Analysis));
    assert_eq!(events, vec![thinking("f1"), thinking("f2"), SessionEvent::Error]);
    assert_eq!(provider.prompts().len(), 1);
}

#[tokio::test]
async fn response_failure_keeps_analysis_and_partial_response() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_fragments(&["a1", "a2"]);
    provider.queue_failure_after(&["g1"], "model overloaded");

    let (outcome, events) = run_session(&provider, "q").await;

    assert_eq!(outcome, SessionOutcome::GenerationFailed(Stage::Response));
    assert_eq!(
        events,
        vec![thinking("a1"), thinking("a2"), response("g1"), SessionEvent::Error]
    );
    assert!(!events.contains(&SessionEvent::End));
}

#[tokio::test]
async fn rejected_request_yields_single_error_event() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_rejection(LlmError::AuthError);

    let (outcome, events) = run_session(&provider, "q").await;

    assert_eq!(outcome, SessionOutcome::GenerationFailed(Stage::Analysis));
    assert_eq!(events, vec![SessionEvent::Error]);
    // The cause is never forwarded to the client.
    assert!(!SessionEvent::Error.payload().contains("Authentication"));
}

#[tokio::test(start_paused = true)]
async fn irregular_timing_does_not_reorder_or_lose_fragments() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_steps(vec![
        MockStep::Text("a".into()),
        MockStep::Delay(Duration::from_millis(250)),
        MockStep::Text("b".into()),
        MockStep::Text("c".into()),
        MockStep::Delay(Duration::from_secs(3)),
        MockStep::Text("d".into()),
    ]);
    provider.queue_steps(vec![
        MockStep::Delay(Duration::from_millis(10)),
        MockStep::Text("r".into()),
    ]);

    let (outcome, events) = run_session(&provider, "q").await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(
        events,
        vec![
            thinking("a"),
            thinking("b"),
            thinking("c"),
            thinking("d"),
            response("r"),
            SessionEvent::End,
        ]
    );
    assert!(provider.prompts()[1].contains("Analysis: abcd\n"));
}

#[tokio::test]
async fn disconnect_mid_analysis_cancels_backend_and_skips_response() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_steps(vec![MockStep::Text("first".into()), MockStep::Hang]);
    provider.queue_fragments(&["never requested"]);

    let orchestrator = Arc::new(orchestrator(&provider));
    let (tx, mut rx) = mpsc::channel(8);
    let session = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move {
            orchestrator
                .serve(Query::new("q").unwrap(), tx)
                .await
        }
    });

    assert_eq!(rx.recv().await, Some(thinking("first")));
    drop(rx);

    let outcome = session.await.unwrap();
    assert_eq!(outcome, SessionOutcome::Disconnected);
    assert_eq!(provider.prompts().len(), 1);
    assert_eq!(provider.abandoned_streams(), 1);
}

#[tokio::test]
async fn disconnect_while_request_pending_skips_response() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_hanging_request();
    provider.queue_fragments(&["never requested"]);

    let orchestrator = Arc::new(orchestrator(&provider));
    let (tx, rx) = mpsc::channel(8);
    let session = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.serve(Query::new("q").unwrap(), tx).await }
    });

    while provider.prompts().is_empty() {
        tokio::task::yield_now().await;
    }
    drop(rx);

    let outcome = session.await.unwrap();
    assert_eq!(outcome, SessionOutcome::Disconnected);
    assert_eq!(provider.prompts().len(), 1);
}

#[tokio::test]
async fn disconnect_mid_response_cancels_backend() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_fragments(&["a"]);
    provider.queue_steps(vec![MockStep::Text("r1".into()), MockStep::Hang]);

    let orchestrator = Arc::new(orchestrator(&provider));
    let (tx, mut rx) = mpsc::channel(8);
    let session = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.serve(Query::new("q").unwrap(), tx).await }
    });

    assert_eq!(rx.recv().await, Some(thinking("a")));
    assert_eq!(rx.recv().await, Some(response("r1")));
    drop(rx);

    let outcome = session.await.unwrap();
    assert_eq!(outcome, SessionOutcome::Disconnected);
    assert_eq!(provider.prompts().len(), 2);
    assert_eq!(provider.abandoned_streams(), 1);
}

#[tokio::test]
async fn start_runs_session_in_background_and_closes_channel() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_fragments(&["x"]);
    provider.queue_fragments(&["y"]);

    let orchestrator = Arc::new(orchestrator(&provider));
    let mut rx = orchestrator.start(Query::new("q").unwrap());

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events, vec![thinking("x"), response("y"), SessionEvent::End]);
}
