//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{SessionRuntime, SseEvent};
use crate::document::Chunk;
use crate::embeddings::Embedder;
use crate::index::{DocumentIndex, IndexError};
use crate::llm::{LlmError, LlmErrorKind, LlmRequest, LlmResponse, LlmService, Usage};
use crate::responder::{Answer, ResponderError};
use crate::state_machine::{ConversationState, Event, SessionContext, SessionView};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

// ============================================================================
// Mock Embedder
// ============================================================================

/// Deterministic embedder: a hashed bag of words, so texts sharing words
/// score closer together
pub struct MockEmbedder {
    dims: usize,
    failure: Option<LlmError>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with `error`
    pub fn failing(error: LlmError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(4)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(usize::from(b)));
            vector[hash % self.dims] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_id(&self) -> &str {
        "mock-embedding"
    }
}

// ============================================================================
// Mock LLM
// ============================================================================

/// Mock chat model that returns queued responses
pub struct MockLlm {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "test-model"
    }
}

// ============================================================================
// Mock Index Builder
// ============================================================================

/// Builds a small in-memory index, or fails the way a missing file does
pub struct MockIndexBuilder {
    texts: Option<Vec<String>>,
    source: PathBuf,
    delay: Duration,
    builds: AtomicUsize,
}

impl MockIndexBuilder {
    pub fn ready(texts: &[&str]) -> Self {
        Self {
            texts: Some(texts.iter().map(|t| (*t).to_string()).collect()),
            source: PathBuf::from("my_data.pdf"),
            delay: Duration::ZERO,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn missing() -> Self {
        Self {
            texts: None,
            ..Self::ready(&[])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexBuilder for MockIndexBuilder {
    async fn build_index(&self) -> Result<DocumentIndex, IndexError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let Some(texts) = &self.texts else {
            return Err(IndexError::MissingSource(self.source.clone()));
        };

        let embedder = MockEmbedder::new(16);
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                text: text.clone(),
                page: Some(1),
                index,
            })
            .collect();
        let vectors = texts.iter().map(|t| embedder.vector_for(t)).collect();
        DocumentIndex::new(self.source.clone(), chunks, vectors)
    }
}

// ============================================================================
// Mock Responder
// ============================================================================

/// Responder that replays queued outcomes and records every question
pub struct MockResponder {
    outcomes: Mutex<VecDeque<Result<String, ResponderError>>>,
    questions: Mutex<Vec<String>>,
    delay: Duration,
}

impl MockResponder {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            questions: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue_answer(&self, text: impl Into<String>) {
        self.outcomes.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn queue_error(&self, kind: LlmErrorKind, message: impl Into<String>) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(ResponderError::new(kind, message)));
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn answer(
        &self,
        question: &str,
        _index: &DocumentIndex,
    ) -> Result<Answer, ResponderError> {
        self.questions.lock().unwrap().push(question.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Ok(text)) => Ok(Answer {
                text,
                sources: vec![],
                usage: Usage::default(),
            }),
            Some(Err(e)) => Err(e),
            None => Err(ResponderError::new(
                LlmErrorKind::Unknown,
                "No mock answer queued",
            )),
        }
    }
}

// ============================================================================
// Test Runtime
// ============================================================================

/// A running session wired to mocks
pub struct TestRuntime {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_rx: broadcast::Receiver<SseEvent>,
    pub state_rx: watch::Receiver<SessionView>,
    pub builder: Arc<MockIndexBuilder>,
    pub responder: Arc<MockResponder>,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

impl TestRuntime {
    pub fn new() -> TestRuntimeBuilder {
        TestRuntimeBuilder::new()
    }
}

pub struct TestRuntimeBuilder {
    session_id: String,
    builder: Option<MockIndexBuilder>,
    responder: Option<MockResponder>,
    max_attempts: u32,
    retry_base: Duration,
}

impl TestRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            session_id: "test-session".to_string(),
            builder: None,
            responder: None,
            max_attempts: 3,
            retry_base: Duration::from_millis(5),
        }
    }

    pub fn builder(mut self, builder: MockIndexBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn responder(mut self, responder: MockResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn build(self) -> TestRuntime {
        let builder = Arc::new(self.builder.unwrap_or_else(|| {
            MockIndexBuilder::ready(&["Sagar works with AWS Lambda and S3"])
        }));
        let responder = Arc::new(self.responder.unwrap_or_else(MockResponder::new));

        let context = SessionContext::new(&self.session_id, self.max_attempts)
            .with_retry_base(self.retry_base);
        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(128);
        let (state_tx, state_rx) = watch::channel(ConversationState::new().view(&self.session_id));

        let runtime = SessionRuntime::new(
            context,
            builder.clone(),
            responder.clone(),
            event_rx,
            &event_tx,
            broadcast_tx,
            state_tx,
        );

        let handle = tokio::spawn(async move {
            runtime.run().await;
        });

        TestRuntime {
            event_tx,
            broadcast_rx,
            state_rx,
            builder,
            responder,
            _runtime_handle: handle,
        }
    }
}

impl Default for TestRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRuntime {
    pub async fn send_message(&self, text: &str) {
        self.event_tx
            .send(Event::UserMessage {
                text: text.to_string(),
            })
            .await
            .expect("Failed to send message");
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        predicate: impl Fn(&SessionView) -> bool,
    ) -> Option<SessionView> {
        match tokio::time::timeout(timeout, self.state_rx.wait_for(|v| predicate(v))).await {
            Ok(Ok(view)) => Some(view.clone()),
            _ => None,
        }
    }

    /// Collect SSE events up to and including the next `TurnDone`
    pub async fn collect_turn(&mut self, timeout: Duration) -> Option<Vec<SseEvent>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut seen = Vec::new();
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.broadcast_rx.recv()).await {
                Ok(Ok(event @ SseEvent::TurnDone { .. })) => {
                    seen.push(event);
                    return Some(seen);
                }
                Ok(Ok(event)) => seen.push(event),
                _ => continue,
            }
        }
        None
    }

    /// Wait for the next `SseEvent::Error` and return its message
    pub async fn wait_for_error(&mut self, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.broadcast_rx.recv()).await {
                Ok(Ok(SseEvent::Error { message })) => return Some(message),
                _ => continue,
            }
        }
        None
    }

    pub fn view(&self) -> SessionView {
        self.state_rx.borrow().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{SessionError, SessionManager, SessionSettings};
    use crate::state_machine::state::Role;
    use crate::state_machine::Notice;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn is_ready(view: &SessionView) -> bool {
        view.index.status == "ready"
    }

    #[tokio::test]
    async fn test_mock_llm() {
        let mock = MockLlm::new();
        mock.queue_response(LlmResponse::text("Hello"));

        let request = LlmRequest::new("Hi");
        let response = mock.complete(&request).await.unwrap();
        assert_eq!(response.text, "Hello");

        // Second call should fail (no more responses)
        assert!(mock.complete(&request).await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(8);
        let vectors = embedder
            .embed_documents(&["AWS Lambda".to_string(), "aws lambda".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors[0], vectors[1]);
        assert!((vectors[0].iter().sum::<f32>() - 2.0).abs() < f32::EPSILON);
        assert_eq!(embedder.calls(), 1);
    }

    /// Question answered end to end; the index is built exactly once
    #[tokio::test]
    async fn test_question_is_answered() {
        let responder = MockResponder::new();
        responder.queue_answer("Sagar has hands-on experience with Lambda, S3 and Bedrock.");

        let mut rt = TestRuntime::new().responder(responder).build();
        let ready = rt.wait_for(TIMEOUT, is_ready).await.expect("index ready");
        assert_eq!(ready.index.chunks, Some(1));

        rt.send_message("What are Sagar's AWS skills?").await;
        let events = rt.collect_turn(TIMEOUT).await.expect("turn completes");
        assert!(matches!(events.last(), Some(SseEvent::TurnDone { is_error: false })));

        let view = rt.view();
        assert_eq!(view.transcript.len(), 2);
        assert_eq!(view.transcript[0].role, Role::User);
        assert_eq!(view.transcript[0].content, "What are Sagar's AWS skills?");
        assert_eq!(view.transcript[1].role, Role::Assistant);
        assert!(!view.transcript[1].is_error);
        assert!(!view.pending);

        assert_eq!(rt.builder.builds(), 1);
        assert_eq!(rt.responder.questions(), vec!["What are Sagar's AWS skills?"]);
    }

    /// The pending snapshot is published before the answer arrives
    #[tokio::test]
    async fn test_pending_is_visible_while_answering() {
        let responder = MockResponder::new().with_delay(Duration::from_millis(100));
        responder.queue_answer("Yes.");

        let mut rt = TestRuntime::new().responder(responder).build();
        rt.wait_for(TIMEOUT, is_ready).await.expect("index ready");
        rt.send_message("Does Sagar know Rust?").await;

        let pending = rt.wait_for(TIMEOUT, |v| v.pending).await.expect("pending");
        assert_eq!(pending.transcript.len(), 1);

        let done = rt.wait_for(TIMEOUT, |v| !v.pending).await.expect("resolved");
        assert_eq!(done.transcript.len(), 2);
    }

    /// Without a source document the question stays unanswered
    #[tokio::test]
    async fn test_missing_source_stalls() {
        let mut rt = TestRuntime::new().builder(MockIndexBuilder::missing()).build();
        let failed = rt
            .wait_for(TIMEOUT, |v| v.index.status == "unavailable")
            .await
            .expect("index unavailable");
        assert!(failed.index.reason.as_deref().is_some_and(|r| r.contains("my_data.pdf")));

        rt.send_message("What are Sagar's AWS skills?").await;
        let view = rt.wait_for(TIMEOUT, |v| v.transcript.len() == 1).await.unwrap();
        assert!(view.pending);
        assert!(view.stalled);

        // A second message is refused while the first is still open
        rt.send_message("Hello?").await;
        assert!(rt.wait_for_error(TIMEOUT).await.is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let view = rt.view();
        assert_eq!(view.transcript.len(), 1);
        assert!(view.transcript.iter().all(|t| t.role == Role::User));
        assert!(rt.responder.questions().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let responder = MockResponder::new();
        responder.queue_error(LlmErrorKind::RateLimit, "Too many requests");
        responder.queue_answer("Sagar is an AWS certified architect.");

        let mut rt = TestRuntime::new().responder(responder).build();
        rt.wait_for(TIMEOUT, is_ready).await.expect("index ready");
        rt.send_message("Is Sagar certified?").await;

        let events = rt.collect_turn(TIMEOUT).await.expect("turn completes");
        assert!(events.iter().any(|e| matches!(
            e,
            SseEvent::Notice {
                notice: Notice::Retrying { attempt: 2, max_attempts: 3 }
            }
        )));
        assert!(matches!(events.last(), Some(SseEvent::TurnDone { is_error: false })));

        let view = rt.view();
        assert_eq!(view.transcript.len(), 2);
        assert!(!view.transcript[1].is_error);
        assert_eq!(rt.responder.questions().len(), 2);
    }

    /// Exhausted retries end the turn with an error; the session keeps working
    #[tokio::test]
    async fn test_persistent_failure_then_recovery() {
        let responder = MockResponder::new();
        for _ in 0..3 {
            responder.queue_error(LlmErrorKind::ServerError, "upstream unavailable");
        }
        responder.queue_answer("Sagar leads a GenAI platform team.");

        let mut rt = TestRuntime::new().responder(responder).build();
        rt.wait_for(TIMEOUT, is_ready).await.expect("index ready");

        rt.send_message("What does Sagar do?").await;
        let events = rt.collect_turn(TIMEOUT).await.expect("turn completes");
        assert!(matches!(events.last(), Some(SseEvent::TurnDone { is_error: true })));
        assert_eq!(rt.responder.questions().len(), 3);

        rt.send_message("What does Sagar do now?").await;
        let events = rt.collect_turn(TIMEOUT).await.expect("turn completes");
        assert!(matches!(events.last(), Some(SseEvent::TurnDone { is_error: false })));

        let view = rt.view();
        assert_eq!(view.transcript.len(), 4);
        assert!(view.transcript[1].is_error);
        assert_eq!(view.transcript[1].role, Role::Assistant);
        assert!(!view.transcript[3].is_error);
        assert!(!view.pending);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let responder = MockResponder::new();
        responder.queue_error(LlmErrorKind::Auth, "invalid api key");

        let mut rt = TestRuntime::new().responder(responder).build();
        rt.wait_for(TIMEOUT, is_ready).await.expect("index ready");
        rt.send_message("Hi").await;

        let events = rt.collect_turn(TIMEOUT).await.expect("turn completes");
        assert!(matches!(events.last(), Some(SseEvent::TurnDone { is_error: true })));
        assert_eq!(rt.responder.questions().len(), 1);
    }

    /// A question asked during the build is answered once the index is ready
    #[tokio::test]
    async fn test_question_during_build() {
        let responder = MockResponder::new();
        responder.queue_answer("Five years.");

        let mut rt = TestRuntime::new()
            .builder(
                MockIndexBuilder::ready(&["Five years of AWS"])
                    .with_delay(Duration::from_millis(100)),
            )
            .responder(responder)
            .build();
        rt.wait_for(TIMEOUT, |v| v.index.status == "building")
            .await
            .expect("building");

        rt.send_message("How long has Sagar used AWS?").await;
        let stalled = rt.wait_for(TIMEOUT, |v| v.pending).await.unwrap();
        assert!(!stalled.stalled);

        rt.collect_turn(TIMEOUT).await.expect("turn completes");
        let view = rt.view();
        assert_eq!(view.transcript.len(), 2);
        assert_eq!(rt.responder.questions(), vec!["How long has Sagar used AWS?"]);
        assert_eq!(rt.builder.builds(), 1);
    }

    // ------------------------------------------------------------------------
    // Session manager
    // ------------------------------------------------------------------------

    fn manager(builder: MockIndexBuilder, responder: Arc<MockResponder>) -> SessionManager {
        manager_with_idle(builder, responder, Duration::from_secs(30 * 60))
    }

    fn manager_with_idle(
        builder: MockIndexBuilder,
        responder: Arc<MockResponder>,
        idle_timeout: Duration,
    ) -> SessionManager {
        SessionManager::new(
            Arc::new(builder),
            responder,
            SessionSettings {
                retry_base: Duration::from_millis(5),
                idle_timeout,
                ..SessionSettings::default()
            },
        )
    }

    async fn wait_snapshot(
        manager: &SessionManager,
        id: &str,
        predicate: impl Fn(&SessionView) -> bool,
    ) -> SessionView {
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        loop {
            let view = manager.snapshot(id).await.unwrap();
            if predicate(&view) {
                return view;
            }
            assert!(tokio::time::Instant::now() < deadline, "condition not reached");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_manager_session_lifecycle() {
        let responder = Arc::new(MockResponder::new());
        responder.queue_answer("Hello from Sagar's assistant.");
        let manager = manager(MockIndexBuilder::ready(&["résumé"]), responder.clone());

        let (id, initial) = manager.create_session().await;
        assert_eq!(initial.session_id, id);
        assert!(initial.transcript.is_empty());

        wait_snapshot(&manager, &id, is_ready).await;
        manager.submit(&id, "Hi").await.unwrap();
        let view = wait_snapshot(&manager, &id, |v| v.transcript.len() == 2).await;
        assert!(!view.pending);

        manager.end_session(&id).await.unwrap();
        assert_eq!(
            manager.end_session(&id).await.unwrap_err(),
            SessionError::NotFound(id.clone())
        );
        assert_eq!(
            manager.snapshot(&id).await.unwrap_err(),
            SessionError::NotFound(id.clone())
        );
    }

    #[tokio::test]
    async fn test_manager_rejects_invalid_submissions() {
        let responder = Arc::new(MockResponder::new().with_delay(Duration::from_millis(200)));
        responder.queue_answer("Still thinking...");
        let manager = manager(MockIndexBuilder::ready(&["résumé"]), responder);

        assert_eq!(
            manager.submit("nope", "Hi").await.unwrap_err(),
            SessionError::NotFound("nope".to_string())
        );

        let (id, _) = manager.create_session().await;
        assert_eq!(manager.submit(&id, "  ").await.unwrap_err(), SessionError::EmptyMessage);

        wait_snapshot(&manager, &id, is_ready).await;
        manager.submit(&id, "First").await.unwrap();
        wait_snapshot(&manager, &id, |v| v.pending).await;
        assert_eq!(manager.submit(&id, "Second").await.unwrap_err(), SessionError::Busy);
    }

    #[tokio::test]
    async fn test_manager_subscribe_starts_from_snapshot() {
        let manager = manager(
            MockIndexBuilder::ready(&["résumé"]),
            Arc::new(MockResponder::new()),
        );
        let (id, _) = manager.create_session().await;
        wait_snapshot(&manager, &id, is_ready).await;

        let (view, _rx) = manager.subscribe(&id).await.unwrap();
        assert!(is_ready(&view));
        assert!(manager.subscribe("missing").await.is_err());
    }

    const SHORT_IDLE: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_idle_session_is_reaped() {
        let manager = manager_with_idle(
            MockIndexBuilder::ready(&["résumé"]),
            Arc::new(MockResponder::new()),
            SHORT_IDLE,
        );
        let (id, _) = manager.create_session().await;
        wait_snapshot(&manager, &id, is_ready).await;

        // Fresh activity keeps it alive
        assert_eq!(manager.reap_idle().await, 0);

        tokio::time::sleep(SHORT_IDLE * 2).await;
        assert_eq!(manager.reap_idle().await, 1);
        assert_eq!(
            manager.snapshot(&id).await.unwrap_err(),
            SessionError::NotFound(id.clone())
        );
    }

    #[tokio::test]
    async fn test_subscribed_session_is_kept() {
        let manager = manager_with_idle(
            MockIndexBuilder::ready(&["résumé"]),
            Arc::new(MockResponder::new()),
            SHORT_IDLE,
        );
        let (id, _) = manager.create_session().await;
        let (_, rx) = manager.subscribe(&id).await.unwrap();

        tokio::time::sleep(SHORT_IDLE * 2).await;
        assert_eq!(manager.reap_idle().await, 0);
        assert!(manager.snapshot(&id).await.is_ok());

        // Once the stream closes the quiet session expires
        drop(rx);
        tokio::time::sleep(SHORT_IDLE * 2).await;
        assert_eq!(manager.reap_idle().await, 1);
    }

    #[tokio::test]
    async fn test_session_answering_is_kept() {
        let responder = Arc::new(MockResponder::new().with_delay(Duration::from_millis(300)));
        responder.queue_answer("Slow answer");
        let manager =
            manager_with_idle(MockIndexBuilder::ready(&["résumé"]), responder, SHORT_IDLE);
        let (id, _) = manager.create_session().await;
        wait_snapshot(&manager, &id, is_ready).await;
        manager.submit(&id, "Hi").await.unwrap();
        wait_snapshot(&manager, &id, |v| v.pending).await;

        tokio::time::sleep(SHORT_IDLE * 2).await;
        assert_eq!(manager.reap_idle().await, 0);
    }

    #[tokio::test]
    async fn test_reaper_task_expires_sessions() {
        let manager = Arc::new(manager_with_idle(
            MockIndexBuilder::ready(&["résumé"]),
            Arc::new(MockResponder::new()),
            SHORT_IDLE,
        ));
        SessionManager::spawn_reaper(&manager, Duration::from_millis(10));
        let (id, _) = manager.create_session().await;

        let deadline = tokio::time::Instant::now() + TIMEOUT;
        while manager.snapshot(&id).await.is_ok() {
            assert!(tokio::time::Instant::now() < deadline, "session never expired");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
