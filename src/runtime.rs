//! Runtime for executing sessions
//!
//! Each session is an actor task owning its `ConversationState`; the
//! manager keeps the channels used to reach it.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::state_machine::{ConversationState, Event, Notice, SessionContext, SessionView};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

/// Type alias for the runtime the server spawns
pub type ProductionRuntime = SessionRuntime<dyn IndexBuilder, dyn Responder>;

/// Handle to interact with a running session
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    pub state_rx: watch::Receiver<SessionView>,
    /// Last event sent or stream opened (for idle expiry)
    pub last_activity: Instant,
}

impl SessionHandle {
    /// Nobody is listening, nothing is in flight and the session has been
    /// quiet for at least `idle_timeout`
    fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        let view = self.state_rx.borrow();
        let answering = view.pending && !view.stalled;
        self.broadcast_tx.receiver_count() == 0
            && !answering
            && now.duration_since(self.last_activity) >= idle_timeout
    }
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init { session: SessionView },
    State { session: SessionView },
    Notice { notice: Notice },
    TurnDone { is_error: bool },
    Error { message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Still working on the previous question")]
    Busy,
    #[error("Session {0} has stopped")]
    Stopped(String),
}

/// Settings shared by every session the manager creates
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub idle_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Manager for all live sessions
pub struct SessionManager {
    builder: Arc<dyn IndexBuilder>,
    responder: Arc<dyn Responder>,
    settings: SessionSettings,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(
        builder: Arc<dyn IndexBuilder>,
        responder: Arc<dyn Responder>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            builder,
            responder,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session; its index build begins immediately
    pub async fn create_session(&self) -> (String, SessionView) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let context = SessionContext::new(&session_id, self.settings.max_attempts)
            .with_retry_base(self.settings.retry_base);

        let initial = ConversationState::new().view(&session_id);
        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let (state_tx, state_rx) = watch::channel(initial.clone());

        let runtime: ProductionRuntime = SessionRuntime::new(
            context,
            Arc::clone(&self.builder),
            Arc::clone(&self.responder),
            event_rx,
            &event_tx,
            broadcast_tx.clone(),
            state_tx,
        );
        tokio::spawn(runtime.run());

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionHandle {
                event_tx,
                broadcast_tx,
                state_rx,
                last_activity: Instant::now(),
            },
        );
        tracing::info!(session_id = %session_id, "Created session");

        (session_id, initial)
    }

    /// Latest published snapshot
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionView, SessionError> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let view = handle.state_rx.borrow().clone();
        Ok(view)
    }

    /// Submit a user question.
    ///
    /// Obvious rejections are answered here so the HTTP layer can report
    /// them; the state machine still has the final say.
    pub async fn submit(&self, session_id: &str, text: &str) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if self.snapshot(session_id).await?.pending {
            return Err(SessionError::Busy);
        }
        self.send_event(
            session_id,
            Event::UserMessage {
                text: text.to_string(),
            },
        )
        .await
    }

    pub async fn send_event(&self, session_id: &str, event: Event) -> Result<(), SessionError> {
        let event_tx = {
            let mut sessions = self.sessions.write().await;
            let handle = sessions
                .get_mut(session_id)
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            handle.last_activity = Instant::now();
            handle.event_tx.clone()
        };
        event_tx
            .send(event)
            .await
            .map_err(|_| SessionError::Stopped(session_id.to_string()))
    }

    /// Current snapshot plus a receiver for everything after it
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(SessionView, broadcast::Receiver<SseEvent>), SessionError> {
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        handle.last_activity = Instant::now();
        // Subscribe before reading the snapshot so no update falls in between
        let rx = handle.broadcast_tx.subscribe();
        let view = handle.state_rx.borrow().clone();
        Ok((view, rx))
    }

    /// Drop the session; its runtime stops once in-flight work finishes
    pub async fn end_session(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|_| tracing::info!(session_id = %session_id, "Ended session"))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Remove every idle session and return how many went
    pub async fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.settings.idle_timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|session_id, handle| {
            let idle = handle.is_idle(now, idle_timeout);
            if idle {
                tracing::info!(session_id = %session_id, "Cleaning up idle session");
            }
            !idle
        });
        before - sessions.len()
    }

    /// Periodically reap idle sessions until the manager is dropped
    pub fn spawn_reaper(manager: &Arc<Self>, interval: Duration) {
        // Weak reference so the task does not keep the manager alive
        let manager_weak = Arc::downgrade(manager);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(manager) = manager_weak.upgrade() else {
                    tracing::debug!("SessionManager dropped, reaper exiting");
                    break;
                };
                manager.reap_idle().await;
            }
        });
    }
}
