//! Conversation state types

use crate::index::DocumentIndex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the transcript. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Assistant turn reporting a failed model call
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), false)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), false)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), true)
    }

    fn new(role: Role, content: String, is_error: bool) -> Self {
        Self {
            role,
            content,
            is_error,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// A user turn is waiting for its answer; `attempt` counts model calls
    AwaitingResponse { attempt: u32 },
}

/// Shared, read-only handle to a built index.
///
/// Equality is identity: two handles are equal when they point at the same
/// build.
#[derive(Clone)]
pub struct IndexHandle(Arc<DocumentIndex>);

impl IndexHandle {
    pub fn new(index: DocumentIndex) -> Self {
        Self(Arc::new(index))
    }

    pub fn shared(&self) -> Arc<DocumentIndex> {
        Arc::clone(&self.0)
    }
}

impl Deref for IndexHandle {
    type Target = DocumentIndex;

    fn deref(&self) -> &DocumentIndex {
        &self.0
    }
}

impl PartialEq for IndexHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("chunks", &self.0.len())
            .field("source", &self.0.source())
            .finish()
    }
}

/// Lifecycle of the session's document index. Only ever moves forward.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum IndexStatus {
    #[default]
    NotStarted,
    Building,
    Ready(IndexHandle),
    Unavailable { reason: String },
}

impl IndexStatus {
    pub fn label(&self) -> &'static str {
        match self {
            IndexStatus::NotStarted => "not_started",
            IndexStatus::Building => "building",
            IndexStatus::Ready(_) => "ready",
            IndexStatus::Unavailable { .. } => "unavailable",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, IndexStatus::Ready(_))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversationState {
    pub transcript: Vec<Turn>,
    pub phase: Phase,
    pub index: IndexStatus,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> bool {
        matches!(self.phase, Phase::AwaitingResponse { .. })
    }

    /// Waiting for an answer that can never come
    pub fn stalled(&self) -> bool {
        self.pending() && matches!(self.index, IndexStatus::Unavailable { .. })
    }

    /// Text of the last turn if it was the user's
    pub fn open_question(&self) -> Option<&str> {
        self.transcript
            .last()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }

    pub fn view(&self, session_id: &str) -> SessionView {
        SessionView {
            session_id: session_id.to_string(),
            transcript: self.transcript.clone(),
            pending: self.pending(),
            stalled: self.stalled(),
            index: IndexView {
                status: self.index.label(),
                chunks: match &self.index {
                    IndexStatus::Ready(index) => Some(index.len()),
                    _ => None,
                },
                reason: match &self.index {
                    IndexStatus::Unavailable { reason } => Some(reason.clone()),
                    _ => None,
                },
            },
        }
    }
}

/// Serializable snapshot handed to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub transcript: Vec<Turn>,
    pub pending: bool,
    pub stalled: bool,
    pub index: IndexView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexView {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-session settings the transition function needs
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further one
    pub retry_base: Duration,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            session_id: session_id.into(),
            max_attempts,
            retry_base: Duration::from_secs(1),
        }
    }

    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }
}
