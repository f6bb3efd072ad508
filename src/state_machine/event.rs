//! Events that drive a conversation

use super::state::IndexHandle;
use crate::llm::LlmErrorKind;
use std::time::Duration;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Session lifecycle
    SessionStarted,

    // Index build results
    IndexBuilt {
        index: IndexHandle,
    },
    IndexFailed {
        message: String,
    },

    // User events
    UserMessage {
        text: String,
    },

    // Responder results
    ResponseReady {
        text: String,
    },
    ResponseFailed {
        message: String,
        kind: LlmErrorKind,
        attempt: u32,
        /// Server-requested wait before trying again
        retry_after: Option<Duration>,
    },
    RetryTimeout {
        attempt: u32,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionStarted => "session_started",
            Event::IndexBuilt { .. } => "index_built",
            Event::IndexFailed { .. } => "index_failed",
            Event::UserMessage { .. } => "user_message",
            Event::ResponseReady { .. } => "response_ready",
            Event::ResponseFailed { .. } => "response_failed",
            Event::RetryTimeout { .. } => "retry_timeout",
        }
    }
}
