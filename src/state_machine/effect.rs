//! Effects produced by state transitions

use serde::Serialize;
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Build the document index (spawns as background task)
    BuildIndex,

    /// Ask the responder to answer `question`
    RequestAnswer { question: String },

    /// Schedule a retry
    ScheduleRetry { delay: Duration, attempt: u32 },

    /// Push the current snapshot to watchers and SSE clients
    PublishState,

    /// Tell connected clients something happened
    Notify(Notice),
}

/// Transient, user-facing notices
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    IndexBuilding,
    IndexReady { chunks: usize },
    IndexUnavailable { reason: String },
    Retrying { attempt: u32, max_attempts: u32 },
    TurnComplete { is_error: bool },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::IndexBuilding => "Processing Sagar's data...".to_string(),
            Notice::IndexReady { .. } => "I am ready to answer your questions".to_string(),
            Notice::IndexUnavailable { reason } => reason.clone(),
            Notice::Retrying { attempt, max_attempts } => {
                format!("Retrying... (attempt {attempt} of {max_attempts})")
            }
            Notice::TurnComplete { .. } => String::new(),
        }
    }
}

impl Effect {
    pub fn notify_index_building() -> Self {
        Effect::Notify(Notice::IndexBuilding)
    }

    pub fn notify_index_ready(chunks: usize) -> Self {
        Effect::Notify(Notice::IndexReady { chunks })
    }

    pub fn notify_index_unavailable(reason: impl Into<String>) -> Self {
        Effect::Notify(Notice::IndexUnavailable {
            reason: reason.into(),
        })
    }

    pub fn notify_turn_complete(is_error: bool) -> Self {
        Effect::Notify(Notice::TurnComplete { is_error })
    }

    pub fn request_answer(question: impl Into<String>) -> Self {
        Effect::RequestAnswer {
            question: question.into(),
        }
    }
}
