//! Pure state transition function

use super::state::{IndexStatus, Phase, Turn};
use super::{ConversationState, Effect, Event, SessionContext};
use crate::llm::LlmErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("The document index has already been requested for this session")]
    IndexAlreadyRequested,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Still working on the previous question")]
    AwaitingResponse,
    #[error("Stale retry for attempt {got} (current attempt {current})")]
    StaleRetry { current: u32, got: u32 },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// Given the same state, context and event it always produces the same new
/// state and effects; the only ambient input is the clock used to stamp new
/// turns.
#[allow(clippy::too_many_lines)]
pub fn transition(
    state: &ConversationState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (&state.phase, &state.index, event) {
        // ============================================================
        // Index lifecycle
        // ============================================================

        (_, IndexStatus::NotStarted, Event::SessionStarted) => {
            let new_state = ConversationState {
                index: IndexStatus::Building,
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::BuildIndex)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::notify_index_building()))
        }

        (_, _, Event::SessionStarted) => Err(TransitionError::IndexAlreadyRequested),

        (phase, IndexStatus::Building, Event::IndexBuilt { index }) => {
            let chunks = index.len();
            let new_state = ConversationState {
                index: IndexStatus::Ready(index),
                ..state.clone()
            };

            // A question asked while the index was building is answered now
            let pending_question = match phase {
                Phase::AwaitingResponse { .. } => state.open_question().map(Effect::request_answer),
                Phase::Idle => None,
            };

            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::notify_index_ready(chunks))
                .with_effects(pending_question))
        }

        (_, IndexStatus::Building, Event::IndexFailed { message }) => {
            let new_state = ConversationState {
                index: IndexStatus::Unavailable {
                    reason: message.clone(),
                },
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::notify_index_unavailable(message)))
        }

        (_, index, event @ (Event::IndexBuilt { .. } | Event::IndexFailed { .. })) => {
            Err(TransitionError::InvalidTransition(format!(
                "{} while index is {}",
                event.name(),
                index.label()
            )))
        }

        // ============================================================
        // User messages
        // ============================================================

        (Phase::AwaitingResponse { .. }, _, Event::UserMessage { .. }) => {
            Err(TransitionError::AwaitingResponse)
        }

        (Phase::Idle, index, Event::UserMessage { text }) => {
            let question = text.trim();
            if question.is_empty() {
                return Err(TransitionError::EmptyMessage);
            }

            let mut transcript = state.transcript.clone();
            transcript.push(Turn::user(question));
            let new_state = ConversationState {
                transcript,
                phase: Phase::AwaitingResponse { attempt: 1 },
                index: index.clone(),
            };

            // Publish first so clients see the pending turn before the call starts
            let request = index.is_ready().then(|| Effect::request_answer(question));
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishState)
                .with_effects(request))
        }

        // ============================================================
        // Responder results
        // ============================================================

        (
            Phase::AwaitingResponse { .. },
            index @ IndexStatus::Ready(_),
            Event::ResponseReady { text },
        ) => {
            let mut transcript = state.transcript.clone();
            transcript.push(Turn::assistant(text));
            let new_state = ConversationState {
                transcript,
                phase: Phase::Idle,
                index: index.clone(),
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::notify_turn_complete(false)))
        }

        (
            Phase::AwaitingResponse { attempt },
            index @ IndexStatus::Ready(_),
            Event::ResponseFailed {
                kind,
                attempt: failed,
                retry_after,
                ..
            },
        ) if *attempt == failed && kind.is_retryable() && *attempt < context.max_attempts => {
            let next = attempt + 1;
            let new_state = ConversationState {
                phase: Phase::AwaitingResponse { attempt: next },
                index: index.clone(),
                transcript: state.transcript.clone(),
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::ScheduleRetry {
                    delay: retry_delay(context.retry_base, next, retry_after),
                    attempt: next,
                })
                .with_effect(Effect::PublishState)
                .with_effect(Effect::Notify(super::Notice::Retrying {
                    attempt: next,
                    max_attempts: context.max_attempts,
                })))
        }

        (
            Phase::AwaitingResponse { attempt },
            index @ IndexStatus::Ready(_),
            Event::ResponseFailed {
                message,
                kind,
                attempt: failed,
                ..
            },
        ) if *attempt == failed => {
            let mut transcript = state.transcript.clone();
            transcript.push(Turn::error(failure_message(&message, kind, *attempt)));
            let new_state = ConversationState {
                transcript,
                phase: Phase::Idle,
                index: index.clone(),
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::notify_turn_complete(true)))
        }

        (
            Phase::AwaitingResponse { attempt },
            IndexStatus::Ready(_),
            Event::ResponseFailed { attempt: failed, .. },
        ) => Err(TransitionError::InvalidTransition(format!(
            "response_failed for attempt {failed} during attempt {attempt}"
        ))),

        // Answers only exist for a ready index
        (
            Phase::AwaitingResponse { .. },
            index,
            event @ (Event::ResponseReady { .. } | Event::ResponseFailed { .. }),
        ) => Err(TransitionError::InvalidTransition(format!(
            "{} while index is {}",
            event.name(),
            index.label()
        ))),

        (
            Phase::AwaitingResponse { attempt },
            IndexStatus::Ready(_),
            Event::RetryTimeout { attempt: retry },
        ) if *attempt == retry => {
            match state.open_question() {
                Some(question) => Ok(TransitionResult::new(state.clone())
                    .with_effect(Effect::request_answer(question))),
                None => Err(TransitionError::InvalidTransition(
                    "retry with no open question".to_string(),
                )),
            }
        }

        (Phase::AwaitingResponse { attempt }, _, Event::RetryTimeout { attempt: retry }) => {
            Err(TransitionError::StaleRetry {
                current: *attempt,
                got: retry,
            })
        }

        (Phase::Idle, _, Event::RetryTimeout { attempt }) => Err(TransitionError::StaleRetry {
            current: 0,
            got: attempt,
        }),

        (Phase::Idle, _, event @ (Event::ResponseReady { .. } | Event::ResponseFailed { .. })) => {
            Err(TransitionError::InvalidTransition(format!(
                "{} with no question pending",
                event.name()
            )))
        }
    }
}

/// Longest server-requested wait honoured before a retry
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Exponential backoff (base, 2x base, 4x base, ...), stretched to the
/// server's Retry-After when that is longer
fn retry_delay(base: Duration, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let exponent = attempt.saturating_sub(2).min(16);
    let backoff = base.saturating_mul(1 << exponent);
    retry_after.map_or(backoff, |wait| backoff.max(wait.min(MAX_RETRY_AFTER)))
}

fn failure_message(message: &str, kind: LlmErrorKind, attempts: u32) -> String {
    if kind.is_retryable() {
        format!("Sorry, I couldn't get an answer after {attempts} attempts: {message}")
    } else {
        format!("Sorry, I couldn't answer that: {message}")
    }
}
