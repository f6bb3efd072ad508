//! Session runtime executor

use super::traits::{IndexBuilder, Responder};
use super::SseEvent;
use crate::state_machine::state::{IndexStatus, Phase};
use crate::state_machine::{
    transition, ConversationState, Effect, Event, IndexHandle, Notice, SessionContext, SessionView,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Owns one session's state and applies events to it one at a time.
///
/// Slow work (index build, model calls, retry timers) runs in spawned tasks
/// that report back through the event channel. The runtime itself only
/// keeps a weak sender, so it stops once every external handle is dropped
/// and no task is still in flight.
pub struct SessionRuntime<B, R>
where
    B: IndexBuilder + ?Sized + 'static,
    R: Responder + ?Sized + 'static,
{
    context: SessionContext,
    state: ConversationState,
    builder: Arc<B>,
    responder: Arc<R>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::WeakSender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    state_tx: watch::Sender<SessionView>,
}

impl<B, R> SessionRuntime<B, R>
where
    B: IndexBuilder + ?Sized + 'static,
    R: Responder + ?Sized + 'static,
{
    pub fn new(
        context: SessionContext,
        builder: Arc<B>,
        responder: Arc<R>,
        event_rx: mpsc::Receiver<Event>,
        event_tx: &mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        state_tx: watch::Sender<SessionView>,
    ) -> Self {
        Self {
            context,
            state: ConversationState::new(),
            builder,
            responder,
            event_rx,
            event_tx: event_tx.downgrade(),
            broadcast_tx,
            state_tx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting session runtime");

        // Kick off the one index build for this session
        if let Err(e) = self.process_event(Event::SessionStarted) {
            tracing::error!(
                session_id = %self.context.session_id,
                error = %e,
                "Failed to start session"
            );
        }

        // Process events in a loop - no recursion
        while let Some(event) = self.event_rx.recv().await {
            if let Err(e) = self.process_event(event) {
                tracing::warn!(session_id = %self.context.session_id, error = %e, "Rejected event");
            }
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    fn process_event(&mut self, event: Event) -> Result<(), String> {
        let name = event.name();
        let result = match transition(&self.state, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                // Transition errors are user-facing (e.g. "still working")
                let _ = self.broadcast_tx.send(SseEvent::Error {
                    message: e.to_string(),
                });
                return Err(e.to_string());
            }
        };

        tracing::debug!(
            session_id = %self.context.session_id,
            event = name,
            effects = result.effects.len(),
            "Applied transition"
        );
        self.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(effect);
        }
        Ok(())
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::BuildIndex => {
                let Some(event_tx) = self.event_tx.upgrade() else {
                    return;
                };
                let builder = Arc::clone(&self.builder);
                let session_id = self.context.session_id.clone();

                tokio::spawn(async move {
                    tracing::info!(
                        session_id = %session_id,
                        "Building document index (background)"
                    );
                    let event = match builder.build_index().await {
                        Ok(index) => Event::IndexBuilt {
                            index: IndexHandle::new(index),
                        },
                        Err(e) => {
                            tracing::error!(
                                session_id = %session_id,
                                error = %e,
                                "Document index unavailable"
                            );
                            Event::IndexFailed {
                                message: e.to_string(),
                            }
                        }
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::RequestAnswer { question } => {
                let IndexStatus::Ready(index) = &self.state.index else {
                    tracing::error!(
                        session_id = %self.context.session_id,
                        "Answer requested without an index"
                    );
                    return;
                };
                let Some(event_tx) = self.event_tx.upgrade() else {
                    return;
                };
                let index = index.shared();
                let responder = Arc::clone(&self.responder);
                let session_id = self.context.session_id.clone();
                let attempt = match self.state.phase {
                    Phase::AwaitingResponse { attempt } => attempt,
                    Phase::Idle => 1,
                };

                tokio::spawn(async move {
                    tracing::info!(
                        session_id = %session_id,
                        attempt,
                        "Requesting answer (background)"
                    );
                    let event = match responder.answer(&question, &index).await {
                        Ok(answer) => {
                            tracing::info!(
                                session_id = %session_id,
                                sources = answer.sources.len(),
                                output_tokens = answer.usage.output_tokens,
                                "Answer ready"
                            );
                            Event::ResponseReady { text: answer.text }
                        }
                        Err(e) => {
                            tracing::warn!(
                                session_id = %session_id,
                                attempt,
                                retryable = e.is_retryable(),
                                error = %e,
                                "Answer failed"
                            );
                            Event::ResponseFailed {
                                message: e.message,
                                kind: e.kind,
                                attempt,
                                retry_after: e.retry_after,
                            }
                        }
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::ScheduleRetry { delay, attempt } => {
                let Some(event_tx) = self.event_tx.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = event_tx.send(Event::RetryTimeout { attempt }).await;
                });
            }

            Effect::PublishState => {
                let view = self.state.view(&self.context.session_id);
                self.state_tx.send_replace(view.clone());
                let _ = self.broadcast_tx.send(SseEvent::State { session: view });
            }

            Effect::Notify(Notice::TurnComplete { is_error }) => {
                let _ = self.broadcast_tx.send(SseEvent::TurnDone { is_error });
            }

            Effect::Notify(notice) => {
                let _ = self.broadcast_tx.send(SseEvent::Notice { notice });
            }
        }
    }
}
