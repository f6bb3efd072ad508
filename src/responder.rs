//! Retrieval-augmented answer generation
//!
//! One call per question: embed the question, pull the closest chunks from
//! the index, render the persona template around them and ask the chat
//! model once. Earlier turns are not sent.

use crate::embeddings::Embedder;
use crate::index::{DocumentIndex, RetrievedChunk};
use crate::llm::{LlmError, LlmErrorKind, LlmRequest, LlmService, Usage};
use crate::persona::PromptTemplate;
use crate::runtime::Responder;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

/// Generated answer plus the chunks it was grounded on
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ResponderError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Wait requested by the model provider, if any
    pub retry_after: Option<Duration>,
}

impl ResponderError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<LlmError> for ResponderError {
    fn from(e: LlmError) -> Self {
        Self::new(e.kind, e.message).with_retry_after(e.retry_after)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct RagResponder {
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmService>,
    template: PromptTemplate,
    settings: GenerationSettings,
    project: String,
}

impl RagResponder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmService>,
        template: PromptTemplate,
        settings: GenerationSettings,
        project: String,
    ) -> Self {
        Self {
            embedder,
            llm,
            template,
            settings,
            project,
        }
    }

    async fn generate(
        &self,
        question: &str,
        index: &DocumentIndex,
    ) -> Result<Answer, ResponderError> {
        let query = self.embedder.embed_query(question).await?;
        let sources = index
            .search(&query, self.settings.top_k)
            .map_err(|e| ResponderError::new(LlmErrorKind::Unknown, e.to_string()))?;

        let context = sources
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self
            .template
            .render(&context, question)
            .map_err(|e| ResponderError::new(LlmErrorKind::InvalidRequest, e.to_string()))?;

        tracing::debug!(
            chunks = sources.len(),
            context_chars = context.chars().count(),
            "Retrieved context"
        );

        let request = LlmRequest::new(prompt)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);
        let response = self.llm.complete(&request).await?;

        Ok(Answer {
            text: response.text,
            sources,
            usage: response.usage,
        })
    }
}

#[async_trait]
impl Responder for RagResponder {
    async fn answer(
        &self,
        question: &str,
        index: &DocumentIndex,
    ) -> Result<Answer, ResponderError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ResponderError::new(
                LlmErrorKind::InvalidRequest,
                "Question is empty",
            ));
        }

        let span = tracing::info_span!(
            "answer",
            project = %self.project,
            model = %self.llm.model_id()
        );
        self.generate(question, index).instrument(span).await
    }
}
