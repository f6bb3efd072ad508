//! Trait abstractions for runtime I/O
//!
//! The session runtime only sees these two seams, so its tests can run
//! against mocks instead of the PDF loader and the model provider.

use crate::index::{DocumentIndex, IndexError};
use crate::responder::{Answer, ResponderError};
use async_trait::async_trait;
use std::sync::Arc;

/// One-shot builder for the session's document index
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    async fn build_index(&self) -> Result<DocumentIndex, IndexError>;
}

/// Answers one question against a built index
#[async_trait]
pub trait Responder: Send + Sync {
    async fn answer(&self, question: &str, index: &DocumentIndex) -> Result<Answer, ResponderError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: IndexBuilder + ?Sized> IndexBuilder for Arc<T> {
    async fn build_index(&self) -> Result<DocumentIndex, IndexError> {
        (**self).build_index().await
    }
}

#[async_trait]
impl<T: Responder + ?Sized> Responder for Arc<T> {
    async fn answer(
        &self,
        question: &str,
        index: &DocumentIndex,
    ) -> Result<Answer, ResponderError> {
        (**self).answer(question, index).await
    }
}
