//! In-memory similarity index over the source document
//!
//! Build: load pages, split into chunks, embed every chunk. Search is a
//! flat cosine-similarity scan, which is plenty for a single résumé.

use crate::document::{load_pages, Chunk, LoadError, TextSplitter};
use crate::embeddings::Embedder;
use crate::llm::LlmError;
use crate::runtime::IndexBuilder;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("Source document not found: {}", .0.display())]
    MissingSource(PathBuf),
    #[error("Failed to load source document: {0}")]
    Load(String),
    #[error("No extractable text in {}", .0.display())]
    EmptyDocument(PathBuf),
    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("Embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl From<LoadError> for IndexError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::NotFound(path) => Self::MissingSource(path),
            other => Self::Load(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// A chunk returned by a search, with its similarity to the query
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Searchable index of one document. Immutable once built.
#[derive(Debug)]
pub struct DocumentIndex {
    entries: Vec<IndexedChunk>,
    dimensions: usize,
    source: PathBuf,
    built_at: DateTime<Utc>,
}

impl DocumentIndex {
    /// Pair chunks with their embeddings. All vectors must share one length.
    pub fn new(
        source: PathBuf,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::Embedding(LlmError::unknown(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            ))));
        }

        let dimensions = embeddings.first().map_or(0, Vec::len);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                found: bad.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        Ok(Self {
            entries,
            dimensions,
            source,
            built_at: Utc::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Top `k` chunks by descending cosine similarity
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if !self.is_empty() && query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                found: query.len(),
            });
        }

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.chunk.index.cmp(&b.1.chunk.index))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| RetrievedChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Statistics from one build
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub pages: usize,
    pub chunks: usize,
    pub dimensions: usize,
}

/// Builds the index for the configured source document
pub struct DocumentIndexer {
    source: PathBuf,
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
}

impl DocumentIndexer {
    pub fn new(source: PathBuf, splitter: TextSplitter, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            source,
            splitter,
            embedder,
        }
    }
}

#[async_trait]
impl IndexBuilder for DocumentIndexer {
    async fn build_index(&self) -> Result<DocumentIndex, IndexError> {
        let start = std::time::Instant::now();

        let pages = load_pages(&self.source).await?;
        let chunks = self.splitter.split_pages(&pages);
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument(self.source.clone()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        let index = DocumentIndex::new(self.source.clone(), chunks, embeddings)?;

        let stats = IndexStats {
            pages: pages.len(),
            chunks: index.len(),
            dimensions: index.dimensions(),
        };
        tracing::info!(
            source = %self.source.display(),
            pages = stats.pages,
            chunks = stats.chunks,
            dimensions = stats.dimensions,
            embedding_model = %self.embedder.model_id(),
            built_at = %index.built_at(),
            duration_ms = %start.elapsed().as_millis(),
            "Document index built"
        );

        Ok(index)
    }
}
