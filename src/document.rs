//! Source document ingestion
//!
//! Loading turns the résumé file into pages of text; splitting turns those
//! pages into overlapping chunks ready for embedding.

mod loader;
mod splitter;

pub use loader::{load_pages, LoadError};
pub use splitter::TextSplitter;

use serde::Serialize;

/// One page of extracted text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: usize,
    pub text: String,
}

/// A piece of the source document small enough to embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub text: String,
    /// 1-based page the chunk came from, when the format has pages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Position of the chunk within the whole document
    pub index: usize,
}
