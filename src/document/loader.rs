//! Reading the source document from disk

use super::Page;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Source document not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },
    #[error("Unsupported document type: {}", .0.display())]
    Unsupported(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Pdf,
    PlainText,
}

fn detect_format(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(Format::Pdf),
        "txt" | "md" | "markdown" => Some(Format::PlainText),
        _ => None,
    }
}

/// Load every page of the document at `path`.
///
/// PDF extraction is CPU-bound so it runs on the blocking pool.
pub async fn load_pages(path: &Path) -> Result<Vec<Page>, LoadError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    match detect_format(path) {
        Some(Format::PlainText) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| LoadError::Unreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            Ok(vec![Page { number: 1, text }])
        }
        Some(Format::Pdf) => {
            let owned = path.to_path_buf();
            let extraction =
                tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned));
            let pages = extraction
                .await
                .map_err(|e| LoadError::Unreadable {
                    path: path.to_path_buf(),
                    message: format!("extraction task failed: {e}"),
                })?
                .map_err(|e| LoadError::Unreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;

            Ok(pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| Page { number: i + 1, text })
                .collect())
        }
        None => Err(LoadError::Unsupported(path.to_path_buf())),
    }
}
