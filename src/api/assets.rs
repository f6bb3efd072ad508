//! Embedded chat page
//!
//! Falls back to the working directory so the page can be edited without
//! a rebuild.

use rust_embed::Embed;

#[derive(Embed)]
#[folder = "ui"]
struct Assets;

/// Get the index.html content (embedded or from filesystem)
pub fn get_index_html() -> Option<String> {
    if let Some(content) = Assets::get("index.html") {
        return String::from_utf8(content.data.to_vec()).ok();
    }

    std::fs::read_to_string("ui/index.html").ok()
}

/// Embedded file plus its guessed content type
pub fn get_asset(path: &str) -> Option<(Vec<u8>, String)> {
    let content = Assets::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Some((content.data.to_vec(), mime.to_string()))
}
