//! Persona prompt template
//!
//! The assistant's behaviour policy lives in a Jinja template with two
//! variables: `context` (retrieved résumé excerpts) and `input` (the
//! user's question). A default ships inside the binary; a file given via
//! `PERSONA_TEMPLATE_PATH` replaces it.

use minijinja::{context, Environment};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_TEMPLATE: &str = include_str!("../prompts/persona.txt");

const CONTEXT_SENTINEL: &str = "\u{1}context-sentinel\u{1}";
const INPUT_SENTINEL: &str = "\u{1}input-sentinel\u{1}";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to read persona template {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },
    #[error("Persona template is invalid: {0}")]
    Syntax(String),
    #[error("Persona template never uses the `{0}` variable")]
    MissingPlaceholder(&'static str),
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    /// Load the template from `path`, or the built-in one when `None`
    pub fn load(path: Option<&Path>) -> Result<Self, PromptError> {
        match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| PromptError::Unreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                tracing::info!(path = %path.display(), "Loaded persona template from file");
                Self::from_source(source)
            }
            None => Self::from_source(DEFAULT_TEMPLATE.to_string()),
        }
    }

    /// Parse and check that both variables actually reach the output
    pub fn from_source(source: String) -> Result<Self, PromptError> {
        let template = Self { source };
        let probe = template.render(CONTEXT_SENTINEL, INPUT_SENTINEL)?;
        if !probe.contains(CONTEXT_SENTINEL) {
            return Err(PromptError::MissingPlaceholder("context"));
        }
        if !probe.contains(INPUT_SENTINEL) {
            return Err(PromptError::MissingPlaceholder("input"));
        }
        Ok(template)
    }

    pub fn render(&self, context_text: &str, input: &str) -> Result<String, PromptError> {
        let env = Environment::new();
        env.render_str(&self.source, context! { context => context_text, input => input })
            .map_err(|e| PromptError::Syntax(e.to_string()))
    }
}
