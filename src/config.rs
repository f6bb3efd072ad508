//! Application configuration
//!
//! Everything is read from environment variables, after `main` has merged
//! in a `.env` file if one exists. Parsing goes through a lookup closure so
//! tests never have to mutate the process environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_RESUME_PATH: &str = "./my_data.pdf";
const DEFAULT_PROJECT: &str = "my-resume-qa-assistant";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Required secret {0} is not set")]
    MissingSecret(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Splitter parameters, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Overlap must stay strictly below the chunk size or the splitter
    /// would never make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                name: "CHUNK_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid {
                name: "CHUNK_OVERLAP",
                reason: format!(
                    "overlap {} must be smaller than chunk size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        Ok(())
    }

    /// Overlap above half the chunk size mostly duplicates content
    pub fn overlap_is_excessive(&self) -> bool {
        self.chunk_overlap * 2 > self.chunk_size
    }
}

/// Optional run-tracing settings
#[derive(Clone, Default)]
pub struct TracingConfig {
    pub api_key: Option<String>,
    pub project: String,
}

impl std::fmt::Debug for TracingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("project", &self.project)
            .finish()
    }
}

/// Full application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub tracing: TracingConfig,
    pub resume_path: PathBuf,
    pub persona_template_path: Option<PathBuf>,
    pub chat_model: String,
    pub chat_temperature: f32,
    pub chat_max_tokens: u32,
    pub embedding_model: String,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub session_idle_timeout: Duration,
    pub port: u16,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("openai_api_key", &"<redacted>")
            .field("openai_base_url", &self.openai_base_url)
            .field("tracing", &self.tracing)
            .field("resume_path", &self.resume_path)
            .field("persona_template_path", &self.persona_template_path)
            .field("chat_model", &self.chat_model)
            .field("chat_temperature", &self.chat_temperature)
            .field("chat_max_tokens", &self.chat_max_tokens)
            .field("embedding_model", &self.embedding_model)
            .field("chunking", &self.chunking)
            .field("top_k", &self.top_k)
            .field("max_attempts", &self.max_attempts)
            .field("request_timeout", &self.request_timeout)
            .field("session_idle_timeout", &self.session_idle_timeout)
            .field("port", &self.port)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// The model provider key is checked first so a missing secret is
    /// reported before anything else is parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let openai_api_key =
            get("OPENAI_API_KEY").ok_or(ConfigError::MissingSecret("OPENAI_API_KEY"))?;

        let defaults = ChunkingConfig::default();
        let chunking = ChunkingConfig {
            chunk_size: parse_or(&get, "CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_or(&get, "CHUNK_OVERLAP", defaults.chunk_overlap)?,
        };
        chunking.validate()?;

        let top_k: usize = parse_or(&get, "RETRIEVAL_TOP_K", 4)?;
        if top_k == 0 {
            return Err(ConfigError::Invalid {
                name: "RETRIEVAL_TOP_K",
                reason: "must be at least 1".to_string(),
            });
        }

        let max_attempts: u32 = parse_or(&get, "LLM_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "LLM_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        let chat_temperature: f32 = parse_or(&get, "CHAT_TEMPERATURE", 0.2)?;
        if !(0.0..=2.0).contains(&chat_temperature) {
            return Err(ConfigError::Invalid {
                name: "CHAT_TEMPERATURE",
                reason: format!("{chat_temperature} is outside 0.0..=2.0"),
            });
        }

        let idle_secs: u64 = parse_or(&get, "SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS)?;
        if idle_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SESSION_IDLE_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL").map_or_else(
                || DEFAULT_BASE_URL.to_string(),
                |u| u.trim_end_matches('/').to_string(),
            ),
            tracing: TracingConfig {
                api_key: get("LANGCHAIN_API_KEY"),
                project: get("LANGCHAIN_PROJECT").unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            },
            resume_path: get("RESUME_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_RESUME_PATH), PathBuf::from),
            persona_template_path: get("PERSONA_TEMPLATE_PATH").map(PathBuf::from),
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            chat_temperature,
            chat_max_tokens: parse_or(&get, "CHAT_MAX_TOKENS", 1024)?,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chunking,
            top_k,
            max_attempts,
            request_timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 60)?),
            session_idle_timeout: Duration::from_secs(idle_secs),
            port: parse_or(&get, "ASSISTANT_PORT", 8000)?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: format!("{raw:?}: {e}"),
        }),
    }
}
