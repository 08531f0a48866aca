//! Process-environment configuration.
//!
//! Values are trimmed; an empty value counts as unset. Lookups happen when a component is
//! built, so a missing required key surfaces as `Error::NotConfigured` before any network
//! activity starts.

use crate::ollama::OllamaClient;
use crate::openai_compat::OpenAiCompatClient;
use pagesift_core::{
    Error, ModelBackend, Result, DEFAULT_CHUNK_CHARS, DEFAULT_KEYWORD_CATEGORY,
};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn env_truthy(key: &str) -> bool {
    matches!(
        env(key).unwrap_or_default().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Realistic desktop browser identification for static fetches.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 120_000;

pub fn user_agent_from_env() -> String {
    env("PAGESIFT_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
}

pub fn model_timeout_from_env() -> Duration {
    Duration::from_millis(env_u64("PAGESIFT_MODEL_TIMEOUT_MS", DEFAULT_MODEL_TIMEOUT_MS).max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackendKind {
    Ollama,
    OpenAiCompat,
}

impl ModelBackendKind {
    pub fn from_env() -> Result<Self> {
        match env("PAGESIFT_MODEL_BACKEND")
            .unwrap_or_else(|| "ollama".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "ollama" => Ok(Self::Ollama),
            "openai_compat" | "openai-compat" | "openai" => Ok(Self::OpenAiCompat),
            other => Err(Error::NotConfigured(format!(
                "unknown PAGESIFT_MODEL_BACKEND={other:?} (allowed: ollama, openai_compat)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAiCompat => "openai_compat",
        }
    }
}

/// Build the configured model handle. The HTTP client is shared with the caller.
pub fn model_from_env(client: reqwest::Client) -> Result<Arc<dyn ModelBackend>> {
    let kind = ModelBackendKind::from_env()?;
    tracing::debug!(backend = kind.as_str(), "configuring model backend");
    Ok(match kind {
        ModelBackendKind::Ollama => Arc::new(OllamaClient::from_env(client)?),
        ModelBackendKind::OpenAiCompat => Arc::new(OpenAiCompatClient::from_env(client, None)?),
    })
}

/// Plain HTTP client for model endpoints (no browser user agent).
pub fn model_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("pagesift/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(model_timeout_from_env())
        .build()
        .map_err(|e| Error::NotConfigured(format!("http client: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub chunk_chars: usize,
    pub keyword_category: String,
    pub preview_chars: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            chunk_chars: DEFAULT_CHUNK_CHARS,
            keyword_category: DEFAULT_KEYWORD_CATEGORY.to_string(),
            preview_chars: 10_000,
        }
    }
}

impl Defaults {
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            chunk_chars: env_u64("PAGESIFT_CHUNK_CHARS", base.chunk_chars as u64) as usize,
            keyword_category: env("PAGESIFT_KEYWORD_CATEGORY").unwrap_or(base.keyword_category),
            preview_chars: base.preview_chars,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; every test in this crate that mutates them takes this lock.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn empty_values_count_as_unset() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("PAGESIFT_TEST_EMPTY", "   ");
        assert_eq!(env("PAGESIFT_TEST_EMPTY"), None);
        assert_eq!(env_u64("PAGESIFT_TEST_EMPTY", 7), 7);
        std::env::set_var("PAGESIFT_TEST_EMPTY", " yes ");
        assert!(env_truthy("PAGESIFT_TEST_EMPTY"));
        std::env::remove_var("PAGESIFT_TEST_EMPTY");
    }

    #[test]
    fn unknown_model_backend_is_not_configured() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("PAGESIFT_MODEL_BACKEND", "mystery");
        let err = ModelBackendKind::from_env().unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
        std::env::remove_var("PAGESIFT_MODEL_BACKEND");
        assert_eq!(ModelBackendKind::from_env().unwrap(), ModelBackendKind::Ollama);
    }

    #[test]
    fn openai_compat_without_base_url_fails_fast() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("PAGESIFT_MODEL_BACKEND", "openai_compat");
        std::env::remove_var("PAGESIFT_OPENAI_COMPAT_BASE_URL");
        let err = model_from_env(reqwest::Client::new()).err().unwrap();
        assert!(matches!(err, Error::NotConfigured(_)));
        std::env::remove_var("PAGESIFT_MODEL_BACKEND");
    }

    #[test]
    fn defaults_read_chunk_length_and_category() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("PAGESIFT_CHUNK_CHARS", "1200");
        std::env::set_var("PAGESIFT_KEYWORD_CATEGORY", "ORG");
        let d = Defaults::from_env();
        assert_eq!(d.chunk_chars, 1200);
        assert_eq!(d.keyword_category, "ORG");
        std::env::remove_var("PAGESIFT_CHUNK_CHARS");
        std::env::remove_var("PAGESIFT_KEYWORD_CATEGORY");
        assert_eq!(Defaults::from_env(), Defaults::default());
    }
}
