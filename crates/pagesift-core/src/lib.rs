use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod chunk;

pub use aggregate::{aggregate, AggregatedResult};
pub use chunk::{Chunk, ChunkSequence, Chunker, DEFAULT_CHUNK_CHARS};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// Network failure, non-success HTTP status, or browser-session failure.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// A single model invocation failed (recoverable per chunk).
    #[error("extraction failed: {0}")]
    Extraction(String),
    /// Required configuration is missing; raised before any network activity.
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Stable machine-readable code (used by the CLI JSON envelope).
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUrl(_) => "invalid_url",
            Error::InvalidParams(_) => "invalid_params",
            Error::Fetch(_) => "fetch_failed",
            Error::Extraction(_) => "extraction_failed",
            Error::NotConfigured(_) => "not_configured",
            Error::NotSupported(_) => "not_supported",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Headless browser session; dynamic content is executed before reading markup.
    Rendered,
    /// Single plain HTTP GET.
    Static,
}

impl FetchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategy::Rendered => "rendered",
            FetchStrategy::Static => "static",
        }
    }
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FetchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rendered" | "render" | "browser" => Ok(FetchStrategy::Rendered),
            "static" | "http" => Ok(FetchStrategy::Static),
            other => Err(Error::InvalidParams(format!(
                "unknown fetch strategy {other:?} (allowed: rendered, static)"
            ))),
        }
    }
}

/// Raw markup as produced by a fetcher. Consumed once by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPage {
    pub url: String,
    pub final_url: String,
    pub strategy: FetchStrategy,
    pub status: Option<u16>,
    pub html: String,
    /// Rendered only: the challenge selector matched after the settle interval.
    #[serde(default)]
    pub captcha_detected: bool,
}

/// Visible page text: one non-blank, trimmed line per text run, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CleanText(String);

impl CleanText {
    /// Build from arbitrary lines, enforcing the trimmed/no-blank-lines invariant.
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = String::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }

    /// First `max_chars` chars, for display.
    pub fn preview(&self, max_chars: usize) -> &str {
        match self.0.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &self.0[..byte_idx],
            None => &self.0,
        }
    }
}

impl AsRef<str> for CleanText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CleanText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const DEFAULT_SUMMARY_MIN_WORDS: usize = 30;
pub const DEFAULT_SUMMARY_MAX_WORDS: usize = 130;
pub const DEFAULT_KEYWORD_CATEGORY: &str = "MISC";

/// Requested output shape for each model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Return only data matching `description`, or nothing.
    FreeQuery { description: String },
    Summary { min_words: usize, max_words: usize },
    /// Keep only entities whose group equals `category`.
    Keywords { category: String },
}

impl ExtractionMode {
    pub fn free_query(description: impl Into<String>) -> Self {
        ExtractionMode::FreeQuery {
            description: description.into(),
        }
    }

    pub fn summary() -> Self {
        ExtractionMode::Summary {
            min_words: DEFAULT_SUMMARY_MIN_WORDS,
            max_words: DEFAULT_SUMMARY_MAX_WORDS,
        }
    }

    pub fn keywords(category: impl Into<String>) -> Self {
        ExtractionMode::Keywords {
            category: category.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExtractionMode::FreeQuery { .. } => "free_query",
            ExtractionMode::Summary { .. } => "summary",
            ExtractionMode::Keywords { .. } => "keywords",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ExtractionMode::FreeQuery { description } if description.trim().is_empty() => Err(
                Error::InvalidParams("free query description must be non-empty".to_string()),
            ),
            ExtractionMode::Summary {
                min_words,
                max_words,
            } if *max_words == 0 || min_words > max_words => Err(Error::InvalidParams(format!(
                "summary bounds must satisfy 0 <= min_words <= max_words, max_words > 0 (got {min_words}..{max_words})"
            ))),
            ExtractionMode::Keywords { category } if category.trim().is_empty() => Err(
                Error::InvalidParams("keyword category must be non-empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest<'a> {
    pub mode: &'a ExtractionMode,
    pub chunk_index: usize,
    pub chunk_text: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub text: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    pub chunk_index: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    pub is_empty: bool,
    /// Set when the model call for this chunk failed; the result is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn text(chunk_index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let is_empty = text.trim().is_empty();
        Self {
            chunk_index,
            text,
            entities: Vec::new(),
            is_empty,
            error: None,
        }
    }

    pub fn empty(chunk_index: usize) -> Self {
        Self::text(chunk_index, String::new())
    }

    pub fn failed(chunk_index: usize, err: &Error) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::empty(chunk_index)
        }
    }
}

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    fn strategy(&self) -> FetchStrategy;
    async fn fetch(&self, url: &str) -> Result<RawPage>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
    /// Upper bound on generated tokens, when the mode has one.
    pub max_tokens: Option<u64>,
}

/// A synchronous request/response model call (no latency guarantee).
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, req: &ModelRequest) -> Result<String>;
}

/// Receives liveness updates from a multi-chunk extraction.
pub trait ProgressSink: Send + Sync {
    /// Called after each chunk finishes (successfully or not). `done` is 1-based.
    fn on_progress(&self, done: usize, total: usize);

    fn on_chunk_error(&self, chunk_index: usize, err: &Error) {
        let _ = (chunk_index, err);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _done: usize, _total: usize) {}
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Fraction in [0, 1] for a progress bar.
pub fn progress_fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (done.min(total) as f64) / (total as f64)
}
