//! fetch -> normalize -> chunk -> dispatch -> aggregate, wired with explicit handles.

use crate::config::{self, Defaults};
use crate::{ContentNormalizer, ExtractionDispatcher, Fetcher};
use pagesift_core::{
    aggregate, AggregatedResult, Chunker, CleanText, Error, ExtractionMode, ExtractionResult,
    FetchStrategy, ProgressSink, Result,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub url: String,
    pub final_url: String,
    pub strategy: FetchStrategy,
    pub captcha_detected: bool,
    pub clean_text: CleanText,
    pub chunk_count: usize,
    pub results: Vec<ExtractionResult>,
    pub aggregated: AggregatedResult,
}

/// The scraped page alongside the fetch facts worth reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedPage {
    pub url: String,
    pub final_url: String,
    pub strategy: FetchStrategy,
    pub status: Option<u16>,
    pub captcha_detected: bool,
    pub text: CleanText,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    fetcher: Fetcher,
    normalizer: ContentNormalizer,
    chunker: Chunker,
    dispatcher: Option<ExtractionDispatcher>,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, chunker: Chunker) -> Self {
        Self {
            fetcher,
            normalizer: ContentNormalizer,
            chunker,
            dispatcher: None,
        }
    }

    /// Fetchers and chunk size from the environment; no model attached.
    pub fn from_env() -> Result<Self> {
        let defaults = Defaults::from_env();
        Ok(Self::new(
            Fetcher::from_env()?,
            Chunker::new(defaults.chunk_chars)?,
        ))
    }

    pub fn with_dispatcher(mut self, dispatcher: ExtractionDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_model_from_env(self) -> Result<Self> {
        let model = config::model_from_env(config::model_http_client()?)?;
        Ok(self.with_dispatcher(ExtractionDispatcher::new(model)))
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn chunker(&self) -> Chunker {
        self.chunker
    }

    pub fn dispatcher(&self) -> Option<&ExtractionDispatcher> {
        self.dispatcher.as_ref()
    }

    pub async fn scrape(&self, url: &str, strategy: FetchStrategy) -> Result<ScrapedPage> {
        let raw = self.fetcher.fetch(url, strategy).await?;
        let text = self.normalizer.normalize(&raw);
        if text.is_empty() {
            tracing::warn!(url = %raw.final_url, "page has no visible text");
        }
        Ok(ScrapedPage {
            url: raw.url,
            final_url: raw.final_url,
            strategy: raw.strategy,
            status: raw.status,
            captcha_detected: raw.captcha_detected,
            text,
        })
    }

    /// Chunk `text`, run the model over every chunk, and merge the answers.
    pub async fn extract(
        &self,
        text: &CleanText,
        mode: &ExtractionMode,
        progress: &dyn ProgressSink,
    ) -> Result<(usize, Vec<ExtractionResult>, AggregatedResult)> {
        let dispatcher = self.dispatcher.as_ref().ok_or_else(|| {
            Error::NotConfigured("no model backend attached to the pipeline".to_string())
        })?;
        mode.validate()?;
        let chunks = self.chunker.chunk_clean(text);
        tracing::debug!(
            chunks = chunks.len(),
            max_chars = self.chunker.max_chars(),
            "chunked page text"
        );
        let results = dispatcher.dispatch(&chunks, mode, progress).await?;
        let aggregated = aggregate(&results);
        if aggregated.chunks_failed > 0 {
            tracing::warn!(
                failed = aggregated.chunks_failed,
                total = aggregated.chunks_total,
                "some chunks failed and were skipped"
            );
        }
        Ok((chunks.len(), results, aggregated))
    }

    pub async fn run(
        &self,
        url: &str,
        strategy: FetchStrategy,
        mode: &ExtractionMode,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutput> {
        // Fail on configuration before fetching.
        if self.dispatcher.is_none() {
            return Err(Error::NotConfigured(
                "no model backend attached to the pipeline".to_string(),
            ));
        }
        mode.validate()?;
        let page = self.scrape(url, strategy).await?;
        let (chunk_count, results, aggregated) =
            self.extract(&page.text, mode, progress).await?;
        Ok(PipelineOutput {
            url: page.url,
            final_url: page.final_url,
            strategy: page.strategy,
            captcha_detected: page.captcha_detected,
            clean_text: page.text,
            chunk_count,
            results,
            aggregated,
        })
    }
}
