//! Per-chunk model invocation.
//!
//! Chunks are processed one at a time in index order; each call sees only its own chunk.
//! A failed call is reported to the progress sink, recorded as an empty result, and the
//! loop moves on. There are no retries.

use crate::prompts;
use pagesift_core::{
    ChunkSequence, Entity, Error, ExtractionMode, ExtractionRequest, ExtractionResult,
    ModelBackend, ProgressSink, Result,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct ExtractionDispatcher {
    model: Arc<dyn ModelBackend>,
}

impl std::fmt::Debug for ExtractionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionDispatcher")
            .field("model", &self.model.name())
            .finish()
    }
}

impl ExtractionDispatcher {
    pub fn new(model: Arc<dyn ModelBackend>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Results come back in chunk order, one per chunk.
    pub async fn dispatch(
        &self,
        chunks: &ChunkSequence,
        mode: &ExtractionMode,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<ExtractionResult>> {
        mode.validate()?;
        let total = chunks.len();
        tracing::info!(mode = mode.name(), model = self.model.name(), total, "dispatching chunks");

        let mut out = Vec::with_capacity(total);
        for (done, chunk) in chunks.iter().enumerate() {
            let req = ExtractionRequest {
                mode,
                chunk_index: chunk.index,
                chunk_text: &chunk.text,
            };
            let result = match self.extract_one(&req).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        chunk = chunk.index,
                        error = %e,
                        "chunk extraction failed; skipping"
                    );
                    progress.on_chunk_error(chunk.index, &e);
                    ExtractionResult::failed(chunk.index, &e)
                }
            };
            out.push(result);
            tracing::debug!("parsed batch {} of {}", done + 1, total);
            progress.on_progress(done + 1, total);
        }
        Ok(out)
    }

    async fn extract_one(&self, req: &ExtractionRequest<'_>) -> Result<ExtractionResult> {
        let model_req = prompts::build_request(req.mode, req.chunk_text);
        let raw = self.model.complete(&model_req).await?;
        let idx = req.chunk_index;
        match req.mode {
            ExtractionMode::FreeQuery { .. } => Ok(ExtractionResult::text(idx, clean_reply(&raw))),
            ExtractionMode::Summary { max_words, .. } => Ok(ExtractionResult::text(
                idx,
                clip_words(clean_reply(&raw), *max_words),
            )),
            ExtractionMode::Keywords { category } => {
                let entities = filter_category(parse_entities(&raw)?, category);
                let text = entity_words(&entities).join(", ");
                Ok(ExtractionResult {
                    entities,
                    ..ExtractionResult::text(idx, text)
                })
            }
        }
    }
}

/// Trim, and treat the model's literal "empty string" replies as empty.
fn clean_reply(raw: &str) -> &str {
    let s = raw.trim();
    match s {
        "''" | "\"\"" | "``" => "",
        _ => s,
    }
}

fn clip_words(s: &str, max_words: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= max_words {
        return s.to_string();
    }
    words[..max_words].join(" ")
}

#[derive(Debug, Deserialize)]
struct EntityRow {
    #[serde(alias = "text", alias = "entity", alias = "keyword")]
    word: String,
    #[serde(default, alias = "category", alias = "label", alias = "type")]
    entity_group: String,
    #[serde(default)]
    score: Option<f32>,
}

/// Parse the model's entity list, tolerating prose or code fences around the JSON array.
fn parse_entities(raw: &str) -> Result<Vec<Entity>> {
    let s = clean_reply(raw);
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let (Some(start), Some(end)) = (s.find('['), s.rfind(']')) else {
        return Err(Error::Extraction(
            "keyword reply did not contain a JSON array".to_string(),
        ));
    };
    if end < start {
        return Err(Error::Extraction(
            "keyword reply did not contain a JSON array".to_string(),
        ));
    }
    let rows: Vec<EntityRow> = serde_json::from_str(&s[start..=end])
        .map_err(|e| Error::Extraction(format!("keyword reply is not valid JSON: {e}")))?;
    Ok(rows
        .into_iter()
        .filter(|r| !r.word.trim().is_empty())
        .map(|r| Entity {
            text: r.word.trim().to_string(),
            category: r.entity_group.trim().to_ascii_uppercase(),
            score: r.score,
        })
        .collect())
}

fn filter_category(entities: Vec<Entity>, category: &str) -> Vec<Entity> {
    let category = category.trim();
    entities
        .into_iter()
        .filter(|e| e.category.eq_ignore_ascii_case(category))
        .collect()
}

/// Distinct entity words, first-seen order.
fn entity_words(entities: &[Entity]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::new();
    entities
        .iter()
        .map(|e| e.text.as_str())
        .filter(|w| seen.insert(*w))
        .collect()
}
