use crate::ExtractionResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub text: String,
    pub chunks_total: usize,
    pub chunks_empty: usize,
    pub chunks_failed: usize,
}

impl AggregatedResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Join non-empty results with `\n` in chunk order, then trim.
///
/// Results are sorted by `chunk_index` first so callers may pass them in any order.
pub fn aggregate(results: &[ExtractionResult]) -> AggregatedResult {
    let mut ordered: Vec<&ExtractionResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.chunk_index);

    let mut parts: Vec<&str> = Vec::with_capacity(ordered.len());
    let mut chunks_empty = 0usize;
    let mut chunks_failed = 0usize;
    for r in ordered {
        if r.error.is_some() {
            chunks_failed += 1;
        }
        if r.is_empty {
            chunks_empty += 1;
            continue;
        }
        parts.push(&r.text);
    }

    AggregatedResult {
        text: parts.join("\n").trim().to_string(),
        chunks_total: results.len(),
        chunks_empty,
        chunks_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn empty_input_is_empty_string() {
        let a = aggregate(&[]);
        assert_eq!(a.text, "");
        assert!(a.is_empty());
        assert_eq!(a.chunks_total, 0);
    }

    #[test]
    fn drops_empty_results_and_joins_in_order() {
        let results = vec![
            ExtractionResult::text(0, "a"),
            ExtractionResult::empty(1),
            ExtractionResult::text(2, "b"),
        ];
        let a = aggregate(&results);
        assert_eq!(a.text, "a\nb");
        assert_eq!(a.chunks_total, 3);
        assert_eq!(a.chunks_empty, 1);
        assert_eq!(a.chunks_failed, 0);
    }

    #[test]
    fn all_empty_is_empty_string_not_error() {
        let results = vec![
            ExtractionResult::empty(0),
            ExtractionResult::failed(1, &Error::Extraction("x".to_string())),
        ];
        let a = aggregate(&results);
        assert_eq!(a.text, "");
        assert_eq!(a.chunks_empty, 2);
        assert_eq!(a.chunks_failed, 1);
    }

    #[test]
    fn trims_outer_whitespace_and_restores_chunk_order() {
        let results = vec![
            ExtractionResult::text(1, "second  \n"),
            ExtractionResult::text(0, "\n  first"),
        ];
        assert_eq!(aggregate(&results).text, "first\nsecond");
    }
}
