//! Public facade crate for `pagesift`.
//!
//! No IO lives here: this re-exports the data model, the chunker, the aggregator and the
//! fetcher/model traits from `pagesift-core`. Concrete fetchers and model clients are in
//! `pagesift-local`.

pub use pagesift_core::*;

#[cfg(test)]
mod tests {
    #[test]
    fn facade_exposes_chunk_and_aggregate() {
        let chunks = crate::Chunker::default().chunk("Hello\nWorld");
        assert_eq!(chunks.len(), 1);
        let results: Vec<_> = chunks
            .iter()
            .map(|c| crate::ExtractionResult::text(c.index, c.text.clone()))
            .collect();
        assert_eq!(crate::aggregate(&results).text, "Hello\nWorld");
    }
}
