//! One explicit instruction template per extraction mode.

use pagesift_core::{ExtractionMode, ModelRequest};

const FREE_QUERY_SYSTEM: &str = "You extract specific information from web page text.\n\
Rules:\n\
1. Extract only the information that directly matches the description you are given.\n\
2. Do not add any other text, comments, or explanations.\n\
3. If nothing matches the description, reply with an empty string ('').\n\
4. Output only the requested data, with no surrounding text.";

const SUMMARY_SYSTEM: &str = "You summarize web page text. \
Write a plain prose summary of the text you are given. \
Output only the summary: no headings, no preamble, no bullet points.";

const KEYWORDS_SYSTEM: &str = "You are a named-entity recognizer. \
Find the named entities and key terms in the text you are given. \
Reply with a JSON array only, no prose, where each element is an object \
{\"word\": string, \"entity_group\": \"PER\" | \"ORG\" | \"LOC\" | \"MISC\", \"score\": number between 0 and 1}. \
Use MISC for entities that are not persons, organizations or locations (products, events, works, nationalities, technologies). \
Reply with [] when there are none.";

/// Token ceiling for a summary of `max_words` words (roughly 1.3 tokens per word, rounded up
/// generously so the model is not cut mid-sentence).
pub fn summary_max_tokens(max_words: usize) -> u64 {
    (max_words as u64).saturating_mul(2).saturating_add(16)
}

pub fn build_request(mode: &ExtractionMode, chunk_text: &str) -> ModelRequest {
    match mode {
        ExtractionMode::FreeQuery { description } => ModelRequest {
            system: FREE_QUERY_SYSTEM.to_string(),
            user: format!(
                "Text content:\n{chunk_text}\n\nDescription of the information to extract: {}",
                description.trim()
            ),
            max_tokens: None,
        },
        ExtractionMode::Summary {
            min_words,
            max_words,
        } => ModelRequest {
            system: format!(
                "{SUMMARY_SYSTEM} Use at least {min_words} and at most {max_words} words."
            ),
            user: chunk_text.to_string(),
            max_tokens: Some(summary_max_tokens(*max_words)),
        },
        ExtractionMode::Keywords { .. } => ModelRequest {
            system: KEYWORDS_SYSTEM.to_string(),
            user: chunk_text.to_string(),
            max_tokens: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_query_carries_chunk_and_description() {
        let r = build_request(&ExtractionMode::free_query("  all prices "), "Widget $5");
        assert!(r.system.contains("empty string"));
        assert!(r.user.contains("Widget $5"));
        assert!(r.user.ends_with("all prices"));
        assert_eq!(r.max_tokens, None);
    }

    #[test]
    fn summary_is_bounded() {
        let r = build_request(
            &ExtractionMode::Summary {
                min_words: 10,
                max_words: 50,
            },
            "text",
        );
        assert!(r.system.contains("at least 10"));
        assert!(r.system.contains("at most 50"));
        assert_eq!(r.max_tokens, Some(116));
        assert_eq!(r.user, "text");
    }

    #[test]
    fn keywords_asks_for_json_entities() {
        let r = build_request(&ExtractionMode::keywords("MISC"), "Rust 1.80 shipped");
        assert!(r.system.contains("entity_group"));
        assert_eq!(r.user, "Rust 1.80 shipped");
    }
}
