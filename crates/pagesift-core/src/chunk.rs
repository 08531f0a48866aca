//! Fixed-width, order-preserving text chunking.
//!
//! Chunks are measured in chars (Unicode scalar values), never bytes, and carry no
//! boundary awareness: a chunk may end mid-word. Concatenating all chunks in order
//! reproduces the input exactly.

use crate::{CleanText, Error, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

pub const DEFAULT_CHUNK_CHARS: usize = 6000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkSequence(Vec<Chunk>);

impl ChunkSequence {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Chunk] {
        &self.0
    }

    /// Concatenation of every chunk, in order.
    pub fn joined(&self) -> String {
        self.0.iter().map(|c| c.text.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a ChunkSequence {
    type Item = &'a Chunk;
    type IntoIter = std::slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chars: NonZeroUsize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            max_chars: NonZeroUsize::new(DEFAULT_CHUNK_CHARS).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Chunker {
    pub fn new(max_chars: usize) -> Result<Self> {
        let max_chars = NonZeroUsize::new(max_chars)
            .ok_or_else(|| Error::InvalidParams("chunk length must be positive".to_string()))?;
        Ok(Self { max_chars })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars.get()
    }

    pub fn chunk_clean(&self, text: &CleanText) -> ChunkSequence {
        self.chunk(text.as_str())
    }

    /// Chunk `i` holds chars `[i*L, (i+1)*L)`; the last one may be shorter.
    pub fn chunk(&self, text: &str) -> ChunkSequence {
        let max = self.max_chars.get();
        let mut out = Vec::new();
        let mut start = 0usize;
        let mut n = 0usize;
        for (byte_idx, _) in text.char_indices() {
            if n == max {
                out.push(Chunk {
                    index: out.len(),
                    text: text[start..byte_idx].to_string(),
                });
                start = byte_idx;
                n = 0;
            }
            n += 1;
        }
        if start < text.len() {
            out.push(Chunk {
                index: out.len(),
                text: text[start..].to_string(),
            });
        }
        ChunkSequence(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        let c = Chunker::new(10).unwrap();
        assert!(c.chunk("").is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let c = Chunker::new(10).unwrap();
        let seq = c.chunk("hello");
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.as_slice()[0].text, "hello");

        let exact = c.chunk("0123456789");
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn slices_are_fixed_width_and_may_split_words() {
        let c = Chunker::new(4).unwrap();
        let seq = c.chunk("hello world");
        let parts: Vec<&str> = seq.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(parts, vec!["hell", "o wo", "rld"]);
        let idx: Vec<usize> = seq.iter().map(|c| c.index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn multibyte_chars_are_never_split() {
        let c = Chunker::new(2).unwrap();
        let seq = c.chunk("héllo→ü");
        let parts: Vec<&str> = seq.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(parts, vec!["hé", "ll", "o→", "ü"]);
    }

    #[test]
    fn zero_length_is_rejected() {
        let err = Chunker::new(0).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
        assert_eq!(Chunker::default().max_chars(), DEFAULT_CHUNK_CHARS);
    }

    proptest! {
        #[test]
        fn concatenation_reconstructs_input(s in any::<String>(), max in 1usize..64) {
            let seq = Chunker::new(max).unwrap().chunk(&s);
            prop_assert_eq!(seq.joined(), s);
        }

        #[test]
        fn chunk_count_is_ceil_of_char_len(s in any::<String>(), max in 1usize..64) {
            let n = s.chars().count();
            let seq = Chunker::new(max).unwrap().chunk(&s);
            prop_assert_eq!(seq.len(), n.div_ceil(max));
            for (i, c) in seq.iter().enumerate() {
                let len = c.text.chars().count();
                prop_assert_eq!(c.index, i);
                prop_assert!(len >= 1 && len <= max);
                if i + 1 < seq.len() {
                    prop_assert_eq!(len, max);
                }
            }
        }
    }
}
