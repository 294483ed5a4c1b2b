//! Recursive character chunking with overlap.
//!
//! Splitting walks a priority-ordered separator list: paragraph breaks, line breaks,
//! sentence breaks, then raw character position. A larger unit is never broken while
//! it still fits the size budget; hard character slicing is the last resort, and it is
//! the only level where the configured overlap applies (a sliding window keeps the
//! tail of one chunk visible at the head of the next).

use crate::pipeline::types::{Chunk, DOC_ID_KEY, SOURCE_KEY, UNKNOWN_SOURCE};
use std::collections::BTreeMap;

/// Default maximum chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", ". "];

/// Splits raw text into overlapping chunks with attached metadata.
///
/// Pure: output depends only on the input text, the supplied metadata, and the
/// configured size and overlap.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl Chunker {
    /// Construct a chunker with the given size budget and overlap.
    ///
    /// The size is clamped to at least one character and the overlap to strictly
    /// less than the size, so the sliding window always advances.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Configured maximum chunk size in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into chunks, attaching `metadata` verbatim to each one.
    ///
    /// Every produced chunk additionally carries a `doc_id` of the form
    /// `<source>_<position>`, which keys the upsert into the vector index.
    /// Empty or whitespace-only input yields an empty list, never an error.
    pub fn process(&self, text: &str, metadata: &BTreeMap<String, String>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let source = metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string();

        let pieces = split_recursive(text, self.chunk_size, self.chunk_overlap, &SEPARATORS);

        pieces
            .into_iter()
            .map(|piece| piece.trim().to_string())
            .filter(|piece| !piece.is_empty())
            .enumerate()
            .map(|(index, content)| {
                let mut chunk_metadata = metadata.clone();
                chunk_metadata.insert(DOC_ID_KEY.to_string(), format!("{source}_{index}"));
                Chunk::new(content, chunk_metadata)
            })
            .collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn split_recursive(text: &str, max: usize, overlap: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= max {
        return vec![text.to_string()];
    }

    let Some((separator, rest)) = separators.split_first() else {
        return split_chars(text, max, overlap);
    };

    if !text.contains(separator) {
        return split_recursive(text, max, overlap, rest);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for fragment in text.split_inclusive(separator) {
        if char_len(&current) + char_len(fragment) <= max {
            current.push_str(fragment);
            continue;
        }

        if !current.trim().is_empty() {
            chunks.push(std::mem::take(&mut current));
        } else {
            current.clear();
        }

        if char_len(fragment) <= max {
            current.push_str(fragment);
        } else {
            chunks.extend(split_recursive(fragment, max, overlap, rest));
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Hard character slicing: fixed windows of `max` characters advancing by
/// `max - overlap`, so consecutive windows share exactly `overlap` characters.
fn split_chars(text: &str, max: usize, overlap: usize) -> Vec<String> {
    let mut boundaries: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    boundaries.push(text.len());
    let total = boundaries.len() - 1;

    let step = max - overlap.min(max - 1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + max).min(total);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == total {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_for(source: &str) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.to_string());
        metadata
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.process("", &metadata_for("a.txt")).is_empty());
        assert!(chunker.process("   \n\n  ", &metadata_for("a.txt")).is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let chunker = Chunker::new(100, 10);
        let chunks = chunker.process("one short paragraph", &metadata_for("a.txt"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "one short paragraph");
        assert_eq!(chunks[0].source(), "a.txt");
        assert_eq!(chunks[0].doc_id(), Some("a.txt_0"));
    }

    #[test]
    fn every_chunk_respects_the_size_budget() {
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let text = format!(
            "{}\n\n{}\n{}",
            sentence.repeat(8),
            sentence.repeat(5),
            sentence.repeat(12)
        );
        let chunker = Chunker::new(120, 20);
        let chunks = chunker.process(&text, &metadata_for("a.txt"));
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 120, "{:?}", chunk.content);
        }
    }

    #[test]
    fn paragraphs_are_not_broken_while_they_fit() {
        let text = "first paragraph body\n\nsecond paragraph body\n\nthird paragraph body";
        let chunker = Chunker::new(25, 5);
        let chunks = chunker.process(text, &metadata_for("a.txt"));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "first paragraph body");
        assert_eq!(chunks[1].content, "second paragraph body");
        assert_eq!(chunks[2].content, "third paragraph body");
    }

    #[test]
    fn sentences_are_preferred_over_hard_slicing() {
        let text = "Alpha sentence here. Beta sentence here. Gamma sentence here.";
        let chunker = Chunker::new(25, 5);
        let chunks = chunker.process(text, &metadata_for("a.txt"));
        assert!(chunks.iter().all(|chunk| chunk.content.contains("sentence")));
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn hard_slices_share_the_configured_overlap() {
        // No separators at all, so the splitter must fall back to character windows.
        let text: String = ('a'..='z').cycle().take(300).collect();
        let pieces = split_chars(&text, 100, 20);
        assert!(pieces.len() > 1);
        for pair in pieces.windows(2) {
            let tail: String = pair[0].chars().rev().take(20).collect::<Vec<_>>().into_iter().rev().collect();
            let head: String = pair[1].chars().take(20).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn doc_ids_are_positional_and_unique() {
        let text = "para one\n\npara two\n\npara three";
        let chunker = Chunker::new(10, 2);
        let chunks = chunker.process(text, &metadata_for("b.txt"));
        let ids: Vec<_> = chunks.iter().filter_map(Chunk::doc_id).collect();
        assert_eq!(ids.len(), chunks.len());
        let unique: std::collections::BTreeSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids[0], "b.txt_0");
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let chunker = Chunker::new(10, 50);
        let text: String = "x".repeat(40);
        let chunks = chunker.process(&text, &metadata_for("a.txt"));
        // The window must advance; a non-advancing window would loop forever.
        assert!(chunks.len() < 40);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 10);
        }
    }
}
