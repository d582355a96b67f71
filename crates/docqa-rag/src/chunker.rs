//! Fixed-size sliding-window chunking with overlap.
//!
//! Windows are measured in characters (Unicode scalar values). Each window
//! `[start, start + chunk_size)` is trimmed of surrounding whitespace, and
//! windows that trim to nothing are dropped. Consecutive windows share
//! `overlap` characters.

use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use crate::types::Chunk;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1800;

/// Default overlap between consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// A raw, untrimmed window over the source text, in character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

/// Sliding-window chunker.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker. The stride `chunk_size - overlap` must be positive.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(RagError::ChunkerConfig {
                chunk_size,
                overlap,
            });
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Raw windows over a text of `char_len` characters.
    pub fn windows(&self, char_len: usize) -> Vec<Window> {
        let mut windows = Vec::new();
        let mut start = 0;

        while start < char_len {
            let end = (start + self.chunk_size).min(char_len);
            windows.push(Window { start, end });
            start += self.stride();
        }

        windows
    }

    /// Split text into trimmed, non-empty chunks numbered in source order.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        // Byte offset of every character boundary, plus the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        self.windows(char_len)
            .into_iter()
            .map(|window| text[boundaries[window.start]..boundaries[window.end]].trim())
            .filter(|slice| !slice.is_empty())
            .enumerate()
            .map(|(ordinal, slice)| Chunk::new(ordinal, slice))
            .collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_invalid_stride_rejected() {
        assert!(matches!(
            Chunker::new(200, 200),
            Err(RagError::ChunkerConfig {
                chunk_size: 200,
                overlap: 200
            })
        ));
        assert!(Chunker::new(100, 300).is_err());
        assert!(Chunker::new(0, 0).is_err());
    }

    #[test]
    fn test_five_thousand_chars_gives_four_chunks() {
        let text: String = (0..5000)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let chunker = Chunker::new(1800, 200).unwrap();

        let windows = chunker.windows(text.chars().count());
        assert_eq!(
            windows,
            vec![
                Window { start: 0, end: 1800 },
                Window { start: 1600, end: 3400 },
                Window { start: 3200, end: 5000 },
                Window { start: 4800, end: 5000 },
            ]
        );

        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
        }

        // Consecutive windows share exactly 200 characters.
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 200);
        }
        assert_eq!(&chunks[0].text[1600..1800], &chunks[1].text[..200]);
    }

    #[test]
    fn test_chunks_are_trimmed_and_blank_windows_dropped() {
        let chunker = Chunker::new(10, 2).unwrap();
        let text = format!("  hello   {}", " ".repeat(30));

        let chunks = chunker.chunk(&text);
        assert_eq!(chunks, vec![Chunk::new(0, "hello")]);
    }

    #[test]
    fn test_ordinals_stay_consecutive_after_skipping() {
        let chunker = Chunker::new(4, 0).unwrap();
        let chunks = chunker.chunk("abcd    efgh");

        assert_eq!(chunks, vec![Chunk::new(0, "abcd"), Chunk::new(1, "efgh")]);
    }

    #[test]
    fn test_multibyte_text_is_split_on_characters() {
        let chunker = Chunker::new(3, 1).unwrap();
        let chunks = chunker.chunk("héllo wörld");

        assert_eq!(chunks[0].text, "hél");
        assert_eq!(chunks[1].text, "llo");
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 3));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.windows(0).is_empty());
    }

    proptest! {
        #[test]
        fn prop_chunking_is_deterministic(text in ".{0,400}", size in 1usize..64, overlap_seed in 0usize..64) {
            let overlap = overlap_seed % size;
            let chunker = Chunker::new(size, overlap).unwrap();
            prop_assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
        }

        #[test]
        fn prop_windows_cover_text(len in 1usize..2000, size in 1usize..300, overlap_seed in 0usize..300) {
            let overlap = overlap_seed % size;
            let chunker = Chunker::new(size, overlap).unwrap();
            let windows = chunker.windows(len);

            prop_assert_eq!(windows[0].start, 0);
            prop_assert_eq!(windows.last().unwrap().end, len);
            for pair in windows.windows(2) {
                prop_assert!(pair[1].start <= pair[0].end);
                prop_assert_eq!(pair[1].start - pair[0].start, size - overlap);
                if pair[0].end - pair[0].start == size {
                    prop_assert_eq!(pair[0].end - pair[1].start, overlap);
                }
            }
        }
    }
}
