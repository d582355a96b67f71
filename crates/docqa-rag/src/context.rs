//! Context-window assembly for retrieved chunks.

use crate::types::ScoredChunk;

/// Default separator placed between retrieved chunks.
pub const DEFAULT_SEPARATOR: &str = "\n---\n";

/// Default maximum context length in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 4000;

/// Join hit texts in rank order and hard-cut the result at `max_chars`
/// characters.
pub fn assemble_context(hits: &[ScoredChunk], separator: &str, max_chars: usize) -> String {
    let joined = hits
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(separator);

    truncate_chars(joined, max_chars)
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn hits(texts: &[&str]) -> Vec<ScoredChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| ScoredChunk {
                chunk: Chunk::new(i, *text),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    #[test]
    fn test_short_context_is_unmodified() {
        let context = assemble_context(&hits(&["alpha", "beta"]), DEFAULT_SEPARATOR, 4000);
        assert_eq!(context, "alpha\n---\nbeta");
    }

    #[test]
    fn test_long_context_is_cut_at_max() {
        let long = "x".repeat(3000);
        let context = assemble_context(&hits(&[&long, &long]), DEFAULT_SEPARATOR, 4000);

        assert_eq!(context.chars().count(), 4000);
        assert!(context.starts_with(&long));
        assert!(context[3000..].starts_with(DEFAULT_SEPARATOR));
    }

    #[test]
    fn test_exact_length_is_kept() {
        let context = assemble_context(&hits(&["abcd"]), DEFAULT_SEPARATOR, 4);
        assert_eq!(context, "abcd");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let context = assemble_context(&hits(&["ééééé"]), DEFAULT_SEPARATOR, 3);
        assert_eq!(context, "ééé");
    }

    #[test]
    fn test_no_hits_gives_empty_context() {
        assert_eq!(assemble_context(&[], DEFAULT_SEPARATOR, 10), "");
    }
}
