//! Exact cosine-similarity index over one document generation.
//!
//! Vectors are normalized to unit length when the index is built, so a
//! search is a flat inner product against every stored row. Rows live in a
//! single row-major matrix aligned with the chunk list.

use crate::error::{RagError, Result};
use crate::types::{dot_product, normalize, Chunk, ScoredChunk, Vector};
use rayon::prelude::*;
use tracing::debug;

/// Default number of results returned by a search.
pub const DEFAULT_TOP_K: usize = 5;

/// Immutable vector index. Built wholesale, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorIndex {
    dimension: usize,
    chunks: Vec<Chunk>,
    /// Row-major, `chunks.len() * dimension` values.
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from chunks paired with their raw embeddings.
    ///
    /// Every vector must share the dimensionality of the first one and hold
    /// only finite values. Each is normalized to unit length; a zero vector
    /// stays zero.
    pub fn build(entries: Vec<(Chunk, Vector)>) -> Result<Self> {
        let dimension = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut chunks = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len() * dimension);

        for (chunk, mut vector) in entries {
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    ordinal: Some(chunk.ordinal),
                    expected: dimension,
                    got: vector.len(),
                });
            }

            if !vector.iter().all(|x| x.is_finite()) {
                return Err(
                    RagError::embedding("non-finite value in vector").at_ordinal(chunk.ordinal)
                );
            }

            normalize(&mut vector);
            vectors.extend_from_slice(&vector);
            chunks.push(chunk);
        }

        debug!(entries = chunks.len(), dimension, "Vector index built");

        Ok(Self {
            dimension,
            chunks,
            vectors,
        })
    }

    /// Reassemble an index from persisted parts. Rows are taken as already
    /// normalized.
    pub fn from_parts(dimension: usize, chunks: Vec<Chunk>, vectors: Vec<f32>) -> Result<Self> {
        if vectors.len() != chunks.len() * dimension {
            return Err(RagError::corrupt(format!(
                "vector matrix holds {} values, expected {} rows of dimension {}",
                vectors.len(),
                chunks.len(),
                dimension
            )));
        }

        Ok(Self {
            dimension,
            chunks,
            vectors,
        })
    }

    /// Return the `k` most similar entries, best first.
    ///
    /// Ties are broken by ascending ordinal. Fewer than `k` entries are
    /// returned when the index is smaller than `k`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() {
            return Err(RagError::IndexEmpty);
        }

        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                ordinal: None,
                expected: self.dimension,
                got: query.len(),
            });
        }

        if !query.iter().all(|x| x.is_finite()) {
            return Err(RagError::embedding("non-finite value in query vector"));
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .into_par_iter()
            .map(|row| (row, dot_product(self.row(row), &query)))
            .collect();

        scored.sort_unstable_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.chunks[a.0].ordinal.cmp(&self.chunks[b.0].ordinal))
        });
        scored.truncate(k);

        debug!(
            candidates = self.len(),
            returned = scored.len(),
            top_score = scored.first().map(|(_, s)| *s).unwrap_or(0.0),
            "Index search complete"
        );

        Ok(scored
            .into_iter()
            .map(|(row, score)| ScoredChunk {
                chunk: self.chunks[row].clone(),
                score,
            })
            .collect())
    }

    fn row(&self, row: usize) -> &[f32] {
        let start = row * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Stored (normalized) vector for the entry at `row`.
    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        (row < self.len()).then(|| self.row(row))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The raw row-major matrix.
    pub fn matrix(&self) -> &[f32] {
        &self.vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::l2_norm;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn create_test_vector(dimension: usize, seed: u64) -> Vector {
        (0..dimension)
            .map(|i| ((seed + i as u64 * 7) % 100) as f32 / 100.0 + 0.01)
            .collect()
    }

    fn entries(vectors: Vec<Vector>) -> Vec<(Chunk, Vector)> {
        vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Chunk::new(i, format!("chunk {}", i)), v))
            .collect()
    }

    #[test]
    fn test_build_normalizes_vectors() {
        let index = VectorIndex::build(entries(vec![
            vec![3.0, 4.0],
            vec![10.0, 0.0],
            vec![0.0, 0.0],
        ]))
        .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), 2);
        assert_relative_eq!(l2_norm(index.vector(0).unwrap()), 1.0, epsilon = 1e-6);
        assert_relative_eq!(l2_norm(index.vector(1).unwrap()), 1.0, epsilon = 1e-6);
        assert_eq!(index.vector(2).unwrap(), &[0.0, 0.0]);
        assert!(index.vector(3).is_none());
    }

    #[test]
    fn test_dimension_mismatch_names_ordinal() {
        let result = VectorIndex::build(entries(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 1.0],
        ]));

        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch {
                ordinal: Some(2),
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_stored_vector_is_its_own_best_match() {
        let vectors: Vec<Vector> = (0..10).map(|seed| create_test_vector(32, seed * 13)).collect();
        let index = VectorIndex::build(entries(vectors.clone())).unwrap();

        for (i, vector) in vectors.iter().enumerate() {
            for k in [1, 3, 5] {
                let results = index.search(vector, k).unwrap();
                assert_eq!(results[0].chunk.ordinal, i);
                assert_relative_eq!(results[0].score, 1.0, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_results_descend_by_score() {
        let index = VectorIndex::build(entries(vec![
            vec![1.0, 0.0],
            vec![0.7, 0.7],
            vec![0.0, 1.0],
            vec![-1.0, 0.0],
        ]))
        .unwrap();

        let results = index.search(&[1.0, 0.1], 4).unwrap();
        let ordinals: Vec<usize> = results.iter().map(|r| r.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_ties_break_by_ascending_ordinal() {
        let index = VectorIndex::build(entries(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 2.0],
            vec![0.0, 1.0],
        ]))
        .unwrap();

        let results = index.search(&[0.0, 1.0], 3).unwrap();
        let ordinals: Vec<usize> = results.iter().map(|r| r.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![0, 2, 3]);
    }

    #[test]
    fn test_fewer_entries_than_k_returns_all() {
        let index = VectorIndex::build(entries(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ]))
        .unwrap();

        let results = index.search(&[1.0, 0.0], DEFAULT_TOP_K).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_empty_index_and_bad_query() {
        let empty = VectorIndex::build(Vec::new()).unwrap();
        assert!(matches!(empty.search(&[1.0], 5), Err(RagError::IndexEmpty)));

        let index = VectorIndex::build(entries(vec![vec![1.0, 0.0]])).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 5),
            Err(RagError::DimensionMismatch {
                ordinal: None,
                expected: 2,
                got: 3
            })
        ));
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_zero_query_scores_zero() {
        let index = VectorIndex::build(entries(vec![vec![1.0, 0.0], vec![0.0, 1.0]])).unwrap();
        let results = index.search(&[0.0, 0.0], 2).unwrap();

        assert!(results.iter().all(|r| r.score == 0.0));
        assert_eq!(results[0].chunk.ordinal, 0);
    }

    #[test]
    fn test_from_parts_rejects_misaligned_matrix() {
        let chunks = vec![Chunk::new(0, "a"), Chunk::new(1, "b")];
        assert!(matches!(
            VectorIndex::from_parts(3, chunks.clone(), vec![0.0; 5]),
            Err(RagError::CorruptIndex(_))
        ));

        let index = VectorIndex::from_parts(3, chunks, vec![0.0; 6]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 3);
    }

    #[test]
    fn test_non_finite_vectors_never_reach_search() {
        let result = VectorIndex::build(entries(vec![vec![1.0, 0.0], vec![f32::NAN, 0.0]]));
        assert!(matches!(
            result,
            Err(RagError::Embedding {
                ordinal: Some(1),
                ..
            })
        ));

        let result = VectorIndex::build(entries(vec![vec![f32::INFINITY, 1.0]]));
        assert!(result.is_err());

        let index = VectorIndex::build(entries(vec![vec![1.0, 0.0], vec![0.0, 1.0]])).unwrap();
        assert!(matches!(
            index.search(&[f32::NAN, 1.0], 2),
            Err(RagError::Embedding { ordinal: None, .. })
        ));
        let ranked: Vec<usize> = index
            .search(&[1.0, 0.0], 2)
            .unwrap()
            .iter()
            .map(|r| r.chunk.ordinal)
            .collect();
        assert_eq!(ranked, vec![0, 1]);
    }

    proptest! {
        #[test]
        fn prop_nonzero_vectors_are_unit_length(
            raw in proptest::collection::vec(proptest::collection::vec(-100.0f32..100.0, 8), 1..20)
        ) {
            let index = VectorIndex::build(entries(raw.clone())).unwrap();
            for (row, vector) in raw.iter().enumerate() {
                if l2_norm(vector) > 1e-3 {
                    let norm = l2_norm(index.vector(row).unwrap());
                    prop_assert!((norm - 1.0).abs() < 1e-4);
                }
            }
        }
    }
}
