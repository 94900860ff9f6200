//! Top-k similarity ranking over the knowledge base.
//!
//! Scores every embedded chunk against a query vector with cosine
//! similarity and returns the `k` best, highest first. The sort is stable,
//! so chunks with equal scores keep their knowledge-base order — earlier
//! chunks win ties. Degenerate inputs (empty knowledge base, zero-magnitude
//! vectors) produce a short or empty ranking, never an error.

use crate::chunks::EmbeddedChunk;
use crate::embedding::cosine_similarity;

/// One chunk scored against a query, valid for a single request.
#[derive(Debug)]
pub struct RankedChunk<'a> {
    pub chunk: &'a EmbeddedChunk,
    pub score: f32,
}

/// Rank `chunks` against `query` and return up to `k` results sorted by
/// descending score. Ties keep the chunk's original position.
pub fn rank<'a>(query: &[f32], chunks: &'a [EmbeddedChunk], k: usize) -> Vec<RankedChunk<'a>> {
    let mut ranked: Vec<RankedChunk<'a>> = chunks
        .iter()
        .map(|chunk| RankedChunk {
            chunk,
            score: cosine_similarity(query, &chunk.embedding),
        })
        .collect();

    // Stable sort: equal scores preserve knowledge-base order.
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(k);

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::{Chunk, ChunkKind, ChunkMetadata};

    fn embedded(content: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                content: content.to_string(),
                metadata: ChunkMetadata {
                    kind: ChunkKind::Bio,
                    id: None,
                    workplace: None,
                    title: None,
                },
            },
            embedding,
        }
    }

    #[test]
    fn test_rank_returns_min_k_len() {
        let chunks = vec![
            embedded("a", vec![1.0, 0.0]),
            embedded("b", vec![0.0, 1.0]),
        ];
        assert_eq!(rank(&[1.0, 0.0], &chunks, 5).len(), 2);
        assert_eq!(rank(&[1.0, 0.0], &chunks, 1).len(), 1);
    }

    #[test]
    fn test_rank_sorted_descending() {
        let chunks = vec![
            embedded("orthogonal", vec![0.0, 1.0]),
            embedded("exact", vec![1.0, 0.0]),
            embedded("diagonal", vec![1.0, 1.0]),
        ];
        let ranked = rank(&[1.0, 0.0], &chunks, 3);
        assert_eq!(ranked[0].chunk.chunk.content, "exact");
        assert_eq!(ranked[1].chunk.chunk.content, "diagonal");
        assert_eq!(ranked[2].chunk.chunk.content, "orthogonal");
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_exact_match_scores_one() {
        let chunks = vec![
            embedded("other", vec![0.2, 0.9]),
            embedded("match", vec![0.6, 0.8]),
        ];
        let ranked = rank(&[0.6, 0.8], &chunks, 5);
        assert_eq!(ranked[0].chunk.chunk.content, "match");
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ties_keep_knowledge_base_order() {
        // Same direction, different magnitude: identical cosine scores.
        let chunks = vec![
            embedded("first", vec![1.0, 1.0]),
            embedded("second", vec![2.0, 2.0]),
            embedded("third", vec![3.0, 3.0]),
        ];
        let ranked = rank(&[1.0, 1.0], &chunks, 3);
        assert_eq!(ranked[0].chunk.chunk.content, "first");
        assert_eq!(ranked[1].chunk.chunk.content, "second");
        assert_eq!(ranked[2].chunk.chunk.content, "third");
    }

    #[test]
    fn test_empty_knowledge_base() {
        let ranked = rank(&[1.0, 0.0], &[], 5);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_zero_query_ranks_all_zero() {
        let chunks = vec![
            embedded("a", vec![1.0, 0.0]),
            embedded("b", vec![0.0, 1.0]),
        ];
        let ranked = rank(&[0.0, 0.0], &chunks, 5);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.score == 0.0));
        // Undefined scores tie, so knowledge-base order holds.
        assert_eq!(ranked[0].chunk.chunk.content, "a");
    }
}
