//! Weighted fusion of similarity and keyword results.

use std::collections::BTreeMap;

use studydb_core::types::{Chunk, ChunkId, HybridHit, SearchHit};

/// Score of the result at 0-based position `rank` of a keyword result list.
pub fn keyword_score(rank: usize) -> f32 {
    1.0 / (1.0 + rank as f32)
}

/// Merges both result lists by chunk id.
///
/// Each chunk scores `alpha * semantic + (1 - alpha) * keyword`, where a
/// component is 0 when the chunk is missing from that list. Results are sorted
/// by descending score, equal scores by ascending id, and cut to `k`.
pub fn fuse(semantic: Vec<SearchHit>, keyword: Vec<Chunk>, alpha: f32, k: usize) -> Vec<HybridHit> {
    let mut merged: BTreeMap<ChunkId, HybridHit> = BTreeMap::new();
    for hit in semantic {
        merged
            .entry(hit.chunk.id)
            .or_insert_with(|| HybridHit { chunk: hit.chunk, score: 0.0, semantic: hit.score, keyword: 0.0 });
    }
    for (rank, chunk) in keyword.into_iter().enumerate() {
        let score = keyword_score(rank);
        merged
            .entry(chunk.id)
            .and_modify(|h| h.keyword = h.keyword.max(score))
            .or_insert_with(|| HybridHit { chunk, score: 0.0, semantic: 0.0, keyword: score });
    }
    let mut hits: Vec<HybridHit> = merged
        .into_values()
        .map(|mut h| {
            h.score = alpha * h.semantic + (1.0 - alpha) * h.keyword;
            h
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.chunk.id.cmp(&b.chunk.id)));
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use studydb_core::metadata::ChunkMetadata;
    use studydb_core::types::SourceKind;

    fn chunk(id: ChunkId) -> Chunk {
        Chunk { id, content: format!("chunk {id}"), metadata: ChunkMetadata::default() }
    }

    fn sem(id: ChunkId, score: f32) -> SearchHit {
        SearchHit { chunk: chunk(id), score, source: SourceKind::Vector }
    }

    fn ids(hits: &[HybridHit]) -> Vec<ChunkId> {
        hits.iter().map(|h| h.chunk.id).collect()
    }

    #[test]
    fn keyword_scores_decay_with_rank() {
        assert_eq!(keyword_score(0), 1.0);
        assert_eq!(keyword_score(1), 0.5);
        assert!((keyword_score(3) - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn chunk_in_both_lists_combines_components() {
        let hits = fuse(vec![sem(7, 0.8), sem(3, 0.4)], vec![chunk(3), chunk(9)], 0.5, 10);
        let three = hits.iter().find(|h| h.chunk.id == 3).expect("merged");
        assert!((three.semantic - 0.4).abs() < 1e-6);
        assert!((three.keyword - 1.0).abs() < 1e-6);
        assert!((three.score - 0.7).abs() < 1e-6);
        assert_eq!(ids(&hits), vec![3, 7, 9]);
    }

    #[test]
    fn alpha_one_follows_similarity_order() {
        let semantic = vec![sem(4, 0.9), sem(2, 0.6), sem(8, 0.3)];
        let keyword = vec![chunk(8), chunk(5), chunk(2)];
        assert_eq!(ids(&fuse(semantic, keyword, 1.0, 3)), vec![4, 2, 8]);
    }

    #[test]
    fn alpha_zero_follows_keyword_order() {
        let semantic = vec![sem(4, 0.9), sem(2, 0.6), sem(8, 0.3)];
        let keyword = vec![chunk(8), chunk(5), chunk(2)];
        assert_eq!(ids(&fuse(semantic, keyword, 0.0, 3)), vec![8, 5, 2]);
    }

    #[test]
    fn ties_break_by_ascending_id_and_output_is_truncated() {
        let semantic = vec![sem(12, 0.5), sem(6, 0.5)];
        let hits = fuse(semantic, vec![], 1.0, 1);
        assert_eq!(ids(&hits), vec![6]);
        assert!(fuse(vec![], vec![], 0.5, 5).is_empty());
    }
}
