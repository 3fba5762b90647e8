//! Weighted score fusion for combining vector and lexical rankings
//!
//! Scores from the two paths live on heterogeneous scales, so each set
//! is normalized to [0, 1] against a zero floor before weighting
//! (`score / max`, extended to negative floors). A fragment missing from
//! one set contributes 0.0 from that side rather than being treated as
//! absent, which rewards agreement between the paths without
//! systematically burying single-path hits.
//!
//! The final ordering is total: fused score descending, ties broken by
//! vector rank, then lexical rank, then fragment identifier. Pagination
//! depends on this being deterministic.

use crate::collaborators::IndexHit;
use crate::retrieval::{FragmentRef, ScoredResult};
use ahash::AHashMap;
use std::cmp::Ordering;

/// Fusion weights taken from the query options
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub vector: f32,
    pub lexical: f32,
}

/// Per-fragment accumulator while building the union
struct Slot {
    document_id: String,
    vector_score: Option<f32>,
    lexical_score: Option<f32>,
}

/// Merge two hit lists into one fused, deterministically ordered list
///
/// `min_score` filters on the fused score after weighting. Ranks are
/// assigned on the returned list starting at 0.
pub fn fuse(
    vector_hits: &[IndexHit],
    lexical_hits: &[IndexHit],
    weights: FusionWeights,
    min_score: f32,
) -> Vec<ScoredResult> {
    let vector_norm = normalize(vector_hits);
    let lexical_norm = normalize(lexical_hits);

    let mut slots: AHashMap<String, Slot> = AHashMap::new();

    for hit in vector_hits {
        let slot = slots.entry(hit.fragment_id.clone()).or_insert_with(|| Slot {
            document_id: hit.document_id.clone(),
            vector_score: None,
            lexical_score: None,
        });
        // on duplicate ids the best-ranked (first) hit wins
        if slot.vector_score.is_none() {
            slot.vector_score = Some(hit.score);
        }
    }

    for hit in lexical_hits {
        let slot = slots.entry(hit.fragment_id.clone()).or_insert_with(|| Slot {
            document_id: hit.document_id.clone(),
            vector_score: None,
            lexical_score: None,
        });
        if slot.lexical_score.is_none() {
            slot.lexical_score = Some(hit.score);
        }
    }

    let mut results: Vec<ScoredResult> = slots
        .into_iter()
        .map(|(fragment_id, slot)| {
            let nv = slot
                .vector_score
                .map(|s| vector_norm.apply(s))
                .unwrap_or(0.0);
            let nl = slot
                .lexical_score
                .map(|s| lexical_norm.apply(s))
                .unwrap_or(0.0);
            let fused = weights.vector * nv + weights.lexical * nl;

            ScoredResult {
                fragment: FragmentRef {
                    fragment_id,
                    document_id: slot.document_id,
                },
                vector_score: slot.vector_score,
                lexical_score: slot.lexical_score,
                fused_score: fused,
                // assigned after the final sort
                rank: 0,
            }
        })
        .collect();

    let vector_ranks = rank_table(vector_hits);
    let lexical_ranks = rank_table(lexical_hits);

    results.sort_by(|a, b| compare_fused(a, b, &vector_ranks, &lexical_ranks));

    if min_score > 0.0 {
        results.retain(|r| r.fused_score >= min_score);
    }

    for (rank, result) in results.iter_mut().enumerate() {
        result.rank = rank;
    }

    results
}

fn compare_fused(
    a: &ScoredResult,
    b: &ScoredResult,
    vector_ranks: &AHashMap<&str, usize>,
    lexical_ranks: &AHashMap<&str, usize>,
) -> Ordering {
    b.fused_score
        .partial_cmp(&a.fused_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            let ra = rank_of(vector_ranks, &a.fragment.fragment_id);
            let rb = rank_of(vector_ranks, &b.fragment.fragment_id);
            ra.cmp(&rb)
        })
        .then_with(|| {
            let ra = rank_of(lexical_ranks, &a.fragment.fragment_id);
            let rb = rank_of(lexical_ranks, &b.fragment.fragment_id);
            ra.cmp(&rb)
        })
        .then_with(|| a.fragment.fragment_id.cmp(&b.fragment.fragment_id))
}

fn rank_of(ranks: &AHashMap<&str, usize>, fragment_id: &str) -> usize {
    ranks.get(fragment_id).copied().unwrap_or(usize::MAX)
}

/// Original rank of each fragment within one hit list, first occurrence wins
fn rank_table(hits: &[IndexHit]) -> AHashMap<&str, usize> {
    let mut ranks = AHashMap::new();
    for (rank, hit) in hits.iter().enumerate() {
        ranks.entry(hit.fragment_id.as_str()).or_insert(rank);
    }
    ranks
}

/// Normalization parameters for one result set
struct Norm {
    floor: f32,
    range: f32,
}

impl Norm {
    fn apply(&self, score: f32) -> f32 {
        if self.range <= f32::EPSILON {
            // Uniform or singleton set: every present hit is a full hit
            1.0
        } else {
            ((score - self.floor) / self.range).clamp(0.0, 1.0)
        }
    }
}

/// Score-range normalization against a zero floor
///
/// The floor only drops below zero when the index emits negative scores
/// (e.g. signed distances); positive scales normalize as `score / max`,
/// so a second-ranked hit keeps a meaningful fraction of the top score
/// instead of collapsing to zero as strict min-max would.
fn normalize(hits: &[IndexHit]) -> Norm {
    let mut floor: f32 = 0.0;
    let mut max = f32::NEG_INFINITY;
    for hit in hits {
        floor = floor.min(hit.score);
        max = max.max(hit.score);
    }
    if hits.is_empty() || max <= f32::NEG_INFINITY {
        return Norm {
            floor: 0.0,
            range: 0.0,
        };
    }
    Norm {
        floor,
        range: max - floor,
    }
}

/// Reorder the top `window` of a fused list per the reranker's ordering
///
/// `order` lists fragment ids in the reranker's preferred order. Only
/// results inside the window move; anything past the window keeps its
/// fused-score position, which bounds reranking cost regardless of
/// total result count. Window entries the reranker did not mention keep
/// their relative order after the mentioned ones. Ranks are reassigned.
pub fn apply_rerank_order(results: &mut Vec<ScoredResult>, order: &[String], window: usize) {
    let window = window.min(results.len());
    if window < 2 {
        return;
    }

    let position: AHashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut head: Vec<ScoredResult> = results.drain(..window).collect();
    // stable sort keeps unmentioned entries in fused order, after the
    // reranked ones
    head.sort_by_key(|r| {
        position
            .get(r.fragment.fragment_id.as_str())
            .copied()
            .unwrap_or(usize::MAX)
    });

    head.append(results);
    *results = head;

    for (rank, result) in results.iter_mut().enumerate() {
        result.rank = rank;
    }
}
