//! Score-window reranking.
//!
//! Keeps a primary set of the best hits, admits strong stragglers, then
//! cuts everything that falls too far below the best score. The result
//! size is driven by the score distribution rather than a fixed count.

use crate::models::SearchHit;

/// Tuning for [`rerank`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankParams {
    /// Hits always considered, best first.
    pub primary: usize,
    /// Minimum score for a hit beyond the primary set.
    pub min_extra_score: f64,
    /// Largest allowed distance from the top score.
    pub max_score_gap: f64,
}

impl Default for RerankParams {
    fn default() -> Self {
        Self {
            primary: 5,
            min_extra_score: 0.7,
            max_score_gap: 0.6,
        }
    }
}

/// Rerank `hits` by relevance score.
///
/// Hits without a score or with a negative one are dropped. Every
/// returned hit is within `max_score_gap` of the top score, and the
/// output is sorted by descending score.
pub fn rerank(hits: Vec<SearchHit>, params: &RerankParams) -> Vec<SearchHit> {
    let mut scored: Vec<(f64, SearchHit)> = hits
        .into_iter()
        .filter_map(|h| match h.relevance_score {
            Some(s) if s >= 0.0 => Some((s, h)),
            _ => None,
        })
        .collect();
    if scored.is_empty() {
        return Vec::new();
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let top = scored[0].0;
    let within_gap = |s: f64| top - s <= params.max_score_gap;

    let rest = scored.split_off(params.primary.min(scored.len()));
    scored.extend(
        rest.into_iter()
            .filter(|(s, _)| *s >= params.min_extra_score && within_gap(*s)),
    );
    scored.retain(|(s, _)| within_gap(*s));
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored.into_iter().map(|(_, h)| h).collect()
}
