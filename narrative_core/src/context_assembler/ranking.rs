//! Hybrid recency + relevance ranking of candidate scenes.

use std::cmp::Ordering;

use story_bible::EntityId;

/// Scores are compared at this resolution so float noise cannot break ties.
const SCORE_RESOLUTION: f32 = 1e6;

/// A scene competing for a bundle slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredScene {
    pub scene: EntityId,
    /// Semantic similarity to the query, in `[0, 1]`.
    pub similarity: f32,
    /// Chronological position scaled to `(0, 1]`; the latest scene is 1.0.
    pub recency: f32,
    /// `relevance_weight * similarity + recency_weight * recency`.
    pub score: f32,
    /// Shares the POV character or target location with the request.
    pub boosted: bool,
}

impl ScoredScene {
    pub fn new(
        scene: EntityId,
        similarity: f32,
        recency: f32,
        recency_weight: f32,
        boosted: bool,
    ) -> Self {
        let score = (1.0 - recency_weight) * similarity + recency_weight * recency;
        Self {
            scene,
            similarity,
            recency,
            score,
            boosted,
        }
    }

    fn quantized(&self) -> i64 {
        (self.score * SCORE_RESOLUTION).round() as i64
    }
}

/// Recency of the scene at zero-based chronological `position` among `total` scenes.
pub fn recency_score(position: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (position + 1) as f32 / total as f32
}

/// Score descending, boosted candidates ahead of equal scores, then ID ascending.
pub fn compare_candidates(a: &ScoredScene, b: &ScoredScene) -> Ordering {
    b.quantized()
        .cmp(&a.quantized())
        .then_with(|| b.boosted.cmp(&a.boosted))
        .then_with(|| a.scene.cmp(&b.scene))
}

/// Sort candidates into slot order.
pub fn rank(mut candidates: Vec<ScoredScene>) -> Vec<ScoredScene> {
    candidates.sort_by(compare_candidates);
    candidates
}
