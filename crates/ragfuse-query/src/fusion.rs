//! Weighted score fusion for combining vector and lexical results.

use std::collections::HashMap;

use ragfuse_core::{
    rank_order, validate_weight, Candidate, Document, FusedResult, Result, DEFAULT_VECTOR_WEIGHT,
};

/// Combine vector and text candidates into one ranking.
///
/// Each side is divided by its own maximum score (1 when the side is empty
/// or its maximum is not positive), then scaled by its weight: `w` for the
/// vector side and `1 - w` for the text side. Documents found by both sides
/// sum their contributions; documents found by one side keep that
/// contribution alone. The result is sorted by score descending, ties by id
/// ascending, and truncated to `limit`.
///
/// Within one side a repeated id keeps its best score. When a document is
/// in both sets the vector-side payload is returned.
pub fn weighted_fusion(
    vector: Vec<Candidate>,
    text: Vec<Candidate>,
    vector_weight: f32,
    limit: usize,
) -> Result<Vec<FusedResult>> {
    validate_weight(vector_weight)?;

    let vector = best_per_id(vector);
    let text = best_per_id(text);

    let mut fused: HashMap<String, FusedResult> = HashMap::with_capacity(vector.len() + text.len());

    let scale = vector_weight / normalizer(&vector);
    for (doc, score) in vector {
        fused.insert(doc.id.clone(), FusedResult::new(doc, score * scale));
    }

    let scale = (1.0 - vector_weight) / normalizer(&text);
    for (doc, score) in text {
        let contribution = score * scale;
        fused
            .entry(doc.id.clone())
            .and_modify(|r| r.score += contribution)
            .or_insert_with(|| FusedResult::new(doc, contribution));
    }

    let mut results: Vec<FusedResult> = fused.into_values().collect();
    results.sort_by(|a, b| rank_order(a.score, a.id(), b.score, b.id()));
    results.truncate(limit);

    Ok(results)
}

/// Divisor for one side: its maximum score, or 1.
fn normalizer(side: &[(Document, f32)]) -> f32 {
    let max = side
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);
    if max.is_finite() && max > 0.0 {
        max
    } else {
        1.0
    }
}

/// Collapse repeated ids, keeping the best score and first-seen order.
fn best_per_id(candidates: Vec<Candidate>) -> Vec<(Document, f32)> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(candidates.len());
    let mut out: Vec<(Document, f32)> = Vec::with_capacity(candidates.len());

    for c in candidates {
        match index.get(c.id()) {
            Some(&i) => {
                if c.score > out[i].1 {
                    out[i] = (c.document, c.score);
                }
            }
            None => {
                index.insert(c.document.id.clone(), out.len());
                out.push((c.document, c.score));
            }
        }
    }
    out
}

/// Fusion engine holding the deployment's default vector weight.
#[derive(Debug, Clone, Copy)]
pub struct ScoreFusion {
    vector_weight: f32,
}

impl Default for ScoreFusion {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
        }
    }
}

impl ScoreFusion {
    pub fn new(vector_weight: f32) -> Result<Self> {
        validate_weight(vector_weight)?;
        Ok(Self { vector_weight })
    }

    pub fn vector_weight(&self) -> f32 {
        self.vector_weight
    }

    /// Fuse with `weight` when given, else the default weight.
    pub fn fuse(
        &self,
        vector: Vec<Candidate>,
        text: Vec<Candidate>,
        weight: Option<f32>,
        limit: usize,
    ) -> Result<Vec<FusedResult>> {
        weighted_fusion(vector, text, weight.unwrap_or(self.vector_weight), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::candidate;

    fn ids(results: &[FusedResult]) -> Vec<&str> {
        results.iter().map(|r| r.id()).collect()
    }

    fn score_of(results: &[FusedResult], id: &str) -> f32 {
        results.iter().find(|r| r.id() == id).unwrap().score
    }

    #[test]
    fn test_worked_example() {
        let vector = vec![candidate("A", 0.9), candidate("B", 0.6)];
        let text = vec![candidate("B", 10.0), candidate("C", 5.0)];

        let fused = weighted_fusion(vector, text, 0.7, 10).unwrap();

        assert_eq!(ids(&fused), vec!["B", "A", "C"]);
        assert!((score_of(&fused, "A") - 0.70).abs() < 1e-5);
        assert!((score_of(&fused, "B") - (0.6 / 0.9 * 0.7 + 0.3)).abs() < 1e-5);
        assert!((score_of(&fused, "C") - 0.15).abs() < 1e-5);
    }

    #[test]
    fn test_top_contribution_equals_weight() {
        let vector = vec![candidate("v1", 0.42), candidate("v2", 0.21)];
        let text = vec![candidate("t1", 3.3), candidate("t2", 1.1)];

        let fused = weighted_fusion(vector, text, 0.7, 10).unwrap();

        assert!((score_of(&fused, "v1") - 0.7).abs() < 1e-6);
        assert!((score_of(&fused, "t1") - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_empty_text_side_degrades_to_scaled_vector() {
        let vector = vec![candidate("a", 0.8), candidate("b", 0.4)];

        let fused = weighted_fusion(vector, Vec::new(), 0.7, 10).unwrap();

        assert_eq!(ids(&fused), vec!["a", "b"]);
        assert!((fused[0].score - 0.7).abs() < 1e-6);
        assert!((fused[1].score - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_empty_vector_side() {
        let text = vec![candidate("x", 2.0), candidate("y", 1.0)];

        let fused = weighted_fusion(Vec::new(), text, 0.7, 10).unwrap();

        assert_eq!(ids(&fused), vec!["x", "y"]);
        assert!((fused[0].score - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_both_empty() {
        assert!(weighted_fusion(Vec::new(), Vec::new(), 0.7, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_ties_break_by_id() {
        let vector = vec![candidate("b", 1.0), candidate("a", 1.0)];
        let text = vec![candidate("c", 1.0)];

        let fused = weighted_fusion(vector, text, 0.5, 10).unwrap();

        assert_eq!(ids(&fused), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_limit_enforced() {
        let vector: Vec<_> = (0..10)
            .map(|i| candidate(&format!("v{i}"), 1.0 - i as f32 * 0.05))
            .collect();
        let text: Vec<_> = (0..10).map(|i| candidate(&format!("t{i}"), 10.0 - i as f32)).collect();

        let fused = weighted_fusion(vector, text, 0.7, 5).unwrap();

        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn test_union_of_inputs() {
        let vector = vec![candidate("a", 0.5), candidate("b", 0.4)];
        let text = vec![candidate("b", 2.0), candidate("c", 1.0)];

        let fused = weighted_fusion(vector, text, 0.7, 10).unwrap();

        assert_eq!(fused.len(), 3);
        for r in &fused {
            assert!(["a", "b", "c"].contains(&r.id()));
        }
    }

    #[test]
    fn test_weight_bounds() {
        for w in [-0.1, 1.1, f32::NAN, f32::INFINITY] {
            let err = weighted_fusion(Vec::new(), Vec::new(), w, 10).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        }
        assert!(ScoreFusion::new(1.5).is_err());
    }

    #[test]
    fn test_extreme_weights() {
        let vector = vec![candidate("v", 0.9)];
        let text = vec![candidate("t", 5.0)];

        let lexical_only = weighted_fusion(vector.clone(), text.clone(), 0.0, 10).unwrap();
        assert_eq!(lexical_only[0].id(), "t");
        assert_eq!(score_of(&lexical_only, "v"), 0.0);

        let vector_only = weighted_fusion(vector, text, 1.0, 10).unwrap();
        assert_eq!(vector_only[0].id(), "v");
    }

    #[test]
    fn test_duplicate_ids_keep_best() {
        let vector = vec![candidate("a", 0.2), candidate("a", 0.8), candidate("b", 0.4)];

        let fused = weighted_fusion(vector, Vec::new(), 1.0, 10).unwrap();

        assert_eq!(fused.len(), 2);
        assert!((score_of(&fused, "a") - 1.0).abs() < 1e-6);
        assert!((score_of(&fused, "b") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_vector_payload_kept() {
        let mut from_vector = candidate("a", 0.5);
        from_vector.document.title = Some("vector".to_string());
        let mut from_text = candidate("a", 1.0);
        from_text.document.title = Some("text".to_string());

        let fused = weighted_fusion(vec![from_vector], vec![from_text], 0.5, 10).unwrap();

        assert_eq!(fused[0].document.title.as_deref(), Some("vector"));
        assert!((fused[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let vector = vec![candidate("a", 0.3), candidate("b", 0.3), candidate("c", 0.6)];
        let text = vec![candidate("d", 1.0), candidate("a", 0.5)];

        let first = weighted_fusion(vector.clone(), text.clone(), 0.7, 10).unwrap();
        let second = weighted_fusion(vector, text, 0.7, 10).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_default_weight() {
        let fusion = ScoreFusion::default();
        assert!((fusion.vector_weight() - 0.7).abs() < f32::EPSILON);

        let fused = fusion
            .fuse(vec![candidate("a", 1.0)], vec![candidate("b", 1.0)], None, 10)
            .unwrap();
        assert_eq!(ids(&fused), vec!["a", "b"]);

        let fused = fusion
            .fuse(vec![candidate("a", 1.0)], vec![candidate("b", 1.0)], Some(0.2), 10)
            .unwrap();
        assert_eq!(ids(&fused), vec!["b", "a"]);
    }
}
