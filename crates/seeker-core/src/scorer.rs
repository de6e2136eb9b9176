//! Pairwise signature scoring.

use crate::types::FaceSignature;

/// Distances at or above this are not matches.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Strategy for scoring query signatures against one corpus record's signatures.
pub trait Scorer {
    /// Scores for every passing (query, corpus) pair.
    fn score(&self, query: &[FaceSignature], corpus: &[FaceSignature], threshold: f32) -> Vec<f32>;
}

/// Euclidean-distance scorer over the full cross product.
///
/// Pairs from different encoding schemes are skipped. A pair passes when its
/// raw distance is strictly below the threshold; its score is `1 - distance`
/// rounded to two decimals and is never clamped.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanScorer;

impl Scorer for EuclideanScorer {
    fn score(&self, query: &[FaceSignature], corpus: &[FaceSignature], threshold: f32) -> Vec<f32> {
        let mut scores = Vec::new();
        for stored in corpus {
            for face in query.iter().filter(|face| face.comparable(stored)) {
                let distance = stored.distance(face);
                if distance < threshold {
                    scores.push(similarity_score(distance));
                }
            }
        }
        scores
    }
}

/// `1 - distance`, rounded to two decimals.
pub fn similarity_score(distance: f32) -> f32 {
    ((1.0 - distance) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(values: &[f32]) -> FaceSignature {
        FaceSignature::new(values.to_vec())
    }

    #[test]
    fn test_exact_threshold_excluded() {
        let scores = EuclideanScorer.score(&[sig(&[0.0, 0.0])], &[sig(&[0.5, 0.0])], 0.5);
        assert!(scores.is_empty());
    }

    #[test]
    fn test_just_below_threshold_included() {
        let scores = EuclideanScorer.score(&[sig(&[0.0, 0.0])], &[sig(&[0.499, 0.0])], 0.5);
        assert_eq!(scores.len(), 1);
        assert!((scores[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_score_rounding() {
        let scores = EuclideanScorer.score(&[sig(&[0.0, 0.0])], &[sig(&[0.3, 0.0])], 0.5);
        assert_eq!(scores.len(), 1);
        assert!((scores[0] - 0.70).abs() < 1e-6);

        assert!((similarity_score(0.123) - 0.88).abs() < 1e-6);
        assert!((similarity_score(0.126) - 0.87).abs() < 1e-6);
    }

    #[test]
    fn test_score_not_clamped() {
        // Distance 1.5 passes a permissive threshold and yields a negative score.
        let scores = EuclideanScorer.score(&[sig(&[0.0])], &[sig(&[1.5])], 2.0);
        assert_eq!(scores.len(), 1);
        assert!((scores[0] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_full_cross_product() {
        let query = [sig(&[0.0, 0.0]), sig(&[10.0, 10.0])];
        let corpus = [sig(&[0.1, 0.0]), sig(&[10.0, 10.2]), sig(&[5.0, 5.0])];
        let scores = EuclideanScorer.score(&query, &corpus, 0.5);
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 0.9).abs() < 1e-6);
        assert!((scores[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_multiple_pairs_same_record_all_reported() {
        let query = [sig(&[0.0]), sig(&[0.1])];
        let corpus = [sig(&[0.05])];
        assert_eq!(EuclideanScorer.score(&query, &corpus, 0.5).len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(EuclideanScorer.score(&[], &[sig(&[0.0])], 0.5).is_empty());
        assert!(EuclideanScorer.score(&[sig(&[0.0])], &[], 0.5).is_empty());
    }

    #[test]
    fn test_different_schemes_never_compared() {
        let arcface = FaceSignature {
            values: vec![0.0, 0.0],
            scheme: Some("w600k_r50".into()),
        };
        let other = FaceSignature {
            values: vec![0.0, 0.0],
            scheme: Some("dlib".into()),
        };
        assert!(EuclideanScorer.score(&[arcface.clone()], &[other], 0.5).is_empty());
        assert_eq!(EuclideanScorer.score(&[arcface], &[sig(&[0.1, 0.0])], 0.5).len(), 1);
    }
}
