//! Nearest-neighbor matching of a probe embedding against stored records.
//!
//! Linear scan with a strict distance threshold. The trait takes a plain
//! slice of candidates so the store's scan can later be replaced by an
//! ANN index without touching matching semantics.

use crate::types::{Embedding, IdentityRecord};
use thiserror::Error;

/// Default maximum accepted Euclidean distance for a positive match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("embedding dimension mismatch: probe has {probe}, stored record has {stored}")]
    DimensionMismatch { probe: usize, stored: usize },
}

/// Strategy for finding the best-matching record for a probe embedding.
pub trait Matcher {
    /// Returns the closest candidate with distance strictly below
    /// `threshold`, or `None` when no candidate qualifies. `None` is a
    /// valid no-match outcome, not an error.
    fn best_match<'a>(
        &self,
        probe: &Embedding,
        candidates: &'a [IdentityRecord],
        threshold: f32,
    ) -> Result<Option<&'a IdentityRecord>, MatchError>;
}

/// Brute-force Euclidean matcher.
///
/// A candidate replaces the running best only when its distance is
/// strictly less than both the best so far and the threshold, so ties
/// resolve to the earliest candidate in scan order. With the store's
/// key-sorted scan this makes results reproducible.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match<'a>(
        &self,
        probe: &Embedding,
        candidates: &'a [IdentityRecord],
        threshold: f32,
    ) -> Result<Option<&'a IdentityRecord>, MatchError> {
        let mut best: Option<&IdentityRecord> = None;
        let mut best_distance = f32::INFINITY;

        for record in candidates {
            if record.embedding.dim() != probe.dim() {
                return Err(MatchError::DimensionMismatch {
                    probe: probe.dim(),
                    stored: record.embedding.dim(),
                });
            }

            let distance = probe.distance(&record.embedding);
            if distance < best_distance && distance < threshold {
                best_distance = distance;
                best = Some(record);
            }
        }

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, values: Vec<f32>) -> IdentityRecord {
        IdentityRecord {
            name: name.into(),
            condition: "stable".into(),
            embedding: Embedding::new(values),
            registered_at: String::new(),
        }
    }

    #[test]
    fn test_exact_match_at_distance_zero() {
        let probe = Embedding::new(vec![0.1, 0.2, 0.3]);
        let candidates = vec![
            record("bob", vec![1.0, 1.0, 1.0]),
            record("alice", vec![0.1, 0.2, 0.3]),
        ];

        let best = EuclideanMatcher
            .best_match(&probe, &candidates, DEFAULT_MATCH_THRESHOLD)
            .unwrap();
        assert_eq!(best.unwrap().name, "alice");
    }

    #[test]
    fn test_empty_candidates_is_no_match() {
        let probe = Embedding::new(vec![0.1, 0.2]);
        let best = EuclideanMatcher
            .best_match(&probe, &[], DEFAULT_MATCH_THRESHOLD)
            .unwrap();
        assert!(best.is_none());
    }

    #[test]
    fn test_distance_at_threshold_is_rejected() {
        // Candidate at exactly the threshold distance: strict inequality.
        let probe = Embedding::new(vec![0.0, 0.0]);
        let candidates = vec![record("edge", vec![0.6, 0.0])];
        let threshold = probe.distance(&candidates[0].embedding);

        let best = EuclideanMatcher
            .best_match(&probe, &candidates, threshold)
            .unwrap();
        assert!(best.is_none());
    }

    #[test]
    fn test_distance_just_below_threshold_is_accepted() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let candidates = vec![record("near", vec![0.6 - 1e-4, 0.0])];

        let best = EuclideanMatcher.best_match(&probe, &candidates, 0.6).unwrap();
        assert_eq!(best.unwrap().name, "near");
    }

    #[test]
    fn test_beyond_threshold_nearest_neighbor_is_rejected() {
        // Nearest stored neighbor at 0.8 with threshold 0.6: no match.
        let probe = Embedding::new(vec![0.0, 0.0]);
        let candidates = vec![record("far", vec![0.8, 0.0])];

        let best = EuclideanMatcher.best_match(&probe, &candidates, 0.6).unwrap();
        assert!(best.is_none());
    }

    #[test]
    fn test_tie_keeps_first_in_scan_order() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let candidates = vec![
            record("first", vec![0.3, 0.0]),
            record("second", vec![0.0, 0.3]),
        ];

        let best = EuclideanMatcher.best_match(&probe, &candidates, 0.6).unwrap();
        assert_eq!(best.unwrap().name, "first");
    }

    #[test]
    fn test_match_is_deterministic() {
        let probe = Embedding::new(vec![0.05, 0.05]);
        let candidates = vec![
            record("a", vec![0.1, 0.0]),
            record("b", vec![0.0, 0.1]),
            record("c", vec![0.5, 0.5]),
        ];

        let first = EuclideanMatcher
            .best_match(&probe, &candidates, 0.6)
            .unwrap()
            .map(|r| r.name.clone());
        for _ in 0..10 {
            let again = EuclideanMatcher
                .best_match(&probe, &candidates, 0.6)
                .unwrap()
                .map(|r| r.name.clone());
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let probe = Embedding::new(vec![0.0, 0.0, 0.0]);
        let candidates = vec![record("short", vec![0.0, 0.0])];

        let err = EuclideanMatcher
            .best_match(&probe, &candidates, 0.6)
            .unwrap_err();
        match err {
            MatchError::DimensionMismatch { probe: p, stored: s } => {
                assert_eq!((p, s), (3, 2));
            }
        }
    }
}
