use image::RgbImage;
use log::{debug, warn};
use serde::Serialize;

use crate::{
    analysis::{
        embedding::{FeatureEmbedder, cosine_similarity},
        matching::KeypointComparator,
    },
    config::Thresholds,
    error::EmbeddingError,
};

/// Dual-metric comparison of one region pair. A failed metric has no score and never matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub embedding_score: Option<f64>,
    pub embedding_match: bool,
    pub keypoint_score: Option<f64>,
    pub keypoint_match: bool,
    pub keypoint_matches: usize,
    pub embedding_error: Option<String>,
    pub keypoint_error: Option<String>,
}

impl SimilarityResult {
    pub fn from_scores(embedding_score: f64, keypoint_score: f64, thresholds: &Thresholds) -> Self {
        Self {
            embedding_score: Some(embedding_score),
            embedding_match: embedding_score >= thresholds.embedding,
            keypoint_score: Some(keypoint_score),
            keypoint_match: keypoint_score >= thresholds.keypoint,
            keypoint_matches: 0,
            embedding_error: None,
            keypoint_error: None,
        }
    }

    /// Both metrics must agree for a region to count as unchanged.
    pub fn is_match(&self) -> bool {
        self.embedding_match && self.keypoint_match
    }
}

pub struct SimilarityEngine {
    embedder: FeatureEmbedder,
    comparator: KeypointComparator,
}

impl SimilarityEngine {
    pub fn new(embedder: FeatureEmbedder, comparator: KeypointComparator) -> Self {
        Self {
            embedder,
            comparator,
        }
    }

    pub fn compare_region(
        &self,
        a: &RgbImage,
        b: &RgbImage,
        thresholds: &Thresholds,
    ) -> SimilarityResult {
        let (embedding, keypoints) = rayon::join(
            || self.embedding_similarity(a, b),
            || self.comparator.compare(a, b),
        );

        let (embedding_score, embedding_error) = match embedding {
            Ok(score) => (Some(score), None),
            Err(e) => {
                warn!("Embedding metric unavailable: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let (keypoint_score, keypoint_matches, keypoint_error) = match keypoints {
            Ok(m) => (Some(m.score), m.match_count, None),
            Err(e) => {
                warn!("Keypoint metric unavailable: {}", e);
                (None, 0, Some(e.to_string()))
            }
        };

        let result = SimilarityResult {
            embedding_score,
            embedding_match: embedding_score.is_some_and(|s| s >= thresholds.embedding),
            keypoint_score,
            keypoint_match: keypoint_score.is_some_and(|s| s >= thresholds.keypoint),
            keypoint_matches,
            embedding_error,
            keypoint_error,
        };

        debug!(
            "Region similarity: embedding {:?} (match {}), keypoints {:?} (match {})",
            result.embedding_score,
            result.embedding_match,
            result.keypoint_score,
            result.keypoint_match
        );

        result
    }

    pub fn embedding_similarity(&self, a: &RgbImage, b: &RgbImage) -> Result<f64, EmbeddingError> {
        let first = self.embedder.embed(a)?;
        let second = self.embedder.embed(b)?;
        cosine_similarity(&first, &second)
    }

    pub fn embedder(&self) -> &FeatureEmbedder {
        &self.embedder
    }

    pub fn comparator(&self) -> &KeypointComparator {
        &self.comparator
    }
}
