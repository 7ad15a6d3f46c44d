use image::RgbImage;
use log::{debug, warn};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use crate::{
    analysis::keypoints::{Descriptor, KeypointDetector, KeypointSet},
    config::KeypointConfig,
    error::KeypointError,
    image_utils::rgb_to_gray,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Outcome of matching two crops' keypoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeypointMatch {
    /// Accepted matches over the smaller keypoint count, in `[0, 1]`.
    pub score: f64,
    pub match_count: usize,
    pub keypoints_a: usize,
    pub keypoints_b: usize,
}

impl KeypointMatch {
    pub fn zero() -> Self {
        Self {
            score: 0.0,
            match_count: 0,
            keypoints_a: 0,
            keypoints_b: 0,
        }
    }
}

/// For each query descriptor, finds its two nearest train descriptors by Hamming
/// distance and keeps the nearest only if `best < ratio * second_best`.
/// Nothing matches when `train` has fewer than two descriptors.
pub fn ratio_test_matches(
    query: &[Descriptor],
    train: &[Descriptor],
    ratio: f32,
) -> Vec<DescriptorMatch> {
    if train.len() < 2 {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .filter_map(|(qi, descriptor)| {
            let ((best_idx, best), (_, second)) = two_nearest(descriptor, train)?;

            ((best as f32) < ratio * second as f32).then_some(DescriptorMatch {
                query: qi,
                train: best_idx,
                distance: best,
            })
        })
        .collect()
}

fn two_nearest(
    descriptor: &Descriptor,
    train: &[Descriptor],
) -> Option<((usize, u32), (usize, u32))> {
    let mut best = (usize::MAX, u32::MAX);
    let mut second = (usize::MAX, u32::MAX);

    for (i, candidate) in train.iter().enumerate() {
        let distance = descriptor.hamming(candidate);
        if distance < best.1 {
            second = best;
            best = (i, distance);
        } else if distance < second.1 {
            second = (i, distance);
        }
    }

    (second.0 != usize::MAX).then_some((best, second))
}

/// Structural similarity of two crops from local keypoint correspondences.
pub struct KeypointComparator {
    detector: KeypointDetector,
    ratio: f32,
}

impl KeypointComparator {
    pub fn new(config: &KeypointConfig) -> Self {
        Self {
            detector: KeypointDetector::new(config.clone()),
            ratio: config.ratio,
        }
    }

    pub fn extract(&self, image: &RgbImage) -> Result<KeypointSet, KeypointError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(KeypointError::EmptyImage { width, height });
        }

        Ok(self.detector.detect(&rgb_to_gray(image)))
    }

    pub fn compare(&self, a: &RgbImage, b: &RgbImage) -> Result<KeypointMatch, KeypointError> {
        let set_a = self.extract(a)?;
        let set_b = self.extract(b)?;
        Ok(self.compare_sets(&set_a, &set_b))
    }

    /// Score is `0.0` when either set is empty.
    pub fn compare_sets(&self, a: &KeypointSet, b: &KeypointSet) -> KeypointMatch {
        if a.is_empty() || b.is_empty() {
            debug!(
                "Keypoint comparison degenerate ({} vs {} keypoints)",
                a.len(),
                b.len()
            );
            return KeypointMatch {
                keypoints_a: a.len(),
                keypoints_b: b.len(),
                ..KeypointMatch::zero()
            };
        }

        let matches = ratio_test_matches(&a.descriptors, &b.descriptors, self.ratio);
        let denominator = a.len().min(b.len());
        let score = (matches.len() as f64 / denominator as f64).min(1.0);

        debug!(
            "Keypoint comparison: {} good match(es) from {} vs {} keypoints, score {:.3}",
            matches.len(),
            a.len(),
            b.len(),
            score
        );

        KeypointMatch {
            score,
            match_count: matches.len(),
            keypoints_a: a.len(),
            keypoints_b: b.len(),
        }
    }

    /// Like [`compare`](Self::compare), but any failure yields a zero score.
    pub fn compare_or_zero(&self, a: &RgbImage, b: &RgbImage) -> KeypointMatch {
        self.compare(a, b).unwrap_or_else(|e| {
            warn!("Keypoint comparison failed, scoring as no match: {}", e);
            KeypointMatch::zero()
        })
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}
