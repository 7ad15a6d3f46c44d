//! Oriented FAST corners with rotated binary (BRIEF-style) descriptors.
//!
//! Corners are found on a downscaled image pyramid so matching tolerates scale
//! changes, and every descriptor is sampled in a frame rotated to the corner's
//! intensity-centroid orientation so it tolerates rotation.

use std::sync::OnceLock;

use image::{
    GrayImage,
    imageops::{self, FilterType},
};
use imageproc::{
    corners::{Corner, corners_fast9},
    filter::gaussian_blur_f32,
};
use log::debug;
use ndarray::Array2;

use crate::{
    config::KeypointConfig,
    image_utils::{gray_to_array, pad_replicate},
};

pub const DESCRIPTOR_BITS: usize = 256;
const DESCRIPTOR_WORDS: usize = DESCRIPTOR_BITS / 64;

/// Replicated border added around each pyramid level so corners near the
/// edge can still be oriented and described.
pub const EDGE_MARGIN: u32 = 20;
/// Levels with a side shorter than this end the pyramid.
const MIN_LEVEL_SIDE: u32 = 8;
const ORIENTATION_RADIUS: i32 = 15;
const PATTERN_EXTENT: f32 = 13.0;
const PATTERN_SIGMA: f32 = 31.0 / 5.0;
const NMS_RADIUS: i32 = 3;
const SMOOTHING_SIGMA: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u64; DESCRIPTOR_WORDS]);

impl Descriptor {
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Position in full-resolution pixel coordinates.
    pub x: f32,
    pub y: f32,
    /// Orientation in radians.
    pub angle: f32,
    /// Pyramid level the corner was found on.
    pub octave: usize,
    pub response: f32,
}

/// Keypoints and their descriptors, index-aligned. May be empty.
#[derive(Debug, Clone, Default)]
pub struct KeypointSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl KeypointSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    fn push(&mut self, keypoint: Keypoint, descriptor: Descriptor) {
        self.keypoints.push(keypoint);
        self.descriptors.push(descriptor);
    }
}

pub struct KeypointDetector {
    config: KeypointConfig,
}

impl KeypointDetector {
    pub fn new(config: KeypointConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, gray: &GrayImage) -> KeypointSet {
        let mut set = KeypointSet::default();
        let (width, height) = gray.dimensions();

        for (octave, quota) in self.level_quotas().into_iter().enumerate() {
            let scale = self.config.scale_factor.powi(octave as i32);
            let level_width = (width as f32 / scale).round() as u32;
            let level_height = (height as f32 / scale).round() as u32;

            if level_width < MIN_LEVEL_SIDE || level_height < MIN_LEVEL_SIDE {
                break;
            }

            let level = if octave == 0 {
                pad_replicate(gray, EDGE_MARGIN)
            } else {
                let resized =
                    imageops::resize(gray, level_width, level_height, FilterType::Triangle);
                pad_replicate(&resized, EDGE_MARGIN)
            };

            let corners = self.select_corners(&level, quota);
            if corners.is_empty() {
                continue;
            }

            let intensity = gray_to_array(&level);
            let smoothed = gray_to_array(&gaussian_blur_f32(&level, SMOOTHING_SIGMA));

            for corner in &corners {
                let (cx, cy) = (corner.x as i32, corner.y as i32);
                let angle = intensity_centroid_angle(&intensity, cx, cy);
                let descriptor = describe(&smoothed, cx, cy, angle);

                set.push(
                    Keypoint {
                        x: (corner.x - EDGE_MARGIN) as f32 * scale,
                        y: (corner.y - EDGE_MARGIN) as f32 * scale,
                        angle,
                        octave,
                        response: corner.score,
                    },
                    descriptor,
                );
            }

            debug!(
                "Pyramid level {} ({}x{}): {} keypoint(s)",
                octave,
                level_width,
                level_height,
                corners.len()
            );
        }

        set
    }

    /// Splits `max_features` across pyramid levels, geometrically decreasing with scale.
    fn level_quotas(&self) -> Vec<usize> {
        let levels = self.config.pyramid_levels;
        let factor = 1.0 / self.config.scale_factor;
        let first = self.config.max_features as f32 * (1.0 - factor)
            / (1.0 - factor.powi(levels as i32));

        (0..levels)
            .map(|i| ((first * factor.powi(i as i32)).round() as usize).max(1))
            .collect()
    }

    /// Strongest FAST corners inside the unpadded area of `level`, with radius-based suppression.
    fn select_corners(&self, level: &GrayImage, quota: usize) -> Vec<Corner> {
        let (width, height) = level.dimensions();
        let mut corners = corners_fast9(level, self.config.fast_threshold);

        corners.retain(|c| {
            c.x >= EDGE_MARGIN
                && c.y >= EDGE_MARGIN
                && c.x < width - EDGE_MARGIN
                && c.y < height - EDGE_MARGIN
        });
        corners.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });

        let mut suppressed = vec![false; (width * height) as usize];
        let mut kept = Vec::with_capacity(quota.min(corners.len()));

        for corner in corners {
            if kept.len() >= quota {
                break;
            }

            let (x, y) = (corner.x as i32, corner.y as i32);
            if suppressed[(y as u32 * width + x as u32) as usize] {
                continue;
            }

            for ny in (y - NMS_RADIUS).max(0)..=(y + NMS_RADIUS).min(height as i32 - 1) {
                for nx in (x - NMS_RADIUS).max(0)..=(x + NMS_RADIUS).min(width as i32 - 1) {
                    suppressed[(ny as u32 * width + nx as u32) as usize] = true;
                }
            }

            kept.push(corner);
        }

        kept
    }
}

fn intensity_centroid_angle(intensity: &Array2<f32>, cx: i32, cy: i32) -> f32 {
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;
    let r2 = ORIENTATION_RADIUS * ORIENTATION_RADIUS;

    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let v = intensity[[(cy + dy) as usize, (cx + dx) as usize]];
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }

    m01.atan2(m10)
}

fn describe(smoothed: &Array2<f32>, cx: i32, cy: i32, angle: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let sample = |x: i32, y: i32| {
        let rx = (cos * x as f32 - sin * y as f32).round() as i32;
        let ry = (sin * x as f32 + cos * y as f32).round() as i32;
        smoothed[[(cy + ry) as usize, (cx + rx) as usize]]
    };

    let mut words = [0u64; DESCRIPTOR_WORDS];
    for (i, &[x1, y1, x2, y2]) in sampling_pattern().iter().enumerate() {
        if sample(x1, y1) < sample(x2, y2) {
            words[i / 64] |= 1u64 << (i % 64);
        }
    }

    Descriptor(words)
}

/// Fixed point-pair test pattern, Gaussian-distributed around the keypoint.
fn sampling_pattern() -> &'static [[i32; 4]] {
    static PATTERN: OnceLock<Vec<[i32; 4]>> = OnceLock::new();

    PATTERN.get_or_init(|| {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut uniform = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 40) as f32 / (1u64 << 24) as f32
        };
        // Irwin-Hall with n = 4 has variance 1/3.
        let mut offset = move || {
            let g = ((0..4).map(|_| uniform()).sum::<f32>() - 2.0) * 3.0f32.sqrt();
            (g * PATTERN_SIGMA).round().clamp(-PATTERN_EXTENT, PATTERN_EXTENT) as i32
        };

        let mut pattern = Vec::with_capacity(DESCRIPTOR_BITS);
        while pattern.len() < DESCRIPTOR_BITS {
            let pair = [offset(), offset(), offset(), offset()];
            if (pair[0], pair[1]) != (pair[2], pair[3]) {
                pattern.push(pair);
            }
        }
        pattern
    })
}
