//! Region-level tamper verification for pairs of document images.
//!
//! A [`DocumentVerifier`] locates labelled regions (profile photo, signature, ...)
//! in two renderings of the same document, scores each region pair with a learned
//! embedding and a keypoint match ratio, and fuses the per-region outcomes into a
//! single [`VerificationResult`].

use std::collections::HashMap;

use image::RgbImage;
use log::{debug, info, warn};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use crate::{
    analysis::{
        embedding::{EmbeddingModel, FeatureEmbedder},
        matching::KeypointComparator,
        similarity::SimilarityEngine,
    },
    detection::{
        DetectedRegion, RegionDetector, RegionLabel, best_per_label,
        crop::{Crop, CropExtractor},
        tampering::{MissingIn, RegionComparison, RegionOutcome, TamperDecisionFuser},
        template::TemplateDetector,
    },
};

pub mod analysis;
pub mod config;
pub mod detection;
pub mod error;
pub mod image_utils;
pub mod input;
pub mod report;

pub use config::{EmbedderConfig, KeypointConfig, Thresholds, VerificationConfig};
pub use detection::tampering::VerificationResult;
pub use error::{Result, VerifyError};
pub use input::{DocumentKind, DocumentLoader, PageRasterizer};

/// Whole-page embedding comparison, without region detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WholeDocumentComparison {
    pub similarity: f64,
    pub is_same: bool,
}

pub struct DocumentVerifier {
    config: VerificationConfig,
    detector: Box<dyn RegionDetector>,
    extractor: CropExtractor,
    engine: SimilarityEngine,
    fuser: TamperDecisionFuser,
}

impl DocumentVerifier {
    pub fn new(
        config: VerificationConfig,
        detector: Box<dyn RegionDetector>,
        model: EmbeddingModel,
    ) -> Result<Self> {
        config.validate()?;

        let engine = SimilarityEngine::new(
            FeatureEmbedder::new(model, &config.embedder),
            KeypointComparator::new(&config.keypoints),
        );
        let fuser = TamperDecisionFuser::new(config.labels.clone());

        debug!(
            "Document verifier ready: detector '{}', labels {:?}",
            detector.name(),
            config.labels
        );

        Ok(Self {
            config,
            detector,
            extractor: CropExtractor::new(),
            engine,
            fuser,
        })
    }

    /// Loads the embedding model and uses the configured layout template for detection.
    pub fn from_config(config: VerificationConfig) -> Result<Self> {
        let model = EmbeddingModel::initialize(&config.embedder)?;
        let detector = TemplateDetector::new(config.layout.clone())?;
        Self::new(config, Box::new(detector), model)
    }

    /// Detection failures are not fatal: the affected document simply has no regions.
    pub fn verify(&self, a: &RgbImage, b: &RgbImage) -> VerificationResult {
        let regions_a = self.detect(a, "first");
        let regions_b = self.detect(b, "second");
        self.verify_regions(a, &regions_a, b, &regions_b)
    }

    /// Runs comparison and fusion on detections supplied by the caller.
    pub fn verify_regions(
        &self,
        a: &RgbImage,
        regions_a: &[DetectedRegion],
        b: &RgbImage,
        regions_b: &[DetectedRegion],
    ) -> VerificationResult {
        let best_a = best_per_label(regions_a);
        let best_b = best_per_label(regions_b);

        let compare = |label: &RegionLabel| {
            let crop_a = self.crop_for(a, &best_a, label);
            let crop_b = self.crop_for(b, &best_b, label);
            (label.clone(), self.compare_crops(label, crop_a, crop_b))
        };

        let outcomes: HashMap<RegionLabel, RegionOutcome> = if self.config.parallel {
            self.config.labels.par_iter().map(compare).collect()
        } else {
            self.config.labels.iter().map(compare).collect()
        };

        self.fuser.fuse(outcomes)
    }

    pub fn compare_whole(&self, a: &RgbImage, b: &RgbImage) -> Result<WholeDocumentComparison> {
        let similarity = self.engine.embedding_similarity(a, b)?;
        let is_same = similarity >= self.config.thresholds.embedding;

        info!(
            "Whole-document similarity {:.4} ({})",
            similarity,
            if is_same { "same" } else { "different" }
        );

        Ok(WholeDocumentComparison {
            similarity,
            is_same,
        })
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn detector(&self) -> &dyn RegionDetector {
        self.detector.as_ref()
    }

    fn detect(&self, image: &RgbImage, which: &str) -> Vec<DetectedRegion> {
        match self.detector.detect(image) {
            Ok(regions) => {
                debug!("{} region(s) detected in {} document", regions.len(), which);
                regions
            }
            Err(e) => {
                warn!("Region detection failed for {} document: {}", which, e);
                Vec::new()
            }
        }
    }

    fn crop_for(
        &self,
        image: &RgbImage,
        regions: &[DetectedRegion],
        label: &RegionLabel,
    ) -> Option<Crop> {
        let region = regions.iter().find(|r| &r.label == label)?;

        self.extractor
            .extract(image, region)
            .map_err(|e| warn!("Skipping region '{}': {}", label, e))
            .ok()
    }

    fn compare_crops(
        &self,
        label: &RegionLabel,
        a: Option<Crop>,
        b: Option<Crop>,
    ) -> RegionOutcome {
        match (a, b) {
            (Some(a), Some(b)) => {
                let similarity = self
                    .engine
                    .compare_region(&a.image, &b.image, &self.config.thresholds);
                RegionOutcome::Compared(RegionComparison {
                    first: a.bbox,
                    second: b.bbox,
                    similarity,
                })
            }
            (a, b) => {
                let missing_in = match (a, b) {
                    (Some(a), None) => MissingIn::Second(a.bbox),
                    (None, Some(b)) => MissingIn::First(b.bbox),
                    _ => MissingIn::Both,
                };
                debug!("Region '{}' not detected ({:?})", label, missing_in);
                RegionOutcome::NotDetected(missing_in)
            }
        }
    }
}
